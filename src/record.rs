//! Term record parsing
//!
//! Turns raw bytes tailed from a source CSV into typed [`Record`]s. The
//! reader is incremental: chunks are pushed as the file grows and complete
//! logical records are pulled out one at a time. A quoted field may span
//! physical lines, so a record is only complete once its quote parity is
//! balanced *and* it ends in a newline; anything else stays buffered and is
//! re-attempted after more data arrives. Bytes are never dropped and partial
//! records are never emitted.

/// One detected-term record from the source stream
///
/// Immutable after creation. `confidence` is in `[0, 1]` as produced by the
/// upstream recognizer.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Burst-group timestamp (opaque string, grouping key)
    pub timestamp: String,

    /// Entity category (e.g. `Product`, `Organization`)
    pub category: String,

    /// The detected term itself
    pub entity: String,

    /// Recognizer confidence in [0, 1]
    pub confidence: f64,

    /// Surrounding utterance the term was detected in
    pub source_context: String,
}

/// An admitted record queued for explanation
///
/// Same shape as [`Record`]; the distinct type marks the ownership handoff
/// from the admission filter to the dispatch queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub timestamp: String,
    pub category: String,
    pub entity: String,
    pub confidence: f64,
    pub source_context: String,
}

impl From<Record> for Task {
    fn from(r: Record) -> Self {
        Self {
            timestamp: r.timestamp,
            category: r.category,
            entity: r.entity,
            confidence: r.confidence,
            source_context: r.source_context,
        }
    }
}

/// Incremental reader of complete logical CSV records
///
/// Feed appended file content with [`push`](Self::push), then drain complete
/// records with [`next_record`](Self::next_record). The unconsumed tail
/// (partial line, or a record with an open quoted field) is kept across
/// calls, which gives the rewind-on-incomplete behavior of a seekable tail
/// without re-reading from the file.
#[derive(Debug, Default)]
pub struct RecordReader {
    buf: String,
}

impl RecordReader {
    /// Create an empty reader
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly read file content
    pub fn push(&mut self, chunk: &str) {
        self.buf.push_str(chunk);
    }

    /// Bytes currently buffered but not yet consumed
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Pull the next complete logical record, if one is buffered
    ///
    /// Returns the record text without its trailing newline. A record is
    /// complete when a newline is reached with an even number of `"` seen so
    /// far; newlines inside an open quoted field are part of the record.
    pub fn next_record(&mut self) -> Option<String> {
        let mut quotes = 0usize;
        for (i, ch) in self.buf.char_indices() {
            match ch {
                '"' => quotes += 1,
                '\n' if quotes % 2 == 0 => {
                    let mut line: String = self.buf.drain(..=i).collect();
                    // strip the newline and an optional preceding \r
                    line.pop();
                    if line.ends_with('\r') {
                        line.pop();
                    }
                    return Some(line);
                }
                _ => {}
            }
        }
        None
    }
}

/// Parse one complete logical record line into a typed [`Record`]
///
/// Fields are split with RFC-4180 quoting (`""` escapes a quote inside a
/// quoted field). Returns `None` when the line has fewer than five fields or
/// the confidence field is not a number; callers log and count these, they
/// are never fatal.
pub fn parse_record(line: &str) -> Option<Record> {
    let fields = split_fields(line);
    if fields.len() < 5 {
        return None;
    }

    let confidence: f64 = fields[3].trim().parse().ok()?;

    Some(Record {
        timestamp: fields[0].trim().to_string(),
        category: fields[1].trim().to_string(),
        entity: fields[2].trim().to_string(),
        confidence,
        source_context: fields[4].clone(),
    })
}

/// Split a CSV line into fields, honoring quoting
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
            }
            _ => field.push(ch),
        }
    }
    fields.push(field);
    fields
}

/// Escape one value for CSV output (used by the durable append sink)
pub fn escape_field(value: &str) -> String {
    if value.contains(['"', ',', '\n', '\r']) {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('"');
        for ch in value.chars() {
            if ch == '"' {
                out.push('"');
            }
            out.push(ch);
        }
        out.push('"');
        out
    } else {
        value.to_string()
    }
}

#[cfg(test)]
#[path = "record_test.rs"]
mod record_test;
