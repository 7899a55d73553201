//! Explanation capability interface and response-text grammar
//!
//! The pipeline treats text generation as an opaque collaborator behind
//! [`ExplainCapability`]: open a session once per worker, then ask it to
//! explain `(term, category, context)` and get free text back. Failure modes
//! are classified here so the worker's retry machine can tell transient
//! trouble from misconfiguration.
//!
//! The raw response text follows a loose shape this module parses with an
//! explicit grammar instead of ad-hoc pattern matching:
//!
//! - an optional leading **domain label** (one token) terminated by a
//!   separator from [`LABEL_SEPARATORS`] or whitespace, then the explanation
//!   body;
//! - sentences end at any boundary in [`SENTENCE_BOUNDARIES`];
//! - a final sentence opening with one of [`CONTEXT_PREFIXES`] refers back to
//!   the source utterance and is stripped before durable storage only.

use async_trait::async_trait;
use thiserror::Error;

/// Fixed response value meaning "no explanation produced, discard silently"
pub const DECLINE_SENTINEL: &str = "__SKIP__";

/// Separator punctuation that may terminate the domain label
pub const LABEL_SEPARATORS: [char; 5] = ['.', ':', '—', '–', '-'];

/// Sentence-ending characters (Latin and CJK)
pub const SENTENCE_BOUNDARIES: [char; 7] = ['.', '!', '?', '。', '！', '？', '…'];

/// Openers of a context-referencing final sentence ("in this context...",
/// "here it appears as..."), with and without internal spacing
pub const CONTEXT_PREFIXES: &[&str] = &[
    "여기서는",
    "이 맥락",
    "이맥락",
    "현재 맥락",
    "현재맥락",
    "본 맥락",
    "본맥락",
    "이 경우",
    "이경우",
    "해당 문맥",
    "해당문맥",
    "해당 맥락",
    "해당맥락",
];

/// A worker's long-lived handle to the capability
///
/// Created lazily on a worker's first task and reused for every subsequent
/// task on that worker. Never shared, never migrated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One explanation request
#[derive(Debug, Clone)]
pub struct ExplainRequest {
    /// The term to explain
    pub term: String,

    /// Its detected category
    pub category: String,

    /// The utterance it was detected in
    pub context: String,
}

/// Capability failure classification
///
/// The worker retries `Transient` and `AttemptTimeout` within its budget;
/// `Unauthorized` and `InvalidTarget` abort the task immediately and are
/// never recovered by re-binding the capability identity.
#[derive(Debug, Error)]
pub enum ExplainError {
    /// One attempt exceeded its timeout
    #[error("explanation attempt timed out")]
    AttemptTimeout,

    /// The total budget across attempts ran out
    #[error("explanation budget exceeded after {attempts} attempts")]
    BudgetExceeded { attempts: u32 },

    /// Transient failure (network, 5xx, throttling)
    #[error("transient capability failure: {0}")]
    Transient(String),

    /// Authorization failure against the capability
    #[error("capability access unauthorized: {0}")]
    Unauthorized(String),

    /// The bound capability target does not exist or is unreachable
    #[error("invalid capability target: {0}")]
    InvalidTarget(String),
}

impl ExplainError {
    /// Fatal errors abort the task without retries
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::InvalidTarget(_))
    }
}

/// Opaque text-generation collaborator
///
/// Implementations wrap whatever backs the capability (an agent service, an
/// LLM API). The pipeline only requires these two operations; rate limiting
/// and latency are the implementation's business, classification of failures
/// is its contract.
#[async_trait]
pub trait ExplainCapability: Send + Sync {
    /// Open a new conversation session
    async fn open_session(&self) -> Result<SessionId, ExplainError>;

    /// Produce an explanation for the request on the given session
    ///
    /// Returns the raw response text; [`DECLINE_SENTINEL`] means the
    /// capability chose not to explain the term.
    async fn explain(
        &self,
        session: &SessionId,
        request: &ExplainRequest,
    ) -> Result<String, ExplainError>;
}

/// Split an optional leading domain label from the explanation body
///
/// The label is the first token, ended by a separator or whitespace; one
/// separator after the label is consumed. A single-token response yields an
/// empty body. Empty input yields two empty strings.
pub fn split_domain_and_body(text: &str) -> (String, String) {
    let s = text.trim();
    if s.is_empty() {
        return (String::new(), String::new());
    }

    let label_end = s
        .char_indices()
        .find(|(_, ch)| ch.is_whitespace() || LABEL_SEPARATORS.contains(ch))
        .map(|(i, _)| i)
        .unwrap_or(s.len());

    let label = &s[..label_end];
    let mut rest = s[label_end..].trim_start();
    if let Some(first) = rest.chars().next() {
        if LABEL_SEPARATORS.contains(&first) {
            rest = rest[first.len_utf8()..].trim_start();
        }
    }

    (label.to_string(), rest.trim_end().to_string())
}

/// Strip a trailing context-referencing sentence, if present
///
/// Returns the (possibly shortened) body and whether a sentence was removed.
/// Only the final sentence is considered; earlier context references stay.
pub fn strip_trailing_context_sentence(body: &str) -> (String, bool) {
    let Some((start, text)) = last_sentence(body) else {
        return (body.to_string(), false);
    };

    let trimmed = text.trim_start();
    let is_context = CONTEXT_PREFIXES.iter().any(|p| trimmed.starts_with(p));
    if is_context {
        (body[..start].trim_end().to_string(), true)
    } else {
        (body.to_string(), false)
    }
}

/// Locate the last non-blank sentence: `(byte offset of its start, text)`
///
/// A sentence is a run of non-boundary characters followed by a run of
/// boundary characters (or end of input).
fn last_sentence(body: &str) -> Option<(usize, &str)> {
    let mut sentences: Vec<(usize, usize)> = Vec::new();
    let mut start: Option<usize> = None;
    let mut in_boundary = false;

    for (i, ch) in body.char_indices() {
        let boundary = SENTENCE_BOUNDARIES.contains(&ch);
        if boundary {
            in_boundary = true;
        } else {
            if in_boundary {
                // boundary run ended: close the previous sentence
                if let Some(s) = start.take() {
                    sentences.push((s, i));
                }
                in_boundary = false;
            }
            if start.is_none() {
                start = Some(i);
            }
        }
    }
    if let Some(s) = start {
        sentences.push((s, body.len()));
    }

    sentences
        .into_iter()
        .rev()
        .map(|(s, e)| (s, &body[s..e]))
        .find(|(_, text)| !text.trim().is_empty())
}

#[cfg(test)]
#[path = "explain_test.rs"]
mod explain_test;
