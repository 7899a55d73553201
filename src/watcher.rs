//! Source watcher
//!
//! Polling tail over a directory of rotating term CSV files. Each tick scans
//! for files matching `<prefix>*.csv`, switches to the newest one when a
//! newer file appears (the recognizer rotates by creating new files, never
//! renaming), and drains the active file's growth through the record parser
//! and the admission filter into the dispatch queue.
//!
//! Switching and draining happen on one task, so they never interleave: a
//! rotation is only observed at a record boundary. With no matching file the
//! watcher idles until one appears.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tokio_util::sync::CancellationToken;

use crate::config::WatcherConfig;
use crate::error::{PipelineError, Result};
use crate::filter::AdmissionFilter;
use crate::metrics::PipelineMetrics;
use crate::queue::DispatchQueue;
use crate::record::{parse_record, RecordReader, Task};

/// Polling tail over the recognizer's output directory
#[derive(Debug)]
pub struct SourceWatcher {
    config: WatcherConfig,
    filter: Arc<AdmissionFilter>,
    queue: Arc<DispatchQueue>,
    metrics: Arc<PipelineMetrics>,
}

impl SourceWatcher {
    /// Create a watcher; fails if the watched directory is not readable
    pub fn new(
        config: WatcherConfig,
        filter: Arc<AdmissionFilter>,
        queue: Arc<DispatchQueue>,
        metrics: Arc<PipelineMetrics>,
    ) -> Result<Self> {
        let meta = std::fs::metadata(&config.dir).map_err(|source| PipelineError::WatchDir {
            path: config.dir.clone(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(PipelineError::WatchDir {
                path: config.dir.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "not a directory"),
            });
        }

        Ok(Self {
            config,
            filter,
            queue,
            metrics,
        })
    }

    /// Run until cancellation; spawn this as a tokio task
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            dir = %self.config.dir.display(),
            prefix = %self.config.file_prefix,
            "source watcher started"
        );

        let mut active: Option<ActiveFile> = None;
        loop {
            self.observe(&mut active);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        tracing::debug!("source watcher stopped");
    }

    /// One tick: maybe switch files, then drain growth
    fn observe(&self, active: &mut Option<ActiveFile>) {
        if let Some((path, modified)) = self.newest_source_file() {
            let is_newer = match active {
                Some(current) => current.path != path && modified > current.modified,
                None => true,
            };
            if is_newer {
                match ActiveFile::open(&path, modified, self.config.start_from_beginning) {
                    Ok(opened) => {
                        tracing::info!(path = %path.display(), "switched to source file");
                        self.filter.reset_group();
                        *active = Some(opened);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "source file open failed");
                    }
                }
            }
        }

        if let Some(current) = active {
            if let Err(e) = self.drain(current) {
                tracing::warn!(path = %current.path.display(), error = %e, "source read failed");
            }
        }
    }

    /// Newest file under the watched directory matching `<prefix>*.csv`
    fn newest_source_file(&self) -> Option<(PathBuf, SystemTime)> {
        let entries = std::fs::read_dir(&self.config.dir).ok()?;
        entries
            .flatten()
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name.starts_with(&self.config.file_prefix) && name.ends_with(".csv")
            })
            .filter_map(|entry| {
                let modified = entry.metadata().ok()?.modified().ok()?;
                Some((entry.path(), modified))
            })
            .max_by_key(|(path, modified)| (*modified, path.clone()))
    }

    /// Read appended bytes and feed complete records downstream
    fn drain(&self, active: &mut ActiveFile) -> std::io::Result<()> {
        let grown = active.read_growth()?;
        if grown == 0 {
            return Ok(());
        }

        while let Some(line) = active.reader.next_record() {
            if active.header_pending {
                active.header_pending = false;
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }

            match parse_record(&line) {
                Some(record) => {
                    self.metrics.record_read();
                    if self.filter.accept(&record) {
                        self.queue.offer(Task::from(record));
                    }
                }
                None => {
                    self.metrics.record_parse_error();
                    tracing::warn!(line = %line, "unparseable source record skipped");
                }
            }
        }
        Ok(())
    }
}

/// Tail state for the currently watched file
struct ActiveFile {
    path: PathBuf,
    modified: SystemTime,
    file: File,
    offset: u64,
    pending: Vec<u8>,
    reader: RecordReader,
    header_pending: bool,
}

impl ActiveFile {
    fn open(path: &Path, modified: SystemTime, from_beginning: bool) -> std::io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let offset = if from_beginning { 0 } else { len };

        Ok(Self {
            path: path.to_path_buf(),
            modified,
            file,
            offset,
            pending: Vec::new(),
            reader: RecordReader::new(),
            // tailing from the end leaves the header row behind the offset
            header_pending: from_beginning,
        })
    }

    /// Read bytes appended since the last call into the record reader
    ///
    /// Only whole UTF-8 sequences reach the reader; a split multi-byte
    /// character waits in `pending` for the rest of its bytes.
    fn read_growth(&mut self) -> std::io::Result<u64> {
        let len = self.file.metadata()?.len();
        if len < self.offset {
            // truncated in place; start over from the top
            tracing::warn!(path = %self.path.display(), "source file truncated, re-reading");
            self.offset = 0;
            self.pending.clear();
            self.reader = RecordReader::new();
            self.header_pending = true;
        }
        if len == self.offset {
            return Ok(0);
        }

        self.file.seek(SeekFrom::Start(self.offset))?;
        let mut chunk = Vec::with_capacity((len - self.offset) as usize);
        (&self.file).take(len - self.offset).read_to_end(&mut chunk)?;
        let read = chunk.len() as u64;
        self.offset += read;
        self.pending.extend_from_slice(&chunk);

        let cut = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // incomplete trailing sequence: hold it back
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            // truly invalid bytes flow through as replacement characters
            Err(_) => self.pending.len(),
        };
        if cut > 0 {
            let text = String::from_utf8_lossy(&self.pending[..cut]);
            self.reader.push(&text);
            self.pending.drain(..cut);
        }
        Ok(read)
    }
}

#[cfg(test)]
#[path = "watcher_test.rs"]
mod watcher_test;
