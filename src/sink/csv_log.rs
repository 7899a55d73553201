//! Durable CSV append log
//!
//! One file per process lifetime, created at startup with a header row.
//! Appends take an exclusive lock for the duration of one row write and
//! flush explicitly before releasing it, so every acknowledged row is on
//! its way to disk even if the process dies mid-stream.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use crate::error::{PipelineError, Result};
use crate::record::escape_field;

/// Header of the durable log
const HEADER: &str = "timestamp,entity,explanation,domain\n";

/// Process-lifetime append-only CSV log
pub struct CsvAppendLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl CsvAppendLog {
    /// Create the log file under `dir`, named with the start time
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|source| PipelineError::AppendLog {
            path: dir.to_path_buf(),
            source,
        })?;

        let name = format!("terms_explained_{}.csv", Local::now().format("%Y%m%d_%H%M%S"));
        let path = dir.join(name);

        let mut file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .map_err(|source| PipelineError::AppendLog {
                path: path.clone(),
                source,
            })?;
        file.write_all(HEADER.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|source| PipelineError::AppendLog {
                path: path.clone(),
                source,
            })?;

        tracing::info!(path = %path.display(), "durable append log created");

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Append one row and flush before returning
    pub fn append(
        &self,
        timestamp: &str,
        entity: &str,
        explanation: &str,
        domain: &str,
    ) -> std::io::Result<()> {
        let row = format!(
            "{},{},{},{}\n",
            escape_field(timestamp),
            escape_field(entity),
            escape_field(explanation),
            escape_field(domain),
        );

        let mut file = self.file.lock();
        file.write_all(row.as_bytes())?;
        file.flush()
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for CsvAppendLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvAppendLog").field("path", &self.path).finish()
    }
}

#[cfg(test)]
#[path = "csv_log_test.rs"]
mod csv_log_test;
