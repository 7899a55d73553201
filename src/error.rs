//! Pipeline error types
//!
//! Errors that can abort pipeline startup or a sink operation. Per-task
//! capability failures live in [`crate::explain::ExplainError`] because they
//! are handled inside the worker loop and never propagate out of it.

use std::path::PathBuf;

use thiserror::Error;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Watch directory missing or unreadable at startup
    #[error("watch directory unavailable: {path}")]
    WatchDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open the durable append log
    #[error("failed to open append log: {path}")]
    AppendLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Remote push client could not be constructed
    #[error("remote push client error: {0}")]
    RemoteClient(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
