//! Pipeline configuration
//!
//! Serde-deserializable configuration tree for the whole pipeline. Every
//! section has sensible defaults so an empty config file is valid; builder
//! methods cover the knobs tests and embedders touch most.
//!
//! # Example
//!
//! ```toml
//! [watcher]
//! dir = "ner_results"
//! file_prefix = "terms_"
//! start_from_beginning = false
//!
//! [queue]
//! capacity = 1000
//! spill_capacity = 5000
//!
//! [workers]
//! count = 5
//!
//! [sinks.remote]
//! base_url = "http://localhost:5000"
//! meeting_id = "demo123"
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PipelineError, Result};

/// Top-level pipeline configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Source watcher settings
    pub watcher: WatcherConfig,

    /// Admission filter settings
    pub filter: FilterConfig,

    /// Dispatch queue settings
    pub queue: QueueConfig,

    /// Worker pool settings
    pub workers: WorkerConfig,

    /// Sink settings (durable log + remote push)
    pub sinks: SinksConfig,

    /// Metrics reporter settings
    pub metrics: MetricsConfig,
}

impl PipelineConfig {
    /// Set the watched source directory
    #[must_use]
    pub fn with_watch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.watcher.dir = dir.into();
        self
    }

    /// Set the durable log output directory
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sinks.log_dir = dir.into();
        self
    }

    /// Set the remote push endpoint
    #[must_use]
    pub fn with_remote(mut self, base_url: impl Into<String>, meeting_id: impl Into<String>) -> Self {
        self.sinks.remote.base_url = base_url.into();
        self.sinks.remote.meeting_id = meeting_id.into();
        self
    }

    /// Set the worker count
    #[must_use]
    pub fn with_workers(mut self, count: usize) -> Self {
        self.workers.count = count;
        self
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.queue.capacity == 0 {
            return Err(PipelineError::config("queue.capacity must be > 0"));
        }
        if self.workers.count == 0 {
            return Err(PipelineError::config("workers.count must be > 0"));
        }
        if self.workers.retry_max_attempts == 0 {
            return Err(PipelineError::config("workers.retry_max_attempts must be > 0"));
        }
        Ok(())
    }
}

/// Source watcher configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Directory containing the rotating term CSV files
    pub dir: PathBuf,

    /// File name prefix identifying source files (e.g. `terms_`)
    pub file_prefix: String,

    /// Poll interval for change detection
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,

    /// Read the active file from its first data row instead of only
    /// tailing new growth (default: tail only)
    pub start_from_beginning: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("ner_results"),
            file_prefix: "terms_".into(),
            poll_interval: Duration::from_millis(200),
            start_from_beginning: false,
        }
    }
}

/// Admission filter configuration
///
/// The 0.5 confidence floor is a fixed property of the filter, not a config
/// knob; see [`crate::filter::CONFIDENCE_FLOOR`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Categories admitted through rule 3
    pub allowed_categories: HashSet<String>,

    /// Minimum entity token count (split on hyphen/slash/whitespace)
    pub min_term_tokens: usize,

    /// Deduplicate within a burst group (same timestamp)
    pub dedup_within_group: bool,

    /// Admit below-minimum-token entities at or above this confidence
    pub one_token_confidence_override: f64,

    /// Admit below-minimum-token entities up to this length (acronyms)
    pub acronym_max_len: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        let allowed_categories = ["Person", "PersonType", "Organization", "Event", "Product", "Skill"]
            .into_iter()
            .map(String::from)
            .collect();
        Self {
            allowed_categories,
            min_term_tokens: 2,
            dedup_within_group: true,
            one_token_confidence_override: 0.92,
            acronym_max_len: 3,
        }
    }
}

/// Dispatch queue configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Bounded queue capacity
    pub capacity: usize,

    /// Spill buffer cap; the oldest spilled task is evicted beyond this
    pub spill_capacity: usize,

    /// Maximum spilled tasks moved back per refill step
    pub refill_batch: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: crate::DEFAULT_QUEUE_CAPACITY,
            spill_capacity: crate::DEFAULT_SPILL_CAPACITY,
            refill_batch: 256,
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of concurrent workers
    pub count: usize,

    /// Queue poll interval when idle
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,

    /// Maximum capability call attempts per task
    pub retry_max_attempts: u32,

    /// Base backoff delay (doubled per attempt, jittered)
    #[serde(with = "duration_ms")]
    pub retry_base_delay: Duration,

    /// Budget for a single capability attempt
    #[serde(with = "duration_ms")]
    pub attempt_timeout: Duration,

    /// Budget across all attempts for one task
    #[serde(with = "duration_ms")]
    pub total_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: crate::DEFAULT_WORKERS,
            poll_interval: Duration::from_millis(200),
            retry_max_attempts: 3,
            retry_base_delay: Duration::from_millis(800),
            attempt_timeout: Duration::from_secs(25),
            total_timeout: Duration::from_secs(60),
        }
    }
}

/// Sink configuration (durable log + remote push)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinksConfig {
    /// Directory for the process-lifetime append log
    pub log_dir: PathBuf,

    /// Remote push endpoint settings
    pub remote: RemoteConfig,
}

impl Default for SinksConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("agent_results"),
            remote: RemoteConfig::default(),
        }
    }
}

/// Remote push endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the term store (no trailing slash required)
    pub base_url: String,

    /// Meeting/session path segment
    pub meeting_id: String,

    /// TCP connect timeout
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,

    /// Response read timeout
    #[serde(with = "duration_ms")]
    pub read_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".into(),
            meeting_id: "demo123".into(),
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(7),
        }
    }
}

/// Metrics reporter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether periodic reporting is enabled
    pub enabled: bool,

    /// Snapshot interval
    #[serde(with = "duration_ms")]
    pub interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(2),
        }
    }
}

/// Serialize durations as integer milliseconds in config files
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
