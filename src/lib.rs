//! termflow - Streaming term-explanation pipeline
//!
//! Tails an append-only, rotating CSV stream of detected terms, filters and
//! deduplicates them, and dispatches each admitted term to a worker pool that
//! obtains a natural-language explanation from an external capability. Every
//! result is appended to a durable local CSV log and pushed to a remote
//! endpoint on a best-effort basis.
//!
//! # Architecture
//!
//! ```text
//! [Watcher]            [Filter]        [Queue]           [Workers]        [Sinks]
//!  terms_*.csv ──→ AdmissionFilter ──→ bounded ──→ worker 1..N ──┬──→ CSV append log
//!  (poll + tail)    dedup/rules        + spill     (session each) └──→ remote POST
//! ```
//!
//! # Key Design
//!
//! - **Two-tier queue**: non-blocking `offer` into a bounded queue with a
//!   capped spill buffer; workers refill from spill oldest-first. The watcher
//!   never blocks on worker throughput.
//! - **Session affinity**: each worker lazily opens one capability session and
//!   reuses it for its lifetime; sessions are never shared or migrated.
//! - **Explicit retry machine**: transient capability failures retry with
//!   jittered exponential backoff inside per-attempt and total-budget
//!   timeouts; authorization and invalid-target failures abort immediately.
//! - **Decoupled sinks**: the local append log is the system of record; remote
//!   push failures are logged and never roll back the local write.
//! - **At-least-once**: no exactly-once remote delivery; sustained overload
//!   evicts the oldest spilled task, always counted, never silent.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use termflow::{PipelineConfig, TermPipeline};
//!
//! let config = PipelineConfig::default()
//!     .with_watch_dir("ner_results")
//!     .with_output_dir("agent_results");
//! let capability: Arc<dyn termflow::ExplainCapability> = build_capability();
//!
//! let pipeline = TermPipeline::start(config, capability)?;
//! // ... later
//! let final_counters = pipeline.shutdown().await;
//! ```

pub mod config;
pub mod error;
pub mod explain;
pub mod filter;
pub mod metrics;
pub mod queue;
pub mod record;
pub mod service;
pub mod sink;
pub mod watcher;
pub mod worker;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use explain::{ExplainCapability, ExplainError, ExplainRequest, SessionId, DECLINE_SENTINEL};
pub use filter::AdmissionFilter;
pub use metrics::{MetricsReporter, PipelineMetrics, PipelineSnapshot};
pub use queue::DispatchQueue;
pub use record::{Record, Task};
pub use service::TermPipeline;
pub use sink::{SinkFanout, TermResult};
pub use watcher::SourceWatcher;
pub use worker::{RetryPolicy, WorkerPool};

/// Default bounded queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Default spill buffer capacity (oldest evicted beyond this)
pub const DEFAULT_SPILL_CAPACITY: usize = 5000;

/// Default worker count
pub const DEFAULT_WORKERS: usize = 5;
