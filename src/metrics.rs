//! Pipeline metrics
//!
//! Atomic counters maintained by every stage plus the periodic health
//! reporter. All counters use relaxed ordering; values are eventually
//! consistent, not real-time. The reporter is read-only with respect to
//! pipeline state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::queue::DispatchQueue;

/// Counters shared across all pipeline stages
///
/// # Thread Safety
///
/// All methods are safe to call from multiple threads concurrently.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Records read from the source (before filtering)
    records_read: AtomicU64,

    /// Records admitted and offered to the queue
    records_admitted: AtomicU64,

    /// Structurally invalid lines skipped by the parser
    parse_errors: AtomicU64,

    /// Rule 1 rejections: empty entity
    rejected_empty_entity: AtomicU64,

    /// Rule 2 rejections: duplicate within the burst group
    rejected_duplicate: AtomicU64,

    /// Rule 3 rejections: category not allowed
    rejected_category: AtomicU64,

    /// Rule 4 rejections: confidence below the fixed floor
    rejected_confidence: AtomicU64,

    /// Rule 5 rejections: token count below minimum without override
    rejected_tokens: AtomicU64,

    /// Offers that overflowed the bounded queue into spill
    queue_overflow: AtomicU64,

    /// Oldest spilled tasks evicted because spill was full
    spill_evicted: AtomicU64,

    /// Spilled tasks moved back into the bounded queue
    spill_refilled: AtomicU64,

    /// Spilled tasks dropped at shutdown
    spill_dropped: AtomicU64,

    /// Tasks that produced a result delivered to the fan-out
    tasks_completed: AtomicU64,

    /// Tasks the capability declined (sentinel or empty body)
    tasks_declined: AtomicU64,

    /// Tasks that failed after the retry budget or a fatal error
    tasks_failed: AtomicU64,

    /// Rows appended to the durable log
    log_rows_written: AtomicU64,

    /// Durable log write failures
    log_write_errors: AtomicU64,

    /// Successful remote pushes
    remote_push_ok: AtomicU64,

    /// Failed remote pushes (logged, never retried)
    remote_push_failed: AtomicU64,
}

impl PipelineMetrics {
    /// Create new metrics with all counters at zero
    pub const fn new() -> Self {
        Self {
            records_read: AtomicU64::new(0),
            records_admitted: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            rejected_empty_entity: AtomicU64::new(0),
            rejected_duplicate: AtomicU64::new(0),
            rejected_category: AtomicU64::new(0),
            rejected_confidence: AtomicU64::new(0),
            rejected_tokens: AtomicU64::new(0),
            queue_overflow: AtomicU64::new(0),
            spill_evicted: AtomicU64::new(0),
            spill_refilled: AtomicU64::new(0),
            spill_dropped: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_declined: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            log_rows_written: AtomicU64::new(0),
            log_write_errors: AtomicU64::new(0),
            remote_push_ok: AtomicU64::new(0),
            remote_push_failed: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_read(&self) {
        self.records_read.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_admitted(&self) {
        self.records_admitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected_empty_entity(&self) {
        self.rejected_empty_entity.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected_duplicate(&self) {
        self.rejected_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected_category(&self) {
        self.rejected_category.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected_confidence(&self) {
        self.rejected_confidence.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected_tokens(&self) {
        self.rejected_tokens.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_queue_overflow(&self) {
        self.queue_overflow.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_spill_evicted(&self) {
        self.spill_evicted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_spill_refilled(&self, count: u64) {
        self.spill_refilled.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_spill_dropped(&self, count: u64) {
        self.spill_dropped.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_task_completed(&self) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_task_declined(&self) {
        self.tasks_declined.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_log_row(&self) {
        self.log_rows_written.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_log_write_error(&self) {
        self.log_write_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_remote_push_ok(&self) {
        self.remote_push_ok.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_remote_push_failed(&self) {
        self.remote_push_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time copy of all counters
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            records_read: self.records_read.load(Ordering::Relaxed),
            records_admitted: self.records_admitted.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            rejected_empty_entity: self.rejected_empty_entity.load(Ordering::Relaxed),
            rejected_duplicate: self.rejected_duplicate.load(Ordering::Relaxed),
            rejected_category: self.rejected_category.load(Ordering::Relaxed),
            rejected_confidence: self.rejected_confidence.load(Ordering::Relaxed),
            rejected_tokens: self.rejected_tokens.load(Ordering::Relaxed),
            queue_overflow: self.queue_overflow.load(Ordering::Relaxed),
            spill_evicted: self.spill_evicted.load(Ordering::Relaxed),
            spill_refilled: self.spill_refilled.load(Ordering::Relaxed),
            spill_dropped: self.spill_dropped.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_declined: self.tasks_declined.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            log_rows_written: self.log_rows_written.load(Ordering::Relaxed),
            log_write_errors: self.log_write_errors.load(Ordering::Relaxed),
            remote_push_ok: self.remote_push_ok.load(Ordering::Relaxed),
            remote_push_failed: self.remote_push_failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of pipeline counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineSnapshot {
    pub records_read: u64,
    pub records_admitted: u64,
    pub parse_errors: u64,
    pub rejected_empty_entity: u64,
    pub rejected_duplicate: u64,
    pub rejected_category: u64,
    pub rejected_confidence: u64,
    pub rejected_tokens: u64,
    pub queue_overflow: u64,
    pub spill_evicted: u64,
    pub spill_refilled: u64,
    pub spill_dropped: u64,
    pub tasks_completed: u64,
    pub tasks_declined: u64,
    pub tasks_failed: u64,
    pub log_rows_written: u64,
    pub log_write_errors: u64,
    pub remote_push_ok: u64,
    pub remote_push_failed: u64,
}

impl PipelineSnapshot {
    /// Total rejections across all admission rules
    #[inline]
    pub fn total_rejected(&self) -> u64 {
        self.rejected_empty_entity
            + self.rejected_duplicate
            + self.rejected_category
            + self.rejected_confidence
            + self.rejected_tokens
    }
}

/// Periodic health reporter
///
/// Logs a counter snapshot plus live queue and spill depth every interval.
/// Observability only: it reads shared counters and never mutates pipeline
/// state.
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    queue: Arc<DispatchQueue>,
    interval: Duration,
}

impl MetricsReporter {
    /// Create a new reporter
    pub fn new(metrics: Arc<PipelineMetrics>, queue: Arc<DispatchQueue>, interval: Duration) -> Self {
        Self {
            metrics,
            queue,
            interval,
        }
    }

    /// Run until cancellation; spawn this as a tokio task
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // the first tick fires immediately; skip it
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.report(),
            }
        }

        tracing::debug!("metrics reporter stopped");
    }

    fn report(&self) {
        let s = self.metrics.snapshot();
        tracing::info!(
            read = s.records_read,
            admitted = s.records_admitted,
            overflow = s.queue_overflow,
            queue_depth = self.queue.queue_size(),
            spill_depth = self.queue.spill_size(),
            rejected_dup = s.rejected_duplicate,
            rejected_category = s.rejected_category,
            rejected_confidence = s.rejected_confidence,
            rejected_tokens = s.rejected_tokens,
            rejected_empty = s.rejected_empty_entity,
            parse_errors = s.parse_errors,
            completed = s.tasks_completed,
            declined = s.tasks_declined,
            failed = s.tasks_failed,
            push_ok = s.remote_push_ok,
            push_failed = s.remote_push_failed,
            "pipeline metrics"
        );
    }
}

#[cfg(test)]
#[path = "metrics_test.rs"]
mod metrics_test;
