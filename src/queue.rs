//! Bounded dispatch queue with spill overflow
//!
//! Two-tier task buffer between the admission path and the worker pool:
//! a fixed-capacity queue plus a capped spill buffer. `offer` never blocks
//! the producer; overflow lands in spill, and a full spill evicts its oldest
//! task (accepted data loss under sustained overload, always counted).
//! Workers drain spill back into the queue opportunistically, oldest first,
//! whenever the queue drops below half capacity.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::QueueConfig;
use crate::metrics::PipelineMetrics;
use crate::record::Task;

/// Interior state, one lock for both tiers
#[derive(Debug, Default)]
struct QueueInner {
    queue: VecDeque<Task>,
    spill: VecDeque<Task>,
}

/// Bounded queue + spill buffer
///
/// Internally synchronized; callers never lock. Shared via `Arc` between the
/// watcher (producer) and the workers (consumers).
pub struct DispatchQueue {
    inner: Mutex<QueueInner>,
    capacity: usize,
    spill_capacity: usize,
    refill_batch: usize,
    metrics: Arc<PipelineMetrics>,
}

impl DispatchQueue {
    /// Create a queue from config
    pub fn new(config: QueueConfig, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            capacity: config.capacity,
            spill_capacity: config.spill_capacity,
            refill_batch: config.refill_batch,
            metrics,
        }
    }

    /// Non-blocking enqueue
    ///
    /// Overflow goes to spill; a full spill evicts its oldest task. Never
    /// blocks the producer.
    pub fn offer(&self, task: Task) {
        let mut inner = self.inner.lock();
        if inner.queue.len() < self.capacity {
            inner.queue.push_back(task);
        } else {
            self.metrics.record_queue_overflow();
            if inner.spill.len() >= self.spill_capacity {
                inner.spill.pop_front();
                self.metrics.record_spill_evicted();
            }
            inner.spill.push_back(task);
        }
    }

    /// Non-blocking dequeue
    pub fn try_take(&self) -> Option<Task> {
        self.inner.lock().queue.pop_front()
    }

    /// Blocking dequeue with a short poll interval
    ///
    /// Returns `None` once `cancel` fires and the queue is observed empty, so
    /// a worker always finishes tasks that were queued before shutdown.
    pub async fn take(&self, cancel: &CancellationToken, poll: Duration) -> Option<Task> {
        loop {
            if let Some(task) = self.try_take() {
                return Some(task);
            }
            if cancel.is_cancelled() {
                return None;
            }
            self.maybe_refill();
            tokio::time::sleep(poll).await;
        }
    }

    /// Move spilled tasks back into the queue when it has drained below half
    /// capacity, oldest spilled task first
    ///
    /// Returns the number of tasks moved. Bounded per call by the configured
    /// refill batch so no worker stalls on a large spill.
    pub fn maybe_refill(&self) -> usize {
        let mut inner = self.inner.lock();
        if inner.queue.len() >= self.capacity.max(2) / 2 || inner.spill.is_empty() {
            return 0;
        }

        let mut moved = 0;
        while moved < self.refill_batch && inner.queue.len() < self.capacity {
            match inner.spill.pop_front() {
                Some(task) => {
                    inner.queue.push_back(task);
                    moved += 1;
                }
                None => break,
            }
        }

        if moved > 0 {
            self.metrics.record_spill_refilled(moved as u64);
        }
        moved
    }

    /// Current bounded-queue depth
    pub fn queue_size(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Current spill depth
    pub fn spill_size(&self) -> usize {
        self.inner.lock().spill.len()
    }

    /// True when both tiers are empty
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.queue.is_empty() && inner.spill.is_empty()
    }

    /// Drop all spilled tasks (shutdown path), returning how many were lost
    pub fn drop_spill(&self) -> usize {
        let mut inner = self.inner.lock();
        let dropped = inner.spill.len();
        inner.spill.clear();
        if dropped > 0 {
            self.metrics.record_spill_dropped(dropped as u64);
        }
        dropped
    }
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("capacity", &self.capacity)
            .field("queue_size", &self.queue_size())
            .field("spill_size", &self.spill_size())
            .finish()
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod queue_test;
