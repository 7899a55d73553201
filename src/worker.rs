//! Worker pool
//!
//! A fixed set of tokio tasks draining the dispatch queue. Each worker owns
//! at most one capability session, opened lazily on its first task and kept
//! for its lifetime. Per task the worker runs a bounded retry loop around the
//! capability call, interprets the response text, and hands accepted results
//! to the sink fan-out. A failed task never stops the worker; it is counted,
//! logged, and the loop moves on.
//!
//! # Retry semantics
//!
//! Each attempt runs under its own timeout, and the whole task under a total
//! budget. Transient failures and attempt timeouts back off exponentially
//! with jitter and retry; `Unauthorized` and `InvalidTarget` abort the task
//! on the spot and are never retried, the session identity stays as-is.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::explain::{
    split_domain_and_body, ExplainCapability, ExplainError, ExplainRequest, SessionId,
    DECLINE_SENTINEL,
};
use crate::metrics::PipelineMetrics;
use crate::queue::DispatchQueue;
use crate::record::Task;
use crate::sink::{SinkFanout, TermResult};

/// Retry budget for one task's capability calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts per task
    pub max_attempts: u32,

    /// Base backoff delay, doubled per attempt
    pub base_delay: Duration,

    /// Budget for a single attempt
    pub attempt_timeout: Duration,

    /// Budget across all attempts of one task
    pub total_budget: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts,
            base_delay: config.retry_base_delay,
            attempt_timeout: config.attempt_timeout,
            total_budget: config.total_timeout,
        }
    }

    /// Backoff before the attempt after `attempt` (1-based) failed
    ///
    /// `base * 2^(attempt-1)`, scaled by a jitter factor in `[1.0, 1.2)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let doubling = 1u64 << (attempt.saturating_sub(1)).min(20);
        let jitter: f64 = rand::thread_rng().gen_range(1.0..1.2);
        self.base_delay.mul_f64(doubling as f64 * jitter)
    }

    /// Run the capability call under this policy
    ///
    /// Retries transient failures and per-attempt timeouts until either the
    /// attempt count or the total budget runs out; fatal errors propagate
    /// immediately.
    pub async fn call_with_retry(
        &self,
        capability: &dyn ExplainCapability,
        session: &SessionId,
        request: &ExplainRequest,
    ) -> Result<String, ExplainError> {
        let started = Instant::now();

        for attempt in 1..=self.max_attempts {
            let remaining = match self.total_budget.checked_sub(started.elapsed()) {
                Some(r) if !r.is_zero() => r,
                _ => return Err(ExplainError::BudgetExceeded { attempts: attempt - 1 }),
            };
            let deadline = self.attempt_timeout.min(remaining);

            match tokio::time::timeout(deadline, capability.explain(session, request)).await {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) if e.is_fatal() => return Err(e),
                Ok(Err(e)) => {
                    tracing::warn!(term = %request.term, attempt, error = %e, "attempt failed");
                }
                Err(_) => {
                    tracing::warn!(
                        term = %request.term,
                        attempt,
                        timeout_ms = deadline.as_millis() as u64,
                        "attempt timed out"
                    );
                }
            }

            if attempt < self.max_attempts {
                let backoff = self.backoff_delay(attempt);
                match self.total_budget.checked_sub(started.elapsed()) {
                    Some(left) if left > backoff => tokio::time::sleep(backoff).await,
                    _ => return Err(ExplainError::BudgetExceeded { attempts: attempt }),
                }
            }
        }

        Err(ExplainError::BudgetExceeded {
            attempts: self.max_attempts,
        })
    }
}

/// One worker's shared context
struct Worker {
    index: usize,
    queue: Arc<DispatchQueue>,
    capability: Arc<dyn ExplainCapability>,
    fanout: Arc<SinkFanout>,
    metrics: Arc<PipelineMetrics>,
    policy: RetryPolicy,
    poll_interval: Duration,
}

impl Worker {
    async fn run(self, cancel: CancellationToken) {
        let mut session: Option<SessionId> = None;

        while let Some(task) = self.queue.take(&cancel, self.poll_interval).await {
            self.handle(&mut session, task).await;
            self.queue.maybe_refill();
        }

        tracing::debug!(worker = self.index, "worker stopped");
    }

    async fn handle(&self, session_slot: &mut Option<SessionId>, task: Task) {
        let session = match session_slot {
            Some(session) => session.clone(),
            None => match self.capability.open_session().await {
                Ok(session) => {
                    tracing::info!(worker = self.index, %session, "capability session opened");
                    *session_slot = Some(session.clone());
                    session
                }
                Err(e) => {
                    // next task tries again
                    self.metrics.record_task_failed();
                    tracing::warn!(
                        worker = self.index,
                        entity = %task.entity,
                        error = %e,
                        "session open failed, task dropped"
                    );
                    return;
                }
            },
        };

        let request = ExplainRequest {
            term: task.entity.clone(),
            category: task.category.clone(),
            context: task.source_context.clone(),
        };

        match self
            .policy
            .call_with_retry(self.capability.as_ref(), &session, &request)
            .await
        {
            Ok(text) => self.interpret(&task, &text).await,
            Err(e) => {
                self.metrics.record_task_failed();
                tracing::warn!(
                    worker = self.index,
                    entity = %task.entity,
                    error = %e,
                    "task failed"
                );
            }
        }
    }

    /// Interpret the raw response and deliver non-declined results
    async fn interpret(&self, task: &Task, text: &str) {
        let text = text.trim();
        if text == DECLINE_SENTINEL {
            self.metrics.record_task_declined();
            tracing::debug!(worker = self.index, entity = %task.entity, "capability declined");
            return;
        }

        let (domain, body) = split_domain_and_body(text);
        if body.is_empty() {
            self.metrics.record_task_declined();
            tracing::debug!(worker = self.index, entity = %task.entity, "empty explanation body");
            return;
        }

        self.fanout
            .deliver(&TermResult {
                timestamp: task.timestamp.clone(),
                entity: task.entity.clone(),
                domain,
                body,
            })
            .await;
        self.metrics.record_task_completed();
    }
}

/// Handle to the spawned workers
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn the configured number of workers
    pub fn spawn(
        config: &WorkerConfig,
        queue: Arc<DispatchQueue>,
        capability: Arc<dyn ExplainCapability>,
        fanout: Arc<SinkFanout>,
        metrics: Arc<PipelineMetrics>,
        cancel: CancellationToken,
    ) -> Self {
        let policy = RetryPolicy::from_config(config);
        let handles = (0..config.count)
            .map(|index| {
                let worker = Worker {
                    index,
                    queue: Arc::clone(&queue),
                    capability: Arc::clone(&capability),
                    fanout: Arc::clone(&fanout),
                    metrics: Arc::clone(&metrics),
                    policy: policy.clone(),
                    poll_interval: config.poll_interval,
                };
                tokio::spawn(worker.run(cancel.clone()))
            })
            .collect();

        tracing::info!(count = config.count, "worker pool started");
        Self { handles }
    }

    /// Wait for every worker to finish
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "worker task panicked");
            }
        }
    }
}

#[cfg(test)]
#[path = "worker_test.rs"]
mod worker_test;
