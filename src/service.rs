//! Pipeline assembly and lifecycle
//!
//! [`TermPipeline`] owns the whole flow: it builds every stage from one
//! [`PipelineConfig`], spawns the watcher, the worker pool and the metrics
//! reporter, and tears them down in dependency order on shutdown:
//!
//! 1. stop the watcher, so no new task enters the queue;
//! 2. drop the spill buffer (counted; spilled tasks are already the accepted
//!    loss tier);
//! 3. wait for the bounded queue to drain;
//! 4. cancel the workers, which they observe at their next queue poll, and
//!    join them so in-flight tasks finish delivery;
//! 5. stop the metrics reporter last.

use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::explain::ExplainCapability;
use crate::filter::AdmissionFilter;
use crate::metrics::{MetricsReporter, PipelineMetrics, PipelineSnapshot};
use crate::queue::DispatchQueue;
use crate::sink::{CsvAppendLog, RemotePushSink, SinkFanout};
use crate::watcher::SourceWatcher;
use crate::worker::WorkerPool;

/// A running term pipeline
pub struct TermPipeline {
    config: PipelineConfig,
    metrics: Arc<PipelineMetrics>,
    queue: Arc<DispatchQueue>,
    fanout: Arc<SinkFanout>,
    watcher_cancel: CancellationToken,
    watcher_handle: JoinHandle<()>,
    worker_cancel: CancellationToken,
    pool: WorkerPool,
    reporter_cancel: CancellationToken,
    reporter_handle: Option<JoinHandle<()>>,
}

impl TermPipeline {
    /// Validate the config, build every stage, and start them
    pub fn start(config: PipelineConfig, capability: Arc<dyn ExplainCapability>) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(PipelineMetrics::new());
        let queue = Arc::new(DispatchQueue::new(config.queue.clone(), Arc::clone(&metrics)));
        let filter = Arc::new(AdmissionFilter::new(
            config.filter.clone(),
            Arc::clone(&metrics),
        ));

        let log = CsvAppendLog::create(&config.sinks.log_dir)?;
        let remote = RemotePushSink::new(&config.sinks.remote)?;
        let fanout = Arc::new(SinkFanout::new(log, remote, Arc::clone(&metrics)));

        let watcher = SourceWatcher::new(
            config.watcher.clone(),
            filter,
            Arc::clone(&queue),
            Arc::clone(&metrics),
        )?;
        let watcher_cancel = CancellationToken::new();
        let watcher_handle = tokio::spawn(watcher.run(watcher_cancel.clone()));

        let worker_cancel = CancellationToken::new();
        let pool = WorkerPool::spawn(
            &config.workers,
            Arc::clone(&queue),
            capability,
            Arc::clone(&fanout),
            Arc::clone(&metrics),
            worker_cancel.clone(),
        );

        let reporter_cancel = CancellationToken::new();
        let reporter_handle = config.metrics.enabled.then(|| {
            let reporter = MetricsReporter::new(
                Arc::clone(&metrics),
                Arc::clone(&queue),
                config.metrics.interval,
            );
            tokio::spawn(reporter.run(reporter_cancel.clone()))
        });

        tracing::info!(
            watch_dir = %config.watcher.dir.display(),
            log_path = %fanout.log_path().display(),
            workers = config.workers.count,
            "pipeline started"
        );

        Ok(Self {
            config,
            metrics,
            queue,
            fanout,
            watcher_cancel,
            watcher_handle,
            worker_cancel,
            pool,
            reporter_cancel,
            reporter_handle,
        })
    }

    /// Shared counters of the running pipeline
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Point-in-time counter snapshot
    pub fn snapshot(&self) -> PipelineSnapshot {
        self.metrics.snapshot()
    }

    /// The dispatch queue (depth inspection)
    pub fn queue(&self) -> &Arc<DispatchQueue> {
        &self.queue
    }

    /// Path of the durable append log
    pub fn log_path(&self) -> &Path {
        self.fanout.log_path()
    }

    /// Stop every stage in dependency order and return the final counters
    ///
    /// Queued tasks are drained before the workers stop; spilled tasks are
    /// dropped and counted.
    pub async fn shutdown(self) -> PipelineSnapshot {
        tracing::info!("pipeline shutting down");

        self.watcher_cancel.cancel();
        if let Err(e) = self.watcher_handle.await {
            tracing::error!(error = %e, "watcher task panicked");
        }

        let dropped = self.queue.drop_spill();
        if dropped > 0 {
            tracing::warn!(dropped, "spilled tasks dropped at shutdown");
        }

        while self.queue.queue_size() > 0 {
            tokio::time::sleep(self.config.workers.poll_interval).await;
        }

        self.worker_cancel.cancel();
        self.pool.join().await;

        self.reporter_cancel.cancel();
        if let Some(handle) = self.reporter_handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "metrics reporter panicked");
            }
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            completed = snapshot.tasks_completed,
            declined = snapshot.tasks_declined,
            failed = snapshot.tasks_failed,
            rows = snapshot.log_rows_written,
            "pipeline stopped"
        );
        snapshot
    }
}

#[cfg(test)]
#[path = "service_test.rs"]
mod service_test;
