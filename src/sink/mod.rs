//! Sink fan-out
//!
//! Every accepted result takes two independent exits: a durable append to the
//! process-lifetime CSV log (the system of record, context-stripped body) and
//! a best-effort remote push (unstripped body). The append always runs first
//! and is never skipped because the push failed; push failures are logged and
//! swallowed, with no retry and no feedback into the dispatch queue.

mod csv_log;
mod remote;

pub use csv_log::CsvAppendLog;
pub use remote::{RemotePushSink, TermPayload};

use std::sync::Arc;

use crate::explain::strip_trailing_context_sentence;
use crate::metrics::PipelineMetrics;

/// A completed explanation ready for the sinks
#[derive(Debug, Clone, PartialEq)]
pub struct TermResult {
    /// Burst-group timestamp of the originating record
    pub timestamp: String,

    /// The explained term
    pub entity: String,

    /// Domain label split from the response ("" when absent)
    pub domain: String,

    /// Explanation body, unstripped; the durable variant is derived here
    pub body: String,
}

/// Fan-out over the two sinks
pub struct SinkFanout {
    log: CsvAppendLog,
    remote: RemotePushSink,
    metrics: Arc<PipelineMetrics>,
}

impl SinkFanout {
    /// Create a fan-out over an open append log and a push client
    pub fn new(log: CsvAppendLog, remote: RemotePushSink, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            log,
            remote,
            metrics,
        }
    }

    /// The durable log path (for operators and tests)
    pub fn log_path(&self) -> &std::path::Path {
        self.log.path()
    }

    /// Deliver one result to both sinks
    ///
    /// Neither sink's failure affects the other or the calling worker; both
    /// paths log and count their own errors.
    pub async fn deliver(&self, result: &TermResult) {
        let (stored_body, context_removed) = strip_trailing_context_sentence(&result.body);

        match self
            .log
            .append(&result.timestamp, &result.entity, &stored_body, &result.domain)
        {
            Ok(()) => {
                self.metrics.record_log_row();
                tracing::debug!(
                    entity = %result.entity,
                    domain = %display_domain(&result.domain),
                    context_removed,
                    "result appended to durable log"
                );
            }
            Err(e) => {
                self.metrics.record_log_write_error();
                tracing::error!(
                    entity = %result.entity,
                    error = %e,
                    "durable log append failed"
                );
            }
        }

        let payload = TermPayload {
            timestamp: result.timestamp.clone(),
            entity: result.entity.clone(),
            domain: display_domain(&result.domain).to_string(),
            body: result.body.clone(),
        };
        match self.remote.push(&payload).await {
            Ok(status) => {
                self.metrics.record_remote_push_ok();
                tracing::debug!(entity = %result.entity, %status, "term pushed to remote");
            }
            Err(e) => {
                self.metrics.record_remote_push_failed();
                tracing::warn!(entity = %result.entity, error = %e, "remote push failed");
            }
        }
    }
}

/// Empty domains render as "-" on the wire
fn display_domain(domain: &str) -> &str {
    if domain.is_empty() {
        "-"
    } else {
        domain
    }
}
