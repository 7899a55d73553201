//! Remote push sink
//!
//! Single `POST {base_url}/meeting/{meeting_id}/terms` per result with a JSON
//! body. The response status is observed for logging only: the pipeline does
//! not retry pushes and never feeds them back into the dispatch queue. The
//! local append log is the system of record.

use reqwest::StatusCode;
use serde::Serialize;

use crate::config::RemoteConfig;
use crate::error::{PipelineError, Result};

/// JSON document pushed to the remote term store
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TermPayload {
    pub timestamp: String,
    pub entity: String,
    pub domain: String,
    pub body: String,
}

/// HTTP push client for the remote term store
pub struct RemotePushSink {
    client: reqwest::Client,
    url: String,
}

impl RemotePushSink {
    /// Build a client with the configured connect and read timeouts
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()
            .map_err(|e| PipelineError::RemoteClient(e.to_string()))?;

        let url = format!(
            "{}/meeting/{}/terms",
            config.base_url.trim_end_matches('/'),
            config.meeting_id,
        );

        Ok(Self { client, url })
    }

    /// Target URL (for diagnostics and tests)
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Push one payload; returns the response status
    ///
    /// Non-2xx statuses are returned as errors so the caller can count them,
    /// but they carry no retry semantics.
    pub async fn push(&self, payload: &TermPayload) -> std::result::Result<StatusCode, String> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status.is_success() {
            Ok(status)
        } else {
            let detail = response.text().await.unwrap_or_default();
            Err(format!("status {status}: {detail}"))
        }
    }
}

impl std::fmt::Debug for RemotePushSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemotePushSink").field("url", &self.url).finish()
    }
}

#[cfg(test)]
#[path = "remote_test.rs"]
mod remote_test;
