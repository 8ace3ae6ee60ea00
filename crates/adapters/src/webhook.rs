// SPDX-License-Identifier: MIT

//! Webhook notification adapter.
//!
//! POSTs the run report as JSON. 5xx and network failures retry with
//! exponential backoff; 4xx is a configuration problem and fails fast.

use crate::notify::{NotifyAdapter, NotifyError, RunReport};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-attempt timeout default.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default retry budget for retriable failures.
pub const DEFAULT_RETRIES: u32 = 3;

const BACKOFF_BASE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    pub retries: u32,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
        }
    }
}

pub struct WebhookAdapter {
    client: reqwest::Client,
    config: WebhookConfig,
    cancel: CancellationToken,
}

impl WebhookAdapter {
    pub fn new(config: WebhookConfig, cancel: CancellationToken) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.timeout)
            .build()
            .map_err(|e| NotifyError::SendFailed(e.to_string()))?;
        Ok(Self { client, config, cancel })
    }

    async fn attempt(&self, report: &RunReport) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.config.url).json(report);
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| NotifyError::SendFailed(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status.is_client_error() {
            return Err(NotifyError::Rejected { status: status.as_u16() });
        }
        Err(NotifyError::SendFailed(format!("status {status}")))
    }
}

#[async_trait]
impl NotifyAdapter for WebhookAdapter {
    async fn notify(&self, report: &RunReport) -> Result<(), NotifyError> {
        let mut last = NotifyError::SendFailed("no attempts".to_string());
        for attempt in 0..=self.config.retries {
            if self.cancel.is_cancelled() {
                return Err(NotifyError::Cancelled);
            }
            match self.attempt(report).await {
                Ok(()) => return Ok(()),
                // 4xx means the request itself is wrong; retrying cannot help.
                Err(err @ NotifyError::Rejected { .. }) => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        run_id = %report.run_id,
                        attempt,
                        error = %err,
                        "webhook delivery failed"
                    );
                    last = err;
                }
            }
            if attempt < self.config.retries {
                let backoff = BACKOFF_BASE * 2u32.saturating_pow(attempt);
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = self.cancel.cancelled() => return Err(NotifyError::Cancelled),
                }
            }
        }
        Err(last)
    }
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;
