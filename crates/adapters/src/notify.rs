// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use quarry_core::{FinalOutcome, JobId, PolicyStats, RunId};
use serde::Serialize;
use thiserror::Error;

/// Errors from notify operations
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("non-retriable response: {status}")]
    Rejected { status: u16 },
    #[error("notification cancelled")]
    Cancelled,
}

/// What an adapter learns about a finished run. Carries no credentials.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub outcome: FinalOutcome,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub stats: PolicyStats,
}

/// Adapter for delivering run completion notifications
#[async_trait]
pub trait NotifyAdapter: Send + Sync {
    async fn notify(&self, report: &RunReport) -> Result<(), NotifyError>;
}

/// Default adapter: does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAdapter;

#[async_trait]
impl NotifyAdapter for NoopAdapter {
    async fn notify(&self, _report: &RunReport) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{NotifyAdapter, NotifyError, RunReport};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct FakeNotifyState {
        reports: Vec<RunReport>,
        fail: bool,
    }

    /// Fake notification adapter for testing
    #[derive(Clone)]
    pub struct FakeNotifyAdapter {
        inner: Arc<Mutex<FakeNotifyState>>,
    }

    impl Default for FakeNotifyAdapter {
        fn default() -> Self {
            Self { inner: Arc::new(Mutex::new(FakeNotifyState { reports: Vec::new(), fail: false })) }
        }
    }

    impl FakeNotifyAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            let adapter = Self::default();
            adapter.inner.lock().fail = true;
            adapter
        }

        /// Get all recorded reports
        pub fn reports(&self) -> Vec<RunReport> {
            self.inner.lock().reports.clone()
        }
    }

    #[async_trait]
    impl NotifyAdapter for FakeNotifyAdapter {
        async fn notify(&self, report: &RunReport) -> Result<(), NotifyError> {
            let mut state = self.inner.lock();
            if state.fail {
                return Err(NotifyError::SendFailed("injected".to_string()));
            }
            state.reports.push(report.clone());
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeNotifyAdapter;

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
