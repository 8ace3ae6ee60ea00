// SPDX-License-Identifier: MIT

//! Run metadata and the out-of-band run request.

use crate::id::{JobId, RunId};
use crate::proxy::ProxyEndpoint;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetaError {
    #[error("attempt must be >= 1 (got {0})")]
    ZeroAttempt(u32),
    #[error("attempt=1 requires parent_run_id to be absent")]
    FirstAttemptWithParent,
    #[error("retry attempts (attempt > 1) require parent_run_id")]
    RetryWithoutParent,
}

/// Immutable per-run identity. Created by the orchestrator at spawn and
/// frozen for the run's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: RunId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<RunId>,
    pub attempt: u32,
}

impl RunMeta {
    /// A first-attempt run with no lineage.
    pub fn root(run_id: RunId) -> Self {
        Self { run_id, job_id: None, parent_run_id: None, attempt: 1 }
    }

    /// Fan-out child: fresh run_id, attempt=1. Children are not retries,
    /// so they carry no parent_run_id either.
    pub fn child(job_id: Option<JobId>) -> Self {
        Self { run_id: RunId::generate(), job_id, parent_run_id: None, attempt: 1 }
    }

    /// Enforces `attempt >= 1` and `attempt == 1 ⇔ parent_run_id absent`.
    pub fn validate(&self) -> Result<(), MetaError> {
        if self.attempt == 0 {
            return Err(MetaError::ZeroAttempt(self.attempt));
        }
        match (self.attempt, &self.parent_run_id) {
            (1, Some(_)) => Err(MetaError::FirstAttemptWithParent),
            (n, None) if n > 1 => Err(MetaError::RetryWithoutParent),
            _ => Ok(()),
        }
    }
}

/// The job a run executes: which script, with what parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobSpec {
    /// Script name or path; resolved by the executor's script resolver.
    pub script: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
}

/// Storage partition metadata the executor embeds in sidecar writes and
/// the runtime uses for every record path.
///
/// `day` derives from the run start time, not per-event timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPartition {
    pub source: String,
    pub category: String,
    pub day: NaiveDate,
    pub run_id: RunId,
}

impl RunPartition {
    pub fn new(source: impl Into<String>, category: impl Into<String>, day: NaiveDate, run_id: RunId) -> Self {
        Self { source: source.into(), category: category.into(), day, run_id }
    }
}

/// Out-of-band request transmitted runtime → executor over the child's
/// stdin as a single length-prefixed frame, before any in-band traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub run: RunMeta,
    pub job: JobSpec,
    /// Resolved endpoint only; the executor never selects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyEndpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<RunPartition>,
}

#[cfg(test)]
#[path = "meta_tests.rs"]
mod tests;
