// SPDX-License-Identifier: MIT

//! Run outcome classification and the `run_result` control frame.
//!
//! Two layers: `ExecutorStatus` is what the child declares about itself in
//! its single `run_result` frame; `FinalOutcome` is the runtime's merged
//! verdict, which alone determines the process exit code.

use serde::{Deserialize, Serialize};

/// Executor-declared status, read after the script returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorStatus {
    Completed,
    Error,
    Crash,
}

impl ExecutorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorStatus::Completed => "completed",
            ExecutorStatus::Error => "error",
            ExecutorStatus::Crash => "crash",
        }
    }
}

impl std::fmt::Display for ExecutorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome body of the `run_result` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub status: ExecutorStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl RunOutcome {
    pub fn completed() -> Self {
        Self { status: ExecutorStatus::Completed, message: None, error_type: None, stack: None }
    }

    pub fn error(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: ExecutorStatus::Error,
            message: Some(message.into()),
            error_type: Some(error_type.into()),
            stack: None,
        }
    }

    pub fn crash(message: impl Into<String>) -> Self {
        Self {
            status: ExecutorStatus::Crash,
            message: Some(message.into()),
            error_type: None,
            stack: None,
        }
    }
}

/// The single control frame the executor emits after its terminal emit
/// attempt. Not an event; does not consume `seq`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub outcome: RunOutcome,
    /// Redacted endpoint (`protocol://host:port`, no password).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_used: Option<String>,
}

/// The runtime's merged verdict for a run. Determines the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalOutcome {
    Success,
    ScriptError,
    ExecutorCrash,
    PolicyFailure,
    VersionMismatch,
}

impl FinalOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalOutcome::Success => "success",
            FinalOutcome::ScriptError => "script_error",
            FinalOutcome::ExecutorCrash => "executor_crash",
            FinalOutcome::PolicyFailure => "policy_failure",
            FinalOutcome::VersionMismatch => "version_mismatch",
        }
    }

    /// Exit-code table: 0 success, 1 script_error, 2 executor_crash,
    /// 3 policy_failure / version_mismatch.
    pub fn exit_code(&self) -> i32 {
        match self {
            FinalOutcome::Success => 0,
            FinalOutcome::ScriptError => 1,
            FinalOutcome::ExecutorCrash => 2,
            FinalOutcome::PolicyFailure | FinalOutcome::VersionMismatch => 3,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FinalOutcome::Success)
    }
}

impl std::fmt::Display for FinalOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
#[path = "outcome_tests.rs"]
mod tests;
