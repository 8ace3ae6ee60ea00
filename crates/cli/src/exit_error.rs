// SPDX-License-Identifier: MIT

//! Error type carrying the process exit code.
//!
//! Commands return `ExitError` instead of calling `std::process::exit()`
//! so `main()` owns termination. The `run` command's codes follow the
//! outcome table (0 success, 1 script_error, 2 executor_crash,
//! 3 policy_failure/version_mismatch); read-only commands use 1.

use quarry_core::FinalOutcome;
use std::fmt;

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// Silent carrier for a non-success run outcome: the summary line was
    /// already printed, only the code matters.
    pub fn from_outcome(outcome: FinalOutcome) -> Self {
        Self { code: outcome.exit_code(), message: String::new() }
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}

#[cfg(test)]
#[path = "exit_error_tests.rs"]
mod tests;
