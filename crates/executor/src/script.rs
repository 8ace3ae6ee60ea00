// SPDX-License-Identifier: MIT

//! Scripts and their lifecycle hooks.
//!
//! A script is a compiled-in `Script` implementation registered by name;
//! `resolve_script` is the single place name/path resolution happens, so
//! resolution rules can change without touching callers.

use crate::browser::BrowserSession;
use crate::emit::Emitter;
use async_trait::async_trait;
use quarry_core::{JobSpec, RunMeta};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Error surfaced by a script or hook. `error_type` lands in the
/// `run_error` event; default is `script_error`.
#[derive(Debug, Error)]
#[error("{error_type}: {message}")]
pub struct ScriptError {
    pub error_type: String,
    pub message: String,
    pub stack: Option<String>,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { error_type: "script_error".to_string(), message: message.into(), stack: None }
    }

    pub fn typed(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self { error_type: error_type.into(), message: message.into(), stack: None }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// What `prepare` decided.
pub enum PrepareAction {
    /// Proceed, optionally with a rewritten job.
    Continue { job: Option<JobSpec> },
    /// Do not run; the driver emits `run_complete({skipped})`.
    Skip { reason: Option<String> },
}

/// Which terminal is about to be auto-emitted; passed to `before_terminal`
/// while emit is still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalSignal {
    Complete,
    Error,
}

/// Everything a running script can touch.
pub struct ScriptContext {
    pub emit: Emitter,
    pub meta: RunMeta,
    pub job: JobSpec,
    /// Present unless the run was skipped before browser acquisition.
    pub browser: Option<Arc<dyn BrowserSession>>,
}

impl std::fmt::Debug for dyn Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<dyn Script>")
    }
}

/// A user script. `run` is required; hooks default to no-ops, which is
/// the checked equivalent of a module simply not exporting them.
#[async_trait]
pub trait Script: Send + Sync {
    async fn prepare(
        &self,
        _job: &JobSpec,
        _meta: &RunMeta,
    ) -> Result<PrepareAction, ScriptError> {
        Ok(PrepareAction::Continue { job: None })
    }

    async fn before_run(&self, _ctx: &ScriptContext) -> Result<(), ScriptError> {
        Ok(())
    }

    async fn run(&self, ctx: &ScriptContext) -> Result<(), ScriptError>;

    async fn after_run(&self, _ctx: &ScriptContext) -> Result<(), ScriptError> {
        Ok(())
    }

    /// Observed on script failure before the terminal is emitted. Errors
    /// here are swallowed so they cannot mask the original failure.
    async fn on_error(&self, _err: &ScriptError, _ctx: &ScriptContext) {}

    /// Last chance to emit; runs with the chain still open.
    async fn before_terminal(&self, _signal: TerminalSignal, _ctx: &ScriptContext) {}

    /// Emit is closed here; any emit call fails with a terminal error.
    async fn cleanup(&self, _ctx: &ScriptContext) {}
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unknown script {0:?}")]
    Unknown(String),
}

/// Compiled-in script registry.
#[derive(Default)]
pub struct ScriptRegistry {
    scripts: HashMap<String, Arc<dyn Script>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, script: Arc<dyn Script>) -> &mut Self {
        self.scripts.insert(name.into(), script);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Script>> {
        self.scripts.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.scripts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Resolve a `--script` value to a registered script.
///
/// Accepts a bare registered name, or a path whose file stem names a
/// registered script; a relative path is interpreted against
/// `resolve_from` when given. Resolution rules are intentionally confined
/// to this function.
pub fn resolve_script(
    registry: &ScriptRegistry,
    script: &str,
    resolve_from: Option<&Path>,
) -> Result<Arc<dyn Script>, LoadError> {
    if let Some(found) = registry.get(script) {
        return Ok(found);
    }

    let path = match resolve_from {
        Some(base) if !Path::new(script).is_absolute() => base.join(script),
        _ => Path::new(script).to_path_buf(),
    };
    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
        if let Some(found) = registry.get(stem) {
            return Ok(found);
        }
    }
    Err(LoadError::Unknown(script.to_string()))
}

#[cfg(test)]
#[path = "script_tests.rs"]
mod tests;
