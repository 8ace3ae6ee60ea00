// SPDX-License-Identifier: MIT

//! The lifecycle driver.
//!
//! Runs hooks in order, auto-emits the terminal when the script did not,
//! and derives the executor's declared outcome. Precedence is checked
//! sink-failure-first so a second terminal emit can never mask a crash.

use crate::browser::{LaunchOpts, ReusableBrowser};
use crate::emit::Emitter;
use crate::script::{PrepareAction, Script, ScriptContext, ScriptError, TerminalSignal};
use quarry_core::{ExecutorStatus, RunOutcome, RunRequest, RunResult};
use std::sync::Arc;

/// Derive the declared outcome per the executor precedence:
/// 1. sink failed ⇒ crash; 2. terminal written ⇒ its type; 3. script
/// threw ⇒ error; 4. script returned ⇒ completed.
fn derive_outcome(emitter: &Emitter, script_failure: Option<&ScriptError>) -> RunOutcome {
    if emitter.is_sink_failed() {
        return RunOutcome::crash(
            emitter.sink_failure().unwrap_or_else(|| "sink failed".to_string()),
        );
    }
    if let Some(terminal) = emitter.terminal_state() {
        return terminal.to_outcome();
    }
    match script_failure {
        Some(err) => RunOutcome {
            status: ExecutorStatus::Error,
            message: Some(err.message.clone()),
            error_type: Some(err.error_type.clone()),
            stack: err.stack.clone(),
        },
        None => RunOutcome::completed(),
    }
}

fn result_with_proxy(outcome: RunOutcome, request: &RunRequest) -> RunResult {
    RunResult {
        outcome,
        // Password stripped; only the server form is ever reported.
        proxy_used: request.proxy.as_ref().map(|p| p.server_arg()),
    }
}

/// Run the whole lifecycle for one request and return the run_result the
/// caller must write (the caller also swallows that write's errors).
pub async fn run_lifecycle(
    request: &RunRequest,
    script: Arc<dyn Script>,
    browser: &ReusableBrowser,
    emitter: Emitter,
) -> RunResult {
    let mut job = request.job.clone();

    // prepare: a throwing prepare is a crash — no browser, no later hooks.
    match script.prepare(&job, &request.run).await {
        Ok(PrepareAction::Continue { job: replacement }) => {
            if let Some(replacement) = replacement {
                job = replacement;
            }
        }
        Ok(PrepareAction::Skip { reason }) => {
            tracing::info!(run_id = %request.run.run_id, ?reason, "prepare skipped run");
            if let Err(err) = emitter.run_skipped(reason) {
                tracing::warn!(error = %err, "skip terminal emit failed");
            }
            return result_with_proxy(derive_outcome(&emitter, None), request);
        }
        Err(err) => {
            tracing::error!(error = %err, "prepare hook failed");
            return result_with_proxy(
                RunOutcome::crash(format!("prepare failed: {}", err.message)),
                request,
            );
        }
    }

    let session = match browser.acquire(&LaunchOpts::from_env(request.proxy.clone())).await {
        Ok(session) => session,
        Err(err) => {
            tracing::error!(error = %err, "browser acquisition failed");
            return result_with_proxy(RunOutcome::crash(err.to_string()), request);
        }
    };
    if let Some(proxy) = &request.proxy {
        if let (Some(username), Some(password)) = (&proxy.username, &proxy.password) {
            if let Err(err) = session.authenticate(username, password).await {
                tracing::error!(error = %err, "proxy authentication failed");
                return result_with_proxy(RunOutcome::crash(err.to_string()), request);
            }
        }
    }

    let ctx = ScriptContext {
        emit: emitter.clone(),
        meta: request.run.clone(),
        job,
        browser: Some(session),
    };

    // before_run → run → after_run; first failure wins.
    let mut failure: Option<ScriptError> = None;
    if let Err(err) = script.before_run(&ctx).await {
        failure = Some(err);
    }
    if failure.is_none() {
        if let Err(err) = script.run(&ctx).await {
            failure = Some(err);
        }
    }
    if failure.is_none() {
        if let Err(err) = script.after_run(&ctx).await {
            failure = Some(err);
        }
    }

    // on_error only fires when the script failed and wrote no terminal.
    if let Some(err) = &failure {
        if emitter.terminal_state().is_none() && !emitter.is_sink_failed() {
            script.on_error(err, &ctx).await;
        }
    }

    // Auto-terminal, preceded by before_terminal with emit still open.
    if emitter.terminal_state().is_none() && !emitter.is_sink_failed() {
        let signal = if failure.is_some() { TerminalSignal::Error } else { TerminalSignal::Complete };
        script.before_terminal(signal, &ctx).await;

        // The hook may have emitted the terminal itself.
        if emitter.terminal_state().is_none() && !emitter.is_sink_failed() {
            let emit_result = match &failure {
                Some(err) => emitter.run_error(
                    err.error_type.clone(),
                    err.message.clone(),
                    err.stack.clone(),
                ),
                None => emitter.run_complete(None),
            };
            if let Err(err) = emit_result {
                tracing::error!(error = %err, "auto-terminal emit failed");
            }
        }
    }

    // cleanup runs with emit closed; its errors cannot mask the outcome.
    emitter.close();
    script.cleanup(&ctx).await;

    result_with_proxy(derive_outcome(&emitter, failure.as_ref()), request)
}

/// Result for failures before a script lifecycle exists (load errors,
/// malformed run requests).
pub fn crash_result(message: impl Into<String>) -> RunResult {
    RunResult { outcome: RunOutcome::crash(message), proxy_used: None }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
