// SPDX-License-Identifier: MIT

//! The run orchestrator: single-run FSM.
//!
//! Spawning → Running → TerminatingOK / TerminatingCrash → Done. Spawns
//! the executor child, transmits the RunRequest over its stdin, drives
//! the ingest loop, merges the three outcome signals (stream health,
//! policy health, terminal event) with the child exit code — which is
//! authoritative on conflict — and derives the process exit code.

use crate::fanout::{self, FanoutSummary};
use crate::metrics::RunMetrics;
use crate::policy::{build_policy, PolicyConfig, PolicyError};
use crate::proxy::{ProxySelector, SelectionCtx};
use crate::reader::{read_stream, ReaderReport, StreamEnd};
use quarry_adapters::{NotifyAdapter, RunReport};
use quarry_core::{
    EventType, ExecutorStatus, FinalOutcome, JobId, JobSpec, PolicyStats, ProxyEndpoint,
    RunId, RunMeta, RunPartition, RunRequest, RunResult,
};
use quarry_storage::{open_lode, BackendKind, MetricsRecord};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;

/// Override for the executor binary path.
pub const ENV_EXECUTOR_BINARY: &str = "QUARRY_EXECUTOR_BINARY";

/// Grace period for the child to exit after its stream ends.
const CHILD_EXIT_GRACE: Duration = Duration::from_secs(5);

/// Best-effort final-flush window after cancellation before storage
/// writes are cut off.
const FINAL_FLUSH_WINDOW: Duration = Duration::from_secs(5);

/// Everything `run` resolved from flags + config, ready to execute.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub run_id: String,
    pub job_id: Option<String>,
    pub script: String,
    pub params: BTreeMap<String, serde_json::Value>,
    pub source: String,
    pub category: String,
    pub storage_backend: BackendKind,
    pub storage_path: String,
    pub storage_region: Option<String>,
    pub policy: PolicyConfig,
    pub proxy_pool: Option<String>,
    pub depth: u32,
    pub max_runs: usize,
    pub parallel: usize,
    pub executor_bin: Option<PathBuf>,
    pub resolve_from: Option<PathBuf>,
    pub no_browser_reuse: bool,
}

/// Shared machinery for a root run and its fan-out children.
#[derive(Clone)]
pub struct ExecutionEnv {
    pub metrics: Arc<RunMetrics>,
    pub selector: Arc<ProxySelector>,
    pub adapter: Arc<dyn NotifyAdapter>,
    pub cancel: CancellationToken,
}

/// Final summary returned to the CLI.
#[derive(Debug)]
pub struct RunReportSummary {
    pub run_id: RunId,
    pub outcome: FinalOutcome,
    pub exit_code: i32,
    pub stats: PolicyStats,
    pub duration_ms: u64,
    pub fanout: Option<FanoutSummary>,
}

pub(crate) struct SingleRun {
    pub outcome: FinalOutcome,
    pub stats: PolicyStats,
    pub enqueues: Vec<quarry_core::EnqueueSpec>,
    pub duration_ms: u64,
}

fn executor_binary(settings: &RunSettings) -> PathBuf {
    if let Some(bin) = &settings.executor_bin {
        return bin.clone();
    }
    if let Ok(bin) = std::env::var(ENV_EXECUTOR_BINARY) {
        return PathBuf::from(bin);
    }
    // Sibling of the current executable, the normal install layout.
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("quarryx")))
        .unwrap_or_else(|| PathBuf::from("quarryx"))
}

/// Merge the outcome signals in spec precedence. Pure for testability.
pub(crate) fn merge_outcome(
    end: &StreamEnd,
    terminal: Option<EventType>,
    close_error: Option<&PolicyError>,
    child_exit_ok: bool,
    run_result: Option<&RunResult>,
    run_id: &RunId,
) -> FinalOutcome {
    let mut outcome = match end {
        StreamEnd::StreamError(_) | StreamEnd::PrematureEof | StreamEnd::Cancelled => {
            FinalOutcome::ExecutorCrash
        }
        StreamEnd::VersionMismatch(_) => FinalOutcome::VersionMismatch,
        StreamEnd::PolicyFailure(_) => FinalOutcome::PolicyFailure,
        StreamEnd::CleanEof => match terminal {
            Some(EventType::RunComplete) => FinalOutcome::Success,
            Some(EventType::RunError) => FinalOutcome::ScriptError,
            _ => FinalOutcome::ExecutorCrash,
        },
    };

    // A failed final flush downgrades an otherwise-clean run: data the
    // policy still held was lost.
    if close_error.is_some()
        && matches!(outcome, FinalOutcome::Success | FinalOutcome::ScriptError)
    {
        outcome = FinalOutcome::PolicyFailure;
    }

    // The child exit code is authoritative over in-band claims.
    if !child_exit_ok && matches!(outcome, FinalOutcome::Success | FinalOutcome::ScriptError) {
        tracing::warn!(
            run_id = %run_id,
            reported = run_result.map(|r| r.outcome.status.as_str()).unwrap_or("none"),
            "executor exit code overrides run_result status"
        );
        outcome = FinalOutcome::ExecutorCrash;
    } else if let Some(result) = run_result {
        let consistent = matches!(
            (outcome, result.outcome.status),
            (FinalOutcome::Success, ExecutorStatus::Completed)
                | (FinalOutcome::ScriptError, ExecutorStatus::Error)
                | (FinalOutcome::ExecutorCrash, ExecutorStatus::Crash)
        );
        if !consistent {
            tracing::warn!(
                run_id = %run_id,
                merged = outcome.as_str(),
                reported = result.outcome.status.as_str(),
                "run_result disagrees with merged outcome; merged outcome stands"
            );
        }
    }
    outcome
}

fn resolve_proxy(
    settings: &RunSettings,
    meta: &RunMeta,
    selector: &ProxySelector,
) -> Result<Option<ProxyEndpoint>, crate::proxy::SelectError> {
    let Some(pool) = &settings.proxy_pool else {
        return Ok(None);
    };
    let ctx = SelectionCtx {
        sticky_key: None,
        job_id: meta.job_id.as_ref(),
        scheme: None,
        host: None,
        port: None,
    };
    selector.select(pool, &ctx).map(Some)
}

/// Execute one run end to end (no fan-out).
pub(crate) async fn execute_single(
    settings: &RunSettings,
    meta: RunMeta,
    env: &ExecutionEnv,
) -> SingleRun {
    let started = Instant::now();
    let run_id = meta.run_id.clone();
    env.metrics.run_started();

    let crash = |stats: PolicyStats, started: Instant| SingleRun {
        outcome: FinalOutcome::ExecutorCrash,
        stats,
        enqueues: Vec::new(),
        duration_ms: started.elapsed().as_millis() as u64,
    };

    // Storage + policy first: a run that cannot persist must not spawn.
    let part = RunPartition::new(
        settings.source.clone(),
        settings.category.clone(),
        chrono::Utc::now().date_naive(),
        run_id.clone(),
    );
    // Storage gets its own token so a cancelled run still has a bounded
    // final-flush window before writes are cut off. The watchdog dies
    // with this run via the drop guard.
    let storage_cancel = CancellationToken::new();
    let done = CancellationToken::new();
    let _done_guard = done.clone().drop_guard();
    {
        let run_cancel = env.cancel.clone();
        let storage_cancel = storage_cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = done.cancelled() => {}
                _ = run_cancel.cancelled() => {
                    tokio::time::sleep(FINAL_FLUSH_WINDOW).await;
                    storage_cancel.cancel();
                }
            }
        });
    }
    let lode = match open_lode(
        settings.storage_backend,
        &settings.storage_path,
        settings.storage_region.as_deref(),
        storage_cancel,
    ) {
        Ok(lode) => lode,
        Err(err) => {
            tracing::error!(error = %err, "storage backend open failed");
            env.metrics.run_failed();
            return crash(PolicyStats::default(), started);
        }
    };
    let mut policy = match build_policy(&settings.policy, lode.clone(), part.clone(), env.cancel.clone())
    {
        Ok(policy) => policy,
        Err(err) => {
            tracing::error!(error = %err, "policy construction failed");
            env.metrics.run_failed();
            return SingleRun {
                outcome: FinalOutcome::PolicyFailure,
                stats: PolicyStats::default(),
                enqueues: Vec::new(),
                duration_ms: started.elapsed().as_millis() as u64,
            };
        }
    };

    let proxy = match resolve_proxy(settings, &meta, &env.selector) {
        Ok(proxy) => proxy,
        Err(err) => {
            tracing::error!(error = %err, "proxy resolution failed");
            env.metrics.run_failed();
            return crash(policy.stats(), started);
        }
    };

    let request = RunRequest {
        run: meta.clone(),
        job: JobSpec { script: settings.script.clone(), params: settings.params.clone() },
        proxy,
        storage: Some(part.clone()),
    };

    // Spawning → Running
    let bin = executor_binary(settings);
    let mut command = tokio::process::Command::new(&bin);
    command.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());
    if let Some(resolve_from) = &settings.resolve_from {
        command.env("QUARRY_RESOLVE_FROM", resolve_from);
    }
    if settings.no_browser_reuse {
        command.env("QUARRY_NO_BROWSER_REUSE", "1");
    }
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            tracing::error!(bin = %bin.display(), error = %err, "executor spawn failed");
            env.metrics.run_failed();
            return crash(policy.stats(), started);
        }
    };

    // Transmit the run request out of band, then close stdin.
    if let Some(mut stdin) = child.stdin.take() {
        let sent = async {
            let payload = quarry_wire::encode_payload(&request)?;
            quarry_wire::write_frame(&mut stdin, &payload).await
        }
        .await;
        if let Err(err) = sent {
            tracing::error!(error = %err, "run request transmission failed");
            let _ = child.kill().await;
            env.metrics.run_failed();
            return crash(policy.stats(), started);
        }
        drop(stdin);
    }

    // Forward executor stderr lines into our logs.
    if let Some(stderr) = child.stderr.take() {
        let run_id = run_id.clone();
        tokio::spawn(async move {
            let mut lines = tokio::io::BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(run_id = %run_id, "executor: {line}");
            }
        });
    }

    let report: ReaderReport = match child.stdout.take() {
        Some(mut stdout) => {
            read_stream(
                &mut stdout,
                policy.as_mut(),
                &lode,
                &part,
                settings.depth > 0,
                &env.cancel,
            )
            .await
        }
        None => {
            tracing::error!("child stdout unavailable");
            let _ = child.kill().await;
            env.metrics.run_failed();
            return crash(policy.stats(), started);
        }
    };

    // Running → Terminating: stop the child, bounded.
    let child_exit_ok = match tokio::time::timeout(CHILD_EXIT_GRACE, child.wait()).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "child wait failed");
            false
        }
        Err(_) => {
            tracing::warn!("child did not exit after stream end; killing");
            let _ = child.kill().await;
            false
        }
    };

    // Final flush window, then close.
    let close_error = policy.close().await.err();
    if let Some(err) = &close_error {
        tracing::error!(error = %err, "policy close failed");
    }
    let stats = policy.stats();

    let outcome = merge_outcome(
        &report.end,
        report.terminal,
        close_error.as_ref(),
        child_exit_ok,
        report.run_result.as_ref(),
        &run_id,
    );
    if !report.orphans.is_empty() {
        tracing::warn!(
            run_id = %run_id,
            orphans = report.orphans.len(),
            "run left uncommitted artifact chunks behind"
        );
    }

    if outcome.is_success() {
        env.metrics.run_completed();
    } else {
        env.metrics.run_failed();
    }
    env.metrics.absorb(&stats);

    // Metrics record: best-effort, never changes the outcome.
    let record = MetricsRecord::new(
        settings.policy.kind.as_str(),
        "quarryx",
        settings.storage_backend.as_str(),
        run_id.clone(),
        meta.job_id.clone(),
        chrono::Utc::now(),
        env.metrics.to_counters(),
        stats.clone(),
    );
    if let Err(err) = lode.append_metrics(&part, &record).await {
        tracing::warn!(error = %err, "metrics record write failed");
    }
    if let Err(err) = lode.close().await {
        tracing::warn!(error = %err, "storage close failed");
    }

    SingleRun {
        outcome,
        stats,
        enqueues: report.enqueues,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// Execute the root run plus any fan-out, notify the adapter, and return
/// the summary whose exit code the CLI propagates.
pub async fn execute_run(settings: RunSettings, env: ExecutionEnv) -> RunReportSummary {
    let meta = RunMeta {
        run_id: RunId::from_string(settings.run_id.clone()),
        job_id: settings.job_id.clone().map(JobId::from_string),
        parent_run_id: None,
        attempt: 1,
    };
    let run_id = meta.run_id.clone();

    let root = execute_single(&settings, meta, &env).await;

    let fanout = if settings.depth > 0 && !root.enqueues.is_empty() {
        Some(fanout::run_children(&settings, &env, root.enqueues.clone()).await)
    } else {
        None
    };

    let summary = RunReportSummary {
        run_id: run_id.clone(),
        outcome: root.outcome,
        exit_code: root.outcome.exit_code(),
        stats: root.stats,
        duration_ms: root.duration_ms,
        fanout,
    };

    // Adapter last: run data is already persisted, so failures here are
    // observable but can never change the exit code.
    let report = RunReport {
        run_id,
        job_id: settings.job_id.map(JobId::from_string),
        outcome: summary.outcome,
        exit_code: summary.exit_code,
        duration_ms: summary.duration_ms,
        stats: summary.stats.clone(),
    };
    if let Err(err) = env.adapter.notify(&report).await {
        env.metrics.adapter_failure();
        tracing::warn!(error = %err, "notification adapter failed");
    }

    summary
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
