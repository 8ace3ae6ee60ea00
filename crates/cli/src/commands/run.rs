// SPDX-License-Identifier: MIT

//! `quarry run` — the only mutating command.

use crate::cli::RunArgs;
use crate::config::{resolve_run, AdapterChoice};
use crate::exit_error::ExitError;
use quarry_adapters::{NoopAdapter, NotifyAdapter, WebhookAdapter};
use quarry_runtime::{execute_run, ExecutionEnv, ProxySelector, RunMetrics, RunReportSummary};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub fn execute(args: RunArgs) -> Result<(), ExitError> {
    // Config errors prevent execution: exit 2 (executor_crash class).
    let resolved = resolve_run(&args).map_err(|err| ExitError::new(2, err.to_string()))?;

    if args.dry_run {
        print_plan(&resolved);
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| ExitError::new(2, format!("runtime init failed: {err}")))?;

    let cancel = CancellationToken::new();
    let selector = Arc::new(ProxySelector::new());
    for pool in resolved.pools {
        selector.add_pool(pool);
    }
    let adapter: Arc<dyn NotifyAdapter> = match resolved.adapter {
        AdapterChoice::Noop => Arc::new(NoopAdapter),
        AdapterChoice::Webhook(config) => Arc::new(
            WebhookAdapter::new(config, cancel.clone())
                .map_err(|err| ExitError::new(2, err.to_string()))?,
        ),
    };
    let env = ExecutionEnv {
        metrics: Arc::new(RunMetrics::new()),
        selector,
        adapter,
        cancel: cancel.clone(),
    };

    let summary = runtime.block_on(async {
        // Signal → cancellation → bounded final flush inside the runtime.
        let cancel_on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; cancelling run");
                cancel_on_signal.cancel();
            }
        });
        execute_run(resolved.settings, env).await
    });

    print_summary(&summary);
    if summary.exit_code == 0 {
        Ok(())
    } else {
        Err(ExitError::from_outcome(summary.outcome))
    }
}

fn print_plan(resolved: &crate::config::ResolvedRun) {
    let s = &resolved.settings;
    println!("run plan (dry run)");
    println!("  run_id:    {}", s.run_id);
    println!("  script:    {}", s.script);
    println!("  source:    {}", s.source);
    println!("  category:  {}", s.category);
    println!("  storage:   {} {}", s.storage_backend.as_str(), s.storage_path);
    println!("  policy:    {}", s.policy.kind.as_str());
    if s.depth > 0 {
        println!("  fan-out:   depth={} max_runs={} parallel={}", s.depth, s.max_runs, s.parallel);
    }
    if let Some(pool) = &s.proxy_pool {
        println!("  proxy:     pool {pool}");
    }
}

fn print_summary(summary: &RunReportSummary) {
    println!(
        "run {} {} in {}ms ({} events persisted, {} dropped, {} chunks)",
        summary.run_id,
        summary.outcome,
        summary.duration_ms,
        summary.stats.events_persisted,
        summary.stats.events_dropped,
        summary.stats.chunks_persisted,
    );
    if let Some(fanout) = &summary.fanout {
        println!(
            "fan-out: {} children ({} deduplicated, {} over max-runs)",
            fanout.children.len(),
            fanout.deduplicated,
            fanout.skipped_max_runs,
        );
        for child in &fanout.children {
            println!(
                "  {} {} {} in {}ms ({} events)",
                child.run_id,
                child.target,
                child.outcome,
                child.duration_ms,
                child.events_persisted,
            );
        }
    }
}
