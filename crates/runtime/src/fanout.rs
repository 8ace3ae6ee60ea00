// SPDX-License-Identifier: MIT

//! Fan-out: derived child runs from `enqueue` events.
//!
//! Active only when `--depth > 0`. Children are bounded by `--max-runs`
//! and `--parallel`, deduplicated on `(target, params)` within one root
//! run, and never influence the root's exit code.

use crate::orchestrator::{execute_single, ExecutionEnv, RunSettings};
use quarry_core::{EnqueueSpec, FinalOutcome, JobId, RunId, RunMeta};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Resolve an enqueue target to an executor script name.
///
/// Target resolution rules may change; every caller goes through here so
/// nothing else depends on the details. Today a target IS the script
/// name.
pub fn resolve_target(target: &str) -> String {
    target.to_string()
}

#[derive(Debug, Clone)]
pub struct ChildSummary {
    pub run_id: RunId,
    pub target: String,
    pub outcome: FinalOutcome,
    pub events_persisted: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Default)]
pub struct FanoutSummary {
    pub children: Vec<ChildSummary>,
    /// Enqueues dropped as duplicates of an earlier `(target, params)`.
    pub deduplicated: usize,
    /// Enqueues dropped because `--max-runs` was exhausted.
    pub skipped_max_runs: usize,
}

fn dedup_key(spec: &EnqueueSpec) -> String {
    let params = serde_json::to_string(&spec.params).unwrap_or_default();
    format!("{}\u{0}{}", spec.target, params)
}

fn child_settings(root: &RunSettings, spec: &EnqueueSpec, depth_left: u32) -> RunSettings {
    RunSettings {
        run_id: String::new(), // child meta carries the generated id
        script: resolve_target(&spec.target),
        params: spec.params.clone(),
        // Children inherit the root partition unless the enqueue overrides.
        source: spec.source.clone().unwrap_or_else(|| root.source.clone()),
        category: spec.category.clone().unwrap_or_else(|| root.category.clone()),
        depth: depth_left,
        ..root.clone()
    }
}

/// Run fan-out children breadth-first until depth, max-runs, or the
/// enqueue stream is exhausted.
pub(crate) async fn run_children(
    root: &RunSettings,
    env: &ExecutionEnv,
    initial: Vec<EnqueueSpec>,
) -> FanoutSummary {
    let mut summary = FanoutSummary::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut frontier = initial;
    let mut spawned = 0usize;
    let semaphore = Arc::new(Semaphore::new(root.parallel.max(1)));

    for level in 1..=root.depth {
        if frontier.is_empty() {
            break;
        }
        let mut next_frontier: Vec<EnqueueSpec> = Vec::new();
        let mut join: JoinSet<(ChildSummary, Vec<EnqueueSpec>)> = JoinSet::new();

        for spec in std::mem::take(&mut frontier) {
            if !seen.insert(dedup_key(&spec)) {
                summary.deduplicated += 1;
                continue;
            }
            if spawned >= root.max_runs {
                summary.skipped_max_runs += 1;
                continue;
            }
            spawned += 1;

            let settings = child_settings(root, &spec, root.depth - level);
            let env = env.clone();
            let semaphore = semaphore.clone();
            let job_id = root.job_id.clone().map(JobId::from_string);
            let target = spec.target.clone();
            join.spawn(async move {
                // Semaphore bounds concurrent child runs.
                let _permit = semaphore.acquire_owned().await;
                let meta = RunMeta::child(job_id);
                let run_id = meta.run_id.clone();
                tracing::info!(run_id = %run_id, %target, level, "fan-out child starting");
                let result = execute_single(&settings, meta, &env).await;
                (
                    ChildSummary {
                        run_id,
                        target,
                        outcome: result.outcome,
                        events_persisted: result.stats.events_persisted,
                        duration_ms: result.duration_ms,
                    },
                    result.enqueues,
                )
            });
        }

        while let Some(finished) = join.join_next().await {
            match finished {
                Ok((child, enqueues)) => {
                    summary.children.push(child);
                    if level < root.depth {
                        next_frontier.extend(enqueues);
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "fan-out child task panicked");
                }
            }
        }
        frontier = next_frontier;
    }

    if !frontier.is_empty() {
        tracing::info!(
            remaining = frontier.len(),
            depth = root.depth,
            "enqueues remained below the depth limit"
        );
    }
    summary
}

#[cfg(test)]
#[path = "fanout_tests.rs"]
mod tests;
