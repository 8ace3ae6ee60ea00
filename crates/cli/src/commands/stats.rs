// SPDX-License-Identifier: MIT

//! `quarry stats` — read-only aggregation.

use crate::cli::{StatsArgs, StatsEntity};
use crate::config::FileConfig;
use crate::output::{format_or_json, render_table};
use anyhow::Result;
use quarry_core::EventPayload;
use quarry_storage::StoreReader;
use std::collections::BTreeMap;

pub fn execute(args: StatsArgs) -> Result<()> {
    match args.entity {
        StatsEntity::Runs { store } => {
            let runs = StoreReader::new(store.storage_path.as_str()).list_runs()?;
            let mut by_type: BTreeMap<String, u64> = BTreeMap::new();
            let mut chunks = 0;
            for run in &runs {
                for (event_type, count) in &run.event_counts {
                    *by_type.entry(event_type.clone()).or_insert(0) += count;
                }
                chunks += run.chunk_count;
            }
            let summary = serde_json::json!({
                "runs": runs.len(),
                "events_by_type": by_type,
                "chunks": chunks,
            });
            format_or_json(store.format, &summary, |s| {
                serde_yaml::to_string(s).unwrap_or_default()
            })
        }
        StatsEntity::Jobs { store } => {
            let reader = StoreReader::new(store.storage_path.as_str());
            let mut jobs: BTreeMap<String, u64> = BTreeMap::new();
            let mut unattached = 0u64;
            for run in reader.list_runs()? {
                let job = reader
                    .read_events(&run)?
                    .iter()
                    .find_map(|e| e.envelope.job_id.clone());
                match job {
                    Some(job_id) => *jobs.entry(job_id.as_str().to_string()).or_insert(0) += 1,
                    None => unattached += 1,
                }
            }
            let summary = serde_json::json!({
                "jobs": jobs.len(),
                "runs_by_job": jobs,
                "runs_without_job": unattached,
            });
            format_or_json(store.format, &summary, |s| {
                serde_yaml::to_string(s).unwrap_or_default()
            })
        }
        StatsEntity::Tasks { store } => {
            let reader = StoreReader::new(store.storage_path.as_str());
            let mut targets: BTreeMap<String, u64> = BTreeMap::new();
            for run in reader.list_runs()? {
                for event in reader.read_events(&run)? {
                    if let EventPayload::Enqueue { spec } = &event.envelope.payload {
                        *targets.entry(spec.target.clone()).or_insert(0) += 1;
                    }
                }
            }
            format_or_json(store.format, &targets, |targets| {
                let rows: Vec<Vec<String>> = targets
                    .iter()
                    .map(|(target, count)| vec![target.clone(), count.to_string()])
                    .collect();
                render_table(&["target", "enqueues"], &rows)
            })
        }
        StatsEntity::Proxies { config } => {
            let file = FileConfig::load(&config)?;
            let rows: Vec<Vec<String>> = file
                .proxy_pools
                .iter()
                .map(|p| {
                    vec![
                        p.name.clone(),
                        p.strategy.as_str().to_string(),
                        p.endpoints.len().to_string(),
                        p.recency_window.map(|w| w.to_string()).unwrap_or_else(|| "-".into()),
                    ]
                })
                .collect();
            println!("{}", render_table(&["pool", "strategy", "endpoints", "recency"], &rows));
            Ok(())
        }
        StatsEntity::Executors { store } => {
            let reader = StoreReader::new(store.storage_path.as_str());
            let mut executors: BTreeMap<String, (u64, u64)> = BTreeMap::new();
            for run in reader.list_runs()? {
                if let Some(metrics) = &run.metrics {
                    let entry = executors.entry(metrics.executor.clone()).or_insert((0, 0));
                    entry.0 += 1;
                    entry.1 += metrics.policy_stats.events_persisted;
                }
            }
            format_or_json(store.format, &executors, |executors| {
                let rows: Vec<Vec<String>> = executors
                    .iter()
                    .map(|(name, (runs, events))| {
                        vec![name.clone(), runs.to_string(), events.to_string()]
                    })
                    .collect();
                render_table(&["executor", "runs", "events"], &rows)
            })
        }
        StatsEntity::Metrics { store } => {
            let reader = StoreReader::new(store.storage_path.as_str());
            let mut counters: BTreeMap<String, u64> = BTreeMap::new();
            for run in reader.list_runs()? {
                if let Some(metrics) = &run.metrics {
                    for (key, value) in &metrics.counters {
                        *counters.entry(key.clone()).or_insert(0) += value;
                    }
                }
            }
            format_or_json(store.format, &counters, |counters| {
                let rows: Vec<Vec<String>> = counters
                    .iter()
                    .map(|(key, value)| vec![key.clone(), value.to_string()])
                    .collect();
                render_table(&["counter", "total"], &rows)
            })
        }
    }
}
