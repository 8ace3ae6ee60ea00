// SPDX-License-Identifier: MIT

//! `quarry list` — read-only enumeration.

use crate::cli::{ListArgs, ListEntity};
use crate::config::FileConfig;
use crate::output::{format_or_json, render_table};
use anyhow::Result;
use quarry_storage::StoreReader;
use std::collections::BTreeMap;

pub fn execute(args: ListArgs) -> Result<()> {
    match args.entity {
        ListEntity::Runs { store, limit } => {
            let mut runs = StoreReader::new(store.storage_path.as_str()).list_runs()?;
            runs.sort_by(|a, b| (&b.day, &b.run_id).cmp(&(&a.day, &a.run_id)));
            runs.truncate(limit);
            format_or_json(store.format, &runs, |runs| {
                let rows: Vec<Vec<String>> = runs
                    .iter()
                    .map(|r| {
                        let events: u64 = r.event_counts.values().sum();
                        vec![
                            r.run_id.clone(),
                            r.source.clone(),
                            r.category.clone(),
                            r.day.clone(),
                            events.to_string(),
                            r.chunk_count.to_string(),
                        ]
                    })
                    .collect();
                render_table(&["run", "source", "category", "day", "events", "chunks"], &rows)
            })
        }
        ListEntity::Jobs { store } => {
            let reader = StoreReader::new(store.storage_path.as_str());
            let mut jobs: BTreeMap<String, usize> = BTreeMap::new();
            for run in reader.list_runs()? {
                for event in reader.read_events(&run)? {
                    if let Some(job_id) = &event.envelope.job_id {
                        *jobs.entry(job_id.as_str().to_string()).or_insert(0) += 1;
                        break;
                    }
                }
            }
            format_or_json(store.format, &jobs, |jobs| {
                let rows: Vec<Vec<String>> =
                    jobs.iter().map(|(job, runs)| vec![job.clone(), runs.to_string()]).collect();
                render_table(&["job", "runs"], &rows)
            })
        }
        ListEntity::Pools { config } => {
            let file = FileConfig::load(&config)?;
            let rows: Vec<Vec<String>> = file
                .proxy_pools
                .iter()
                .map(|p| {
                    vec![
                        p.name.clone(),
                        p.strategy.as_str().to_string(),
                        p.endpoints.len().to_string(),
                    ]
                })
                .collect();
            println!("{}", render_table(&["pool", "strategy", "endpoints"], &rows));
            Ok(())
        }
        ListEntity::Executors { store } => {
            let reader = StoreReader::new(store.storage_path.as_str());
            let mut executors: BTreeMap<String, usize> = BTreeMap::new();
            for run in reader.list_runs()? {
                if let Some(metrics) = &run.metrics {
                    *executors.entry(metrics.executor.clone()).or_insert(0) += 1;
                }
            }
            format_or_json(store.format, &executors, |executors| {
                let rows: Vec<Vec<String>> = executors
                    .iter()
                    .map(|(name, runs)| vec![name.clone(), runs.to_string()])
                    .collect();
                render_table(&["executor", "runs"], &rows)
            })
        }
    }
}
