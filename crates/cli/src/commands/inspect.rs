// SPDX-License-Identifier: MIT

//! `quarry inspect` — one entity in detail.

use crate::cli::{InspectArgs, InspectEntity};
use crate::config::FileConfig;
use crate::output::format_or_json;
use anyhow::{anyhow, Result};
use quarry_core::EventPayload;
use quarry_storage::StoreReader;

pub fn execute(args: InspectArgs) -> Result<()> {
    match args.entity {
        InspectEntity::Run { id, store } => {
            let reader = StoreReader::new(store.storage_path.as_str());
            let summary = reader
                .find_run(&id)?
                .ok_or_else(|| anyhow!("run {id:?} not found (or prefix is ambiguous)"))?;
            let events = reader.read_events(&summary)?;
            let detail = serde_json::json!({
                "run": summary,
                "events": events.iter().map(|e| serde_json::json!({
                    "seq": e.envelope.seq,
                    "type": e.envelope.event_type().as_str(),
                    "event_id": e.envelope.event_id,
                    "ts": e.envelope.ts,
                })).collect::<Vec<_>>(),
            });
            format_or_json(store.format, &detail, |d| {
                serde_yaml::to_string(d).unwrap_or_default()
            })
        }
        InspectEntity::Job { id, store } => {
            let reader = StoreReader::new(store.storage_path.as_str());
            let mut runs = Vec::new();
            for run in reader.list_runs()? {
                let belongs = reader
                    .read_events(&run)?
                    .iter()
                    .any(|e| e.envelope.job_id.as_ref().is_some_and(|j| j.as_str() == id));
                if belongs {
                    runs.push(run);
                }
            }
            if runs.is_empty() {
                return Err(anyhow!("job {id:?} not found"));
            }
            let detail = serde_json::json!({ "job": id, "runs": runs });
            format_or_json(store.format, &detail, |d| {
                serde_yaml::to_string(d).unwrap_or_default()
            })
        }
        InspectEntity::Task { target, store } => {
            let reader = StoreReader::new(store.storage_path.as_str());
            let mut occurrences = Vec::new();
            for run in reader.list_runs()? {
                for event in reader.read_events(&run)? {
                    if let EventPayload::Enqueue { spec } = &event.envelope.payload {
                        if spec.target == target {
                            occurrences.push(serde_json::json!({
                                "run_id": run.run_id,
                                "seq": event.envelope.seq,
                                "params": spec.params,
                            }));
                        }
                    }
                }
            }
            if occurrences.is_empty() {
                return Err(anyhow!("task target {target:?} not found"));
            }
            let detail = serde_json::json!({ "target": target, "enqueues": occurrences });
            format_or_json(store.format, &detail, |d| {
                serde_yaml::to_string(d).unwrap_or_default()
            })
        }
        InspectEntity::Proxy { name, config } => {
            let file = FileConfig::load(&config)?;
            let pool = file
                .proxy_pools
                .iter()
                .find(|p| p.name == name)
                .ok_or_else(|| anyhow!("pool {name:?} not defined"))?;
            // Redacted view only: passwords never reach stdout.
            let endpoints: Vec<String> =
                pool.endpoints.iter().map(|e| e.redacted().server_arg()).collect();
            let detail = serde_json::json!({
                "name": pool.name,
                "strategy": pool.strategy.as_str(),
                "endpoints": endpoints,
                "sticky": pool.sticky,
                "recency_window": pool.recency_window,
            });
            println!("{}", serde_yaml::to_string(&detail)?);
            Ok(())
        }
        InspectEntity::Executor { name, store } => {
            let reader = StoreReader::new(store.storage_path.as_str());
            let mut runs = Vec::new();
            for run in reader.list_runs()? {
                if run.metrics.as_ref().is_some_and(|m| m.executor == name) {
                    runs.push(run);
                }
            }
            if runs.is_empty() {
                return Err(anyhow!("executor {name:?} not found in any metrics record"));
            }
            let detail = serde_json::json!({ "executor": name, "runs": runs });
            format_or_json(store.format, &detail, |d| {
                serde_yaml::to_string(d).unwrap_or_default()
            })
        }
    }
}
