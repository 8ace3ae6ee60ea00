// SPDX-License-Identifier: MIT

//! Config resolution: CLI flags over YAML file over defaults.
//!
//! Required fields (`source`, `--storage-backend`, `--storage-path`) are
//! validated after the merge, and skipped under `--dry-run`.

use crate::cli::RunArgs;
use quarry_adapters::WebhookConfig;
use quarry_core::ProxyPool;
use quarry_runtime::{PolicyConfig, RunSettings};
use quarry_storage::BackendKind;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config file {path}: {source}")]
    Unparseable {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("missing required setting {0} (flag or config file)")]
    Missing(&'static str),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("proxy pool config: {0}")]
    Pool(#[from] quarry_core::PoolError),
}

/// YAML config file shape. Every field optional; flags win.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub source: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub policy: PolicySection,
    #[serde(default)]
    pub adapter: AdapterSection,
    #[serde(default)]
    pub fanout: FanoutSection,
    #[serde(default)]
    pub proxy_pools: Vec<ProxyPool>,
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    pub backend: Option<String>,
    pub path: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySection {
    pub kind: Option<String>,
    pub flush_mode: Option<String>,
    pub buffer_events: Option<usize>,
    pub buffer_bytes: Option<u64>,
    pub flush_count: Option<usize>,
    /// humantime string, e.g. "5s"
    pub flush_interval: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterSection {
    pub kind: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// humantime string, e.g. "10s"
    pub timeout: Option<String>,
    pub retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FanoutSection {
    pub depth: Option<u32>,
    pub max_runs: Option<usize>,
    pub parallel: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Unparseable {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Everything `run` needs, fully resolved.
#[derive(Debug)]
pub struct ResolvedRun {
    pub settings: RunSettings,
    pub adapter: AdapterChoice,
    pub pools: Vec<ProxyPool>,
}

#[derive(Debug)]
pub enum AdapterChoice {
    Noop,
    Webhook(WebhookConfig),
}

fn parse_duration_field(
    value: Option<String>,
    field: &'static str,
) -> Result<Option<std::time::Duration>, ConfigError> {
    value
        .map(|v| {
            humantime::parse_duration(&v)
                .map_err(|e| ConfigError::Invalid { field, reason: e.to_string() })
        })
        .transpose()
}

/// Merge flags over the config file and validate.
pub fn resolve_run(args: &RunArgs) -> Result<ResolvedRun, ConfigError> {
    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    let source = args.source.clone().or(file.source);
    let category = args
        .category
        .clone()
        .or(file.category)
        .unwrap_or_else(|| "default".to_string());
    let backend = args.storage_backend.clone().or(file.storage.backend);
    let storage_path = args.storage_path.clone().or(file.storage.path);
    let storage_region = args.storage_region.clone().or(file.storage.region);

    // Required unless --dry-run; --dry-run still prints what it has.
    let (source, backend, storage_path) = if args.dry_run {
        (
            source.unwrap_or_else(|| "unset".to_string()),
            backend.unwrap_or_else(|| "fs".to_string()),
            storage_path.unwrap_or_else(|| "unset".to_string()),
        )
    } else {
        (
            source.ok_or(ConfigError::Missing("source"))?,
            backend.ok_or(ConfigError::Missing("storage-backend"))?,
            storage_path.ok_or(ConfigError::Missing("storage-path"))?,
        )
    };

    let storage_backend: BackendKind = backend
        .parse()
        .map_err(|reason| ConfigError::Invalid { field: "storage-backend", reason })?;

    let kind = args
        .policy
        .clone()
        .or(file.policy.kind)
        .unwrap_or_else(|| "strict".to_string());
    let flush_mode = args
        .flush_mode
        .clone()
        .or(file.policy.flush_mode)
        .map(|m| m.parse().map_err(|reason| ConfigError::Invalid { field: "flush-mode", reason }))
        .transpose()?
        .unwrap_or_default();
    let policy = PolicyConfig {
        kind: kind
            .parse()
            .map_err(|reason| ConfigError::Invalid { field: "policy", reason })?,
        flush_mode,
        max_events: args.buffer_events.or(file.policy.buffer_events),
        max_bytes: args.buffer_bytes.or(file.policy.buffer_bytes),
        flush_count: args.flush_count.or(file.policy.flush_count),
        flush_interval: args
            .flush_interval
            .or(parse_duration_field(file.policy.flush_interval, "flush-interval")?),
    };

    let adapter_kind = args
        .adapter
        .clone()
        .or(file.adapter.kind)
        .unwrap_or_else(|| "noop".to_string());
    let adapter = match adapter_kind.as_str() {
        "noop" => AdapterChoice::Noop,
        "webhook" => {
            let url = args
                .adapter_url
                .clone()
                .or(file.adapter.url)
                .ok_or(ConfigError::Missing("adapter-url"))?;
            let mut config = WebhookConfig::new(url);
            for (key, value) in &file.adapter.headers {
                config.headers.push((key.clone(), value.clone()));
            }
            for (key, value) in &args.adapter_header {
                config.headers.push((key.clone(), value.clone()));
            }
            if let Some(timeout) = args
                .adapter_timeout
                .or(parse_duration_field(file.adapter.timeout, "adapter-timeout")?)
            {
                config.timeout = timeout;
            }
            if let Some(retries) = args.adapter_retries.or(file.adapter.retries) {
                config.retries = retries;
            }
            AdapterChoice::Webhook(config)
        }
        other => {
            return Err(ConfigError::Invalid {
                field: "adapter",
                reason: format!("unknown adapter {other:?}"),
            });
        }
    };

    for pool in &file.proxy_pools {
        pool.validate()?;
    }
    if let Some(pool) = &args.proxy_pool {
        if !file.proxy_pools.iter().any(|p| &p.name == pool) {
            return Err(ConfigError::Invalid {
                field: "proxy-pool",
                reason: format!("pool {pool:?} not defined in the config file"),
            });
        }
    }

    let settings = RunSettings {
        run_id: args.run_id.clone(),
        job_id: args.job_id.clone(),
        script: args.script.clone(),
        params: file.params,
        source,
        category,
        storage_backend,
        storage_path,
        storage_region,
        policy,
        proxy_pool: args.proxy_pool.clone(),
        depth: args.depth.or(file.fanout.depth).unwrap_or(0),
        max_runs: args.max_runs.or(file.fanout.max_runs).unwrap_or(100),
        parallel: args.parallel.or(file.fanout.parallel).unwrap_or(1),
        executor_bin: None,
        resolve_from: args.resolve_from.clone(),
        no_browser_reuse: args.no_browser_reuse,
    };

    Ok(ResolvedRun { settings, adapter, pools: file.proxy_pools })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
