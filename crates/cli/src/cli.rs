// SPDX-License-Identifier: MIT

//! `quarry` command surface.
//!
//! `run` is the only command that executes work; everything else is
//! read-only over the store or over configuration.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "quarry", version, about = "Single-shot extraction runtime")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Execute one extraction run
    Run(Box<RunArgs>),
    /// Show one entity in detail
    Inspect(InspectArgs),
    /// Aggregated statistics over the store
    Stats(StatsArgs),
    /// List entities
    List(ListArgs),
    /// Debugging helpers
    Debug(DebugArgs),
    /// Print the version (CLI, emit contract, and IPC contract move in
    /// lockstep)
    Version,
}

#[derive(Args)]
pub struct RunArgs {
    /// Script name or path (resolved by the executor)
    #[arg(long)]
    pub script: String,

    /// Run identifier; must be collision resistant (UUIDv7/ULID)
    #[arg(long)]
    pub run_id: String,

    /// Job identifier grouping related runs
    #[arg(long)]
    pub job_id: Option<String>,

    /// Partition source
    #[arg(long)]
    pub source: Option<String>,

    /// Partition category
    #[arg(long)]
    pub category: Option<String>,

    /// Storage backend
    #[arg(long, value_parser = ["fs", "s3"])]
    pub storage_backend: Option<String>,

    /// Storage root: a path / file:// URI (fs) or s3://bucket[/prefix]
    #[arg(long)]
    pub storage_path: Option<String>,

    /// Region for the s3 backend
    #[arg(long)]
    pub storage_region: Option<String>,

    /// Ingestion policy
    #[arg(long, value_parser = ["strict", "buffered", "streaming", "noop"])]
    pub policy: Option<String>,

    /// Buffered-policy flush mode
    #[arg(long, value_parser = ["at_least_once", "chunks_first", "two_phase"])]
    pub flush_mode: Option<String>,

    /// Buffer bound in events (buffered/streaming)
    #[arg(long)]
    pub buffer_events: Option<usize>,

    /// Buffer bound in bytes (buffered/streaming)
    #[arg(long)]
    pub buffer_bytes: Option<u64>,

    /// Streaming: flush every N events
    #[arg(long)]
    pub flush_count: Option<usize>,

    /// Streaming: flush every interval (e.g. "5s", "500ms")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub flush_interval: Option<std::time::Duration>,

    /// Fan-out depth; 0 means enqueue events are advisory only
    #[arg(long)]
    pub depth: Option<u32>,

    /// Fan-out: total child-run budget
    #[arg(long)]
    pub max_runs: Option<usize>,

    /// Fan-out: concurrent child runs
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Notification adapter
    #[arg(long, value_parser = ["webhook", "noop"])]
    pub adapter: Option<String>,

    /// Webhook adapter endpoint
    #[arg(long)]
    pub adapter_url: Option<String>,

    /// Webhook header, key=value (repeatable)
    #[arg(long = "adapter-header", value_parser = parse_key_value)]
    pub adapter_header: Vec<(String, String)>,

    /// Webhook per-attempt timeout
    #[arg(long, value_parser = humantime::parse_duration)]
    pub adapter_timeout: Option<std::time::Duration>,

    /// Webhook retry budget for 5xx/network failures
    #[arg(long)]
    pub adapter_retries: Option<u32>,

    /// Proxy pool name (defined in the config file)
    #[arg(long)]
    pub proxy_pool: Option<String>,

    /// YAML config file; flags win over file values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Resolve and validate only; print the plan and exit 0
    #[arg(long)]
    pub dry_run: bool,

    /// Directory relative script paths resolve against
    #[arg(long)]
    pub resolve_from: Option<PathBuf>,

    /// Launch a fresh browser for every run
    #[arg(long)]
    pub no_browser_reuse: bool,
}

#[derive(Args)]
pub struct InspectArgs {
    #[command(subcommand)]
    pub entity: InspectEntity,
}

#[derive(Subcommand)]
pub enum InspectEntity {
    /// One run: partitions, counts, metrics
    Run { id: String, #[command(flatten)] store: StoreArgs },
    /// One job: all runs sharing a job_id
    Job { id: String, #[command(flatten)] store: StoreArgs },
    /// One fan-out target: enqueue occurrences
    Task { target: String, #[command(flatten)] store: StoreArgs },
    /// One proxy pool from the config file
    Proxy { name: String, #[arg(long)] config: PathBuf },
    /// One executor as seen in metrics records
    Executor { name: String, #[command(flatten)] store: StoreArgs },
}

#[derive(Args)]
pub struct StatsArgs {
    #[command(subcommand)]
    pub entity: StatsEntity,
}

#[derive(Subcommand)]
pub enum StatsEntity {
    Runs {
        #[command(flatten)]
        store: StoreArgs,
    },
    Jobs {
        #[command(flatten)]
        store: StoreArgs,
    },
    Tasks {
        #[command(flatten)]
        store: StoreArgs,
    },
    Proxies {
        #[arg(long)]
        config: PathBuf,
    },
    Executors {
        #[command(flatten)]
        store: StoreArgs,
    },
    Metrics {
        #[command(flatten)]
        store: StoreArgs,
    },
}

#[derive(Args)]
pub struct ListArgs {
    #[command(subcommand)]
    pub entity: ListEntity,
}

#[derive(Subcommand)]
pub enum ListEntity {
    Runs {
        #[command(flatten)]
        store: StoreArgs,
        /// Maximum number of runs to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    Jobs {
        #[command(flatten)]
        store: StoreArgs,
    },
    Pools {
        #[arg(long)]
        config: PathBuf,
    },
    Executors {
        #[command(flatten)]
        store: StoreArgs,
    },
}

#[derive(Args)]
pub struct DebugArgs {
    #[command(subcommand)]
    pub tool: DebugTool,
}

#[derive(Subcommand)]
pub enum DebugTool {
    /// Run one selection round against a pool; prints the redacted
    /// endpoint
    ResolveProxy {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        pool: String,
        /// Commit the selection instead of peeking
        #[arg(long)]
        commit: bool,
        #[arg(long)]
        job_id: Option<String>,
        #[arg(long)]
        sticky_key: Option<String>,
    },
    /// Decode a length-prefixed frame stream from a file (or stdin with
    /// "-") and pretty-print the frames
    Ipc {
        /// Input file; "-" reads stdin
        input: String,
    },
}

/// Shared flags for commands that read the store.
#[derive(Args)]
pub struct StoreArgs {
    /// Store root (fs layout)
    #[arg(long)]
    pub storage_path: String,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: crate::output::OutputFormat,
}

pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got {s:?}")),
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
