// SPDX-License-Identifier: MIT

//! The Quarry runtime: the parent-process data plane.
//!
//! Spawns the executor child, decodes its frame stream, runs the
//! ingestion policy, coordinates artifact commits, merges outcome
//! signals, and derives the process exit code.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod artifact;
pub mod fanout;
pub mod metrics;
pub mod orchestrator;
pub mod policy;
pub mod proxy;
pub mod reader;

pub use artifact::{ChunkReassembler, ReassemblyError};
pub use fanout::{resolve_target, ChildSummary, FanoutSummary};
pub use metrics::RunMetrics;
pub use orchestrator::{
    execute_run, ExecutionEnv, RunReportSummary, RunSettings, ENV_EXECUTOR_BINARY,
};
pub use policy::{
    build_policy, FlushMode, IngestPolicy, PolicyConfig, PolicyError, PolicyKind, StatsHandle,
};
pub use proxy::{ProxySelector, SelectError, SelectionCtx};
pub use reader::{read_stream, ReaderReport, StreamEnd};
