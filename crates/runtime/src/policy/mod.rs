// SPDX-License-Identifier: MIT

//! Ingestion policies.
//!
//! A policy decides what gets buffered, persisted, or dropped between the
//! IPC reader and the storage sink. All policies preserve per-run event
//! order, never alter event shapes, and never silently drop non-droppable
//! events — a non-droppable that cannot be persisted is an error that
//! terminates the run as `policy_failure`.

mod buffered;
mod noop;
mod strict;
mod streaming;

pub use buffered::BufferedPolicy;
pub use noop::NoopPolicy;
pub use strict::StrictPolicy;
pub use streaming::StreamingPolicy;

use async_trait::async_trait;
use parking_lot::Mutex;
use quarry_core::{ArtifactChunk, EventEnvelope, PolicyStats, RunPartition};
use quarry_storage::{Lode, StorageError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum PolicyError {
    /// A non-droppable event could not be persisted. Terminates the run.
    #[error("non-droppable {event_type} event could not be persisted: {source}")]
    NonDroppable {
        event_type: String,
        #[source]
        source: StorageError,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("policy misconfigured: {0}")]
    Misconfigured(String),
    #[error("policy cancelled while blocked on a full buffer")]
    Cancelled,
}

/// The policy interface the ingest loop drives. Single-writer: exactly one
/// loop per run calls these; observers read stats through [`StatsHandle`].
#[async_trait]
pub trait IngestPolicy: Send {
    async fn ingest_event(&mut self, envelope: EventEnvelope) -> Result<(), PolicyError>;

    async fn ingest_chunk(&mut self, chunk: ArtifactChunk) -> Result<(), PolicyError>;

    /// Persist whatever is buffered. Empty buffers are a no-op with zero
    /// storage writes.
    async fn flush(&mut self) -> Result<(), PolicyError>;

    /// Final flush and release. Idempotent.
    async fn close(&mut self) -> Result<(), PolicyError>;

    fn stats(&self) -> PolicyStats;

    /// Shared handle observers may read concurrently.
    fn stats_handle(&self) -> StatsHandle;
}

/// Read-consistent shared stats cell. Snapshots hold the lock once.
#[derive(Clone, Default)]
pub struct StatsHandle(Arc<Mutex<PolicyStats>>);

impl StatsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PolicyStats {
        self.0.lock().clone()
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut PolicyStats) -> R) -> R {
        f(&mut self.0.lock())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Strict,
    Buffered,
    Streaming,
    Noop,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Strict => "strict",
            PolicyKind::Buffered => "buffered",
            PolicyKind::Streaming => "streaming",
            PolicyKind::Noop => "noop",
        }
    }
}

impl std::str::FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(PolicyKind::Strict),
            "buffered" => Ok(PolicyKind::Buffered),
            "streaming" => Ok(PolicyKind::Streaming),
            "noop" => Ok(PolicyKind::Noop),
            other => Err(format!(
                "unknown policy {other:?} (expected strict, buffered, streaming, or noop)"
            )),
        }
    }
}

/// Buffered-policy flush modes (§ duplicate-risk trade-offs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    #[default]
    AtLeastOnce,
    ChunksFirst,
    TwoPhase,
}

impl FlushMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushMode::AtLeastOnce => "at_least_once",
            FlushMode::ChunksFirst => "chunks_first",
            FlushMode::TwoPhase => "two_phase",
        }
    }
}

impl std::str::FromStr for FlushMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "at_least_once" => Ok(FlushMode::AtLeastOnce),
            "chunks_first" => Ok(FlushMode::ChunksFirst),
            "two_phase" => Ok(FlushMode::TwoPhase),
            other => Err(format!(
                "unknown flush mode {other:?} (expected at_least_once, chunks_first, or two_phase)"
            )),
        }
    }
}

/// Assembled policy configuration (flags + config file, already merged).
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub kind: PolicyKind,
    pub flush_mode: FlushMode,
    pub max_events: Option<usize>,
    pub max_bytes: Option<u64>,
    pub flush_count: Option<usize>,
    pub flush_interval: Option<Duration>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            kind: PolicyKind::Strict,
            flush_mode: FlushMode::default(),
            max_events: None,
            max_bytes: None,
            flush_count: None,
            flush_interval: None,
        }
    }
}

impl PolicyConfig {
    /// Buffer bound when neither `--buffer-events` nor `--buffer-bytes`
    /// is given.
    pub const DEFAULT_MAX_EVENTS: usize = 1000;

    pub fn validate(&self) -> Result<(), PolicyError> {
        match self.kind {
            PolicyKind::Streaming => {
                if self.flush_count.is_none() && self.flush_interval.is_none() {
                    return Err(PolicyError::Misconfigured(
                        "streaming policy requires flush_count and/or flush_interval".to_string(),
                    ));
                }
                if self.flush_count == Some(0) {
                    return Err(PolicyError::Misconfigured(
                        "flush_count must be positive".to_string(),
                    ));
                }
            }
            PolicyKind::Buffered => {
                if self.max_events == Some(0) || self.max_bytes == Some(0) {
                    return Err(PolicyError::Misconfigured(
                        "buffer bounds must be positive".to_string(),
                    ));
                }
            }
            PolicyKind::Strict | PolicyKind::Noop => {}
        }
        Ok(())
    }
}

/// Build the configured policy over a storage sink.
pub fn build_policy(
    config: &PolicyConfig,
    lode: Arc<dyn Lode>,
    part: RunPartition,
    cancel: CancellationToken,
) -> Result<Box<dyn IngestPolicy>, PolicyError> {
    config.validate()?;
    Ok(match config.kind {
        PolicyKind::Strict => Box::new(StrictPolicy::new(lode, part)),
        PolicyKind::Buffered => Box::new(BufferedPolicy::new(config, lode, part)),
        PolicyKind::Streaming => Box::new(StreamingPolicy::new(config, lode, part, cancel)),
        PolicyKind::Noop => Box::new(NoopPolicy::new()),
    })
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

#[cfg(test)]
pub(crate) mod test_support;
