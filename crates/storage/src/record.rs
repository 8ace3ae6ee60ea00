// SPDX-License-Identifier: MIT

//! On-disk record shapes.
//!
//! Every persisted line carries a `record_kind` discriminator so readers
//! can mix record streams without consulting the path.

use chrono::{DateTime, Utc};
use quarry_core::{ArtifactChunk, ArtifactId, EventEnvelope, EventType, JobId, PolicyStats, RunId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Event,
    ArtifactEvent,
    ArtifactChunk,
    Metrics,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Event => "event",
            RecordKind::ArtifactEvent => "artifact_event",
            RecordKind::ArtifactChunk => "artifact_chunk",
            RecordKind::Metrics => "metrics",
        }
    }

    /// Artifact commit events get their own kind so readers can find
    /// commits without inspecting payloads.
    pub fn for_event(event_type: EventType) -> Self {
        if event_type == EventType::Artifact {
            RecordKind::ArtifactEvent
        } else {
            RecordKind::Event
        }
    }
}

/// A persisted event line: discriminator plus the unmodified envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub record_kind: RecordKind,
    #[serde(flatten)]
    pub envelope: EventEnvelope,
}

impl StoredEvent {
    pub fn new(envelope: EventEnvelope) -> Self {
        Self { record_kind: RecordKind::for_event(envelope.event_type()), envelope }
    }
}

/// Metadata line for one persisted chunk (the bytes live beside it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub record_kind: RecordKind,
    pub artifact_id: ArtifactId,
    pub seq: u64,
    /// Byte offset of this chunk within the artifact.
    pub offset: u64,
    pub length: u64,
    pub is_last: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Tracks per-artifact byte offsets across flushes so chunk records carry
/// stable offsets even when a retry re-delivers a chunk.
#[derive(Debug, Default)]
pub struct ChunkLedger {
    // (artifact, seq) → (offset, length)
    seen: HashMap<(ArtifactId, u64), (u64, u64)>,
    // artifact → next free offset
    next: HashMap<ArtifactId, u64>,
}

impl ChunkLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the record for a chunk, assigning its offset. Re-delivered
    /// chunks (same artifact + seq) get their original offset back.
    pub fn record_for(&mut self, chunk: &ArtifactChunk) -> ChunkRecord {
        let key = (chunk.artifact_id.clone(), chunk.seq);
        let length = chunk.data.len() as u64;
        let (offset, length) = match self.seen.get(&key) {
            Some(&existing) => existing,
            None => {
                let offset = self.next.get(&chunk.artifact_id).copied().unwrap_or(0);
                self.next.insert(chunk.artifact_id.clone(), offset + length);
                self.seen.insert(key, (offset, length));
                (offset, length)
            }
        };
        ChunkRecord {
            record_kind: RecordKind::ArtifactChunk,
            artifact_id: chunk.artifact_id.clone(),
            seq: chunk.seq,
            offset,
            length,
            is_last: chunk.is_last,
            checksum: chunk.checksum.clone(),
        }
    }
}

/// Per-run metrics snapshot, persisted once after terminal + final flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub record_kind: RecordKind,
    pub policy: String,
    pub executor: String,
    pub storage_backend: String,
    pub run_id: RunId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub ts: DateTime<Utc>,
    pub counters: BTreeMap<String, u64>,
    pub policy_stats: PolicyStats,
}

impl MetricsRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        policy: impl Into<String>,
        executor: impl Into<String>,
        storage_backend: impl Into<String>,
        run_id: RunId,
        job_id: Option<JobId>,
        ts: DateTime<Utc>,
        counters: BTreeMap<String, u64>,
        policy_stats: PolicyStats,
    ) -> Self {
        Self {
            record_kind: RecordKind::Metrics,
            policy: policy.into(),
            executor: executor.into(),
            storage_backend: storage_backend.into(),
            run_id,
            job_id,
            ts,
            counters,
            policy_stats,
        }
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
