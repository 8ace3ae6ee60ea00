// SPDX-License-Identifier: MIT

//! Noop policy: persists nothing, never fails.
//!
//! An explicit operator opt-out (`--policy=noop`) for plumbing checks.
//! Everything is counted as dropped — including non-droppable types — so
//! the stats record still tells the truth about what was discarded.

use crate::policy::{IngestPolicy, PolicyError, StatsHandle};
use async_trait::async_trait;
use quarry_core::{ArtifactChunk, EventEnvelope, PolicyStats};

#[derive(Default)]
pub struct NoopPolicy {
    stats: StatsHandle,
}

impl NoopPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IngestPolicy for NoopPolicy {
    async fn ingest_event(&mut self, envelope: EventEnvelope) -> Result<(), PolicyError> {
        let event_type = envelope.event_type().as_str();
        self.stats.update(|s| {
            s.events_total += 1;
            s.events_dropped += 1;
            *s.dropped_by_type.entry(event_type.to_string()).or_insert(0) += 1;
        });
        Ok(())
    }

    async fn ingest_chunk(&mut self, _chunk: ArtifactChunk) -> Result<(), PolicyError> {
        self.stats.update(|s| s.chunks_total += 1);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), PolicyError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PolicyError> {
        Ok(())
    }

    fn stats(&self) -> PolicyStats {
        self.stats.snapshot()
    }

    fn stats_handle(&self) -> StatsHandle {
        self.stats.clone()
    }
}
