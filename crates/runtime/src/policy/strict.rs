// SPDX-License-Identifier: MIT

//! Strict policy: pass-through, serialized, never drops.
//!
//! Every event and chunk is written as it arrives; any write failure
//! terminates the run. `BufferSize` is always 0.

use crate::policy::{IngestPolicy, PolicyError, StatsHandle};
use async_trait::async_trait;
use quarry_core::{ArtifactChunk, EventEnvelope, PolicyStats, RunPartition};
use quarry_storage::Lode;
use std::sync::Arc;

pub struct StrictPolicy {
    lode: Arc<dyn Lode>,
    part: RunPartition,
    stats: StatsHandle,
}

impl StrictPolicy {
    pub fn new(lode: Arc<dyn Lode>, part: RunPartition) -> Self {
        Self { lode, part, stats: StatsHandle::new() }
    }
}

#[async_trait]
impl IngestPolicy for StrictPolicy {
    async fn ingest_event(&mut self, envelope: EventEnvelope) -> Result<(), PolicyError> {
        self.stats.update(|s| s.events_total += 1);
        let event_type = envelope.event_type();
        match self.lode.append_events(&self.part, std::slice::from_ref(&envelope)).await {
            Ok(()) => {
                self.stats.update(|s| {
                    s.events_persisted += 1;
                    s.flushes += 1;
                });
                Ok(())
            }
            Err(source) => {
                self.stats.update(|s| s.errors += 1);
                // Strict never drops: every failure is terminal, but
                // non-droppables carry the stronger error for reporting.
                if event_type.is_droppable() {
                    Err(PolicyError::Storage(source))
                } else {
                    Err(PolicyError::NonDroppable {
                        event_type: event_type.as_str().to_string(),
                        source,
                    })
                }
            }
        }
    }

    async fn ingest_chunk(&mut self, chunk: ArtifactChunk) -> Result<(), PolicyError> {
        self.stats.update(|s| s.chunks_total += 1);
        match self.lode.append_chunks(&self.part, std::slice::from_ref(&chunk)).await {
            Ok(()) => {
                self.stats.update(|s| s.chunks_persisted += 1);
                Ok(())
            }
            Err(source) => {
                self.stats.update(|s| s.errors += 1);
                Err(PolicyError::Storage(source))
            }
        }
    }

    async fn flush(&mut self) -> Result<(), PolicyError> {
        // Nothing buffered, nothing to do.
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

#[cfg(test)]
#[path = "strict_tests.rs"]
mod tests;
