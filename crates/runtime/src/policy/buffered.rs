// SPDX-License-Identifier: MIT

//! Buffered policy.
//!
//! Bounded by event count and/or byte size. Flushes on bound or on
//! explicit `flush()`. Droppable events may be dropped when the buffer is
//! full and a flush could not free space; drops are counted by type and
//! logged. Flush failures retain buffers for retry — loss of a
//! non-droppable is only ever reported at close, as a policy failure.
//!
//! Every mode writes chunks before events within a flush so an artifact
//! commit can never land ahead of its chunks; the modes differ in what
//! they retain when a write fails (and so in duplicate risk on retry).

use crate::policy::{FlushMode, IngestPolicy, PolicyConfig, PolicyError, StatsHandle};
use async_trait::async_trait;
use quarry_core::{ArtifactChunk, EventEnvelope, PolicyStats, RunPartition};
use quarry_storage::{Lode, StorageError};
use std::collections::VecDeque;
use std::sync::Arc;

pub struct BufferedPolicy {
    lode: Arc<dyn Lode>,
    part: RunPartition,
    stats: StatsHandle,
    mode: FlushMode,
    max_events: Option<usize>,
    max_bytes: Option<u64>,
    events: VecDeque<(EventEnvelope, u64)>,
    chunks: VecDeque<ArtifactChunk>,
    buffer_bytes: u64,
    closed: bool,
}

impl BufferedPolicy {
    pub fn new(config: &PolicyConfig, lode: Arc<dyn Lode>, part: RunPartition) -> Self {
        let (max_events, max_bytes) = match (config.max_events, config.max_bytes) {
            (None, None) => (Some(PolicyConfig::DEFAULT_MAX_EVENTS), None),
            bounds => bounds,
        };
        Self {
            lode,
            part,
            stats: StatsHandle::new(),
            mode: config.flush_mode,
            max_events,
            max_bytes,
            events: VecDeque::new(),
            chunks: VecDeque::new(),
            buffer_bytes: 0,
            closed: false,
        }
    }

    fn at_capacity(&self) -> bool {
        let len = self.events.len() + self.chunks.len();
        self.max_events.is_some_and(|m| len >= m)
            || self.max_bytes.is_some_and(|m| self.buffer_bytes >= m)
    }

    fn sync_buffer_stats(&self) {
        let len = (self.events.len() + self.chunks.len()) as u64;
        let bytes = self.buffer_bytes;
        self.stats.update(|s| {
            s.buffer_len = len;
            s.buffer_bytes = bytes;
        });
    }

    fn record_drop(&self, envelope: &EventEnvelope) {
        let event_type = envelope.event_type().as_str();
        tracing::warn!(
            run_id = %envelope.run_id,
            event_type,
            seq = envelope.seq,
            "buffer full, dropping droppable event"
        );
        self.stats.update(|s| {
            s.events_dropped += 1;
            *s.dropped_by_type.entry(event_type.to_string()).or_insert(0) += 1;
        });
    }

    /// Serialized size used for byte accounting.
    fn event_size(envelope: &EventEnvelope) -> u64 {
        serde_json::to_vec(envelope).map(|v| v.len() as u64).unwrap_or(0)
    }

    async fn flush_at_least_once(&mut self) -> Result<(), StorageError> {
        // All-or-keep-all: a failure anywhere retains both buffers, so
        // both events and chunks may duplicate on retry.
        let chunk_batch: Vec<ArtifactChunk> = self.chunks.iter().cloned().collect();
        let event_batch: Vec<EventEnvelope> =
            self.events.iter().map(|(e, _)| e.clone()).collect();

        self.lode.append_chunks(&self.part, &chunk_batch).await?;
        self.lode.append_events(&self.part, &event_batch).await?;

        self.stats.update(|s| {
            s.chunks_persisted += chunk_batch.len() as u64;
            s.events_persisted += event_batch.len() as u64;
        });
        self.chunks.clear();
        self.events.clear();
        self.buffer_bytes = 0;
        Ok(())
    }

    async fn flush_chunks_first(&mut self) -> Result<(), StorageError> {
        // Chunks clear as soon as they land, so only events are retried
        // after an events-write failure; chunks never rewrite.
        if !self.chunks.is_empty() {
            let chunk_batch: Vec<ArtifactChunk> = self.chunks.iter().cloned().collect();
            self.lode.append_chunks(&self.part, &chunk_batch).await?;
            let freed: u64 = self.chunks.iter().map(|c| c.data.len() as u64).sum();
            self.stats.update(|s| s.chunks_persisted += chunk_batch.len() as u64);
            self.chunks.clear();
            self.buffer_bytes = self.buffer_bytes.saturating_sub(freed);
        }

        if !self.events.is_empty() {
            let event_batch: Vec<EventEnvelope> =
                self.events.iter().map(|(e, _)| e.clone()).collect();
            self.lode.append_events(&self.part, &event_batch).await?;
            self.stats.update(|s| s.events_persisted += event_batch.len() as u64);
            self.events.clear();
            self.buffer_bytes = 0;
        }
        Ok(())
    }

    async fn flush_two_phase(&mut self) -> Result<(), StorageError> {
        // Per-item marks: anything written is popped immediately, so a
        // retry resumes exactly where the failure hit.
        while let Some(chunk) = self.chunks.front() {
            self.lode.append_chunks(&self.part, std::slice::from_ref(chunk)).await?;
            let freed = chunk.data.len() as u64;
            self.stats.update(|s| s.chunks_persisted += 1);
            self.chunks.pop_front();
            self.buffer_bytes = self.buffer_bytes.saturating_sub(freed);
        }
        while let Some((envelope, size)) = self.events.front() {
            self.lode.append_events(&self.part, std::slice::from_ref(envelope)).await?;
            let freed = *size;
            self.stats.update(|s| s.events_persisted += 1);
            self.events.pop_front();
            self.buffer_bytes = self.buffer_bytes.saturating_sub(freed);
        }
        Ok(())
    }

    /// One flush attempt. Failures leave retained buffers in place and
    /// count an error; the caller decides whether that is fatal.
    async fn try_flush(&mut self) -> Result<(), PolicyError> {
        if self.events.is_empty() && self.chunks.is_empty() {
            return Ok(());
        }
        let result = match self.mode {
            FlushMode::AtLeastOnce => self.flush_at_least_once().await,
            FlushMode::ChunksFirst => self.flush_chunks_first().await,
            FlushMode::TwoPhase => self.flush_two_phase().await,
        };
        self.sync_buffer_stats();
        match result {
            Ok(()) => {
                self.stats.update(|s| s.flushes += 1);
                Ok(())
            }
            Err(source) => {
                tracing::warn!(error = %source, mode = self.mode.as_str(), "flush failed, buffers retained");
                self.stats.update(|s| s.errors += 1);
                Err(PolicyError::Storage(source))
            }
        }
    }

    fn first_retained_non_droppable(&self) -> Option<&EventEnvelope> {
        self.events.iter().map(|(e, _)| e).find(|e| !e.is_droppable())
    }
}

#[async_trait]
impl IngestPolicy for BufferedPolicy {
    async fn ingest_event(&mut self, envelope: EventEnvelope) -> Result<(), PolicyError> {
        self.stats.update(|s| s.events_total += 1);

        if self.at_capacity() {
            // Bound reached before this event fits: flush, and if storage
            // is still refusing, shed droppables rather than grow.
            let flushed = self.try_flush().await;
            if flushed.is_err() && self.at_capacity() && envelope.is_droppable() {
                self.record_drop(&envelope);
                return Ok(());
            }
        }

        let size = Self::event_size(&envelope);
        self.buffer_bytes += size;
        self.events.push_back((envelope, size));
        self.sync_buffer_stats();

        if self.at_capacity() {
            let _ = self.try_flush().await;
        }
        Ok(())
    }

    async fn ingest_chunk(&mut self, chunk: ArtifactChunk) -> Result<(), PolicyError> {
        self.stats.update(|s| s.chunks_total += 1);

        if self.at_capacity() {
            let _ = self.try_flush().await;
        }

        self.buffer_bytes += chunk.data.len() as u64;
        self.chunks.push_back(chunk);
        self.sync_buffer_stats();

        if self.at_capacity() {
            let _ = self.try_flush().await;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), PolicyError> {
        self.try_flush().await
    }

    async fn close(&mut self) -> Result<(), PolicyError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.try_flush().await {
            Ok(()) => Ok(()),
            Err(PolicyError::Storage(source)) => {
                // Loss of retained chunks or non-droppable events at the
                // end of the run is a policy failure, never silent.
                if let Some(envelope) = self.first_retained_non_droppable() {
                    return Err(PolicyError::NonDroppable {
                        event_type: envelope.event_type().as_str().to_string(),
                        source,
                    });
                }
                if !self.chunks.is_empty() {
                    return Err(PolicyError::NonDroppable {
                        event_type: "artifact_chunk".to_string(),
                        source,
                    });
                }
                // Only droppables remain: shed them, visibly.
                let remaining: Vec<EventEnvelope> =
                    self.events.drain(..).map(|(e, _)| e).collect();
                for envelope in &remaining {
                    self.record_drop(envelope);
                }
                self.buffer_bytes = 0;
                self.sync_buffer_stats();
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    fn stats(&self) -> PolicyStats {
        self.stats.snapshot()
    }

    fn stats_handle(&self) -> StatsHandle {
        self.stats.clone()
    }
}

#[cfg(test)]
#[path = "buffered_tests.rs"]
mod tests;
