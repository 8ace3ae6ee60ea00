// SPDX-License-Identifier: MIT

//! Streaming policy.
//!
//! Buffered with continuous persistence: flushes fire on event count, on
//! an interval timer, on the terminal event, or on buffer capacity —
//! whichever comes first. Never drops anything: when the buffer is full
//! and storage is refusing writes, ingestion blocks until a flush
//! completes (or the run is cancelled).
//!
//! State machine: Accumulating → Flushing on any trigger; back to
//! Accumulating on success or failure (buffer retained, error counted);
//! Accumulating → Blocked on a full buffer; Blocked → Flushing when a
//! trigger fires; any state → Draining on close; Draining → Closed after
//! the final attempted flush.

use crate::policy::{IngestPolicy, PolicyConfig, PolicyError, StatsHandle};
use async_trait::async_trait;
use quarry_core::{ArtifactChunk, EventEnvelope, FlushTrigger, PolicyStats, RunPartition};
use quarry_storage::{Lode, StorageError};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

/// Retry cadence while blocked without an interval timer to wake us.
const BLOCKED_RETRY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Accumulating,
    Flushing,
    Blocked,
    Draining,
    Closed,
}

struct Core {
    lode: Arc<dyn Lode>,
    part: RunPartition,
    stats: StatsHandle,
    events: VecDeque<EventEnvelope>,
    chunks: VecDeque<ArtifactChunk>,
    buffer_bytes: u64,
    state: StreamState,
    flush_count: Option<usize>,
    max_events: Option<usize>,
    max_bytes: Option<u64>,
}

impl Core {
    fn at_capacity(&self) -> bool {
        let len = self.events.len() + self.chunks.len();
        self.max_events.is_some_and(|m| len >= m)
            || self.max_bytes.is_some_and(|m| self.buffer_bytes >= m)
    }

    fn count_trigger_ready(&self) -> bool {
        self.flush_count.is_some_and(|n| self.events.len() >= n)
    }

    fn sync_buffer_stats(&self) {
        let len = (self.events.len() + self.chunks.len()) as u64;
        let bytes = self.buffer_bytes;
        self.stats.update(|s| {
            s.buffer_len = len;
            s.buffer_bytes = bytes;
        });
    }

    fn is_empty(&self) -> bool {
        self.events.is_empty() && self.chunks.is_empty()
    }

    /// One flush: chunks first, then events, atomically per call. Success
    /// clears the buffer and counts the trigger; failure retains
    /// everything and counts an error.
    async fn flush(&mut self, trigger: FlushTrigger) -> Result<(), StorageError> {
        if self.is_empty() {
            // Interval fires on an empty buffer: no write occurs.
            return Ok(());
        }
        let draining = self.state == StreamState::Draining;
        self.state = StreamState::Flushing;

        let chunk_batch: Vec<ArtifactChunk> = self.chunks.iter().cloned().collect();
        let event_batch: Vec<EventEnvelope> = self.events.iter().cloned().collect();
        let result = async {
            self.lode.append_chunks(&self.part, &chunk_batch).await?;
            self.lode.append_events(&self.part, &event_batch).await?;
            Ok::<(), StorageError>(())
        }
        .await;

        match result {
            Ok(()) => {
                self.chunks.clear();
                self.events.clear();
                self.buffer_bytes = 0;
                self.stats.update(|s| {
                    s.chunks_persisted += chunk_batch.len() as u64;
                    s.events_persisted += event_batch.len() as u64;
                    s.flushes += 1;
                    *s.flush_triggers.entry(trigger.as_str().to_string()).or_insert(0) += 1;
                });
                self.sync_buffer_stats();
                self.state = if draining { StreamState::Draining } else { StreamState::Accumulating };
                Ok(())
            }
            Err(source) => {
                tracing::warn!(error = %source, trigger = %trigger, "streaming flush failed, buffer retained");
                self.stats.update(|s| s.errors += 1);
                self.state = if draining { StreamState::Draining } else { StreamState::Accumulating };
                Err(source)
            }
        }
    }
}

pub struct StreamingPolicy {
    core: Arc<Mutex<Core>>,
    flushed: Arc<Notify>,
    stats: StatsHandle,
    cancel: CancellationToken,
    timer: Option<tokio::task::JoinHandle<()>>,
    closed: bool,
}

impl StreamingPolicy {
    pub fn new(
        config: &PolicyConfig,
        lode: Arc<dyn Lode>,
        part: RunPartition,
        cancel: CancellationToken,
    ) -> Self {
        let stats = StatsHandle::new();
        let core = Arc::new(Mutex::new(Core {
            lode,
            part,
            stats: stats.clone(),
            events: VecDeque::new(),
            chunks: VecDeque::new(),
            buffer_bytes: 0,
            state: StreamState::Accumulating,
            flush_count: config.flush_count,
            max_events: config.max_events,
            max_bytes: config.max_bytes,
        }));
        let flushed = Arc::new(Notify::new());

        let timer = config.flush_interval.map(|interval| {
            let core = core.clone();
            let flushed = flushed.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = cancel.cancelled() => break,
                    }
                    let mut core = core.lock().await;
                    if core.state == StreamState::Closed {
                        break;
                    }
                    if core.flush(FlushTrigger::Interval).await.is_ok() {
                        flushed.notify_waiters();
                    }
                }
            })
        });

        Self { core, flushed, stats, cancel, timer, closed: false }
    }

    /// Wait for buffer space while blocked. Returns once a flush (ours or
    /// the timer's) has freed capacity; errors only on cancellation.
    async fn block_until_flushed(&self) -> Result<(), PolicyError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(PolicyError::Cancelled);
            }
            tokio::select! {
                _ = self.flushed.notified() => {}
                _ = tokio::time::sleep(BLOCKED_RETRY) => {}
                _ = self.cancel.cancelled() => return Err(PolicyError::Cancelled),
            }

            let mut core = self.core.lock().await;
            if !core.at_capacity() {
                core.state = StreamState::Accumulating;
                return Ok(());
            }
            if core.flush(FlushTrigger::Capacity).await.is_ok() {
                core.state = StreamState::Accumulating;
                self.flushed.notify_waiters();
                return Ok(());
            }
            core.state = StreamState::Blocked;
        }
    }

    /// Make room for one more entry, blocking if storage is refusing.
    async fn ensure_capacity(&self) -> Result<(), PolicyError> {
        {
            let mut core = self.core.lock().await;
            if !core.at_capacity() {
                return Ok(());
            }
            if core.flush(FlushTrigger::Capacity).await.is_ok() {
                self.flushed.notify_waiters();
                return Ok(());
            }
            core.state = StreamState::Blocked;
        }
        self.block_until_flushed().await
    }
}

#[async_trait]
impl IngestPolicy for StreamingPolicy {
    async fn ingest_event(&mut self, envelope: EventEnvelope) -> Result<(), PolicyError> {
        self.stats.update(|s| s.events_total += 1);
        self.ensure_capacity().await?;

        let terminal = envelope.is_terminal();
        let mut core = self.core.lock().await;
        core.buffer_bytes += serde_json::to_vec(&envelope).map(|v| v.len() as u64).unwrap_or(0);
        core.events.push_back(envelope);
        core.sync_buffer_stats();

        if terminal {
            // Best effort; a failed termination flush retries at close.
            if core.flush(FlushTrigger::Termination).await.is_ok() {
                self.flushed.notify_waiters();
            }
        } else if core.count_trigger_ready() {
            if core.flush(FlushTrigger::Count).await.is_ok() {
                self.flushed.notify_waiters();
            }
        }
        Ok(())
    }

    async fn ingest_chunk(&mut self, chunk: ArtifactChunk) -> Result<(), PolicyError> {
        self.stats.update(|s| s.chunks_total += 1);
        self.ensure_capacity().await?;

        let mut core = self.core.lock().await;
        core.buffer_bytes += chunk.data.len() as u64;
        core.chunks.push_back(chunk);
        core.sync_buffer_stats();
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), PolicyError> {
        let mut core = self.core.lock().await;
        match core.flush(FlushTrigger::Termination).await {
            Ok(()) => {
                self.flushed.notify_waiters();
                Ok(())
            }
            Err(source) => Err(PolicyError::Storage(source)),
        }
    }

    async fn close(&mut self) -> Result<(), PolicyError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut core = self.core.lock().await;
        core.state = StreamState::Draining;
        let result = core.flush(FlushTrigger::Termination).await;
        core.state = StreamState::Closed;

        if let Some(timer) = self.timer.take() {
            timer.abort();
        }

        match result {
            Ok(()) => Ok(()),
            Err(source) => {
                // Streaming never drops: anything left behind is loss.
                let event_type = core
                    .events
                    .front()
                    .map(|e| e.event_type().as_str().to_string())
                    .unwrap_or_else(|| "artifact_chunk".to_string());
                Err(PolicyError::NonDroppable { event_type, source })
            }
        }
    }

    fn stats(&self) -> PolicyStats {
        self.stats.snapshot()
    }

    fn stats_handle(&self) -> StatsHandle {
        self.stats.clone()
    }
}

impl Drop for StreamingPolicy {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
#[path = "streaming_tests.rs"]
mod tests;
