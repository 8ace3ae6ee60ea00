// SPDX-License-Identifier: MIT

//! In-memory Lode for policy and orchestrator tests, with injectable
//! failures per call class.

use crate::lode::{Lode, StorageError};
use crate::record::{ChunkLedger, ChunkRecord, MetricsRecord};
use async_trait::async_trait;
use parking_lot::Mutex;
use quarry_core::{ArtifactChunk, EventEnvelope, RunPartition};
use std::sync::Arc;

#[derive(Default)]
struct FakeState {
    events: Vec<EventEnvelope>,
    chunks: Vec<ChunkRecord>,
    chunk_bytes: Vec<ArtifactChunk>,
    metrics: Vec<MetricsRecord>,
    files: Vec<(String, Vec<u8>)>,
    ledger: ChunkLedger,
    /// Batches handed to `append_events`, in call order.
    event_batches: Vec<usize>,
    events_ok_before_fail: u32,
    fail_next_events: u32,
    fail_next_chunks: u32,
    fail_metrics: bool,
    closed: bool,
}

/// Recording Lode. Clones share state.
#[derive(Clone, Default)]
pub struct FakeLode {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeLode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` `append_events` calls fail.
    pub fn fail_next_events(&self, n: u32) {
        self.inner.lock().fail_next_events = n;
    }

    /// Let the next `ok` event appends succeed, then fail the `fail`
    /// calls after them.
    pub fn fail_events_after(&self, ok: u32, fail: u32) {
        let mut state = self.inner.lock();
        state.events_ok_before_fail = ok;
        state.fail_next_events = fail;
    }

    /// Make the next `n` `append_chunks` calls fail.
    pub fn fail_next_chunks(&self, n: u32) {
        self.inner.lock().fail_next_chunks = n;
    }

    pub fn fail_metrics(&self) {
        self.inner.lock().fail_metrics = true;
    }

    pub fn events(&self) -> Vec<EventEnvelope> {
        self.inner.lock().events.clone()
    }

    pub fn chunk_records(&self) -> Vec<ChunkRecord> {
        self.inner.lock().chunks.clone()
    }

    pub fn chunk_data(&self) -> Vec<ArtifactChunk> {
        self.inner.lock().chunk_bytes.clone()
    }

    pub fn metrics(&self) -> Vec<MetricsRecord> {
        self.inner.lock().metrics.clone()
    }

    pub fn files(&self) -> Vec<(String, Vec<u8>)> {
        self.inner.lock().files.clone()
    }

    /// Sizes of the event batches received, in call order.
    pub fn event_batch_sizes(&self) -> Vec<usize> {
        self.inner.lock().event_batches.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

#[async_trait]
impl Lode for FakeLode {
    async fn append_events(
        &self,
        _part: &RunPartition,
        events: &[EventEnvelope],
    ) -> Result<(), StorageError> {
        let mut state = self.inner.lock();
        if state.events_ok_before_fail > 0 {
            state.events_ok_before_fail -= 1;
        } else if state.fail_next_events > 0 {
            state.fail_next_events -= 1;
            return Err(StorageError::Injected("events write failed"));
        }
        state.event_batches.push(events.len());
        state.events.extend_from_slice(events);
        Ok(())
    }

    async fn append_chunks(
        &self,
        _part: &RunPartition,
        chunks: &[ArtifactChunk],
    ) -> Result<(), StorageError> {
        let mut state = self.inner.lock();
        if state.fail_next_chunks > 0 {
            state.fail_next_chunks -= 1;
            return Err(StorageError::Injected("chunks write failed"));
        }
        for chunk in chunks {
            let record = state.ledger.record_for(chunk);
            state.chunks.push(record);
            state.chunk_bytes.push(chunk.clone());
        }
        Ok(())
    }

    async fn append_metrics(
        &self,
        _part: &RunPartition,
        record: &MetricsRecord,
    ) -> Result<(), StorageError> {
        let mut state = self.inner.lock();
        if state.fail_metrics {
            return Err(StorageError::Injected("metrics write failed"));
        }
        state.metrics.push(record.clone());
        Ok(())
    }

    async fn write_file(
        &self,
        _part: &RunPartition,
        rel_path: &str,
        data: &[u8],
    ) -> Result<(), StorageError> {
        self.inner.lock().files.push((rel_path.to_string(), data.to_vec()));
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.inner.lock().closed = true;
        Ok(())
    }
}
