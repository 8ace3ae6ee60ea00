// SPDX-License-Identifier: MIT

//! Object-store Lode backend (S3).
//!
//! Object stores have no append, so each batch becomes a new numbered
//! object under the partition prefix. Batch counters are per-Lode, which
//! is safe because one Lode serves exactly one run.

use crate::lode::{Lode, StorageError};
use crate::partition::{partition_dir, run_dir, sanitize_value, EVENT_TYPE_CHUNK, EVENT_TYPE_METRICS};
use crate::record::{ChunkLedger, MetricsRecord, StoredEvent};
use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use parking_lot::Mutex;
use quarry_core::{ArtifactChunk, EventEnvelope, RunPartition};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct S3Lode {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    cancel: CancellationToken,
    ledger: Mutex<ChunkLedger>,
    event_batch: AtomicU64,
    chunk_batch: AtomicU64,
}

impl S3Lode {
    pub fn open(
        bucket: &str,
        prefix: &str,
        region: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<Self, StorageError> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(region) = region {
            builder = builder.with_region(region);
        }
        let store = builder.build()?;
        Ok(Self {
            store: Arc::new(store),
            prefix: prefix.trim_matches('/').to_string(),
            cancel,
            ledger: Mutex::new(ChunkLedger::new()),
            event_batch: AtomicU64::new(0),
            chunk_batch: AtomicU64::new(0),
        })
    }

    fn key(&self, rel: &str) -> ObjectPath {
        if self.prefix.is_empty() {
            ObjectPath::from(rel)
        } else {
            ObjectPath::from(format!("{}/{}", self.prefix, rel))
        }
    }

    fn check_cancelled(&self) -> Result<(), StorageError> {
        if self.cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        Ok(())
    }

    async fn put(&self, rel: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.store.put(&self.key(rel), bytes.into()).await?;
        Ok(())
    }
}

#[async_trait]
impl Lode for S3Lode {
    async fn append_events(
        &self,
        part: &RunPartition,
        events: &[EventEnvelope],
    ) -> Result<(), StorageError> {
        self.check_cancelled()?;
        if events.is_empty() {
            return Ok(());
        }

        let batch = self.event_batch.fetch_add(1, Ordering::Relaxed);
        let mut grouped: Vec<(&'static str, Vec<u8>)> = Vec::new();
        for envelope in events {
            let event_type = envelope.event_type().as_str();
            let mut line = serde_json::to_vec(&StoredEvent::new(envelope.clone()))?;
            line.push(b'\n');
            match grouped.iter_mut().find(|(t, _)| *t == event_type) {
                Some((_, buf)) => buf.extend_from_slice(&line),
                None => grouped.push((event_type, line)),
            }
        }

        for (event_type, buf) in grouped {
            let rel = format!(
                "{}/events-{batch:08}.jsonl",
                partition_dir(part, event_type)
            );
            self.put(&rel, buf).await?;
        }
        Ok(())
    }

    async fn append_chunks(
        &self,
        part: &RunPartition,
        chunks: &[ArtifactChunk],
    ) -> Result<(), StorageError> {
        self.check_cancelled()?;
        if chunks.is_empty() {
            return Ok(());
        }

        let dir = partition_dir(part, EVENT_TYPE_CHUNK);
        let mut records = Vec::new();
        for chunk in chunks {
            let record = self.ledger.lock().record_for(chunk);
            let rel = format!(
                "{dir}/{}/{}.bin",
                sanitize_value(chunk.artifact_id.as_str()),
                chunk.seq
            );
            self.put(&rel, chunk.data.clone()).await?;
            let mut line = serde_json::to_vec(&record)?;
            line.push(b'\n');
            records.extend_from_slice(&line);
        }
        // Metadata object follows the data objects it describes.
        let batch = self.chunk_batch.fetch_add(1, Ordering::Relaxed);
        self.put(&format!("{dir}/chunks-{batch:08}.jsonl"), records).await?;
        Ok(())
    }

    async fn append_metrics(
        &self,
        part: &RunPartition,
        record: &MetricsRecord,
    ) -> Result<(), StorageError> {
        self.check_cancelled()?;
        let rel = format!("{}/metrics.json", partition_dir(part, EVENT_TYPE_METRICS));
        self.put(&rel, serde_json::to_vec_pretty(record)?).await?;
        Ok(())
    }

    async fn write_file(
        &self,
        part: &RunPartition,
        rel_path: &str,
        data: &[u8],
    ) -> Result<(), StorageError> {
        self.check_cancelled()?;
        if rel_path.split('/').any(|seg| seg == ".." || seg.is_empty()) || rel_path.starts_with('/')
        {
            return Err(StorageError::InvalidPath {
                path: rel_path.to_string(),
                reason: "sidecar path must be relative without '..'".to_string(),
            });
        }
        let rel = format!("{}/files/{rel_path}", run_dir(part));
        self.put(&rel, data.to_vec()).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
