// SPDX-License-Identifier: MIT

//! Filesystem Lode backend.
//!
//! Events and chunk metadata are JSON lines; chunk bytes are
//! `<artifact_id>/<seq>.bin` files. Chunk data files are fsynced before
//! their metadata line is appended, which is what lets the policies treat
//! a returned `append_chunks` as durable.

use crate::lode::{Lode, StorageError};
use crate::partition::{partition_dir, run_dir, sanitize_value, EVENT_TYPE_CHUNK, EVENT_TYPE_METRICS};
use crate::record::{ChunkLedger, MetricsRecord, StoredEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use quarry_core::{ArtifactChunk, EventEnvelope, RunPartition};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

pub struct FsLode {
    root: PathBuf,
    cancel: CancellationToken,
    ledger: Mutex<ChunkLedger>,
}

impl FsLode {
    pub fn new(root: PathBuf, cancel: CancellationToken) -> Self {
        Self { root, cancel, ledger: Mutex::new(ChunkLedger::new()) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check_cancelled(&self) -> Result<(), StorageError> {
        if self.cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        Ok(())
    }

    async fn append_lines(&self, dir: &Path, file: &str, lines: &[String]) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(dir).await?;
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(file))
            .await?;
        for line in lines {
            f.write_all(line.as_bytes()).await?;
            f.write_all(b"\n").await?;
        }
        f.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl Lode for FsLode {
    async fn append_events(
        &self,
        part: &RunPartition,
        events: &[EventEnvelope],
    ) -> Result<(), StorageError> {
        self.check_cancelled()?;
        if events.is_empty() {
            return Ok(());
        }

        // Group into per-event-type partitions, preserving batch order
        // within each group.
        let mut grouped: Vec<(&'static str, Vec<String>)> = Vec::new();
        for envelope in events {
            let event_type = envelope.event_type().as_str();
            let line = serde_json::to_string(&StoredEvent::new(envelope.clone()))?;
            match grouped.iter_mut().find(|(t, _)| *t == event_type) {
                Some((_, lines)) => lines.push(line),
                None => grouped.push((event_type, vec![line])),
            }
        }

        for (event_type, lines) in grouped {
            let dir = self.root.join(partition_dir(part, event_type));
            self.append_lines(&dir, "events.jsonl", &lines).await?;
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

        let dir = self.root.join(partition_dir(part, EVENT_TYPE_CHUNK));
        let mut records = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let record = self.ledger.lock().record_for(chunk);

            let artifact_dir = dir.join(sanitize_value(chunk.artifact_id.as_str()));
            tokio::fs::create_dir_all(&artifact_dir).await?;
            let bin_path = artifact_dir.join(format!("{}.bin", chunk.seq));
            let mut f = tokio::fs::File::create(&bin_path).await?;
            f.write_all(&chunk.data).await?;
            f.sync_all().await?;

            records.push(serde_json::to_string(&record)?);
        }
        // Metadata lines land only after every data file is durable.
        self.append_lines(&dir, "chunks.jsonl", &records).await?;
        Ok(())
    }

    async fn append_metrics(
        &self,
        part: &RunPartition,
        record: &MetricsRecord,
    ) -> Result<(), StorageError> {
        self.check_cancelled()?;
        let dir = self.root.join(partition_dir(part, EVENT_TYPE_METRICS));
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join("metrics.json");
        let mut f = tokio::fs::File::create(&path).await?;
        f.write_all(serde_json::to_string_pretty(record)?.as_bytes()).await?;
        f.sync_all().await?;
        Ok(())
    }

    async fn write_file(
        &self,
        part: &RunPartition,
        rel_path: &str,
        data: &[u8],
    ) -> Result<(), StorageError> {
        self.check_cancelled()?;
        // Reject traversal; sidecar paths stay inside the run directory.
        if rel_path.split('/').any(|seg| seg == ".." || seg.is_empty()) || rel_path.starts_with('/')
        {
            return Err(StorageError::InvalidPath {
                path: rel_path.to_string(),
                reason: "sidecar path must be relative without '..'".to_string(),
            });
        }
        let path = self.root.join(run_dir(part)).join("files").join(rel_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut f = tokio::fs::File::create(&path).await?;
        f.write_all(data).await?;
        f.sync_all().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "fs_tests.rs"]
mod tests;
