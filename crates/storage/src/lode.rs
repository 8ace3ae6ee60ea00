// SPDX-License-Identifier: MIT

//! The Lode storage interface and backend selection.

use crate::fs::FsLode;
use crate::record::MetricsRecord;
use crate::s3::S3Lode;
use async_trait::async_trait;
use quarry_core::{ArtifactChunk, EventEnvelope, RunPartition};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("record encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid storage path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("storage operation cancelled")]
    Cancelled,
    #[error("injected failure: {0}")]
    Injected(&'static str),
}

/// Append-only batch writer. One instance serves one run.
///
/// Implementations must make every chunk durable before returning from
/// `append_chunks`: the policies rely on that to order chunk persistence
/// before artifact commit events.
#[async_trait]
pub trait Lode: Send + Sync {
    /// Append a batch of events, grouped internally by `event_type`
    /// partition. The batch's relative order is preserved on disk.
    async fn append_events(
        &self,
        part: &RunPartition,
        events: &[EventEnvelope],
    ) -> Result<(), StorageError>;

    /// Append a batch of artifact chunks (bytes + metadata records).
    async fn append_chunks(
        &self,
        part: &RunPartition,
        chunks: &[ArtifactChunk],
    ) -> Result<(), StorageError>;

    /// Persist the per-run metrics record. Called at most once per run.
    async fn append_metrics(
        &self,
        part: &RunPartition,
        record: &MetricsRecord,
    ) -> Result<(), StorageError>;

    /// Sidecar write under the run directory; bypasses sequencing.
    async fn write_file(
        &self,
        part: &RunPartition,
        rel_path: &str,
        data: &[u8],
    ) -> Result<(), StorageError>;

    /// Flush and release resources. Further writes are undefined.
    async fn close(&self) -> Result<(), StorageError>;
}

/// Storage backend selector, from `--storage-backend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Fs,
    S3,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Fs => "fs",
            BackendKind::S3 => "s3",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fs" => Ok(BackendKind::Fs),
            "s3" => Ok(BackendKind::S3),
            other => Err(format!("unknown storage backend {other:?} (expected fs or s3)")),
        }
    }
}

/// Open a Lode for the given backend and path.
///
/// `fs` accepts a bare path or a `file://` URI; `s3` requires
/// `s3://bucket[/prefix]`.
pub fn open_lode(
    backend: BackendKind,
    path: &str,
    region: Option<&str>,
    cancel: CancellationToken,
) -> Result<Arc<dyn Lode>, StorageError> {
    match backend {
        BackendKind::Fs => {
            let root = path.strip_prefix("file://").unwrap_or(path);
            if root.is_empty() {
                return Err(StorageError::InvalidPath {
                    path: path.to_string(),
                    reason: "empty filesystem root".to_string(),
                });
            }
            Ok(Arc::new(FsLode::new(PathBuf::from(root), cancel)))
        }
        BackendKind::S3 => {
            let rest = path.strip_prefix("s3://").ok_or_else(|| StorageError::InvalidPath {
                path: path.to_string(),
                reason: "s3 backend requires an s3://bucket[/prefix] path".to_string(),
            })?;
            let (bucket, prefix) = match rest.split_once('/') {
                Some((b, p)) => (b, p.trim_end_matches('/')),
                None => (rest, ""),
            };
            if bucket.is_empty() {
                return Err(StorageError::InvalidPath {
                    path: path.to_string(),
                    reason: "missing bucket name".to_string(),
                });
            }
            Ok(Arc::new(S3Lode::open(bucket, prefix, region, cancel)?))
        }
    }
}

#[cfg(test)]
#[path = "lode_tests.rs"]
mod tests;
