// SPDX-License-Identifier: MIT

//! Artifact chunking.
//!
//! Splits artifact bytes into ≤ 8 MiB chunks with contiguous `seq` from 1
//! and `is_last` on the final chunk. An empty artifact still produces one
//! zero-byte chunk so the chunk stream always terminates explicitly.

use crate::codec::MAX_CHUNK_DATA;
use quarry_core::{ArtifactChunk, ArtifactId};

/// Split `data` into chunk frames for `artifact_id`.
pub fn chunk_artifact(artifact_id: &ArtifactId, data: &[u8]) -> Vec<ArtifactChunk> {
    if data.is_empty() {
        return vec![ArtifactChunk {
            artifact_id: artifact_id.clone(),
            seq: 1,
            is_last: true,
            data: Vec::new(),
            checksum: Some(format!("{:x}", md5::compute([]))),
        }];
    }

    let mut chunks = Vec::with_capacity(data.len().div_ceil(MAX_CHUNK_DATA));
    for (index, piece) in data.chunks(MAX_CHUNK_DATA).enumerate() {
        chunks.push(ArtifactChunk {
            artifact_id: artifact_id.clone(),
            seq: index as u64 + 1,
            is_last: false,
            data: piece.to_vec(),
            checksum: Some(format!("{:x}", md5::compute(piece))),
        });
    }
    if let Some(last) = chunks.last_mut() {
        last.is_last = true;
    }
    chunks
}

#[cfg(test)]
#[path = "chunker_tests.rs"]
mod tests;
