// SPDX-License-Identifier: MIT

//! Chunk reassembly and commit gating.
//!
//! Chunks are accepted out-of-band, possibly before their commit event.
//! Per-artifact sequence must start at 1 and increase contiguously; a
//! violation is a fatal stream error. Only a commit event makes an
//! artifact exist — anything else is an orphan, GC'd downstream.

use quarry_core::{ArtifactChunk, ArtifactId};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReassemblyError {
    #[error("artifact {artifact_id} chunk seq {got} out of order (expected {expected})")]
    NonContiguous { artifact_id: ArtifactId, expected: u64, got: u64 },
    #[error("artifact {artifact_id} received chunk after is_last")]
    AfterLast { artifact_id: ArtifactId },
    #[error("artifact {artifact_id} committed with {declared} chunks but {seen} arrived")]
    ChunkCountMismatch { artifact_id: ArtifactId, declared: u64, seen: u64 },
    #[error("artifact {artifact_id} committed before its chunk stream terminated")]
    CommitBeforeLast { artifact_id: ArtifactId },
    #[error("artifact {artifact_id} committed twice")]
    DuplicateCommit { artifact_id: ArtifactId },
}

#[derive(Debug, Default)]
struct ArtifactState {
    next_seq: u64,
    finished: bool,
    committed: bool,
    bytes: u64,
}

/// Tracks each artifact's chunk stream and commit status for one run.
#[derive(Debug, Default)]
pub struct ChunkReassembler {
    artifacts: HashMap<ArtifactId, ArtifactState>,
}

impl ChunkReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and account for one incoming chunk.
    pub fn accept(&mut self, chunk: &ArtifactChunk) -> Result<(), ReassemblyError> {
        let state = self.artifacts.entry(chunk.artifact_id.clone()).or_insert(ArtifactState {
            next_seq: 1,
            finished: false,
            committed: false,
            bytes: 0,
        });
        if state.finished {
            return Err(ReassemblyError::AfterLast { artifact_id: chunk.artifact_id.clone() });
        }
        if chunk.seq != state.next_seq {
            return Err(ReassemblyError::NonContiguous {
                artifact_id: chunk.artifact_id.clone(),
                expected: state.next_seq,
                got: chunk.seq,
            });
        }
        state.next_seq += 1;
        state.bytes += chunk.data.len() as u64;
        if chunk.is_last {
            state.finished = true;
        }
        Ok(())
    }

    /// Validate a commit event against the chunk stream seen so far.
    ///
    /// Stream order guarantees the chunks preceded the commit, so an
    /// unfinished stream at commit time is an executor bug.
    pub fn observe_commit(
        &mut self,
        artifact_id: &ArtifactId,
        declared_chunks: u64,
    ) -> Result<(), ReassemblyError> {
        let Some(state) = self.artifacts.get_mut(artifact_id) else {
            return Err(ReassemblyError::CommitBeforeLast { artifact_id: artifact_id.clone() });
        };
        if state.committed {
            return Err(ReassemblyError::DuplicateCommit { artifact_id: artifact_id.clone() });
        }
        if !state.finished {
            return Err(ReassemblyError::CommitBeforeLast { artifact_id: artifact_id.clone() });
        }
        let seen = state.next_seq - 1;
        if seen != declared_chunks {
            return Err(ReassemblyError::ChunkCountMismatch {
                artifact_id: artifact_id.clone(),
                declared: declared_chunks,
                seen,
            });
        }
        state.committed = true;
        Ok(())
    }

    /// Artifacts with chunks on disk but no commit record.
    pub fn orphans(&self) -> Vec<ArtifactId> {
        let mut orphans: Vec<ArtifactId> = self
            .artifacts
            .iter()
            .filter(|(_, s)| !s.committed)
            .map(|(id, _)| id.clone())
            .collect();
        orphans.sort();
        orphans
    }

    pub fn committed_count(&self) -> usize {
        self.artifacts.values().filter(|s| s.committed).count()
    }
}

#[cfg(test)]
#[path = "artifact_tests.rs"]
mod tests;
