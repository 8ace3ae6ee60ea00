// SPDX-License-Identifier: MIT

//! Artifact chunk frames.
//!
//! Chunks are stream-level constructs, not events: they bypass the event
//! sequence and are reassembled by the runtime keyed on `artifact_id`. The
//! commit event (`EventPayload::Artifact`) is what makes an artifact exist;
//! chunks without one are orphans.

use crate::id::ArtifactId;
use serde::{Deserialize, Serialize};

/// One chunk of an artifact's byte stream.
///
/// Per-artifact `seq` starts at 1 and increases contiguously; `is_last`
/// terminates the sequence. An empty artifact is exactly one zero-byte
/// chunk with `seq=1, is_last=true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactChunk {
    pub artifact_id: ArtifactId,
    pub seq: u64,
    pub is_last: bool,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    /// Hex MD5 of `data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl ArtifactChunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
