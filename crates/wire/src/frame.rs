// SPDX-License-Identifier: MIT

//! Frame discrimination.
//!
//! `artifact_chunk`, `file_write`, and `run_result` are stream-level tags;
//! any other `type` value is an event envelope. Decoding probes the tag
//! first and then deserializes the concrete shape directly, so raw chunk
//! bytes never pass through serde's buffered-content path.

use crate::codec::{decode_payload, encode_payload, WireError, MAX_CHUNK_DATA};
use quarry_core::{ArtifactChunk, EventEnvelope, RunResult};
use serde::{Deserialize, Serialize};

const TAG_ARTIFACT_CHUNK: &str = "artifact_chunk";
const TAG_FILE_WRITE: &str = "file_write";
const TAG_RUN_RESULT: &str = "run_result";

/// Sidecar storage write. Bypasses event sequencing and the ingestion
/// policy entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileWrite {
    /// Path relative to the run's partition directory.
    pub path: String,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// One decoded IPC frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Event(EventEnvelope),
    Chunk(ArtifactChunk),
    FileWrite(FileWrite),
    RunResult(RunResult),
}

// Serialization wrappers that stamp the stream-level `type` tag.
#[derive(Serialize)]
#[serde(tag = "type")]
enum StreamFrame<'a> {
    #[serde(rename = "artifact_chunk")]
    ArtifactChunk(&'a ArtifactChunk),
    #[serde(rename = "file_write")]
    FileWrite(&'a FileWrite),
    #[serde(rename = "run_result")]
    RunResult(&'a RunResult),
}

#[derive(Deserialize)]
struct TypeProbe {
    #[serde(rename = "type")]
    tag: String,
}

/// Encode a frame to its msgpack payload (no length prefix).
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, WireError> {
    match frame {
        Frame::Event(envelope) => encode_payload(envelope),
        Frame::Chunk(chunk) => {
            if chunk.data.len() > MAX_CHUNK_DATA {
                return Err(WireError::Oversize { len: chunk.data.len(), max: MAX_CHUNK_DATA });
            }
            encode_payload(&StreamFrame::ArtifactChunk(chunk))
        }
        Frame::FileWrite(fw) => encode_payload(&StreamFrame::FileWrite(fw)),
        Frame::RunResult(result) => encode_payload(&StreamFrame::RunResult(result)),
    }
}

/// Decode a msgpack payload into a frame, discriminating on its `type` key.
pub fn decode_frame(payload: &[u8]) -> Result<Frame, WireError> {
    let probe: TypeProbe = decode_payload(payload)?;
    match probe.tag.as_str() {
        TAG_ARTIFACT_CHUNK => {
            let chunk: ArtifactChunk = decode_payload(payload)?;
            if chunk.data.len() > MAX_CHUNK_DATA {
                return Err(WireError::Oversize { len: chunk.data.len(), max: MAX_CHUNK_DATA });
            }
            Ok(Frame::Chunk(chunk))
        }
        TAG_FILE_WRITE => Ok(Frame::FileWrite(decode_payload(payload)?)),
        TAG_RUN_RESULT => Ok(Frame::RunResult(decode_payload(payload)?)),
        _ => Ok(Frame::Event(decode_payload(payload)?)),
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
