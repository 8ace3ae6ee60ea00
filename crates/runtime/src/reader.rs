// SPDX-License-Identifier: MIT

//! The IPC reader: the single ingest loop per run.
//!
//! Decodes frames off the child's stdout and dispatches: chunks to the
//! reassembler and policy, events to the policy, `run_result` into the
//! report (first one wins), `file_write` straight to storage. Truncated
//! or oversize frames and reassembly violations are fatal — the stream is
//! abandoned with no resynchronization.

use crate::artifact::ChunkReassembler;
use crate::policy::{IngestPolicy, PolicyError};
use quarry_core::{
    check_contract, ArtifactId, EnqueueSpec, EventPayload, EventType, RunPartition, RunResult,
    CONTRACT_VERSION,
};
use quarry_storage::Lode;
use quarry_wire::{decode_frame, read_frame, Frame};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

/// How the frame stream ended.
#[derive(Debug)]
pub enum StreamEnd {
    /// EOF after a terminal event was accepted.
    CleanEof,
    /// EOF with no terminal: premature executor termination.
    PrematureEof,
    /// Wire-level or reassembly fatal error.
    StreamError(String),
    /// The policy refused an event or chunk; the run is over.
    PolicyFailure(PolicyError),
    /// An envelope carried an incompatible contract_version.
    VersionMismatch(String),
    Cancelled,
}

#[derive(Debug)]
pub struct ReaderReport {
    /// The terminal event type the policy accepted, if any.
    pub terminal: Option<EventType>,
    /// The executor's declared outcome; later duplicates are ignored.
    pub run_result: Option<RunResult>,
    /// Collected `enqueue` payloads (fan-out input), in arrival order.
    pub enqueues: Vec<EnqueueSpec>,
    pub end: StreamEnd,
    /// Artifacts with chunks but no commit at stream end.
    pub orphans: Vec<ArtifactId>,
}

/// Drive the ingest loop until EOF, a fatal error, or cancellation.
pub async fn read_stream<R: AsyncRead + Unpin>(
    stdout: &mut R,
    policy: &mut dyn IngestPolicy,
    lode: &Arc<dyn Lode>,
    part: &RunPartition,
    collect_enqueues: bool,
    cancel: &CancellationToken,
) -> ReaderReport {
    let mut reassembler = ChunkReassembler::new();
    let mut terminal: Option<EventType> = None;
    let mut run_result: Option<RunResult> = None;
    let mut enqueues: Vec<EnqueueSpec> = Vec::new();

    let end = loop {
        let frame = tokio::select! {
            frame = read_frame(stdout) => frame,
            _ = cancel.cancelled() => break StreamEnd::Cancelled,
        };
        let payload = match frame {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                break if terminal.is_some() {
                    StreamEnd::CleanEof
                } else {
                    StreamEnd::PrematureEof
                };
            }
            Err(err) => {
                tracing::error!(error = %err, "fatal frame error, abandoning stream");
                break StreamEnd::StreamError(err.to_string());
            }
        };

        let frame = match decode_frame(&payload) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(error = %err, "frame decode failed, abandoning stream");
                break StreamEnd::StreamError(err.to_string());
            }
        };

        match frame {
            Frame::Chunk(chunk) => {
                if let Err(err) = reassembler.accept(&chunk) {
                    tracing::error!(error = %err, "chunk stream violation");
                    break StreamEnd::StreamError(err.to_string());
                }
                if let Err(err) = policy.ingest_chunk(chunk).await {
                    break StreamEnd::PolicyFailure(err);
                }
            }
            Frame::RunResult(result) => {
                if run_result.is_none() {
                    run_result = Some(result);
                } else {
                    tracing::debug!("duplicate run_result frame ignored");
                }
            }
            Frame::FileWrite(fw) => {
                // Sidecar writes bypass sequencing and policy; failures
                // are logged, not fatal.
                if let Err(err) = lode.write_file(part, &fw.path, &fw.data).await {
                    tracing::warn!(path = %fw.path, error = %err, "sidecar file write failed");
                }
            }
            Frame::Event(envelope) => {
                if envelope.contract_version != CONTRACT_VERSION {
                    if let Err(err) = check_contract(&envelope.contract_version) {
                        tracing::error!(error = %err, "contract version mismatch");
                        break StreamEnd::VersionMismatch(err.to_string());
                    }
                }

                if let EventPayload::Artifact { artifact_id, chunks, .. } = &envelope.payload {
                    if let Err(err) = reassembler.observe_commit(artifact_id, *chunks) {
                        tracing::error!(error = %err, "artifact commit violation");
                        break StreamEnd::StreamError(err.to_string());
                    }
                }
                if collect_enqueues {
                    if let EventPayload::Enqueue { spec } = &envelope.payload {
                        enqueues.push(spec.clone());
                    }
                }

                let event_type = envelope.event_type();
                if let Err(err) = policy.ingest_event(envelope).await {
                    break StreamEnd::PolicyFailure(err);
                }
                if event_type.is_terminal() {
                    terminal = Some(event_type);
                }
            }
        }
    };

    ReaderReport { terminal, run_result, enqueues, end, orphans: reassembler.orphans() }
}

#[cfg(test)]
#[path = "reader_tests.rs"]
mod tests;
