// SPDX-License-Identifier: MIT

//! The emit API.
//!
//! Every operation funnels through one mutex, so frames leave the process
//! in strict emit order. `seq` is assigned only after the sink accepts the
//! write; a failed write therefore never burns a sequence number, and the
//! first failure poisons the whole chain.

use crate::sink::ObservingSink;
use parking_lot::Mutex;
use quarry_core::{
    ArtifactId, EnqueueSpec, EventEnvelope, EventId, EventPayload, LogLevel, RunMeta, RunResult,
    CONTRACT_VERSION,
};
use quarry_wire::{chunk_artifact, Frame, WireError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmitError {
    /// A terminal event already succeeded (or emit is closed for the
    /// cleanup phase); nothing further may be emitted.
    #[error("emit rejected: terminal event already written")]
    Terminal,
    /// A previous write failed; the chain is poisoned. Carries the first
    /// failure as cause.
    #[error("emit sink failed: {0}")]
    SinkFailed(String),
    /// This write failed. The chain is poisoned from here on.
    #[error(transparent)]
    Write(#[from] WireError),
}

struct EmitState {
    sink: ObservingSink,
    meta: RunMeta,
    next_seq: u64,
    emit_closed: bool,
}

/// Serialized, fail-fast emit handle. Clones share the chain.
#[derive(Clone)]
pub struct Emitter {
    inner: Arc<Mutex<EmitState>>,
}

impl Emitter {
    pub fn new(sink: ObservingSink, meta: RunMeta) -> Self {
        Self {
            inner: Arc::new(Mutex::new(EmitState {
                sink,
                meta,
                next_seq: 1,
                emit_closed: false,
            })),
        }
    }

    fn envelope(state: &EmitState, payload: EventPayload) -> EventEnvelope {
        EventEnvelope {
            contract_version: CONTRACT_VERSION.to_string(),
            event_id: EventId::generate(),
            run_id: state.meta.run_id.clone(),
            job_id: state.meta.job_id.clone(),
            parent_run_id: state.meta.parent_run_id.clone(),
            attempt: state.meta.attempt,
            ts: chrono::Utc::now(),
            seq: state.next_seq,
            payload,
        }
    }

    fn emit_event(&self, payload: EventPayload) -> Result<u64, EmitError> {
        let mut state = self.inner.lock();

        // Sink-failure first: a poisoned chain must surface as SinkFailed
        // even if a terminal was also latched.
        if let Some(cause) = state.sink.failure() {
            return Err(EmitError::SinkFailed(cause.to_string()));
        }
        if state.emit_closed || state.sink.terminal_state().is_some() {
            return Err(EmitError::Terminal);
        }

        let envelope = Self::envelope(&state, payload);
        let seq = envelope.seq;
        state.sink.write(&Frame::Event(envelope))?;
        // Persistence-accept: only now does the sequence number advance.
        state.next_seq += 1;
        Ok(seq)
    }

    pub fn item(&self, data: serde_json::Value) -> Result<u64, EmitError> {
        self.emit_event(EventPayload::Item { data })
    }

    pub fn checkpoint(&self, state: serde_json::Value) -> Result<u64, EmitError> {
        self.emit_event(EventPayload::Checkpoint { state })
    }

    pub fn enqueue(&self, spec: EnqueueSpec) -> Result<u64, EmitError> {
        self.emit_event(EventPayload::Enqueue { spec })
    }

    pub fn rotate_proxy(&self, reason: Option<String>) -> Result<u64, EmitError> {
        self.emit_event(EventPayload::RotateProxy { reason })
    }

    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        fields: Option<serde_json::Value>,
    ) -> Result<u64, EmitError> {
        self.emit_event(EventPayload::Log { level, message: message.into(), fields })
    }

    pub fn log_debug(&self, message: impl Into<String>) -> Result<u64, EmitError> {
        self.log(LogLevel::Debug, message, None)
    }

    pub fn log_info(&self, message: impl Into<String>) -> Result<u64, EmitError> {
        self.log(LogLevel::Info, message, None)
    }

    pub fn log_warn(&self, message: impl Into<String>) -> Result<u64, EmitError> {
        self.log(LogLevel::Warn, message, None)
    }

    pub fn log_error(&self, message: impl Into<String>) -> Result<u64, EmitError> {
        self.log(LogLevel::Error, message, None)
    }

    /// Emit an artifact: chunk frames first, then the commit event, all
    /// under one lock so no other emit interleaves.
    pub fn artifact(
        &self,
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: &[u8],
    ) -> Result<ArtifactId, EmitError> {
        let mut state = self.inner.lock();
        if let Some(cause) = state.sink.failure() {
            return Err(EmitError::SinkFailed(cause.to_string()));
        }
        if state.emit_closed || state.sink.terminal_state().is_some() {
            return Err(EmitError::Terminal);
        }

        let artifact_id = ArtifactId::generate();
        let chunks = chunk_artifact(&artifact_id, data);
        let chunk_count = chunks.len() as u64;
        for chunk in chunks {
            state.sink.write(&Frame::Chunk(chunk))?;
        }

        let envelope = Self::envelope(
            &state,
            EventPayload::Artifact {
                artifact_id: artifact_id.clone(),
                name: name.into(),
                content_type: content_type.into(),
                size_bytes: data.len() as u64,
                chunks: chunk_count,
            },
        );
        state.sink.write(&Frame::Event(envelope))?;
        state.next_seq += 1;
        Ok(artifact_id)
    }

    /// Sidecar file write: a stream-level frame that bypasses event
    /// sequencing and the ingestion policy. Still fail-fast.
    pub fn write_file(&self, path: impl Into<String>, data: &[u8]) -> Result<(), EmitError> {
        let mut state = self.inner.lock();
        if let Some(cause) = state.sink.failure() {
            return Err(EmitError::SinkFailed(cause.to_string()));
        }
        if state.emit_closed {
            return Err(EmitError::Terminal);
        }
        state.sink.write(&Frame::FileWrite(quarry_wire::FileWrite {
            path: path.into(),
            data: data.to_vec(),
        }))?;
        Ok(())
    }

    pub fn run_complete(&self, summary: Option<serde_json::Value>) -> Result<u64, EmitError> {
        self.emit_event(EventPayload::RunComplete { summary, skipped: false, reason: None })
    }

    /// Terminal for a run `prepare` chose to skip.
    pub fn run_skipped(&self, reason: Option<String>) -> Result<u64, EmitError> {
        self.emit_event(EventPayload::RunComplete { summary: None, skipped: true, reason })
    }

    pub fn run_error(
        &self,
        error_type: impl Into<String>,
        message: impl Into<String>,
        stack: Option<String>,
    ) -> Result<u64, EmitError> {
        self.emit_event(EventPayload::RunError {
            error_type: error_type.into(),
            message: message.into(),
            stack,
        })
    }

    /// Forbid further emits (the cleanup phase). Idempotent.
    pub fn close(&self) {
        self.inner.lock().emit_closed = true;
    }

    /// Write the run_result control frame, bypassing terminal/poison
    /// checks. The caller swallows any error.
    pub fn write_run_result(&self, result: &RunResult) -> Result<(), WireError> {
        self.inner.lock().sink.write_raw(&Frame::RunResult(result.clone()))
    }

    pub fn terminal_state(&self) -> Option<crate::sink::TerminalState> {
        self.inner.lock().sink.terminal_state().cloned()
    }

    pub fn is_sink_failed(&self) -> bool {
        self.inner.lock().sink.is_failed()
    }

    pub fn sink_failure(&self) -> Option<String> {
        self.inner.lock().sink.failure().map(str::to_string)
    }
}

#[cfg(test)]
#[path = "emit_tests.rs"]
mod tests;
