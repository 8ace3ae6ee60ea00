// SPDX-License-Identifier: MIT

//! The observing sink.
//!
//! Wraps the raw frame writer and records two facts: the first terminal
//! event whose write succeeded, and the first write failure. After a
//! failure it refuses all further writes, which is what poisons the emit
//! chain above it.

use quarry_core::{EventPayload, ExecutorStatus, RunOutcome};
use quarry_wire::{encode_frame, write_frame_blocking, Frame, WireError};
use std::io::Write;

/// Anything that can persist an encoded frame. The production impl writes
/// length-prefixed frames to the guarded stdout fd.
pub trait RawFrameSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), WireError>;
}

/// Raw sink over any blocking writer (the guarded stdout in production).
pub struct WriterSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> RawFrameSink for WriterSink<W> {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), WireError> {
        let payload = encode_frame(frame)?;
        write_frame_blocking(&mut self.writer, &payload)
    }
}

/// In-memory sink collecting decoded frames; test double with optional
/// failure injection.
#[derive(Default)]
pub struct VecSink {
    pub frames: std::sync::Arc<parking_lot::Mutex<Vec<Frame>>>,
    fail_after: Option<usize>,
    fail_next: u32,
    written: usize,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every write once `n` frames have been accepted (broken pipe).
    pub fn failing_after(n: usize) -> Self {
        Self { fail_after: Some(n), ..Self::default() }
    }

    /// Fail only the next `n` write attempts (transient failure).
    pub fn failing_next(n: u32) -> Self {
        Self { fail_next: n, ..Self::default() }
    }

    pub fn handle(&self) -> std::sync::Arc<parking_lot::Mutex<Vec<Frame>>> {
        self.frames.clone()
    }
}

impl RawFrameSink for VecSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), WireError> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(WireError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "injected sink failure",
            )));
        }
        if let Some(limit) = self.fail_after {
            if self.written >= limit {
                return Err(WireError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "injected sink failure",
                )));
            }
        }
        // Encode even in the test double so size caps apply.
        let _payload = encode_frame(frame)?;
        self.written += 1;
        self.frames.lock().push(frame.clone());
        Ok(())
    }
}

/// The terminal event the sink saw succeed, reduced to what outcome
/// derivation needs.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalState {
    Completed { summary: Option<serde_json::Value>, skipped: bool },
    Errored { error_type: String, message: String, stack: Option<String> },
}

impl TerminalState {
    /// The outcome this terminal implies for the run_result frame.
    pub fn to_outcome(&self) -> RunOutcome {
        match self {
            TerminalState::Completed { .. } => RunOutcome::completed(),
            TerminalState::Errored { error_type, message, stack } => RunOutcome {
                status: ExecutorStatus::Error,
                message: Some(message.clone()),
                error_type: Some(error_type.clone()),
                stack: stack.clone(),
            },
        }
    }
}

pub struct ObservingSink {
    inner: Box<dyn RawFrameSink>,
    terminal: Option<TerminalState>,
    failure: Option<String>,
}

impl ObservingSink {
    pub fn new(inner: Box<dyn RawFrameSink>) -> Self {
        Self { inner, terminal: None, failure: None }
    }

    /// Write a frame, observing terminal events and failures.
    ///
    /// Fail-fast: once any write has failed, every later call returns the
    /// first failure without touching the raw sink.
    pub fn write(&mut self, frame: &Frame) -> Result<(), WireError> {
        if let Some(failure) = &self.failure {
            return Err(WireError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                failure.clone(),
            )));
        }

        match self.inner.write_frame(frame) {
            Ok(()) => {
                if self.terminal.is_none() {
                    if let Frame::Event(envelope) = frame {
                        match &envelope.payload {
                            EventPayload::RunComplete { summary, skipped, .. } => {
                                self.terminal = Some(TerminalState::Completed {
                                    summary: summary.clone(),
                                    skipped: *skipped,
                                });
                            }
                            EventPayload::RunError { error_type, message, stack } => {
                                self.terminal = Some(TerminalState::Errored {
                                    error_type: error_type.clone(),
                                    message: message.clone(),
                                    stack: stack.clone(),
                                });
                            }
                            _ => {}
                        }
                    }
                }
                Ok(())
            }
            Err(err) => {
                self.failure = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Write bypassing the fail-fast check; used only for the run_result
    /// frame, whose failures the driver swallows. Does not observe.
    pub fn write_raw(&mut self, frame: &Frame) -> Result<(), WireError> {
        self.inner.write_frame(frame)
    }

    pub fn terminal_state(&self) -> Option<&TerminalState> {
        self.terminal.as_ref()
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }
}

#[cfg(test)]
#[path = "sink_tests.rs"]
mod tests;
