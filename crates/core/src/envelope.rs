// SPDX-License-Identifier: MIT

//! Event envelopes carried in-band from executor to runtime.
//!
//! The wire shape is a single msgpack map: envelope fields plus the
//! flattened, `type`-tagged payload. The `type` key therefore discriminates
//! both the frame kind (anything that is not a stream-level tag is an event)
//! and the payload variant.

use crate::id::{ArtifactId, EventId, JobId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Event type tags. Closed set; renames are forbidden within the 0.x series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Item,
    Artifact,
    Checkpoint,
    Enqueue,
    RotateProxy,
    Log,
    RunError,
    RunComplete,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Item => "item",
            EventType::Artifact => "artifact",
            EventType::Checkpoint => "checkpoint",
            EventType::Enqueue => "enqueue",
            EventType::RotateProxy => "rotate_proxy",
            EventType::Log => "log",
            EventType::RunError => "run_error",
            EventType::RunComplete => "run_complete",
        }
    }

    /// Only `log`, `enqueue`, and `rotate_proxy` may ever be dropped.
    pub fn is_droppable(&self) -> bool {
        matches!(self, EventType::Log | EventType::Enqueue | EventType::RotateProxy)
    }

    /// Terminal events end the run; exactly one may be persisted per run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventType::RunError | EventType::RunComplete)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Log severity for `log` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Fan-out request carried by an `enqueue` event. Observed by the runtime
/// only when `--depth > 0`; purely advisory otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnqueueSpec {
    pub target: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
    /// Overrides the parent run's partition source for the child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Type-discriminated event payload. Flattened into the envelope so the
/// envelope's `type` key carries the tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Item {
        data: serde_json::Value,
    },
    /// Commit event for an artifact; its chunks travel as stream frames.
    Artifact {
        artifact_id: ArtifactId,
        name: String,
        content_type: String,
        size_bytes: u64,
        chunks: u64,
    },
    Checkpoint {
        state: serde_json::Value,
    },
    Enqueue {
        #[serde(flatten)]
        spec: EnqueueSpec,
    },
    RotateProxy {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Log {
        level: LogLevel,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<serde_json::Value>,
    },
    RunError {
        error_type: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
    RunComplete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<serde_json::Value>,
        /// Set when `prepare` skipped the run.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        skipped: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::Item { .. } => EventType::Item,
            EventPayload::Artifact { .. } => EventType::Artifact,
            EventPayload::Checkpoint { .. } => EventType::Checkpoint,
            EventPayload::Enqueue { .. } => EventType::Enqueue,
            EventPayload::RotateProxy { .. } => EventType::RotateProxy,
            EventPayload::Log { .. } => EventType::Log,
            EventPayload::RunError { .. } => EventType::RunError,
            EventPayload::RunComplete { .. } => EventType::RunComplete,
        }
    }
}

/// One in-band event from executor to runtime. Never mutated after emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub contract_version: String,
    pub event_id: EventId,
    pub run_id: RunId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<RunId>,
    pub attempt: u32,
    pub ts: DateTime<Utc>,
    /// Monotonic per run, starting at 1, assigned at persistence-accept by
    /// the emit layer. Failed writes do not burn sequence numbers.
    pub seq: u64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl EventEnvelope {
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    pub fn is_droppable(&self) -> bool {
        self.event_type().is_droppable()
    }

    pub fn is_terminal(&self) -> bool {
        self.event_type().is_terminal()
    }

    /// Short display form for logs: `type seq=N id=evt-…`.
    pub fn log_summary(&self) -> String {
        format!("{} seq={} id={}", self.event_type(), self.seq, self.event_id)
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
