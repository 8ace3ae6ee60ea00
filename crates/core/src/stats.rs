// SPDX-License-Identifier: MIT

//! Policy stats snapshots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What caused a streaming-policy flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushTrigger {
    Count,
    Interval,
    Termination,
    Capacity,
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Count => "count",
            FlushTrigger::Interval => "interval",
            FlushTrigger::Termination => "termination",
            FlushTrigger::Capacity => "capacity",
        }
    }
}

impl std::fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Read-consistent snapshot of a policy's per-run counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStats {
    pub events_total: u64,
    pub events_persisted: u64,
    pub events_dropped: u64,
    /// Drop counts keyed by event type tag. Only droppable types appear
    /// for the strict/buffered policies.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dropped_by_type: BTreeMap<String, u64>,
    pub chunks_total: u64,
    pub chunks_persisted: u64,
    /// Events + chunks currently buffered.
    pub buffer_len: u64,
    pub buffer_bytes: u64,
    pub flushes: u64,
    pub errors: u64,
    /// Streaming policy only: flushes keyed by trigger.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flush_triggers: BTreeMap<String, u64>,
}

impl PolicyStats {
    pub fn trigger_count(&self, trigger: FlushTrigger) -> u64 {
        self.flush_triggers.get(trigger.as_str()).copied().unwrap_or(0)
    }
}
