// SPDX-License-Identifier: MIT

//! Per-process run counters, snapshotted into the per-run metrics record.

use quarry_core::PolicyStats;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RunMetrics {
    runs_started: AtomicU64,
    runs_completed: AtomicU64,
    runs_failed: AtomicU64,
    events_persisted: AtomicU64,
    events_dropped: AtomicU64,
    chunks_persisted: AtomicU64,
    flushes: AtomicU64,
    adapter_failures: AtomicU64,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn run_completed(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn run_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn adapter_failure(&self) {
        self.adapter_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a policy's final stats into the process counters.
    pub fn absorb(&self, stats: &PolicyStats) {
        self.events_persisted.fetch_add(stats.events_persisted, Ordering::Relaxed);
        self.events_dropped.fetch_add(stats.events_dropped, Ordering::Relaxed);
        self.chunks_persisted.fetch_add(stats.chunks_persisted, Ordering::Relaxed);
        self.flushes.fetch_add(stats.flushes, Ordering::Relaxed);
    }

    pub fn to_counters(&self) -> BTreeMap<String, u64> {
        let mut counters = BTreeMap::new();
        counters.insert("runs_started_total".into(), self.runs_started.load(Ordering::Relaxed));
        counters
            .insert("runs_completed_total".into(), self.runs_completed.load(Ordering::Relaxed));
        counters.insert("runs_failed_total".into(), self.runs_failed.load(Ordering::Relaxed));
        counters.insert(
            "events_persisted_total".into(),
            self.events_persisted.load(Ordering::Relaxed),
        );
        counters
            .insert("events_dropped_total".into(), self.events_dropped.load(Ordering::Relaxed));
        counters.insert(
            "artifact_chunks_persisted_total".into(),
            self.chunks_persisted.load(Ordering::Relaxed),
        );
        counters.insert("flushes_total".into(), self.flushes.load(Ordering::Relaxed));
        counters.insert(
            "adapter_failures_total".into(),
            self.adapter_failures.load(Ordering::Relaxed),
        );
        counters
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
