// SPDX-License-Identifier: MIT

//! Read-only scans over a filesystem Lode layout.
//!
//! Powers `list` / `stats` / `inspect`. Walks the Hive partition tree
//! parsing `key=value` segments; tolerant of foreign files.

use crate::lode::StorageError;
use crate::record::{MetricsRecord, StoredEvent};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One run as discovered on disk.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub source: String,
    pub category: String,
    pub day: String,
    pub run_id: String,
    /// Event counts per `event_type` partition.
    pub event_counts: BTreeMap<String, u64>,
    pub chunk_count: u64,
    pub metrics: Option<MetricsRecord>,
}

pub struct StoreReader {
    root: PathBuf,
}

impl StoreReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn hive_value(segment: &std::ffi::OsStr, key: &str) -> Option<String> {
        let s = segment.to_str()?;
        s.strip_prefix(key).and_then(|rest| rest.strip_prefix('=')).map(str::to_string)
    }

    fn subdirs(path: &Path, key: &str) -> Result<Vec<(String, PathBuf)>, StorageError> {
        let mut out = Vec::new();
        if !path.is_dir() {
            return Ok(out);
        }
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(value) = Self::hive_value(&entry.file_name(), key) {
                out.push((value, entry.path()));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    fn count_lines(path: &Path) -> u64 {
        std::fs::read_to_string(path)
            .map(|s| s.lines().filter(|l| !l.trim().is_empty()).count() as u64)
            .unwrap_or(0)
    }

    /// Enumerate all runs under the store root.
    pub fn list_runs(&self) -> Result<Vec<RunSummary>, StorageError> {
        let mut runs = Vec::new();
        for (source, source_dir) in Self::subdirs(&self.root, "source")? {
            for (category, cat_dir) in Self::subdirs(&source_dir, "category")? {
                for (day, day_dir) in Self::subdirs(&cat_dir, "day")? {
                    for (run_id, run_dir) in Self::subdirs(&day_dir, "run_id")? {
                        runs.push(self.summarize(
                            source.clone(),
                            category.clone(),
                            day.clone(),
                            run_id,
                            &run_dir,
                        )?);
                    }
                }
            }
        }
        Ok(runs)
    }

    fn summarize(
        &self,
        source: String,
        category: String,
        day: String,
        run_id: String,
        run_dir: &Path,
    ) -> Result<RunSummary, StorageError> {
        let mut event_counts = BTreeMap::new();
        let mut chunk_count = 0;
        let mut metrics = None;

        for (event_type, type_dir) in Self::subdirs(run_dir, "event_type")? {
            match event_type.as_str() {
                "artifact_chunk" => {
                    for name in ["chunks.jsonl"] {
                        chunk_count += Self::count_lines(&type_dir.join(name));
                    }
                    // Object-store layouts use numbered batch files.
                    for entry in std::fs::read_dir(&type_dir)? {
                        let path = entry?.path();
                        if path
                            .file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| n.starts_with("chunks-") && n.ends_with(".jsonl"))
                        {
                            chunk_count += Self::count_lines(&path);
                        }
                    }
                }
                "metrics" => {
                    let path = type_dir.join("metrics.json");
                    if let Ok(text) = std::fs::read_to_string(&path) {
                        metrics = serde_json::from_str(&text).ok();
                    }
                }
                _ => {
                    let mut count = Self::count_lines(&type_dir.join("events.jsonl"));
                    for entry in std::fs::read_dir(&type_dir)? {
                        let path = entry?.path();
                        if path
                            .file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| n.starts_with("events-") && n.ends_with(".jsonl"))
                        {
                            count += Self::count_lines(&path);
                        }
                    }
                    event_counts.insert(event_type, count);
                }
            }
        }

        Ok(RunSummary { source, category, day, run_id, event_counts, chunk_count, metrics })
    }

    /// Find a single run by ID (or unique ID prefix, like git hashes).
    pub fn find_run(&self, id: &str) -> Result<Option<RunSummary>, StorageError> {
        let runs = self.list_runs()?;
        let mut matched: Vec<RunSummary> =
            runs.into_iter().filter(|r| r.run_id.starts_with(id)).collect();
        match matched.len() {
            1 => Ok(Some(matched.remove(0))),
            _ => Ok(matched.into_iter().find(|r| r.run_id == id)),
        }
    }

    /// Read every persisted event for a run, in partition order.
    pub fn read_events(&self, summary: &RunSummary) -> Result<Vec<StoredEvent>, StorageError> {
        let run_dir = self
            .root
            .join(format!("source={}", summary.source))
            .join(format!("category={}", summary.category))
            .join(format!("day={}", summary.day))
            .join(format!("run_id={}", summary.run_id));

        let mut events = Vec::new();
        for (event_type, type_dir) in Self::subdirs(&run_dir, "event_type")? {
            if event_type == "artifact_chunk" || event_type == "metrics" {
                continue;
            }
            let path = type_dir.join("events.jsonl");
            if let Ok(text) = std::fs::read_to_string(&path) {
                for line in text.lines().filter(|l| !l.trim().is_empty()) {
                    events.push(serde_json::from_str(line)?);
                }
            }
        }
        events.sort_by_key(|e: &StoredEvent| e.envelope.seq);
        Ok(events)
    }
}

#[cfg(test)]
#[path = "reader_tests.rs"]
mod tests;
