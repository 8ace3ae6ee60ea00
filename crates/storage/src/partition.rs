// SPDX-License-Identifier: MIT

//! Hive partition paths.

use quarry_core::RunPartition;

/// Partition value for artifact chunk records (chunks are not events but
/// still live under an `event_type=` leaf).
pub const EVENT_TYPE_CHUNK: &str = "artifact_chunk";

/// Partition value for the per-run metrics record.
pub const EVENT_TYPE_METRICS: &str = "metrics";

/// Make a value safe for a `key=value` path segment.
///
/// Replaces path separators and the hive delimiter; never empty.
pub fn sanitize_value(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| match c {
            '/' | '\\' | '=' | '\0' => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// `source=<s>/category=<c>/day=<YYYY-MM-DD>/run_id=<r>/event_type=<t>`
pub fn partition_dir(part: &RunPartition, event_type: &str) -> String {
    format!(
        "source={}/category={}/day={}/run_id={}/event_type={}",
        sanitize_value(&part.source),
        sanitize_value(&part.category),
        part.day.format("%Y-%m-%d"),
        sanitize_value(part.run_id.as_str()),
        sanitize_value(event_type),
    )
}

/// Run-level directory without the `event_type` leaf (sidecar files).
pub fn run_dir(part: &RunPartition) -> String {
    format!(
        "source={}/category={}/day={}/run_id={}",
        sanitize_value(&part.source),
        sanitize_value(&part.category),
        part.day.format("%Y-%m-%d"),
        sanitize_value(part.run_id.as_str()),
    )
}

#[cfg(test)]
#[path = "partition_tests.rs"]
mod tests;
