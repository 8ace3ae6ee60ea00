// SPDX-License-Identifier: MIT

use super::*;
use crate::fs::FsLode;
use crate::lode::Lode;
use crate::record::MetricsRecord;
use quarry_core::{ArtifactChunk, ArtifactId, EventEnvelope, EventId, EventPayload, RunId, RunPartition};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn part(run: &str) -> RunPartition {
    RunPartition::new(
        "shop",
        "default",
        chrono::NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
        RunId::from_string(run),
    )
}

fn item(run: &str, seq: u64) -> EventEnvelope {
    EventEnvelope {
        contract_version: quarry_core::CONTRACT_VERSION.to_string(),
        event_id: EventId::generate(),
        run_id: RunId::from_string(run),
        job_id: None,
        parent_run_id: None,
        attempt: 1,
        ts: chrono::Utc::now(),
        seq,
        payload: EventPayload::Item { data: serde_json::json!({ "seq": seq }) },
    }
}

async fn seed(root: &std::path::Path) {
    let lode = FsLode::new(root.to_path_buf(), CancellationToken::new());
    lode.append_events(&part("run-a"), &[item("run-a", 1), item("run-a", 2)]).await.unwrap();
    lode.append_chunks(
        &part("run-a"),
        &[ArtifactChunk {
            artifact_id: ArtifactId::from_string("art-1"),
            seq: 1,
            is_last: true,
            data: b"x".to_vec(),
            checksum: None,
        }],
    )
    .await
    .unwrap();
    lode.append_metrics(
        &part("run-a"),
        &MetricsRecord::new(
            "strict",
            "quarryx",
            "fs",
            RunId::from_string("run-a"),
            None,
            chrono::Utc::now(),
            Default::default(),
            Default::default(),
        ),
    )
    .await
    .unwrap();
    lode.append_events(&part("run-b"), &[item("run-b", 1)]).await.unwrap();
}

#[tokio::test]
async fn list_runs_discovers_partitions() {
    let dir = tempdir().unwrap();
    seed(dir.path()).await;

    let reader = StoreReader::new(dir.path());
    let runs = reader.list_runs().unwrap();
    assert_eq!(runs.len(), 2);

    let run_a = runs.iter().find(|r| r.run_id == "run-a").unwrap();
    assert_eq!(run_a.source, "shop");
    assert_eq!(run_a.event_counts.get("item"), Some(&2));
    assert_eq!(run_a.chunk_count, 1);
    assert!(run_a.metrics.is_some());

    let run_b = runs.iter().find(|r| r.run_id == "run-b").unwrap();
    assert!(run_b.metrics.is_none());
}

#[tokio::test]
async fn find_run_matches_unique_prefix() {
    let dir = tempdir().unwrap();
    seed(dir.path()).await;

    let reader = StoreReader::new(dir.path());
    assert_eq!(reader.find_run("run-a").unwrap().unwrap().run_id, "run-a");
    // "run-" is ambiguous between run-a and run-b
    assert!(reader.find_run("run-").unwrap().is_none());
    assert!(reader.find_run("nope").unwrap().is_none());
}

#[tokio::test]
async fn read_events_returns_seq_order() {
    let dir = tempdir().unwrap();
    seed(dir.path()).await;

    let reader = StoreReader::new(dir.path());
    let summary = reader.find_run("run-a").unwrap().unwrap();
    let events = reader.read_events(&summary).unwrap();
    let seqs: Vec<u64> = events.iter().map(|e| e.envelope.seq).collect();
    assert_eq!(seqs, vec![1, 2]);
}

#[test]
fn empty_store_lists_nothing() {
    let dir = tempdir().unwrap();
    let reader = StoreReader::new(dir.path());
    assert!(reader.list_runs().unwrap().is_empty());
}
