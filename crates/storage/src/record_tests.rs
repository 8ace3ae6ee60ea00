// SPDX-License-Identifier: MIT

use super::*;
use quarry_core::{EventId, EventPayload, RunId};

fn envelope(payload: EventPayload) -> EventEnvelope {
    EventEnvelope {
        contract_version: quarry_core::CONTRACT_VERSION.to_string(),
        event_id: EventId::generate(),
        run_id: RunId::from_string("run-1"),
        job_id: None,
        parent_run_id: None,
        attempt: 1,
        ts: chrono::Utc::now(),
        seq: 1,
        payload,
    }
}

fn chunk(artifact: &str, seq: u64, len: usize, is_last: bool) -> ArtifactChunk {
    ArtifactChunk {
        artifact_id: ArtifactId::from_string(artifact),
        seq,
        is_last,
        data: vec![0u8; len],
        checksum: None,
    }
}

#[test]
fn artifact_commits_get_their_own_record_kind() {
    let stored = StoredEvent::new(envelope(EventPayload::Artifact {
        artifact_id: ArtifactId::from_string("art-1"),
        name: "page.html".into(),
        content_type: "text/html".into(),
        size_bytes: 10,
        chunks: 1,
    }));
    assert_eq!(stored.record_kind, RecordKind::ArtifactEvent);

    let stored = StoredEvent::new(envelope(EventPayload::Item { data: serde_json::json!(1) }));
    assert_eq!(stored.record_kind, RecordKind::Event);
}

#[test]
fn stored_event_line_carries_discriminator_and_type() {
    let stored = StoredEvent::new(envelope(EventPayload::Item { data: serde_json::json!(1) }));
    let value = serde_json::to_value(&stored).unwrap();
    assert_eq!(value["record_kind"], "event");
    assert_eq!(value["type"], "item");
    assert_eq!(value["seq"], 1);
}

#[test]
fn ledger_assigns_cumulative_offsets() {
    let mut ledger = ChunkLedger::new();

    let r1 = ledger.record_for(&chunk("art-1", 1, 100, false));
    let r2 = ledger.record_for(&chunk("art-1", 2, 50, false));
    let r3 = ledger.record_for(&chunk("art-1", 3, 7, true));

    assert_eq!((r1.offset, r1.length), (0, 100));
    assert_eq!((r2.offset, r2.length), (100, 50));
    assert_eq!((r3.offset, r3.length), (150, 7));
    assert!(r3.is_last);
}

#[test]
fn ledger_is_stable_across_redelivery() {
    let mut ledger = ChunkLedger::new();
    ledger.record_for(&chunk("art-1", 1, 100, false));
    let again = ledger.record_for(&chunk("art-1", 1, 100, false));

    assert_eq!(again.offset, 0);
    // Offsets for later chunks are unaffected by the duplicate
    let r2 = ledger.record_for(&chunk("art-1", 2, 10, true));
    assert_eq!(r2.offset, 100);
}

#[test]
fn ledger_tracks_artifacts_independently() {
    let mut ledger = ChunkLedger::new();
    ledger.record_for(&chunk("art-1", 1, 100, false));
    let other = ledger.record_for(&chunk("art-2", 1, 5, true));
    assert_eq!(other.offset, 0);
}
