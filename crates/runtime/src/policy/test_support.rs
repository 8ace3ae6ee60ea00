// SPDX-License-Identifier: MIT

//! Builders shared by policy tests.

use quarry_core::{
    ArtifactChunk, ArtifactId, EventEnvelope, EventId, EventPayload, RunId, RunPartition,
};

pub fn part() -> RunPartition {
    RunPartition::new(
        "shop",
        "default",
        chrono::NaiveDate::from_ymd_opt(2026, 1, 2).expect("valid date"),
        RunId::from_string("run-1"),
    )
}

pub fn envelope(seq: u64, payload: EventPayload) -> EventEnvelope {
    EventEnvelope {
        contract_version: quarry_core::CONTRACT_VERSION.to_string(),
        event_id: EventId::generate(),
        run_id: RunId::from_string("run-1"),
        job_id: None,
        parent_run_id: None,
        attempt: 1,
        ts: chrono::Utc::now(),
        seq,
        payload,
    }
}

pub fn item(seq: u64) -> EventEnvelope {
    envelope(seq, EventPayload::Item { data: serde_json::json!({ "seq": seq }) })
}

pub fn log(seq: u64) -> EventEnvelope {
    envelope(
        seq,
        EventPayload::Log {
            level: quarry_core::LogLevel::Info,
            message: format!("log {seq}"),
            fields: None,
        },
    )
}

pub fn complete(seq: u64) -> EventEnvelope {
    envelope(seq, EventPayload::RunComplete { summary: None, skipped: false, reason: None })
}

pub fn commit(seq: u64, artifact: &str, chunks: u64, size: u64) -> EventEnvelope {
    envelope(
        seq,
        EventPayload::Artifact {
            artifact_id: ArtifactId::from_string(artifact),
            name: "blob".into(),
            content_type: "application/octet-stream".into(),
            size_bytes: size,
            chunks,
        },
    )
}

pub fn chunk(artifact: &str, seq: u64, len: usize, is_last: bool) -> ArtifactChunk {
    ArtifactChunk {
        artifact_id: ArtifactId::from_string(artifact),
        seq,
        is_last,
        data: vec![0xAB; len],
        checksum: None,
    }
}
