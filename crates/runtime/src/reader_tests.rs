// SPDX-License-Identifier: MIT

use super::*;
use crate::policy::test_support::{chunk, commit, complete, envelope, item, part};
use crate::policy::{build_policy, PolicyConfig, PolicyKind};
use quarry_core::{EventPayload, RunOutcome};
use quarry_storage::FakeLode;
use quarry_wire::{encode_frame, Frame};

fn stream_of(frames: &[Frame]) -> std::io::Cursor<Vec<u8>> {
    let mut bytes = Vec::new();
    for frame in frames {
        let payload = encode_frame(frame).expect("encode");
        bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&payload);
    }
    std::io::Cursor::new(bytes)
}

struct Rig {
    lode: FakeLode,
    policy: Box<dyn IngestPolicy>,
    part: quarry_core::RunPartition,
}

fn rig() -> Rig {
    let lode = FakeLode::new();
    let policy = build_policy(
        &PolicyConfig { kind: PolicyKind::Strict, ..Default::default() },
        Arc::new(lode.clone()),
        part(),
        CancellationToken::new(),
    )
    .expect("policy");
    Rig { lode, policy, part: part() }
}

async fn run(rig: &mut Rig, frames: &[Frame], collect: bool) -> ReaderReport {
    let lode: Arc<dyn Lode> = Arc::new(rig.lode.clone());
    let mut stdout = stream_of(frames);
    read_stream(
        &mut stdout,
        rig.policy.as_mut(),
        &lode,
        &rig.part,
        collect,
        &CancellationToken::new(),
    )
    .await
}

#[tokio::test]
async fn clean_stream_ends_clean_after_terminal() {
    let mut rig = rig();
    let report = run(&mut rig, &[Frame::Event(item(1)), Frame::Event(complete(2))], false).await;

    assert!(matches!(report.end, StreamEnd::CleanEof));
    assert_eq!(report.terminal, Some(quarry_core::EventType::RunComplete));
    assert_eq!(rig.lode.events().len(), 2);
}

#[tokio::test]
async fn eof_without_terminal_is_premature() {
    let mut rig = rig();
    let report = run(&mut rig, &[Frame::Event(item(1))], false).await;
    assert!(matches!(report.end, StreamEnd::PrematureEof));
    assert!(report.terminal.is_none());
}

#[tokio::test]
async fn run_result_is_recorded_first_wins() {
    let mut rig = rig();
    let first = quarry_core::RunResult { outcome: RunOutcome::completed(), proxy_used: None };
    let second = quarry_core::RunResult {
        outcome: RunOutcome::crash("late and wrong"),
        proxy_used: None,
    };
    let report = run(
        &mut rig,
        &[
            Frame::Event(complete(1)),
            Frame::RunResult(first.clone()),
            Frame::RunResult(second),
        ],
        false,
    )
    .await;

    assert_eq!(report.run_result, Some(first));
}

#[tokio::test]
async fn chunks_flow_through_reassembler_and_policy() {
    let mut rig = rig();
    let report = run(
        &mut rig,
        &[
            Frame::Chunk(chunk("art-1", 1, 4, false)),
            Frame::Chunk(chunk("art-1", 2, 4, true)),
            Frame::Event(commit(1, "art-1", 2, 8)),
            Frame::Event(complete(2)),
        ],
        false,
    )
    .await;

    assert!(matches!(report.end, StreamEnd::CleanEof));
    assert_eq!(rig.lode.chunk_records().len(), 2);
    assert!(report.orphans.is_empty());
}

#[tokio::test]
async fn out_of_order_chunks_abort_the_stream() {
    let mut rig = rig();
    let report = run(
        &mut rig,
        &[
            Frame::Chunk(chunk("art-1", 1, 4, false)),
            Frame::Chunk(chunk("art-1", 3, 4, true)),
            Frame::Event(complete(1)),
        ],
        false,
    )
    .await;

    assert!(matches!(report.end, StreamEnd::StreamError(_)));
    // The terminal after the violation was never consumed
    assert!(report.terminal.is_none());
}

#[tokio::test]
async fn commit_for_unterminated_artifact_aborts() {
    let mut rig = rig();
    let report = run(
        &mut rig,
        &[
            Frame::Chunk(chunk("art-1", 1, 4, false)),
            Frame::Event(commit(1, "art-1", 1, 4)),
        ],
        false,
    )
    .await;
    assert!(matches!(report.end, StreamEnd::StreamError(_)));
}

#[tokio::test]
async fn uncommitted_chunks_surface_as_orphans() {
    let mut rig = rig();
    let report = run(
        &mut rig,
        &[Frame::Chunk(chunk("art-1", 1, 4, true)), Frame::Event(complete(1))],
        false,
    )
    .await;

    assert_eq!(report.orphans, vec![quarry_core::ArtifactId::from_string("art-1")]);
}

#[tokio::test]
async fn oversize_frame_is_fatal_with_nothing_consumed_after() {
    let mut rig = rig();
    // A frame declaring 2x the cap, followed by a valid frame that must
    // never be consumed.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&((2 * quarry_wire::MAX_FRAME) as u32).to_be_bytes());
    let tail = encode_frame(&Frame::Event(complete(1))).expect("encode");
    bytes.extend_from_slice(&(tail.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&tail);
    let mut stdout = std::io::Cursor::new(bytes);

    let lode: Arc<dyn Lode> = Arc::new(rig.lode.clone());
    let report = read_stream(
        &mut stdout,
        rig.policy.as_mut(),
        &lode,
        &rig.part,
        false,
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(report.end, StreamEnd::StreamError(_)));
    assert!(rig.lode.events().is_empty(), "no resynchronization");
}

#[tokio::test]
async fn truncated_frame_is_fatal() {
    let mut rig = rig();
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&100u32.to_be_bytes());
    bytes.extend_from_slice(b"short");
    let mut stdout = std::io::Cursor::new(bytes);

    let lode: Arc<dyn Lode> = Arc::new(rig.lode.clone());
    let report = read_stream(
        &mut stdout,
        rig.policy.as_mut(),
        &lode,
        &rig.part,
        false,
        &CancellationToken::new(),
    )
    .await;
    assert!(matches!(report.end, StreamEnd::StreamError(_)));
}

#[tokio::test]
async fn version_mismatch_aborts() {
    let mut rig = rig();
    let mut bad = item(1);
    bad.contract_version = "99.0.0".to_string();
    let report = run(&mut rig, &[Frame::Event(bad)], false).await;
    assert!(matches!(report.end, StreamEnd::VersionMismatch(_)));
}

#[tokio::test]
async fn policy_failure_ends_the_stream() {
    let mut rig = rig();
    rig.lode.fail_next_events(1);
    let report = run(&mut rig, &[Frame::Event(item(1)), Frame::Event(complete(2))], false).await;
    assert!(matches!(report.end, StreamEnd::PolicyFailure(_)));
}

#[tokio::test]
async fn enqueues_collected_only_when_requested() {
    let mut rig1 = rig();
    let enqueue = envelope(
        1,
        EventPayload::Enqueue {
            spec: quarry_core::EnqueueSpec {
                target: "detail".into(),
                params: Default::default(),
                source: None,
                category: None,
            },
        },
    );
    let frames = [Frame::Event(enqueue), Frame::Event(complete(2))];

    let report = run(&mut rig1, &frames, true).await;
    assert_eq!(report.enqueues.len(), 1);
    assert_eq!(report.enqueues[0].target, "detail");

    let mut rig2 = rig();
    let report = run(&mut rig2, &frames, false).await;
    assert!(report.enqueues.is_empty());
}

#[tokio::test]
async fn file_writes_land_as_sidecars() {
    let mut rig = rig();
    let report = run(
        &mut rig,
        &[
            Frame::FileWrite(quarry_wire::FileWrite {
                path: "pages/1.html".into(),
                data: b"<html>".to_vec(),
            }),
            Frame::Event(complete(1)),
        ],
        false,
    )
    .await;

    assert!(matches!(report.end, StreamEnd::CleanEof));
    assert_eq!(rig.lode.files(), vec![("pages/1.html".to_string(), b"<html>".to_vec())]);
}
