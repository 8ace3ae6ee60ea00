// SPDX-License-Identifier: MIT

use super::*;
use crate::policy::test_support::{chunk, commit, complete, item, log, part};
use crate::policy::{IngestPolicy, PolicyConfig, PolicyKind};
use quarry_core::FlushTrigger;
use quarry_storage::FakeLode;

fn config() -> PolicyConfig {
    PolicyConfig {
        kind: PolicyKind::Streaming,
        flush_mode: Default::default(),
        max_events: None,
        max_bytes: None,
        flush_count: None,
        flush_interval: None,
    }
}

fn policy(lode: &FakeLode, config: &PolicyConfig) -> StreamingPolicy {
    StreamingPolicy::new(config, Arc::new(lode.clone()), part(), CancellationToken::new())
}

#[tokio::test]
async fn count_trigger_fires_exactly_at_n() {
    let lode = FakeLode::new();
    let mut p = policy(&lode, &PolicyConfig { flush_count: Some(3), ..config() });

    p.ingest_event(item(1)).await.unwrap();
    p.ingest_event(item(2)).await.unwrap();
    assert!(lode.events().is_empty());

    p.ingest_event(item(3)).await.unwrap();
    // One batch with all three events in emission order
    assert_eq!(lode.event_batch_sizes(), vec![3]);
    let seqs: Vec<u64> = lode.events().iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);

    let stats = p.stats();
    assert_eq!(stats.trigger_count(FlushTrigger::Count), 1);
    assert_eq!(stats.buffer_len, 0);
}

#[tokio::test(start_paused = true)]
async fn interval_trigger_flushes_buffered_events() {
    let lode = FakeLode::new();
    let mut p = policy(
        &lode,
        &PolicyConfig { flush_interval: Some(Duration::from_secs(5)), ..config() },
    );

    p.ingest_event(item(1)).await.unwrap();
    assert!(lode.events().is_empty());

    tokio::time::sleep(Duration::from_secs(6)).await;
    tokio::task::yield_now().await;

    assert_eq!(lode.events().len(), 1);
    assert_eq!(p.stats().trigger_count(FlushTrigger::Interval), 1);
}

#[tokio::test(start_paused = true)]
async fn interval_on_empty_buffer_writes_nothing() {
    let lode = FakeLode::new();
    let p = policy(
        &lode,
        &PolicyConfig { flush_interval: Some(Duration::from_secs(1)), ..config() },
    );

    tokio::time::sleep(Duration::from_secs(5)).await;
    tokio::task::yield_now().await;

    assert!(lode.events().is_empty());
    assert!(lode.event_batch_sizes().is_empty(), "no storage writes at all");
    assert_eq!(p.stats().flushes, 0);
    drop(p);
}

#[tokio::test]
async fn terminal_event_triggers_termination_flush() {
    let lode = FakeLode::new();
    let mut p = policy(&lode, &PolicyConfig { flush_count: Some(100), ..config() });

    p.ingest_event(item(1)).await.unwrap();
    p.ingest_event(complete(2)).await.unwrap();

    assert_eq!(lode.events().len(), 2);
    assert_eq!(p.stats().trigger_count(FlushTrigger::Termination), 1);
}

#[tokio::test]
async fn capacity_trigger_flushes_when_bound_hit() {
    let lode = FakeLode::new();
    let mut p = policy(
        &lode,
        &PolicyConfig { flush_count: Some(100), max_events: Some(2), ..config() },
    );

    p.ingest_event(item(1)).await.unwrap();
    p.ingest_event(item(2)).await.unwrap();
    // Third ingest finds the buffer at bound and flushes before pushing
    p.ingest_event(item(3)).await.unwrap();

    assert_eq!(p.stats().trigger_count(FlushTrigger::Capacity), 1);
    assert_eq!(lode.events().len(), 2);
}

#[tokio::test]
async fn streaming_never_drops_droppables() {
    let lode = FakeLode::new();
    let mut p = policy(&lode, &PolicyConfig { flush_count: Some(2), ..config() });

    p.ingest_event(log(1)).await.unwrap();
    p.ingest_event(log(2)).await.unwrap();
    p.ingest_event(item(3)).await.unwrap();
    p.flush().await.unwrap();

    let stats = p.stats();
    assert_eq!(stats.events_dropped, 0, "streaming drops nothing, ever");
    assert_eq!(stats.events_persisted, 3);
    assert!(stats.dropped_by_type.is_empty());
}

#[tokio::test(start_paused = true)]
async fn full_buffer_blocks_until_flush_succeeds() {
    let lode = FakeLode::new();
    let mut p = policy(
        &lode,
        &PolicyConfig { flush_count: Some(100), max_events: Some(2), ..config() },
    );

    p.ingest_event(item(1)).await.unwrap();
    p.ingest_event(item(2)).await.unwrap();

    // Storage refuses twice: the capacity flush fails, ingest blocks, and
    // the retry loop eventually gets through.
    lode.fail_next_events(2);
    p.ingest_event(item(3)).await.unwrap();

    assert!(p.stats().errors >= 1);
    assert_eq!(lode.events().len(), 2, "blocked ingest resumed after a successful flush");
    // The third event is buffered, not dropped
    assert_eq!(p.stats().buffer_len, 1);
}

#[tokio::test]
async fn cancellation_unblocks_with_error() {
    let lode = FakeLode::new();
    let cancel = CancellationToken::new();
    let mut p = StreamingPolicy::new(
        &PolicyConfig { flush_count: Some(100), max_events: Some(1), ..config() },
        Arc::new(lode.clone()),
        part(),
        cancel.clone(),
    );

    p.ingest_event(item(1)).await.unwrap();
    lode.fail_next_events(u32::MAX);
    cancel.cancel();

    let err = p.ingest_event(item(2)).await.unwrap_err();
    assert!(matches!(err, PolicyError::Cancelled));
}

#[tokio::test]
async fn chunks_flush_before_events_within_a_flush() {
    let lode = FakeLode::new();
    let mut p = policy(&lode, &PolicyConfig { flush_count: Some(100), ..config() });

    p.ingest_chunk(chunk("art-1", 1, 8, true)).await.unwrap();
    p.ingest_event(commit(1, "art-1", 1, 8)).await.unwrap();
    p.flush().await.unwrap();

    assert_eq!(lode.chunk_records().len(), 1);
    assert_eq!(lode.events().len(), 1);
}

#[tokio::test]
async fn commit_in_later_flush_after_chunks_persisted_earlier() {
    // Artifact B's chunks persist in flush 1; its commit arrives in flush
    // 2 together with artifact A's chunks. The ordering invariant holds
    // because B's chunks are already durable.
    let lode = FakeLode::new();
    let mut p = policy(&lode, &PolicyConfig { flush_count: Some(100), ..config() });

    p.ingest_chunk(chunk("art-b", 1, 8, true)).await.unwrap();
    p.flush().await.unwrap();
    assert_eq!(lode.chunk_records().len(), 1);

    p.ingest_chunk(chunk("art-a", 1, 8, true)).await.unwrap();
    p.ingest_event(commit(1, "art-b", 1, 8)).await.unwrap();
    p.flush().await.unwrap();

    assert_eq!(lode.chunk_records().len(), 2);
    assert_eq!(lode.events().len(), 1);
}

#[tokio::test]
async fn flush_failure_retains_buffer_and_counts_error() {
    let lode = FakeLode::new();
    let mut p = policy(&lode, &PolicyConfig { flush_count: Some(100), ..config() });

    p.ingest_event(item(1)).await.unwrap();
    lode.fail_next_events(1);
    assert!(p.flush().await.is_err());

    let stats = p.stats();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.buffer_len, 1);

    p.flush().await.unwrap();
    assert_eq!(lode.events().len(), 1);
}

#[tokio::test]
async fn close_drains_and_failure_is_policy_failure() {
    let lode = FakeLode::new();
    let mut p = policy(&lode, &PolicyConfig { flush_count: Some(100), ..config() });

    p.ingest_event(item(1)).await.unwrap();
    p.close().await.unwrap();
    assert_eq!(lode.events().len(), 1);

    let lode = FakeLode::new();
    let mut p = policy(&lode, &PolicyConfig { flush_count: Some(100), ..config() });
    p.ingest_event(log(1)).await.unwrap();
    lode.fail_next_events(10);
    let err = p.close().await.unwrap_err();
    // Even a droppable left behind is loss under streaming
    assert!(matches!(err, PolicyError::NonDroppable { .. }));
}

#[tokio::test]
async fn multiple_empty_flushes_are_no_ops() {
    let lode = FakeLode::new();
    let mut p = policy(&lode, &PolicyConfig { flush_count: Some(10), ..config() });

    p.flush().await.unwrap();
    p.flush().await.unwrap();
    assert_eq!(p.stats().flushes, 0);
    assert!(lode.event_batch_sizes().is_empty());
}
