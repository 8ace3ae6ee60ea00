// SPDX-License-Identifier: MIT

//! Lode: the append-only, Hive-partitioned store Quarry writes into.
//!
//! Records land under `source=<s>/category=<c>/day=<d>/run_id=<r>/
//! event_type=<t>/`. Nothing is ever updated or deleted; orphan-chunk GC
//! is a downstream concern.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod fs;
mod lode;
mod partition;
mod reader;
mod record;
mod s3;

pub use fs::FsLode;
pub use lode::{open_lode, BackendKind, Lode, StorageError};
pub use partition::{partition_dir, sanitize_value, EVENT_TYPE_CHUNK, EVENT_TYPE_METRICS};
pub use reader::{RunSummary, StoreReader};
pub use record::{ChunkLedger, ChunkRecord, MetricsRecord, RecordKind, StoredEvent};
pub use s3::S3Lode;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeLode;
