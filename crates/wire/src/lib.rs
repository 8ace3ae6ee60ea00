// SPDX-License-Identifier: MIT

//! IPC protocol between the Quarry runtime and its executor child.
//!
//! Wire format: 4-byte length prefix (big-endian) + msgpack payload,
//! map-encoded so the decoded object's `type` field discriminates frames.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod chunker;
mod codec;
mod frame;

pub use chunker::chunk_artifact;
pub use codec::{
    decode_payload, encode_payload, read_frame, read_frame_blocking, write_frame,
    write_frame_blocking, WireError, MAX_CHUNK_DATA, MAX_FRAME, MAX_PAYLOAD,
};
pub use frame::{decode_frame, encode_frame, FileWrite, Frame};
