// SPDX-License-Identifier: MIT

//! Length-prefixed frame codec.
//!
//! A frame is `u32be length || payload`. The payload is msgpack with named
//! (map) encoding — `rmp_serde::to_vec_named` — because frame discrimination
//! reads the `type` key out of the decoded map. Oversize and truncated
//! frames are fatal stream errors: no resynchronization is attempted.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum total frame size: prefix + payload.
pub const MAX_FRAME: usize = 16 * 1024 * 1024;

/// Maximum payload size (total frame minus the 4-byte prefix).
pub const MAX_PAYLOAD: usize = MAX_FRAME - 4;

/// Maximum artifact chunk raw data size, before msgpack wrapping.
pub const MAX_CHUNK_DATA: usize = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame payload of {len} bytes exceeds the {max} byte cap")]
    Oversize { len: usize, max: usize },
    #[error("truncated frame: expected {expected} payload bytes")]
    Truncated { expected: usize },
    #[error("frame encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("frame decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Encode a payload to msgpack map encoding, without the length prefix.
pub fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    let payload = rmp_serde::to_vec_named(value)?;
    if payload.len() > MAX_PAYLOAD {
        return Err(WireError::Oversize { len: payload.len(), max: MAX_PAYLOAD });
    }
    Ok(payload)
}

/// Decode a msgpack payload into a concrete type.
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, WireError> {
    Ok(rmp_serde::from_slice(payload)?)
}

/// Write one frame: length prefix then payload.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), WireError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(WireError::Oversize { len: payload.len(), max: MAX_PAYLOAD });
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame's payload.
///
/// Returns `Ok(None)` on clean EOF at a frame boundary. EOF inside the
/// prefix or payload is `WireError::Truncated`; a declared length above
/// the cap is `WireError::Oversize`. Both are fatal to the stream.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Vec<u8>>, WireError> {
    let mut prefix = [0u8; 4];
    let mut filled = 0;
    while filled < prefix.len() {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(WireError::Truncated { expected: 4 });
        }
        filled += n;
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_PAYLOAD {
        return Err(WireError::Oversize { len, max: MAX_PAYLOAD });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            WireError::Truncated { expected: len }
        } else {
            WireError::Io(e)
        }
    })?;
    Ok(Some(payload))
}

/// Blocking variant of [`write_frame`] for the executor side, where emits
/// serialize through one mutex and block on pipe backpressure.
pub fn write_frame_blocking<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), WireError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(WireError::Oversize { len: payload.len(), max: MAX_PAYLOAD });
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Blocking variant of [`read_frame`].
pub fn read_frame_blocking<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, WireError> {
    let mut prefix = [0u8; 4];
    let mut filled = 0;
    while filled < prefix.len() {
        let n = reader.read(&mut prefix[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(WireError::Truncated { expected: 4 });
        }
        filled += n;
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_PAYLOAD {
        return Err(WireError::Oversize { len, max: MAX_PAYLOAD });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            WireError::Truncated { expected: len }
        } else {
            WireError::Io(e)
        }
    })?;
    Ok(Some(payload))
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
