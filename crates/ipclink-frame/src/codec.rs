use bytes::{Buf, BufMut, Bytes, BytesMut};
use ipclink_crypto::{MessageCipher, SEAL_OVERHEAD};

use crate::error::{FrameError, Result};

/// Length prefix: 4 bytes, big-endian unsigned.
pub const LEN_PREFIX: usize = 4;

/// Message-type prefix inside the payload: 4 bytes, big-endian signed.
pub const TYPE_PREFIX: usize = 4;

/// A decoded message as it appeared on the wire.
///
/// `msg_type > 0` is user traffic; `msg_type ≤ 0` is reserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub msg_type: i32,
    pub data: Bytes,
}

/// Largest inbound frame body accepted for a negotiated maximum message
/// size: the data, its type prefix, and the seal overhead of an encrypted
/// payload.
pub fn frame_ceiling(max_msg_size: u32) -> usize {
    max_msg_size as usize + TYPE_PREFIX + SEAL_OVERHEAD
}

/// Encode one message into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬─────────────────────────────────────────┐
/// │ Length       │ Payload (Length bytes)                  │
/// │ (4B BE)      │ msg_type (4B BE) ‖ data                 │
/// │              │ — sealed as one blob when encrypted —   │
/// └──────────────┴─────────────────────────────────────────┘
/// ```
pub fn encode_frame(
    msg_type: i32,
    data: &[u8],
    cipher: Option<&MessageCipher>,
    dst: &mut BytesMut,
) -> Result<()> {
    let mut payload = Vec::with_capacity(TYPE_PREFIX + data.len());
    payload.extend_from_slice(&msg_type.to_be_bytes());
    payload.extend_from_slice(data);

    let payload = match cipher {
        Some(cipher) => cipher.seal(&payload)?,
        None => payload,
    };

    dst.reserve(LEN_PREFIX + payload.len());
    dst.put_u32(payload.len() as u32);
    dst.put_slice(&payload);
    Ok(())
}

/// Decode one frame body from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. The returned body
/// is still sealed when the connection is encrypted.
pub fn decode_frame(src: &mut BytesMut, ceiling: usize) -> Result<Option<Bytes>> {
    if src.len() < LEN_PREFIX {
        return Ok(None); // Need more data
    }

    let body_len = u32::from_be_bytes(src[..LEN_PREFIX].try_into().expect("4-byte slice")) as usize;

    if body_len > ceiling {
        return Err(FrameError::FrameTooLarge {
            size: body_len,
            max: ceiling,
        });
    }

    if src.len() < LEN_PREFIX + body_len {
        return Ok(None); // Need more data
    }

    src.advance(LEN_PREFIX);
    Ok(Some(src.split_to(body_len).freeze()))
}

/// Split a decrypted payload into its message type and data.
pub fn split_typed(payload: Bytes) -> Result<WireMessage> {
    if payload.len() < TYPE_PREFIX {
        return Err(FrameError::Truncated(payload.len()));
    }

    let msg_type = i32::from_be_bytes(payload[..TYPE_PREFIX].try_into().expect("4-byte slice"));
    Ok(WireMessage {
        msg_type,
        data: payload.slice(TYPE_PREFIX..),
    })
}
