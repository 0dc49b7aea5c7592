//! Length-prefixed, typed, optionally sealed message framing.
//!
//! Every frame on the wire is:
//! - A 4-byte big-endian payload length
//! - The payload: a 4-byte big-endian signed message type followed by the
//!   message data, sealed as one AEAD blob when the connection negotiated
//!   encryption
//!
//! No partial reads, no buffer management in user code.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, frame_ceiling, split_typed, WireMessage, LEN_PREFIX, TYPE_PREFIX,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
