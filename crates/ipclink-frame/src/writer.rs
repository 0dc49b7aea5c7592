use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use ipclink_crypto::MessageCipher;

use crate::codec::encode_frame;
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete typed messages to any `Write` stream.
///
/// One writer exists per active connection; the connection state machine
/// swaps the whole writer when the underlying connection is replaced.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    cipher: Option<MessageCipher>,
    max_msg_size: u32,
}

impl<T: Write> FrameWriter<T> {
    /// Create a writer for a connection with the negotiated maximum message
    /// size and cipher (present when the handshake agreed on encryption).
    pub fn new(inner: T, cipher: Option<MessageCipher>, max_msg_size: u32) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            cipher,
            max_msg_size,
        }
    }

    /// Encode, seal, and send one message (blocking).
    pub fn send(&mut self, msg_type: i32, data: &[u8]) -> Result<()> {
        if data.len() > self.max_msg_size as usize {
            return Err(FrameError::PayloadTooLarge {
                size: data.len(),
                max: self.max_msg_size as usize,
            });
        }

        self.buf.clear();
        encode_frame(msg_type, data, self.cipher.as_ref(), &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
