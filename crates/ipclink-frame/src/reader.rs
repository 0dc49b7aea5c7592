use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use ipclink_crypto::MessageCipher;

use crate::codec::{decode_frame, frame_ceiling, split_typed, WireMessage};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete typed messages from any `Read` stream.
///
/// Handles partial reads internally — callers always get complete,
/// decrypted messages. One reader exists per active connection.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    cipher: Option<MessageCipher>,
    ceiling: usize,
}

impl<T: Read> FrameReader<T> {
    /// Create a reader for a connection with the negotiated maximum message
    /// size and cipher (present when the handshake agreed on encryption).
    pub fn new(inner: T, cipher: Option<MessageCipher>, max_msg_size: u32) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            cipher,
            ceiling: frame_ceiling(max_msg_size),
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached, and
    /// `Err(FrameError::Crypto(_))` when a frame fails to decrypt — the
    /// stream itself stays consistent, so the caller may keep reading.
    pub fn read_message(&mut self) -> Result<WireMessage> {
        let body = loop {
            if let Some(body) = decode_frame(&mut self.buf, self.ceiling)? {
                break body;
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        };

        let payload = match &self.cipher {
            Some(cipher) => Bytes::from(cipher.open(&body)?),
            None => body,
        };

        split_typed(payload)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, BytesMut};
    use ipclink_crypto::KeyExchange;

    use super::*;
    use crate::codec::encode_frame;

    const MAX: u32 = 64 * 1024;

    fn cipher_pair() -> (MessageCipher, MessageCipher) {
        let a = KeyExchange::generate();
        let b = KeyExchange::generate();
        let a_pub = a.public_bytes();
        let b_pub = b.public_bytes();
        (
            MessageCipher::new(&a.derive(&b_pub).unwrap()),
            MessageCipher::new(&b.derive(&a_pub).unwrap()),
        )
    }

    #[test]
    fn read_single_message() {
        let mut wire = BytesMut::new();
        encode_frame(2, b"hello", None, &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()), None, MAX);
        let msg = reader.read_message().unwrap();

        assert_eq!(msg.msg_type, 2);
        assert_eq!(msg.data.as_ref(), b"hello");
    }

    #[test]
    fn read_multiple_messages_in_order() {
        let mut wire = BytesMut::new();
        encode_frame(1, b"one", None, &mut wire).unwrap();
        encode_frame(2, b"two", None, &mut wire).unwrap();
        encode_frame(3, b"three", None, &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()), None, MAX);

        for (expected_type, expected_data) in [(1, &b"one"[..]), (2, b"two"), (3, b"three")] {
            let msg = reader.read_message().unwrap();
            assert_eq!(msg.msg_type, expected_type);
            assert_eq!(msg.data.as_ref(), expected_data);
        }
    }

    #[test]
    fn read_encrypted_message() {
        let (seal, open) = cipher_pair();
        let mut wire = BytesMut::new();
        encode_frame(5, b"sealed payload", Some(&seal), &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()), Some(open), MAX);
        let msg = reader.read_message().unwrap();

        assert_eq!(msg.msg_type, 5);
        assert_eq!(msg.data.as_ref(), b"sealed payload");
    }

    #[test]
    fn tampered_frame_reports_crypto_error_and_stream_continues() {
        let (seal, open) = cipher_pair();
        let mut wire = BytesMut::new();
        encode_frame(2, b"first", Some(&seal), &mut wire).unwrap();
        let first_end = wire.len();
        encode_frame(2, b"second", Some(&seal), &mut wire).unwrap();

        // Corrupt the first frame's last ciphertext byte.
        wire[first_end - 1] ^= 0x01;

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()), Some(open), MAX);

        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::Crypto(_)));

        let msg = reader.read_message().unwrap();
        assert_eq!(msg.data.as_ref(), b"second");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()), None, MAX);
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut partial = BytesMut::new();
        partial.put_u32(16);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()), None, MAX);
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn oversize_frame_rejected() {
        let mut wire = BytesMut::new();
        wire.put_u32(frame_ceiling(16) as u32 + 1);

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()), None, 16);
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { .. }));
    }

    #[test]
    fn partial_read_handling() {
        let mut wire = BytesMut::new();
        encode_frame(4, b"slow", None, &mut wire).unwrap();

        let mut reader = FrameReader::new(
            ByteByByteReader {
                bytes: wire.to_vec(),
                pos: 0,
            },
            None,
            MAX,
        );

        let msg = reader.read_message().unwrap();
        assert_eq!(msg.msg_type, 4);
        assert_eq!(msg.data.as_ref(), b"slow");
    }

    #[test]
    fn interrupted_read_retries() {
        let mut wire = BytesMut::new();
        encode_frame(6, b"ok", None, &mut wire).unwrap();

        let mut reader = FrameReader::new(
            InterruptedThenData {
                interrupted: false,
                bytes: wire.to_vec(),
                pos: 0,
            },
            None,
            MAX,
        );

        let msg = reader.read_message().unwrap();
        assert_eq!(msg.data.as_ref(), b"ok");
    }

    #[test]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left, None, MAX);
        let mut reader = FrameReader::new(right, None, MAX);

        writer.send(2, b"ping").unwrap();
        let msg = reader.read_message().unwrap();

        assert_eq!(msg.msg_type, 2);
        assert_eq!(msg.data.as_ref(), b"ping");
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }
}
