//! Connection establishment handshake.
//!
//! Performed once over the raw stream before any framed traffic, always
//! initiated by the server:
//!
//! 1. Version and encryption mode (unencrypted): server sends
//!    `[version, mode]`, client answers with a result byte.
//! 2. Key exchange (only when both sides are encrypted): each side sends
//!    its 32-byte X25519 public key, server first.
//! 3. Maximum message size: server sends its limit as a length-prefixed
//!    (and, when encrypted, sealed) big-endian `u32`; client answers with
//!    a result byte.

use std::io::{Read, Write};

use ipclink_crypto::{KeyExchange, MessageCipher, PUBLIC_KEY_LEN, SEAL_OVERHEAD};
use ipclink_transport::IpcStream;
use tracing::debug;

use crate::error::{Result, SessionError};

/// Protocol version carried in the first handshake byte.
pub const IPC_VERSION: u8 = 2;

const MODE_PLAIN: u8 = 0;
const MODE_ENCRYPTED: u8 = 1;

/// Result byte a client answers handshake steps with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeReply {
    Ok = 0,
    VersionMismatch = 1,
    EncryptionRequired = 2,
    MaxMsgSizeTooBig = 3,
}

impl HandshakeReply {
    pub fn from_byte(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(HandshakeReply::Ok),
            1 => Some(HandshakeReply::VersionMismatch),
            2 => Some(HandshakeReply::EncryptionRequired),
            3 => Some(HandshakeReply::MaxMsgSizeTooBig),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for HandshakeReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            HandshakeReply::Ok => "ok",
            HandshakeReply::VersionMismatch => "client reports a protocol version mismatch",
            HandshakeReply::EncryptionRequired => {
                "client requires encryption, server offered plain"
            }
            HandshakeReply::MaxMsgSizeTooBig => {
                "client requires a larger maximum message size than the server supports"
            }
        };
        f.write_str(text)
    }
}

/// What a completed handshake agreed on.
#[derive(Debug)]
pub struct HandshakeOutcome {
    /// Present iff both sides agreed on encrypted mode.
    pub cipher: Option<MessageCipher>,
    /// Message size limit both sides honor from here on.
    pub max_msg_size: u32,
}

/// Run the server side of the handshake over a freshly accepted stream.
pub fn server_handshake(
    stream: &mut IpcStream,
    encryption: bool,
    max_msg_size: u32,
) -> Result<HandshakeOutcome> {
    // Step 1: version and mode.
    let mode = if encryption { MODE_ENCRYPTED } else { MODE_PLAIN };
    stream
        .write_all(&[IPC_VERSION, mode])
        .map_err(|err| step_err("sending version exchange", err))?;
    read_reply(stream, "version exchange")?;

    // Step 2: key exchange.
    let cipher = if encryption {
        Some(server_key_exchange(stream)?)
    } else {
        None
    };

    // Step 3: maximum message size.
    send_max_msg_size(stream, cipher.as_ref(), max_msg_size)?;
    read_reply(stream, "message size negotiation")?;

    debug!(max_msg_size, encrypted = cipher.is_some(), "server handshake complete");
    Ok(HandshakeOutcome {
        cipher,
        max_msg_size,
    })
}

/// Run the client side of the handshake after dialing.
///
/// `require_encryption` aborts if the server offers plain mode; otherwise
/// the client follows the server's mode. `configured_max` of zero adopts
/// the server's limit; a non-zero value must fit within it.
pub fn client_handshake(
    stream: &mut IpcStream,
    require_encryption: bool,
    configured_max: u32,
) -> Result<HandshakeOutcome> {
    // Step 1: version and mode.
    let mut hello = [0u8; 2];
    stream
        .read_exact(&mut hello)
        .map_err(|err| step_err("receiving version exchange", err))?;

    if hello[0] != IPC_VERSION {
        send_reply_best_effort(stream, HandshakeReply::VersionMismatch);
        return Err(SessionError::Handshake(format!(
            "server protocol version is {}, expected {IPC_VERSION}",
            hello[0]
        )));
    }

    let server_encrypted = hello[1] != MODE_PLAIN;
    if !server_encrypted && require_encryption {
        send_reply_best_effort(stream, HandshakeReply::EncryptionRequired);
        return Err(SessionError::Handshake(
            "server offers plain transport, client requires encryption".to_string(),
        ));
    }

    send_reply(stream, HandshakeReply::Ok)?;

    // Step 2: key exchange, following the server's mode.
    let cipher = if server_encrypted {
        Some(client_key_exchange(stream)?)
    } else {
        None
    };

    // Step 3: maximum message size.
    let server_max = recv_max_msg_size(stream, cipher.as_ref())?;

    if configured_max > 0 && server_max < configured_max {
        send_reply_best_effort(stream, HandshakeReply::MaxMsgSizeTooBig);
        return Err(SessionError::MaxMsgSizeBelowRequested {
            server_max,
            requested: configured_max,
        });
    }

    let max_msg_size = if configured_max == 0 {
        server_max
    } else {
        configured_max
    };

    send_reply(stream, HandshakeReply::Ok)?;

    debug!(max_msg_size, encrypted = cipher.is_some(), "client handshake complete");
    Ok(HandshakeOutcome {
        cipher,
        max_msg_size,
    })
}

fn server_key_exchange(stream: &mut IpcStream) -> Result<MessageCipher> {
    let exchange = KeyExchange::generate();

    stream
        .write_all(&exchange.public_bytes())
        .map_err(|err| step_err("sending public key", err))?;

    let mut peer = [0u8; PUBLIC_KEY_LEN];
    stream
        .read_exact(&mut peer)
        .map_err(|err| step_err("receiving public key", err))?;

    Ok(MessageCipher::new(&exchange.derive(&peer)?))
}

fn client_key_exchange(stream: &mut IpcStream) -> Result<MessageCipher> {
    let exchange = KeyExchange::generate();

    let mut peer = [0u8; PUBLIC_KEY_LEN];
    stream
        .read_exact(&mut peer)
        .map_err(|err| step_err("receiving public key", err))?;

    stream
        .write_all(&exchange.public_bytes())
        .map_err(|err| step_err("sending public key", err))?;

    Ok(MessageCipher::new(&exchange.derive(&peer)?))
}

fn send_max_msg_size(
    stream: &mut IpcStream,
    cipher: Option<&MessageCipher>,
    max_msg_size: u32,
) -> Result<()> {
    let body = max_msg_size.to_be_bytes().to_vec();
    let body = match cipher {
        Some(cipher) => cipher.seal(&body)?,
        None => body,
    };

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);

    stream
        .write_all(&frame)
        .map_err(|err| step_err("sending max message size", err))
}

fn recv_max_msg_size(stream: &mut IpcStream, cipher: Option<&MessageCipher>) -> Result<u32> {
    let mut len_prefix = [0u8; 4];
    stream
        .read_exact(&mut len_prefix)
        .map_err(|err| step_err("receiving max message size", err))?;

    let body_len = u32::from_be_bytes(len_prefix) as usize;
    if body_len == 0 || body_len > 4 + SEAL_OVERHEAD {
        return Err(SessionError::Handshake(format!(
            "unexpected max message size frame length {body_len}"
        )));
    }

    let mut body = vec![0u8; body_len];
    stream
        .read_exact(&mut body)
        .map_err(|err| step_err("receiving max message size", err))?;

    let body = match cipher {
        Some(cipher) => cipher.open(&body)?,
        None => body,
    };

    // The decrypted value is authoritative; nothing else in the frame is.
    let max: [u8; 4] = body
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            SessionError::Handshake("max message size payload is shorter than 4 bytes".to_string())
        })?;
    Ok(u32::from_be_bytes(max))
}

fn read_reply(stream: &mut IpcStream, step: &str) -> Result<()> {
    let mut reply = [0u8; 1];
    stream
        .read_exact(&mut reply)
        .map_err(|err| step_err(&format!("receiving {step} reply"), err))?;

    match HandshakeReply::from_byte(reply[0]) {
        Some(HandshakeReply::Ok) => Ok(()),
        Some(reply) => Err(SessionError::HandshakeRejected(reply)),
        None => Err(SessionError::Handshake(format!(
            "unknown handshake result code {}",
            reply[0]
        ))),
    }
}

fn send_reply(stream: &mut IpcStream, reply: HandshakeReply) -> Result<()> {
    stream
        .write_all(&[reply.as_byte()])
        .map_err(|err| step_err("sending handshake reply", err))
}

fn send_reply_best_effort(stream: &mut IpcStream, reply: HandshakeReply) {
    // The handshake is already failing; the reply is a courtesy.
    let _ = stream.write_all(&[reply.as_byte()]);
}

fn step_err(step: &str, err: std::io::Error) -> SessionError {
    SessionError::Handshake(format!("{step}: {err}"))
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;
    use std::thread;

    use super::*;

    fn stream_pair() -> (IpcStream, IpcStream) {
        let (left, right) = UnixStream::pair().unwrap();
        (IpcStream::from_unix(left), IpcStream::from_unix(right))
    }

    #[test]
    fn plain_handshake_agrees_on_server_limit() {
        let (mut server, mut client) = stream_pair();

        let server_side = thread::spawn(move || server_handshake(&mut server, false, 2048));
        let client_result = client_handshake(&mut client, false, 0).unwrap();
        let server_result = server_side.join().unwrap().unwrap();

        assert!(client_result.cipher.is_none());
        assert!(server_result.cipher.is_none());
        assert_eq!(client_result.max_msg_size, 2048);
        assert_eq!(server_result.max_msg_size, 2048);
    }

    #[test]
    fn client_keeps_smaller_configured_limit() {
        let (mut server, mut client) = stream_pair();

        let server_side = thread::spawn(move || server_handshake(&mut server, false, 4096));
        let client_result = client_handshake(&mut client, false, 1024).unwrap();
        server_side.join().unwrap().unwrap();

        assert_eq!(client_result.max_msg_size, 1024);
    }

    #[test]
    fn encrypted_handshake_derives_matching_ciphers() {
        let (mut server, mut client) = stream_pair();

        let server_side = thread::spawn(move || server_handshake(&mut server, true, 4096));
        let client_result = client_handshake(&mut client, true, 0).unwrap();
        let server_result = server_side.join().unwrap().unwrap();

        let seal = server_result.cipher.expect("server cipher");
        let open = client_result.cipher.expect("client cipher");

        let sealed = seal.seal(b"handshake check").unwrap();
        assert_eq!(open.open(&sealed).unwrap(), b"handshake check");
    }

    #[test]
    fn client_follows_server_into_encrypted_mode() {
        let (mut server, mut client) = stream_pair();

        let server_side = thread::spawn(move || server_handshake(&mut server, true, 4096));
        // Client did not ask for encryption but the server offers it.
        let client_result = client_handshake(&mut client, false, 0).unwrap();
        server_side.join().unwrap().unwrap();

        assert!(client_result.cipher.is_some());
    }

    #[test]
    fn version_mismatch_aborts_both_sides() {
        let (mut fake_server, mut client) = stream_pair();

        let peer = thread::spawn(move || {
            fake_server.write_all(&[1, MODE_PLAIN]).unwrap();
            let mut reply = [0u8; 1];
            fake_server.read_exact(&mut reply).unwrap();
            reply[0]
        });

        let err = client_handshake(&mut client, false, 0).unwrap_err();
        assert!(matches!(err, SessionError::Handshake(_)));
        assert_eq!(peer.join().unwrap(), HandshakeReply::VersionMismatch.as_byte());
    }

    #[test]
    fn encryption_mismatch_aborts_both_sides() {
        let (mut server, mut client) = stream_pair();

        let server_side = thread::spawn(move || server_handshake(&mut server, false, 2048));
        let client_err = client_handshake(&mut client, true, 0).unwrap_err();
        let server_err = server_side.join().unwrap().unwrap_err();

        assert!(matches!(client_err, SessionError::Handshake(_)));
        assert!(matches!(
            server_err,
            SessionError::HandshakeRejected(HandshakeReply::EncryptionRequired)
        ));
    }

    #[test]
    fn client_rejects_server_limit_below_its_own() {
        let (mut server, mut client) = stream_pair();

        let server_side = thread::spawn(move || server_handshake(&mut server, false, 2048));
        let client_err = client_handshake(&mut client, false, 4096).unwrap_err();
        let server_err = server_side.join().unwrap().unwrap_err();

        match client_err {
            SessionError::MaxMsgSizeBelowRequested {
                server_max,
                requested,
            } => {
                assert_eq!(server_max, 2048);
                assert_eq!(requested, 4096);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            server_err,
            SessionError::HandshakeRejected(HandshakeReply::MaxMsgSizeTooBig)
        ));
    }

    #[test]
    fn encrypted_max_size_negotiation_roundtrips() {
        let (mut server, mut client) = stream_pair();

        let server_side = thread::spawn(move || server_handshake(&mut server, true, 8192));
        let client_result = client_handshake(&mut client, true, 0).unwrap();
        server_side.join().unwrap().unwrap();

        assert_eq!(client_result.max_msg_size, 8192);
    }

    #[test]
    fn truncated_peer_aborts_with_descriptive_error() {
        let (fake_server, mut client) = stream_pair();
        drop(fake_server);

        let err = client_handshake(&mut client, false, 0).unwrap_err();
        assert!(matches!(err, SessionError::Handshake(_)));
    }

    #[test]
    fn reply_codes_roundtrip_bytes() {
        for reply in [
            HandshakeReply::Ok,
            HandshakeReply::VersionMismatch,
            HandshakeReply::EncryptionRequired,
            HandshakeReply::MaxMsgSizeTooBig,
        ] {
            assert_eq!(HandshakeReply::from_byte(reply.as_byte()), Some(reply));
        }
        assert_eq!(HandshakeReply::from_byte(9), None);
    }
}
