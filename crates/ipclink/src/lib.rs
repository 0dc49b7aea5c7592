//! Authenticated, framed, typed IPC between one server and one client on
//! the same host.
//!
//! ipclink establishes a length-framed, typed-message stream over a Unix
//! domain socket, with version negotiation, an ephemeral X25519 key
//! exchange, and optional AES-256-GCM transport encryption.
//!
//! # Crate Structure
//!
//! - [`transport`] — Low-level byte-stream endpoints (UDS)
//! - [`crypto`] — Key exchange and message sealing
//! - [`frame`] — Length-prefixed typed-message framing
//! - [`session`] — Handshake, connection lifecycle, and the public API

/// Re-export transport types.
pub mod transport {
    pub use ipclink_transport::*;
}

/// Re-export crypto types.
pub mod crypto {
    pub use ipclink_crypto::*;
}

/// Re-export frame types.
pub mod frame {
    pub use ipclink_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use ipclink_session::*;
}

pub use ipclink_session::{
    dial_and_handshake, dial_and_handshake_async, dial_and_handshake_with_callback, start_server,
    start_server_with_callback, Client, ClientConfig, ClientStatus, Message, Server, ServerConfig,
    ServerStatus, SessionError, Status,
};
