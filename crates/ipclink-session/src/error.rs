use crate::handshake::HandshakeReply;
use crate::status::Status;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The IPC name is empty or contains path separators.
    #[error("invalid IPC name {0:?}")]
    InvalidName(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] ipclink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] ipclink_frame::FrameError),

    /// Key exchange or message sealing error.
    #[error("crypto error: {0}")]
    Crypto(#[from] ipclink_crypto::CryptoError),

    /// Handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The peer answered a handshake step with a non-ok result code.
    #[error("handshake rejected by peer: {0}")]
    HandshakeRejected(HandshakeReply),

    /// The server's negotiated limit is below what this client requires.
    #[error("server only supports messages up to {server_max} bytes (client requires {requested})")]
    MaxMsgSizeBelowRequested { server_max: u32, requested: u32 },

    /// Write called with a reserved message type.
    #[error("message type {0} is reserved (0 or below)")]
    ReservedMsgType(i32),

    /// Write called with data beyond the negotiated maximum.
    #[error("message exceeds maximum message length ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Write called while the connection is not established.
    #[error("cannot write while connection status is {0}")]
    NotConnected(Status),

    /// The incoming or outgoing queue has been closed.
    #[error("the message queue has been closed")]
    QueueClosed,

    /// The connection was closed locally.
    #[error("connection has been closed")]
    Closed,
}

impl SessionError {
    /// True when the error is a dial/reconnect deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            SessionError::Transport(ipclink_transport::TransportError::DialTimeout { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
