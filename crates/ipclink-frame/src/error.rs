/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The message data exceeds the negotiated maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An inbound frame announced a length beyond the read-path ceiling.
    #[error("frame too large ({size} bytes, ceiling {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The decoded payload is shorter than the message-type prefix.
    #[error("payload truncated ({0} bytes, need at least 4)")]
    Truncated(usize),

    /// Sealing or opening the payload failed.
    #[error(transparent)]
    Crypto(#[from] ipclink_crypto::CryptoError),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
