/// Errors from key exchange and message sealing.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The peer's public key has the wrong length.
    #[error("peer public key is {0} bytes, expected 32")]
    BadPublicKeyLength(usize),

    /// The Diffie-Hellman output was all zeroes (non-contributory peer key).
    #[error("degenerate shared secret from key exchange")]
    DegenerateSharedSecret,

    /// Sealing a message failed.
    #[error("message encryption failed")]
    Seal,

    /// Opening a sealed message failed (truncated or tampered).
    #[error("message decryption failed")]
    Open,
}

pub type Result<T> = std::result::Result<T, CryptoError>;
