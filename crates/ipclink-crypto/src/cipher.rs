use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};

use crate::error::{CryptoError, Result};
use crate::keys::SessionKey;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Bytes a sealed blob adds over its plaintext (nonce prefix + tag).
pub const SEAL_OVERHEAD: usize = NONCE_LEN + TAG_LEN;

/// AES-256-GCM message cipher shared by the reader and writer of one
/// connection.
///
/// Wire layout of a sealed blob: `nonce(12) ‖ ciphertext ‖ tag(16)`, with a
/// fresh random nonce per message and no associated data.
#[derive(Clone)]
pub struct MessageCipher {
    aead: Aes256Gcm,
}

impl MessageCipher {
    /// Build a cipher from a handshake-derived session key.
    pub fn new(key: &SessionKey) -> Self {
        let aead = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        Self { aead }
    }

    /// Seal a plaintext, prefixing the random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .aead
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::Seal)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open a sealed blob. Fails closed on truncation or tampering.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(CryptoError::Open);
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.aead
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Open)
    }
}

impl std::fmt::Debug for MessageCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MessageCipher(aes-256-gcm)")
    }
}
