use rand_core::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::error::{CryptoError, Result};

/// Size of an X25519 public key on the wire.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Symmetric key derived from the handshake, ready to seed an AEAD cipher.
pub struct SessionKey([u8; 32]);

impl SessionKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material never reaches logs.
        f.write_str("SessionKey(<redacted>)")
    }
}

/// One side of an ephemeral X25519 Diffie-Hellman exchange.
///
/// Generated fresh per connection; the secret is consumed by
/// [`KeyExchange::derive`], so a keypair cannot outlive its handshake.
pub struct KeyExchange {
    secret: EphemeralSecret,
    public: PublicKey,
}

impl KeyExchange {
    /// Generate a fresh ephemeral keypair.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// The 32-byte public key to send to the peer.
    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.public.to_bytes()
    }

    /// Derive the session key from the peer's public key.
    ///
    /// The key is `SHA-256(X25519(own_secret, peer_public))`. A peer public
    /// key that collapses the exchange to zero is rejected.
    pub fn derive(self, peer_public: &[u8]) -> Result<SessionKey> {
        let peer: [u8; PUBLIC_KEY_LEN] = peer_public
            .try_into()
            .map_err(|_| CryptoError::BadPublicKeyLength(peer_public.len()))?;

        let shared = self.secret.diffie_hellman(&PublicKey::from(peer));
        if !shared.was_contributory() {
            return Err(CryptoError::DegenerateSharedSecret);
        }

        let digest = Sha256::digest(shared.as_bytes());
        Ok(SessionKey(digest.into()))
    }
}

impl std::fmt::Debug for KeyExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyExchange")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_derive_the_same_key() {
        let server = KeyExchange::generate();
        let client = KeyExchange::generate();

        let server_pub = server.public_bytes();
        let client_pub = client.public_bytes();

        let server_key = server.derive(&client_pub).unwrap();
        let client_key = client.derive(&server_pub).unwrap();

        assert_eq!(server_key.as_bytes(), client_key.as_bytes());
    }

    #[test]
    fn distinct_exchanges_yield_distinct_keys() {
        let a1 = KeyExchange::generate();
        let b1 = KeyExchange::generate();
        let b1_pub = b1.public_bytes();
        let key1 = a1.derive(&b1_pub).unwrap();

        let a2 = KeyExchange::generate();
        let b2 = KeyExchange::generate();
        let b2_pub = b2.public_bytes();
        let key2 = a2.derive(&b2_pub).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn rejects_wrong_length_public_key() {
        let exchange = KeyExchange::generate();
        let err = exchange.derive(&[0u8; 16]).unwrap_err();
        assert!(matches!(err, CryptoError::BadPublicKeyLength(16)));
    }

    #[test]
    fn rejects_all_zero_public_key() {
        let exchange = KeyExchange::generate();
        let err = exchange.derive(&[0u8; 32]).unwrap_err();
        assert!(matches!(err, CryptoError::DegenerateSharedSecret));
    }

    #[test]
    fn debug_output_redacts_key_material() {
        let server = KeyExchange::generate();
        let client = KeyExchange::generate();
        let client_pub = client.public_bytes();
        let key = server.derive(&client_pub).unwrap();
        assert_eq!(format!("{key:?}"), "SessionKey(<redacted>)");
    }
}
