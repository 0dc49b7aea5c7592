//! Connection encryption primitives for ipclink.
//!
//! One ephemeral X25519 keypair per connection; the raw shared secret is
//! hashed with SHA-256 into an AES-256-GCM key. Every sealed message
//! carries a fresh random 12-byte nonce prefixed to the ciphertext.

pub mod cipher;
pub mod error;
pub mod keys;

pub use cipher::{MessageCipher, NONCE_LEN, SEAL_OVERHEAD, TAG_LEN};
pub use error::{CryptoError, Result};
pub use keys::{KeyExchange, SessionKey, PUBLIC_KEY_LEN};
