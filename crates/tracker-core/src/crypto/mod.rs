//! Cryptographic primitives behind narrow traits.
//!
//! - `platform`: OS randomness, PBKDF2-HMAC-SHA256, AES-256-GCM
//! - `testing`: deterministic randomness and always-unavailable doubles
//!
//! No custom crypto: the platform implementations are thin wrappers over
//! RustCrypto crates.

pub mod platform;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::sync::Arc;

use crate::error::SecretError;

pub use platform::{Aes256GcmCipher, OsRandom, Pbkdf2Sha256};

/// Cryptographically secure random bytes.
pub trait RandomBytes: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> Result<(), SecretError>;
}

/// Password-based key derivation into `out.len()` bytes.
pub trait KeyDerivation: Send + Sync {
    fn derive(&self, password: &[u8], salt: &[u8], out: &mut [u8]) -> Result<(), SecretError>;
}

/// Authenticated symmetric encryption. `seal` output is ciphertext + tag.
pub trait AeadCipher: Send + Sync {
    fn key_len(&self) -> usize;
    fn nonce_len(&self) -> usize;
    fn seal(&self, key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, SecretError>;
    /// Must fail with [`SecretError::Decryption`] when the tag does not verify.
    fn open(&self, key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, SecretError>;
}

/// The full set of primitives a [`crate::SecretStore`] needs.
#[derive(Clone)]
pub struct CryptoProvider {
    pub random: Arc<dyn RandomBytes>,
    pub kdf: Arc<dyn KeyDerivation>,
    pub cipher: Arc<dyn AeadCipher>,
}

impl CryptoProvider {
    pub fn new(
        random: Arc<dyn RandomBytes>,
        kdf: Arc<dyn KeyDerivation>,
        cipher: Arc<dyn AeadCipher>,
    ) -> Self {
        Self {
            random,
            kdf,
            cipher,
        }
    }

    /// OS randomness, PBKDF2 at `iterations` rounds, AES-256-GCM.
    pub fn platform(iterations: u32) -> Self {
        Self::new(
            Arc::new(OsRandom),
            Arc::new(Pbkdf2Sha256::new(iterations)),
            Arc::new(Aes256GcmCipher),
        )
    }
}

impl Default for CryptoProvider {
    fn default() -> Self {
        Self::platform(platform::PBKDF2_ITERATIONS)
    }
}
