use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use sha2::Sha256;

use super::{AeadCipher, KeyDerivation, RandomBytes};
use crate::error::SecretError;

pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// AES-256 key length.
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce length (96 bits).
pub const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomBytes for OsRandom {
    fn fill(&self, buf: &mut [u8]) -> Result<(), SecretError> {
        rand::rngs::OsRng
            .try_fill_bytes(buf)
            .map_err(|e| SecretError::Unavailable(format!("os rng: {e}")))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Pbkdf2Sha256 {
    iterations: u32,
}

impl Pbkdf2Sha256 {
    pub fn new(iterations: u32) -> Self {
        Self { iterations }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl Default for Pbkdf2Sha256 {
    fn default() -> Self {
        Self::new(PBKDF2_ITERATIONS)
    }
}

impl KeyDerivation for Pbkdf2Sha256 {
    fn derive(&self, password: &[u8], salt: &[u8], out: &mut [u8]) -> Result<(), SecretError> {
        if self.iterations == 0 {
            return Err(SecretError::Crypto("pbkdf2: zero iterations".into()));
        }
        pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, self.iterations, out);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Aes256GcmCipher;

impl AeadCipher for Aes256GcmCipher {
    fn key_len(&self) -> usize {
        KEY_LEN
    }

    fn nonce_len(&self) -> usize {
        NONCE_LEN
    }

    fn seal(&self, key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, SecretError> {
        if nonce.len() != NONCE_LEN {
            return Err(SecretError::Crypto("aes-gcm: bad nonce length".into()));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| SecretError::Crypto(format!("aes-gcm key: {e}")))?;
        cipher
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|_| SecretError::Crypto("aes-gcm encrypt".into()))
    }

    fn open(&self, key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, SecretError> {
        if nonce.len() != NONCE_LEN {
            return Err(SecretError::Decryption);
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| SecretError::Crypto(format!("aes-gcm key: {e}")))?;
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SecretError::Decryption)
    }
}
