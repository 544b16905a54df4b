//! Deterministic doubles for the crypto traits.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use super::{AeadCipher, Aes256GcmCipher, CryptoProvider, KeyDerivation, Pbkdf2Sha256, RandomBytes};
use crate::error::SecretError;

/// Reproducible byte stream from a fixed seed.
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomBytes for SeededRandom {
    fn fill(&self, buf: &mut [u8]) -> Result<(), SecretError> {
        self.rng.lock().fill_bytes(buf);
        Ok(())
    }
}

/// Stands in for an environment without crypto support.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailablePrimitives;

impl UnavailablePrimitives {
    fn err() -> SecretError {
        SecretError::Unavailable("no cryptographic primitives in this environment".into())
    }
}

impl RandomBytes for UnavailablePrimitives {
    fn fill(&self, _buf: &mut [u8]) -> Result<(), SecretError> {
        Err(Self::err())
    }
}

impl KeyDerivation for UnavailablePrimitives {
    fn derive(&self, _password: &[u8], _salt: &[u8], _out: &mut [u8]) -> Result<(), SecretError> {
        Err(Self::err())
    }
}

impl AeadCipher for UnavailablePrimitives {
    fn key_len(&self) -> usize {
        32
    }

    fn nonce_len(&self) -> usize {
        12
    }

    fn seal(&self, _key: &[u8], _nonce: &[u8], _plaintext: &[u8]) -> Result<Vec<u8>, SecretError> {
        Err(Self::err())
    }

    fn open(&self, _key: &[u8], _nonce: &[u8], _ciphertext: &[u8]) -> Result<Vec<u8>, SecretError> {
        Err(Self::err())
    }
}

/// Real cipher and KDF with a cheap iteration count and seeded randomness.
pub fn fast_provider(seed: u64) -> CryptoProvider {
    CryptoProvider::new(
        Arc::new(SeededRandom::new(seed)),
        Arc::new(Pbkdf2Sha256::new(1_000)),
        Arc::new(Aes256GcmCipher),
    )
}

pub fn unavailable_provider() -> CryptoProvider {
    CryptoProvider::new(
        Arc::new(UnavailablePrimitives),
        Arc::new(UnavailablePrimitives),
        Arc::new(UnavailablePrimitives),
    )
}
