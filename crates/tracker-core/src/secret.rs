//! SecretStore: encryption of the GitHub access token at rest.
//!
//! Ciphertext wire format (standard base64):
//!   [ nonce (12 bytes) | ciphertext + tag ]
//!
//! Key derivation: PBKDF2-HMAC-SHA256 over `KEY_LABEL + salt_text`, with the
//! decoded salt bytes as the PBKDF2 salt.
//!
//! # Limitation
//! There is no passphrase. Anyone who can read the stored salt can rebuild
//! the key, so this keeps the token out of plain sight in the store and
//! nothing more. Code running with access to the store can decrypt it.

use base64::{engine::general_purpose, Engine as _};
use zeroize::Zeroizing;

use crate::crypto::CryptoProvider;
use crate::error::SecretError;

pub const SALT_LEN: usize = 16;

/// Fixed application label mixed into the key material.
pub const KEY_LABEL: &str = "github-tracker-";

/// Fresh random salt, base64-encoded.
pub fn generate_salt(crypto: &CryptoProvider) -> Result<String, SecretError> {
    let mut salt = [0u8; SALT_LEN];
    crypto.random.fill(&mut salt)?;
    Ok(general_purpose::STANDARD.encode(salt))
}

/// Encrypts and decrypts one secret string under a fixed salt.
///
/// The salt is chosen at construction and never changes; build a new store
/// to switch salts.
#[derive(Clone)]
pub struct SecretStore {
    crypto: CryptoProvider,
    salt: String,
    salt_bytes: Vec<u8>,
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStore").field("salt", &self.salt).finish()
    }
}

impl SecretStore {
    /// Adopt `existing_salt`, or generate a new one when it is absent or blank.
    pub fn initialize(
        crypto: CryptoProvider,
        existing_salt: Option<&str>,
    ) -> Result<Self, SecretError> {
        let salt = match existing_salt.map(str::trim).filter(|s| !s.is_empty()) {
            Some(salt) => salt.to_string(),
            None => generate_salt(&crypto)?,
        };
        let salt_bytes = general_purpose::STANDARD
            .decode(&salt)
            .map_err(|e| SecretError::Validation(format!("salt is not base64: {e}")))?;
        if salt_bytes.is_empty() {
            return Err(SecretError::Validation("salt decodes to zero bytes".into()));
        }
        Ok(Self {
            crypto,
            salt,
            salt_bytes,
        })
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    pub async fn encrypt(&self, plaintext: &str) -> Result<String, SecretError> {
        if plaintext.trim().is_empty() {
            return Err(SecretError::Validation("token cannot be empty".into()));
        }
        let this = self.clone();
        let plaintext = Zeroizing::new(plaintext.as_bytes().to_vec());
        run_blocking(move || this.encrypt_blocking(&plaintext)).await
    }

    pub async fn decrypt(&self, ciphertext: &str) -> Result<String, SecretError> {
        if ciphertext.trim().is_empty() {
            return Err(SecretError::Validation("ciphertext cannot be empty".into()));
        }
        let this = self.clone();
        let ciphertext = ciphertext.trim().to_string();
        run_blocking(move || this.decrypt_blocking(&ciphertext)).await
    }

    fn derive_key(&self) -> Result<Zeroizing<Vec<u8>>, SecretError> {
        let material = Zeroizing::new(format!("{KEY_LABEL}{}", self.salt));
        let mut key = Zeroizing::new(vec![0u8; self.crypto.cipher.key_len()]);
        self.crypto
            .kdf
            .derive(material.as_bytes(), &self.salt_bytes, &mut key)?;
        Ok(key)
    }

    fn encrypt_blocking(&self, plaintext: &[u8]) -> Result<String, SecretError> {
        let key = self.derive_key()?;
        let mut nonce = vec![0u8; self.crypto.cipher.nonce_len()];
        self.crypto.random.fill(&mut nonce)?;
        let sealed = self.crypto.cipher.seal(&key, &nonce, plaintext)?;

        let mut out = Vec::with_capacity(nonce.len() + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(general_purpose::STANDARD.encode(out))
    }

    fn decrypt_blocking(&self, ciphertext: &str) -> Result<String, SecretError> {
        let combined = general_purpose::STANDARD
            .decode(ciphertext)
            .map_err(|_| SecretError::Decryption)?;
        let nonce_len = self.crypto.cipher.nonce_len();
        if combined.len() <= nonce_len {
            return Err(SecretError::Decryption);
        }
        let (nonce, sealed) = combined.split_at(nonce_len);
        let key = self.derive_key()?;
        let plaintext = Zeroizing::new(self.crypto.cipher.open(&key, nonce, sealed)?);
        String::from_utf8(plaintext.to_vec()).map_err(|_| SecretError::Decryption)
    }
}

async fn run_blocking<F, T>(f: F) -> Result<T, SecretError>
where
    F: FnOnce() -> Result<T, SecretError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SecretError::Crypto(format!("crypto task aborted: {e}")))?
}
