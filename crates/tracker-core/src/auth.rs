use tracing::{info, warn};

use crate::crypto::CryptoProvider;
use crate::error::SecretError;
use crate::keys::cache;
use crate::kv::KeyValueCache;
use crate::models::Credential;
use crate::secret::SecretStore;

/// Credential record plus the login / logout / token flow.
#[derive(Clone)]
pub struct AuthSession {
    cache: KeyValueCache,
    crypto: CryptoProvider,
}

impl AuthSession {
    pub fn new(cache: KeyValueCache, crypto: CryptoProvider) -> Self {
        Self { cache, crypto }
    }

    pub fn credentials(&self) -> Option<Credential> {
        self.cache.get(cache::AUTH, None)
    }

    pub fn save_credentials(&self, credential: &Credential) {
        self.cache.set(cache::AUTH, credential);
    }

    /// Logout.
    pub fn clear(&self) {
        self.cache.remove(cache::AUTH);
    }

    /// Store `username`, and the token encrypted under a fresh salt when one
    /// is given. Replaces any previous credential.
    pub async fn login(
        &self,
        username: &str,
        token: Option<&str>,
    ) -> Result<Credential, SecretError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(SecretError::Validation("username cannot be empty".into()));
        }

        let credential = match token {
            Some(token) => {
                let secrets = SecretStore::initialize(self.crypto.clone(), None)?;
                let encrypted = secrets.encrypt(token).await?;
                Credential {
                    username: username.to_string(),
                    encrypted_token: Some(encrypted),
                    salt: Some(secrets.salt().to_string()),
                }
            }
            None => Credential {
                username: username.to_string(),
                encrypted_token: None,
                salt: None,
            },
        };

        self.save_credentials(&credential);
        info!(
            username = %credential.username,
            with_token = credential.encrypted_token.is_some(),
            "logged in"
        );
        Ok(credential)
    }

    /// The plaintext token, or `None` when there is no usable credential.
    pub async fn decrypted_token(&self) -> Option<String> {
        let credential = self.credentials()?;
        let encrypted = credential.encrypted_token.filter(|t| !t.is_empty())?;
        let salt = credential.salt.filter(|s| !s.is_empty())?;

        let result = match SecretStore::initialize(self.crypto.clone(), Some(&salt)) {
            Ok(secrets) => secrets.decrypt(&encrypted).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(error = %e, "stored token could not be decrypted");
                None
            }
        }
    }
}
