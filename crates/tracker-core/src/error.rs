use thiserror::Error;

/// Failures of the underlying key-value backend.
///
/// `KeyValueCache` swallows every one of these on the read path and on plain
/// `set`; only the `try_*` writers surface them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Corrupt data under {key}: {reason}")]
    CorruptData { key: String, reason: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cryptographic primitives unavailable: {0}")]
    Unavailable(String),

    #[error("Decryption failed: wrong salt or corrupted ciphertext")]
    Decryption,

    #[error("Crypto error: {0}")]
    Crypto(String),
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration v{version} ({name}) failed: {reason}")]
    Step {
        version: u32,
        name: &'static str,
        reason: String,
    },

    #[error("No migration registered for v{0}")]
    MissingStep(u32),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Rejected organization mutations. Nothing is written when one of these is
/// returned.
#[derive(Debug, Error)]
pub enum OrganizationError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Limit reached: {0}")]
    LimitReached(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
