//! tracker-core: local-first persistence for the GitHub activity tracker
//!
//! Everything the dashboard keeps between sessions lives in one synchronous
//! string key-value store, one key per entity, each holding JSON text.
//!
//! # Layers
//! - `kv`: `KeyValueStore` backends and the corruption-tolerant `KeyValueCache`
//! - `crypto`: injectable random / KDF / AEAD primitives
//! - `secret`: `SecretStore`, encrypts the access token under a per-install salt
//! - `migration`: versioned, idempotent upgrade steps with a reset path
//! - `machine`: persistent installation id
//! - `sync_queue`: offline mutation outbox (nothing drains it yet)
//! - `organization`: typed reads and writes of tags, per-project organization, notes, todos
//! - `organizer`: validated mutations of that data, each recorded in the sync queue
//! - `auth`: credential record and the login / token flow
//! - `cache`: activity cache, settings and cache-size management
//! - `store`: `TrackerStore`, the handle that wires it all together
//!
//! # Threat model
//! The token key is derived from the stored salt plus a fixed label, not from
//! anything the user types. It hides the token from someone browsing the raw
//! store, not from code running with the same access to it.

pub mod auth;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod kv;
pub mod machine;
pub mod migration;
pub mod models;
pub mod organization;
pub mod organizer;
pub mod paths;
pub mod secret;
pub mod store;
pub mod sync_queue;

pub use config::TrackerConfig;
pub use crypto::CryptoProvider;
pub use error::{MigrationError, OrganizationError, SecretError, StoreError};
pub use kv::{FileStore, KeyValueCache, KeyValueStore, MemoryStore};
pub use migration::{MigrationEngine, MigrationOutcome};
pub use organizer::Organizer;
pub use secret::SecretStore;
pub use store::{StartupReport, TrackerStore};
