use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AuthSession;
use crate::cache::{LocalCache, DEFAULT_MAX_CACHE_BYTES};
use crate::config::TrackerConfig;
use crate::crypto::CryptoProvider;
use crate::error::StoreError;
use crate::kv::{FileStore, KeyValueCache, KeyValueStore};
use crate::machine::MachineIdentity;
use crate::migration::{MigrationEngine, MigrationOutcome};
use crate::organization::OrganizationCache;
use crate::organizer::Organizer;
use crate::paths;
use crate::sync_queue::SyncQueue;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupReport {
    pub migration: MigrationOutcome,
    pub machine_id: Uuid,
}

/// Central handle: one backend, one crypto provider, and accessors for every
/// component built on them.
#[derive(Clone)]
pub struct TrackerStore {
    cache: KeyValueCache,
    crypto: CryptoProvider,
    max_cache_bytes: u64,
}

impl TrackerStore {
    /// File-backed store under the resolved data directory.
    pub fn open(config: &TrackerConfig) -> Result<Self, StoreError> {
        Self::open_at(&config.resolve_data_dir()?, config)
    }

    /// File-backed store in `dir`, ignoring `config.data_dir`. Always uses
    /// the platform primitives at the standard PBKDF2 cost.
    pub fn open_at(dir: &Path, config: &TrackerConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        let backend = FileStore::open(paths::store_path(dir))?;
        info!(path = %backend.path().display(), "opened store");
        Ok(Self {
            cache: KeyValueCache::new(Arc::new(backend)),
            crypto: CryptoProvider::default(),
            max_cache_bytes: config.max_cache_bytes,
        })
    }

    pub fn with_backend(store: Arc<dyn KeyValueStore>, crypto: CryptoProvider) -> Self {
        Self {
            cache: KeyValueCache::new(store),
            crypto,
            max_cache_bytes: DEFAULT_MAX_CACHE_BYTES,
        }
    }

    pub fn cache(&self) -> &KeyValueCache {
        &self.cache
    }

    pub fn crypto(&self) -> &CryptoProvider {
        &self.crypto
    }

    pub fn migrations(&self) -> MigrationEngine {
        MigrationEngine::new(self.cache.clone())
    }

    pub fn machine(&self) -> MachineIdentity {
        MachineIdentity::new(self.cache.clone())
    }

    pub fn sync_queue(&self) -> SyncQueue {
        SyncQueue::new(self.cache.clone())
    }

    pub fn organization(&self) -> OrganizationCache {
        OrganizationCache::new(self.cache.clone())
    }

    pub fn organizer(&self) -> Organizer {
        Organizer::new(self.cache.clone())
    }

    pub fn auth(&self) -> AuthSession {
        AuthSession::new(self.cache.clone(), self.crypto.clone())
    }

    pub fn local(&self) -> LocalCache {
        LocalCache::new(self.cache.clone(), self.max_cache_bytes)
    }

    /// Migrations first, then machine identity. Must run before feature code
    /// reads organization or auth data.
    pub fn startup(&self) -> StartupReport {
        let migration = self.migrations().run();
        if !migration.success {
            warn!(errors = ?migration.errors, "startup migration failed; reset may be needed");
        }
        let machine_id = self.machine().get_or_create();
        info!(
            version = migration.version,
            machine_id = %machine_id,
            "startup complete"
        );
        StartupReport {
            migration,
            machine_id,
        }
    }
}
