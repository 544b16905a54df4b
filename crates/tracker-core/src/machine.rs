use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::keys::org;
use crate::kv::KeyValueCache;
use crate::models::MachineInfo;

/// Persistent random id for this installation.
#[derive(Clone)]
pub struct MachineIdentity {
    cache: KeyValueCache,
}

impl MachineIdentity {
    pub fn new(cache: KeyValueCache) -> Self {
        Self { cache }
    }

    pub fn info(&self) -> Option<MachineInfo> {
        self.cache.get(org::MACHINE, None)
    }

    /// Return the stored id after bumping `last_seen_at`, or mint a new one.
    ///
    /// If the store is unavailable the id is still returned, it just will not
    /// survive the process.
    pub fn get_or_create(&self) -> Uuid {
        let now = Utc::now();
        match self.info() {
            Some(mut machine) => {
                machine.last_seen_at = now;
                self.cache.set(org::MACHINE, &machine);
                debug!(machine_id = %machine.id, "machine seen");
                machine.id
            }
            None => {
                let machine = MachineInfo {
                    id: Uuid::new_v4(),
                    name: String::new(),
                    created_at: now,
                    last_seen_at: now,
                };
                self.cache.set(org::MACHINE, &machine);
                info!(machine_id = %machine.id, "registered new machine");
                machine.id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{KeyValueStore, MemoryStore};
    use std::sync::Arc;

    #[test]
    fn first_call_creates_identity() {
        let identity = MachineIdentity::new(KeyValueCache::new(Arc::new(MemoryStore::new())));
        assert!(identity.info().is_none());
        let id = identity.get_or_create();
        let info = identity.info().unwrap();
        assert_eq!(info.id, id);
        assert_eq!(info.created_at, info.last_seen_at);
        assert!(info.name.is_empty());
    }

    #[test]
    fn later_calls_keep_id_and_bump_last_seen() {
        let identity = MachineIdentity::new(KeyValueCache::new(Arc::new(MemoryStore::new())));
        let id = identity.get_or_create();
        let created = identity.info().unwrap().created_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(identity.get_or_create(), id);
        let info = identity.info().unwrap();
        assert_eq!(info.created_at, created);
        assert!(info.last_seen_at > created);
    }

    #[test]
    fn corrupt_record_is_replaced() {
        let store = Arc::new(MemoryStore::new());
        store.set(org::MACHINE, "{\"id\": 12}").unwrap();
        let identity = MachineIdentity::new(KeyValueCache::new(store));
        let id = identity.get_or_create();
        assert_eq!(identity.info().unwrap().id, id);
    }

    #[test]
    fn unavailable_store_still_yields_an_id() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let identity = MachineIdentity::new(KeyValueCache::new(store));
        let a = identity.get_or_create();
        let b = identity.get_or_create();
        assert_ne!(a, b);
    }
}
