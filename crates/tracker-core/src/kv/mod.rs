//! Synchronous key-value layer.
//!
//! `KeyValueStore` is the narrow seam to whatever physically persists
//! strings. `KeyValueCache` sits on top and turns every backend failure or
//! malformed value into the caller's fallback, so a damaged cache never takes
//! the dashboard down. Cached data can always be re-fetched from the remote
//! side.

mod file;
mod memory;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::StoreError;

pub use file::FileStore;
pub use memory::MemoryStore;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// JSON view over a [`KeyValueStore`]. Cheap to clone.
///
/// There is no in-memory layer: every call goes to the backend.
#[derive(Clone)]
pub struct KeyValueCache {
    store: Option<Arc<dyn KeyValueStore>>,
}

impl KeyValueCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store: Some(store) }
    }

    /// A cache with no backing store at all. Reads return fallbacks, writes
    /// do nothing.
    pub fn detached() -> Self {
        Self { store: None }
    }

    pub fn is_attached(&self) -> bool {
        self.store.is_some()
    }

    /// Read and deserialize `key`, or return `fallback`.
    pub fn get<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        match self.try_get(key) {
            Ok(Some(value)) => value,
            Ok(None) => fallback,
            Err(e) => {
                debug!(key, error = %e, "discarding cache entry");
                fallback
            }
        }
    }

    /// Like [`get`](Self::get) but reports why a present value was unusable.
    pub fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let raw = match self.backend()?.get(key)? {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(None),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::CorruptData {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    /// Raw stored text. Empty strings count as missing.
    pub fn get_raw(&self, key: &str) -> Option<String> {
        let store = self.store.as_ref()?;
        match store.get(key) {
            Ok(Some(raw)) if !raw.is_empty() => Some(raw),
            Ok(_) => None,
            Err(e) => {
                debug!(key, error = %e, "cache read failed");
                None
            }
        }
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = self.try_set(key, value) {
            warn!(key, error = %e, "cache write skipped");
        }
    }

    pub fn try_set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let text = serde_json::to_string(value)?;
        self.try_set_raw(key, &text)
    }

    pub fn set_raw(&self, key: &str, value: &str) {
        if let Err(e) = self.try_set_raw(key, value) {
            warn!(key, error = %e, "cache write skipped");
        }
    }

    pub fn try_set_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.backend()?.set(key, value)
    }

    pub fn remove(&self, key: &str) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if let Err(e) = store.remove(key) {
            warn!(key, error = %e, "cache remove skipped");
        }
    }

    /// Remove every key starting with `prefix`; returns how many went.
    pub fn remove_by_prefix(&self, prefix: &str) -> usize {
        let Some(store) = self.store.as_ref() else {
            return 0;
        };
        let keys = match store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(prefix, error = %e, "cannot enumerate keys for prefix wipe");
                return 0;
            }
        };
        let mut removed = 0;
        for key in keys.iter().filter(|k| k.starts_with(prefix)) {
            match store.remove(key) {
                Ok(()) => removed += 1,
                Err(e) => warn!(key = key.as_str(), error = %e, "cache remove skipped"),
            }
        }
        removed
    }

    /// Total UTF-8 byte length of the text stored under `keys`.
    pub fn size_of<I, S>(&self, keys: I) -> u64
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        keys.into_iter()
            .filter_map(|key| self.get_raw(key.as_ref()))
            .map(|raw| raw.len() as u64)
            .sum()
    }

    fn backend(&self) -> Result<&Arc<dyn KeyValueStore>, StoreError> {
        self.store
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("no key-value store attached".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    fn cache() -> (Arc<MemoryStore>, KeyValueCache) {
        let store = Arc::new(MemoryStore::new());
        let cache = KeyValueCache::new(store.clone());
        (store, cache)
    }

    #[test]
    fn set_then_get_returns_value() {
        let (_, cache) = cache();
        let value = Sample { name: "a".into(), count: 3 };
        cache.set("k", &value);
        let read: Option<Sample> = cache.get("k", None);
        assert_eq!(read, Some(value));
    }

    #[test]
    fn corrupt_value_returns_fallback() {
        let (store, cache) = cache();
        store.set("k", "{not json").unwrap();
        let read: Vec<Sample> = cache.get("k", Vec::new());
        assert!(read.is_empty());
        assert!(matches!(
            cache.try_get::<Vec<Sample>>("k"),
            Err(StoreError::CorruptData { .. })
        ));
    }

    #[test]
    fn wrong_shape_returns_fallback() {
        let (store, cache) = cache();
        store.set("k", r#"{"name": 7}"#).unwrap();
        let read: Option<Sample> = cache.get("k", None);
        assert_eq!(read, None);
    }

    #[test]
    fn unavailable_store_falls_back_and_skips_writes() {
        let (store, cache) = cache();
        cache.set("k", &1u32);
        store.set_available(false);
        assert_eq!(cache.get("k", 0u32), 0);
        cache.set("k", &2u32);
        assert!(cache.try_set("k", &2u32).is_err());
        store.set_available(true);
        assert_eq!(cache.get("k", 0u32), 1);
    }

    #[test]
    fn detached_cache_is_inert() {
        let cache = KeyValueCache::detached();
        cache.set("k", &5u32);
        assert_eq!(cache.get("k", 9u32), 9);
        assert_eq!(cache.remove_by_prefix(""), 0);
        assert!(matches!(
            cache.try_set_raw("k", "v"),
            Err(StoreError::Unavailable(_))
        ));
    }

    #[test]
    fn remove_by_prefix_only_touches_prefix() {
        let (store, cache) = cache();
        cache.set_raw("app-org-a", "1");
        cache.set_raw("app-org-b", "2");
        cache.set_raw("app-other", "3");
        assert_eq!(cache.remove_by_prefix("app-org-"), 2);
        assert_eq!(store.keys().unwrap(), vec!["app-other".to_string()]);
    }

    #[test]
    fn size_of_counts_utf8_bytes_of_present_keys() {
        let (_, cache) = cache();
        cache.set_raw("a", "abc");
        cache.set_raw("b", "à");
        assert_eq!(cache.size_of(["a", "b", "missing"]), 5);
    }
}
