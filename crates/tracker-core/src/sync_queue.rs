//! Offline mutation outbox.
//!
//! Every local change to organization data appends one item. Nothing in this
//! crate drains the queue; it is a durable record for a future sync client.
//!
//! Items are edited as raw JSON so an entry this build cannot parse is kept
//! as it is. A queue whose text is not a JSON list at all is never
//! overwritten; mutations are skipped until it is reset.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::keys::org;
use crate::kv::KeyValueCache;
use crate::models::{SyncAction, SyncEntity, SyncQueueItem};

#[derive(Clone)]
pub struct SyncQueue {
    cache: KeyValueCache,
}

impl SyncQueue {
    pub fn new(cache: KeyValueCache) -> Self {
        Self { cache }
    }

    /// Readable items in queue order.
    pub fn items(&self) -> Vec<SyncQueueItem> {
        match self.load() {
            Ok(raw) => raw
                .into_iter()
                .filter_map(|value| serde_json::from_value(value).ok())
                .collect(),
            Err(e) => {
                debug!(error = %e, "sync queue unreadable");
                Vec::new()
            }
        }
    }

    /// Pending entries, unreadable ones included.
    pub fn len(&self) -> usize {
        self.load().map(|raw| raw.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn enqueue(&self, entity: SyncEntity, action: SyncAction, payload: Value) -> SyncQueueItem {
        let item = SyncQueueItem {
            id: Uuid::new_v4(),
            entity,
            action,
            payload,
            timestamp: Utc::now(),
            retry_count: 0,
        };
        match self.append(&item) {
            Ok(pending) => debug!(id = %item.id, ?entity, ?action, pending, "queued mutation"),
            Err(e) => warn!(id = %item.id, ?entity, ?action, error = %e, "mutation not queued"),
        }
        item
    }

    pub fn remove(&self, id: Uuid) {
        let Ok(mut raw) = self.load() else {
            return;
        };
        let before = raw.len();
        raw.retain(|value| id_of(value) != Some(id));
        if raw.len() != before {
            self.save(&raw);
        }
    }

    /// Bump the retry counter of one item. Returns `false` if it is not queued.
    pub fn increment_retry(&self, id: Uuid) -> bool {
        let Ok(mut raw) = self.load() else {
            return false;
        };
        let Some(Value::Object(entry)) = raw.iter_mut().find(|value| id_of(value) == Some(id)) else {
            return false;
        };
        let retries = entry.get("retryCount").and_then(Value::as_u64).unwrap_or(0);
        entry.insert("retryCount".into(), Value::from(retries.saturating_add(1)));
        self.save(&raw);
        true
    }

    pub fn clear(&self) {
        self.save(&[]);
    }

    fn load(&self) -> Result<Vec<Value>, StoreError> {
        Ok(self.cache.try_get(org::SYNC_QUEUE)?.unwrap_or_default())
    }

    fn append(&self, item: &SyncQueueItem) -> Result<usize, StoreError> {
        let mut raw = self.load()?;
        raw.push(serde_json::to_value(item)?);
        self.cache.try_set(org::SYNC_QUEUE, &raw)?;
        Ok(raw.len())
    }

    fn save(&self, raw: &[Value]) {
        self.cache.set(org::SYNC_QUEUE, raw);
    }
}

fn id_of(value: &Value) -> Option<Uuid> {
    value
        .get("id")
        .and_then(Value::as_str)
        .and_then(|id| Uuid::parse_str(id).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{KeyValueStore, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    fn queue() -> (Arc<MemoryStore>, SyncQueue) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), SyncQueue::new(KeyValueCache::new(store)))
    }

    fn raw_queue(store: &MemoryStore) -> Vec<Value> {
        serde_json::from_str(&store.get(org::SYNC_QUEUE).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn enqueue_then_remove_leaves_empty_persisted_queue() {
        let (store, queue) = queue();
        let item = queue.enqueue(SyncEntity::Tag, SyncAction::Create, json!({"name": "client"}));
        assert_eq!(item.retry_count, 0);
        assert_eq!(queue.len(), 1);

        queue.remove(item.id);
        assert!(queue.is_empty());
        assert_eq!(store.get(org::SYNC_QUEUE).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn increment_retry_touches_only_target() {
        let (_, queue) = queue();
        let a = queue.enqueue(SyncEntity::Note, SyncAction::Update, json!({"projectId": 1}));
        let b = queue.enqueue(SyncEntity::Todo, SyncAction::Delete, json!({"id": "t"}));
        let before = queue.items();

        assert!(queue.increment_retry(b.id));
        let after = queue.items();
        assert_eq!(after.len(), 2);
        assert_eq!(after[0], before[0]);
        assert_eq!(after[0], a);
        assert_eq!(after[1].retry_count, before[1].retry_count + 1);
        assert_eq!(
            SyncQueueItem {
                retry_count: before[1].retry_count,
                ..after[1].clone()
            },
            before[1]
        );

        assert!(queue.increment_retry(b.id));
        assert_eq!(queue.items()[1].retry_count, 2);
        assert_eq!(queue.items()[0], a);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let (_, queue) = queue();
        queue.enqueue(SyncEntity::Machine, SyncAction::Update, json!(null));
        assert!(!queue.increment_retry(Uuid::new_v4()));
        queue.remove(Uuid::new_v4());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn order_is_preserved_and_clear_empties() {
        let (_, queue) = queue();
        let ids: Vec<_> = (0..3)
            .map(|i| queue.enqueue(SyncEntity::ProjectOrg, SyncAction::Update, json!({"projectId": i})).id)
            .collect();
        let stored: Vec<_> = queue.items().into_iter().map(|item| item.id).collect();
        assert_eq!(stored, ids);
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn unreadable_entries_survive_mutations() {
        let (store, queue) = queue();
        let foreign = json!({"id": "not-a-uuid", "type": "board", "action": "archive"});
        store.set(org::SYNC_QUEUE, &json!([foreign.clone()]).to_string()).unwrap();

        let item = queue.enqueue(SyncEntity::Tag, SyncAction::Delete, json!({}));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.items(), vec![item.clone()]);

        assert!(queue.increment_retry(item.id));
        queue.remove(item.id);
        assert_eq!(raw_queue(&store), vec![foreign]);
    }

    #[test]
    fn corrupt_queue_is_never_overwritten() {
        let (store, queue) = queue();
        store.set(org::SYNC_QUEUE, "[{broken").unwrap();
        assert!(queue.is_empty());

        let item = queue.enqueue(SyncEntity::Tag, SyncAction::Delete, json!({}));
        assert!(!queue.increment_retry(item.id));
        queue.remove(item.id);
        assert_eq!(store.get(org::SYNC_QUEUE).unwrap().as_deref(), Some("[{broken"));

        queue.clear();
        queue.enqueue(SyncEntity::Tag, SyncAction::Delete, json!({}));
        assert_eq!(queue.len(), 1);
    }
}
