use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::keys::org;
use crate::kv::KeyValueCache;
use crate::models::{ProjectNote, ProjectOrganization, Tag, TodoItem};

/// Typed accessors for the organization namespace.
#[derive(Clone)]
pub struct OrganizationCache {
    cache: KeyValueCache,
}

impl OrganizationCache {
    pub fn new(cache: KeyValueCache) -> Self {
        Self { cache }
    }

    pub fn tags(&self) -> Vec<Tag> {
        self.cache.get(org::TAGS, Vec::new())
    }

    pub fn save_tags(&self, tags: &[Tag]) {
        self.cache.set(org::TAGS, tags);
    }

    /// Organization records keyed by project id.
    pub fn project_organizations(&self) -> BTreeMap<u64, ProjectOrganization> {
        self.cache.get(org::PROJECTS, BTreeMap::new())
    }

    pub fn save_project_organizations(&self, orgs: &BTreeMap<u64, ProjectOrganization>) {
        self.cache.set(org::PROJECTS, orgs);
    }

    pub fn notes(&self) -> BTreeMap<u64, ProjectNote> {
        self.cache.get(org::NOTES, BTreeMap::new())
    }

    pub fn save_notes(&self, notes: &BTreeMap<u64, ProjectNote>) {
        self.cache.set(org::NOTES, notes);
    }

    pub fn todos(&self) -> Vec<TodoItem> {
        self.cache.get(org::TODOS, Vec::new())
    }

    pub fn save_todos(&self, todos: &[TodoItem]) {
        self.cache.set(org::TODOS, todos);
    }

    /// Stored as plain RFC 3339 text, not JSON.
    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.cache.get_raw(org::LAST_SYNC)?;
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn save_last_sync_at(&self, at: DateTime<Utc>) {
        self.cache.set_raw(org::LAST_SYNC, &at.to_rfc3339());
    }

    /// Remove every organization entity key. The migration version is kept.
    pub fn clear(&self) {
        for key in org::ALL {
            self.cache.remove(key);
        }
    }
}
