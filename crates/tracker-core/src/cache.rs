//! Activity cache written by the remote client, plus settings and
//! housekeeping.
//!
//! Remote payloads (profile, repositories, commits, weeks, stats) are kept as
//! raw JSON. Reads fall back to empty values and writes are logged no-ops
//! when the store is unavailable; everything here can be re-fetched.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::keys::{self, cache};
use crate::kv::KeyValueCache;
use crate::models::{ActivityCache, ActivityCacheUpdate, CacheMetadata, Settings, CACHE_VERSION};

pub const DEFAULT_MAX_CACHE_BYTES: u64 = 50 * 1024 * 1024;

/// Current-week activity older than this is re-fetched. Past weeks never go
/// stale.
pub const CURRENT_WEEK_MAX_AGE_SECS: i64 = 60 * 60;

/// `true` when there was no sync yet or the last one is more than an hour
/// before `now`.
pub fn is_current_week_stale(last_sync: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_sync {
        None => true,
        Some(last) => now - last > Duration::seconds(CURRENT_WEEK_MAX_AGE_SECS),
    }
}

#[derive(Clone)]
pub struct LocalCache {
    cache: KeyValueCache,
    max_bytes: u64,
}

impl LocalCache {
    pub fn new(cache: KeyValueCache, max_bytes: u64) -> Self {
        Self { cache, max_bytes }
    }

    pub fn settings(&self) -> Settings {
        self.cache.get(cache::SETTINGS, Settings::default())
    }

    pub fn save_settings(&self, settings: &Settings) {
        self.cache.set(cache::SETTINGS, settings);
    }

    /// Read-modify-write of the settings record.
    pub fn update_settings<F>(&self, f: F) -> Settings
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.settings();
        f(&mut settings);
        self.save_settings(&settings);
        settings
    }

    pub fn user_profile(&self) -> Option<Value> {
        self.cache.get(cache::USER_PROFILE, None)
    }

    pub fn save_user_profile(&self, profile: &Value) {
        self.cache.set(cache::USER_PROFILE, profile);
    }

    pub fn repositories(&self) -> Vec<Value> {
        self.cache.get(cache::REPOSITORIES, Vec::new())
    }

    pub fn save_repositories(&self, repos: &[Value]) {
        self.cache.set(cache::REPOSITORIES, repos);
    }

    /// Shallow-merge `updates` into the repository with `id`. Returns `false`
    /// when no such repository is cached.
    pub fn update_repository(&self, id: u64, updates: &serde_json::Map<String, Value>) -> bool {
        let mut repos = self.repositories();
        let Some(Value::Object(repo)) = repos
            .iter_mut()
            .find(|repo| repo.get("id").and_then(Value::as_u64) == Some(id))
        else {
            return false;
        };
        for (field, value) in updates {
            repo.insert(field.clone(), value.clone());
        }
        self.save_repositories(&repos);
        true
    }

    pub fn commits(&self) -> Vec<Value> {
        self.cache.get(cache::COMMITS, Vec::new())
    }

    pub fn save_commits(&self, commits: &[Value]) {
        self.cache.set(cache::COMMITS, commits);
    }

    /// Append commits whose `sha` is not cached yet; returns how many were
    /// added. Commits without a `sha` are always appended.
    pub fn add_commits(&self, new_commits: Vec<Value>) -> usize {
        let mut commits = self.commits();
        let mut seen: HashSet<String> = commits.iter().filter_map(sha_of).collect();
        let before = commits.len();
        for commit in new_commits {
            match sha_of(&commit) {
                Some(sha) if !seen.insert(sha.clone()) => continue,
                _ => commits.push(commit),
            }
        }
        let added = commits.len() - before;
        if added > 0 {
            self.save_commits(&commits);
        }
        debug!(added, total = commits.len(), "merged commits");
        added
    }

    pub fn commits_by_repo(&self, repo_name: &str) -> Vec<Value> {
        self.commits()
            .into_iter()
            .filter(|commit| commit.get("repoName").and_then(Value::as_str) == Some(repo_name))
            .collect()
    }

    /// Commits dated within `start..=end`. Undated commits are skipped.
    pub fn commits_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Value> {
        self.commits()
            .into_iter()
            .filter(|commit| {
                commit
                    .get("date")
                    .and_then(Value::as_str)
                    .and_then(|date| DateTime::parse_from_rfc3339(date).ok())
                    .map(|date| date.with_timezone(&Utc))
                    .is_some_and(|date| date >= start && date <= end)
            })
            .collect()
    }

    /// Week activity keyed by week id.
    pub fn weeks_activity(&self) -> BTreeMap<String, Value> {
        self.cache.get(cache::WEEKS, BTreeMap::new())
    }

    pub fn save_weeks_activity(&self, weeks: &BTreeMap<String, Value>) {
        self.cache.set(cache::WEEKS, weeks);
    }

    pub fn week_activity(&self, week_id: &str) -> Option<Value> {
        self.weeks_activity().remove(week_id)
    }

    pub fn update_week_activity(&self, week_id: &str, activity: Value) {
        let mut weeks = self.weeks_activity();
        weeks.insert(week_id.to_string(), activity);
        self.save_weeks_activity(&weeks);
    }

    pub fn global_stats(&self) -> Option<Value> {
        self.cache.get(cache::GLOBAL_STATS, None)
    }

    pub fn save_global_stats(&self, stats: &Value) {
        self.cache.set(cache::GLOBAL_STATS, stats);
    }

    pub fn cache_metadata(&self) -> CacheMetadata {
        self.cache.get(cache::METADATA, CacheMetadata::default())
    }

    pub fn save_cache_metadata(&self, metadata: &CacheMetadata) {
        self.cache.set(cache::METADATA, metadata);
    }

    pub fn update_last_sync(&self) -> CacheMetadata {
        let mut metadata = self.cache_metadata();
        metadata.last_sync = Some(Utc::now());
        self.save_cache_metadata(&metadata);
        metadata
    }

    pub fn activity_cache(&self) -> ActivityCache {
        ActivityCache {
            user_profile: self.user_profile(),
            repositories: self.repositories(),
            commits: self.commits(),
            weeks_activity: self.weeks_activity(),
            global_stats: self.global_stats(),
            metadata: self.cache_metadata(),
        }
    }

    /// Write the parts present in `update`, then restamp the metadata: sync
    /// time, cache version, total size and the three counts.
    pub fn save_activity_cache(&self, update: ActivityCacheUpdate) -> CacheMetadata {
        if let Some(profile) = &update.user_profile {
            self.save_user_profile(profile);
        }
        if let Some(repos) = &update.repositories {
            self.save_repositories(repos);
        }
        if let Some(commits) = &update.commits {
            self.save_commits(commits);
        }
        if let Some(weeks) = &update.weeks_activity {
            self.save_weeks_activity(weeks);
        }
        if let Some(stats) = &update.global_stats {
            self.save_global_stats(stats);
        }

        let mut metadata = self.cache_metadata();
        metadata.last_sync = Some(Utc::now());
        metadata.cache_version = CACHE_VERSION.to_string();
        metadata.repo_count = update
            .repositories
            .as_ref()
            .map_or_else(|| self.repositories().len(), Vec::len);
        metadata.commit_count = update
            .commits
            .as_ref()
            .map_or_else(|| self.commits().len(), Vec::len);
        metadata.week_count = update
            .weeks_activity
            .as_ref()
            .map_or_else(|| self.weeks_activity().len(), BTreeMap::len);
        metadata.total_size = self.cache_size();
        self.save_cache_metadata(&metadata);
        metadata
    }

    /// Staleness of the current week against the recorded last sync.
    pub fn is_current_week_stale(&self) -> bool {
        is_current_week_stale(self.cache_metadata().last_sync, Utc::now())
    }

    /// Export of the activity cache and settings. The credential is reduced
    /// to its username.
    pub fn export_all_data(&self) -> Value {
        let auth = self
            .cache
            .get::<Option<crate::models::Credential>>(cache::AUTH, None)
            .map(|credential| serde_json::json!({ "username": credential.username }));
        serde_json::json!({
            "cache": self.activity_cache(),
            "settings": self.settings(),
            "auth": auth,
            "exportedAt": Utc::now().to_rfc3339(),
            "version": CACHE_VERSION,
        })
    }

    /// Bytes held by the activity cache keys.
    pub fn cache_size(&self) -> u64 {
        self.cache.size_of(cache::ALL)
    }

    pub fn is_cache_full(&self) -> bool {
        self.cache_size() >= self.max_bytes
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn clear_cache(&self) {
        for key in cache::ALL {
            self.cache.remove(key);
        }
    }

    /// Remove every key this application owns, organization data included.
    pub fn clear_all_data(&self) -> usize {
        let removed = self.cache.remove_by_prefix(keys::NAMESPACE);
        info!(removed, "cleared all local data");
        removed
    }
}

fn sha_of(commit: &Value) -> Option<String> {
    commit.get("sha").and_then(Value::as_str).map(str::to_string)
}
