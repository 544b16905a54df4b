//! Persisted records. Field names are camelCase on the wire so existing
//! stores written by the web client stay readable.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Auth ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub username: String,
    /// Only decryptable with the `salt` stored next to it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
}

// ── Organization ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    /// Hex color, e.g. `#3B82F6`.
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tags seeded on first run: (name, color).
pub const DEFAULT_TAGS: [(&str, &str); 4] = [
    ("client", "#3B82F6"),
    ("perso", "#10B981"),
    ("side-project", "#8B5CF6"),
    ("à finir", "#F59E0B"),
];

impl Tag {
    pub fn new(name: &str, color: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            color: color.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn defaults(now: DateTime<Utc>) -> Vec<Tag> {
        DEFAULT_TAGS
            .iter()
            .map(|(name, color)| Tag::new(name, color, now))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManualStatus {
    EnCours,
    EnPause,
    Termine,
    Abandonne,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectOrganization {
    pub project_id: u64,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub manual_status: Option<ManualStatus>,
    #[serde(default)]
    pub manual_status_date: Option<DateTime<Utc>>,
    /// Machine ids where the project has been cloned.
    #[serde(default)]
    pub cloned_on_machines: Vec<String>,
}

impl ProjectOrganization {
    pub fn empty(project_id: u64) -> Self {
        Self {
            project_id,
            tag_ids: vec![],
            is_favorite: false,
            is_pinned: false,
            manual_status: None,
            manual_status_date: None,
            cloned_on_machines: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectNote {
    pub project_id: u64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub id: Uuid,
    pub project_id: u64,
    pub description: String,
    pub completed: bool,
    pub order: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caps applied by the organization mutations.
pub mod limits {
    pub const MAX_TAGS: usize = 50;
    pub const MAX_TODOS_PER_PROJECT: usize = 50;
    pub const MAX_TODOS_TOTAL: usize = 500;
    /// In characters.
    pub const MAX_NOTE_LENGTH: usize = 10_000;
    pub const MAX_PINNED_PROJECTS: usize = 5;
}

// ── Machine ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineInfo {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

// ── Sync queue ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncEntity {
    Tag,
    ProjectOrg,
    Note,
    Todo,
    Machine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub entity: SyncEntity,
    pub action: SyncAction,
    #[serde(rename = "data", default)]
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
}

// ── Activity cache ───────────────────────────────────────────────────────────

pub const CACHE_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheMetadata {
    pub last_sync: Option<DateTime<Utc>>,
    pub cache_version: String,
    /// Bytes held by the activity cache keys when last written.
    pub total_size: u64,
    pub commit_count: usize,
    pub repo_count: usize,
    pub week_count: usize,
}

impl Default for CacheMetadata {
    fn default() -> Self {
        Self {
            last_sync: None,
            cache_version: CACHE_VERSION.to_string(),
            total_size: 0,
            commit_count: 0,
            repo_count: 0,
            week_count: 0,
        }
    }
}

/// Everything the activity cache holds. Remote payloads stay raw JSON; only
/// the fields this crate indexes on (`id`, `sha`, `repoName`, `date`) are
/// looked at.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityCache {
    pub user_profile: Option<serde_json::Value>,
    pub repositories: Vec<serde_json::Value>,
    pub commits: Vec<serde_json::Value>,
    pub weeks_activity: BTreeMap<String, serde_json::Value>,
    pub global_stats: Option<serde_json::Value>,
    pub metadata: CacheMetadata,
}

/// Parts of the activity cache to replace. `None` leaves a part as it is.
#[derive(Debug, Clone, Default)]
pub struct ActivityCacheUpdate {
    pub user_profile: Option<serde_json::Value>,
    pub repositories: Option<Vec<serde_json::Value>>,
    pub commits: Option<Vec<serde_json::Value>>,
    pub weeks_activity: Option<BTreeMap<String, serde_json::Value>>,
    pub global_stats: Option<serde_json::Value>,
}

// ── Settings ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFormat {
    Eu,
    Us,
    Relative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Fr,
    En,
}

pub const MIN_WEEKS_TO_DISPLAY: u8 = 4;
pub const MAX_WEEKS_TO_DISPLAY: u8 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub theme: Theme,
    pub date_format: DateFormat,
    pub weeks_to_display: u8,
    pub language: Language,
    pub offline_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::System,
            date_format: DateFormat::Relative,
            weeks_to_display: 12,
            language: Language::Fr,
            offline_mode: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_item_uses_web_field_names() {
        let item = SyncQueueItem {
            id: Uuid::nil(),
            entity: SyncEntity::ProjectOrg,
            action: SyncAction::Update,
            payload: serde_json::json!({"projectId": 1}),
            timestamp: Utc::now(),
            retry_count: 0,
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["type"], "project-org");
        assert_eq!(value["action"], "update");
        assert_eq!(value["data"]["projectId"], 1);
        assert_eq!(value["retryCount"], 0);
    }

    #[test]
    fn credential_omits_missing_token() {
        let cred = Credential {
            username: "octo".into(),
            encrypted_token: None,
            salt: None,
        };
        assert_eq!(
            serde_json::to_string(&cred).unwrap(),
            r#"{"username":"octo"}"#
        );
    }

    #[test]
    fn manual_status_is_kebab_case() {
        let org: ProjectOrganization = serde_json::from_str(
            r#"{"projectId": 5, "manualStatus": "en-pause"}"#,
        )
        .unwrap();
        assert_eq!(org.manual_status, Some(ManualStatus::EnPause));
        assert!(org.tag_ids.is_empty());
    }
}
