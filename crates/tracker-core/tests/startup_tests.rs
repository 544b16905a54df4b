use std::collections::HashSet;
use std::fs;
use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;
use tracker_core::crypto::testing::fast_provider;
use tracker_core::keys::{cache, legacy, org};
use tracker_core::models::{SyncAction, SyncEntity, DEFAULT_TAGS};
use tracker_core::{FileStore, KeyValueStore, MemoryStore, TrackerConfig, TrackerStore};

fn memory_store() -> (Arc<MemoryStore>, TrackerStore) {
    let backend = Arc::new(MemoryStore::new());
    let store = TrackerStore::with_backend(backend.clone(), fast_provider(7));
    (backend, store)
}

#[test]
fn empty_store_end_to_end() {
    let (backend, store) = memory_store();
    let report = store.startup();

    assert!(report.migration.success);
    assert_eq!(report.migration.version, 1);
    assert!(report.migration.errors.is_empty());

    let tags = store.organization().tags();
    assert_eq!(tags.len(), 4);
    let ids: HashSet<_> = tags.iter().map(|t| t.id).collect();
    assert_eq!(ids.len(), 4);
    for (tag, (name, color)) in tags.iter().zip(DEFAULT_TAGS) {
        assert_eq!(tag.name, name);
        assert_eq!(tag.color, color);
        assert_eq!(tag.created_at, tag.updated_at);
    }
    assert!(store.organization().project_organizations().is_empty());
    assert_eq!(
        backend.get(org::MIGRATION_VERSION).unwrap().as_deref(),
        Some("1")
    );

    backend.set(org::TAGS, "{{not json").unwrap();
    assert!(store.organization().tags().is_empty());
}

#[test]
fn legacy_repositories_become_organization_records_once() {
    let (backend, store) = memory_store();
    backend
        .set(legacy::REPOS, r#"[{"id": 101, "name": "a"}, {"id": 102}]"#)
        .unwrap();
    backend
        .set(cache::REPOSITORIES, r#"{"data": [{"id": 102}, {"id": 103}], "timestamp": 1}"#)
        .unwrap();

    store.startup();
    let orgs = store.organization().project_organizations();
    assert_eq!(orgs.keys().copied().collect::<Vec<_>>(), vec![101, 102, 103]);

    store.migrations().reset_organization_data();
    store.startup();
    store.startup();
    assert_eq!(store.organization().project_organizations().len(), 3);
    assert_eq!(store.organization().tags().len(), 4);
}

#[tokio::test]
async fn reset_keeps_credentials_and_activity_cache() {
    let (backend, store) = memory_store();
    store.startup();
    store.auth().login("octocat", Some("ghp_token")).await.unwrap();
    backend.set(cache::COMMITS, "[]").unwrap();
    store
        .sync_queue()
        .enqueue(SyncEntity::Tag, SyncAction::Create, json!({"name": "x"}));

    store.migrations().reset_organization_data();

    assert!(store.sync_queue().is_empty());
    assert!(store.organization().tags().is_empty());
    assert_eq!(store.migrations().current_version(), 0);
    assert_eq!(store.auth().decrypted_token().await.as_deref(), Some("ghp_token"));
    assert_eq!(backend.get(cache::COMMITS).unwrap().as_deref(), Some("[]"));
}

#[tokio::test]
async fn file_store_persists_across_instances() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.json");

    let machine_id = {
        let store = TrackerStore::with_backend(Arc::new(FileStore::open(&path).unwrap()), fast_provider(1));
        let report = store.startup();
        store.auth().login("octocat", Some("ghp_token")).await.unwrap();
        report.machine_id
    };

    let store = TrackerStore::with_backend(Arc::new(FileStore::open(&path).unwrap()), fast_provider(2));
    let report = store.startup();
    assert_eq!(report.machine_id, machine_id);
    assert_eq!(store.organization().tags().len(), 4);
    assert_eq!(store.auth().decrypted_token().await.as_deref(), Some("ghp_token"));
}

#[tokio::test]
async fn token_survives_config_changes() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    let config_path = dir.path().join("config.json");

    fs::write(&config_path, r#"{"kdf_iterations": 1000}"#).unwrap();
    let config = TrackerConfig::load_or_default(&config_path).unwrap();
    let store = TrackerStore::open_at(&data, &config).unwrap();
    store.auth().login("octocat", Some("ghp_token")).await.unwrap();

    fs::write(&config_path, r#"{"kdf_iterations": 2000, "log_filter": "debug"}"#).unwrap();
    let config = TrackerConfig::load_or_default(&config_path).unwrap();
    let reopened = TrackerStore::open_at(&data, &config).unwrap();
    assert_eq!(reopened.auth().decrypted_token().await.as_deref(), Some("ghp_token"));

    let plain = TrackerStore::open_at(&data, &TrackerConfig::default()).unwrap();
    assert_eq!(plain.auth().decrypted_token().await.as_deref(), Some("ghp_token"));
}

#[test]
fn startup_keeps_records_it_cannot_read() {
    let (backend, store) = memory_store();
    let existing = json!({
        "5": {"projectId": 5, "isFavorite": true, "isPinned": true},
        "6": {"projectId": 6, "tagIds": ["not-a-uuid"]}
    });
    backend.set(org::PROJECTS, &existing.to_string()).unwrap();
    backend.set(cache::REPOSITORIES, r#"[{"id": 7}]"#).unwrap();

    let report = store.startup();
    assert!(report.migration.success);

    let after: serde_json::Value =
        serde_json::from_str(&backend.get(org::PROJECTS).unwrap().unwrap()).unwrap();
    assert_eq!(after["5"], existing["5"]);
    assert_eq!(after["6"], existing["6"]);
    assert_eq!(after["7"]["projectId"], 7);
}

#[test]
fn corrupt_project_map_blocks_the_version_bump() {
    let (backend, store) = memory_store();
    backend.set(org::PROJECTS, "{\"5\": {\"isFav").unwrap();

    let report = store.startup();
    assert!(!report.migration.success);
    assert_eq!(store.migrations().current_version(), 0);
    assert_eq!(
        backend.get(org::PROJECTS).unwrap().as_deref(),
        Some("{\"5\": {\"isFav")
    );

    store.migrations().reset_organization_data();
    assert!(store.startup().migration.success);
}

#[test]
fn corrupt_store_file_is_set_aside() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.json");
    fs::write(&path, "\u{0}\u{0}garbage").unwrap();

    let backend = Arc::new(FileStore::open(&path).unwrap());
    let store = TrackerStore::with_backend(backend, fast_provider(3));
    let report = store.startup();

    assert!(report.migration.success);
    assert!(dir.path().join("store.json.corrupt").exists());
    assert_eq!(store.organization().tags().len(), 4);
}

#[test]
fn unavailable_backend_degrades_gracefully() {
    let (backend, store) = memory_store();
    backend.set_available(false);
    let report = store.startup();
    assert!(!report.migration.success);
    assert_eq!(report.migration.version, 0);
    assert!(store.organization().tags().is_empty());
    assert_eq!(store.local().cache_size(), 0);
}
