//! Versioned upgrades of the organization namespace.
//!
//! The stored version only ever moves forward, and only after every pending
//! step succeeded. A failed run leaves whatever idempotent work the steps did
//! and the old version, so the next run retries from the same point. When a
//! run keeps failing, `reset_organization_data` wipes the namespace and the
//! next run starts from v0.

mod registry;
mod v1;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::MigrationError;
use crate::keys::{self, cache, org};
use crate::kv::KeyValueCache;

pub use registry::{collect_project_ids, LegacyShape, LegacySource, MigrationStep};
pub use v1::SeedOrganization;

/// Schema version this build migrates to.
pub const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationOutcome {
    pub success: bool,
    /// Stored version after the run.
    pub version: u32,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatus {
    pub current_version: u32,
    pub target_version: u32,
    pub needs_migration: bool,
    pub organization_data_exists: bool,
}

pub fn default_steps() -> Vec<Box<dyn MigrationStep>> {
    vec![Box::new(SeedOrganization)]
}

pub struct MigrationEngine {
    cache: KeyValueCache,
    steps: Vec<Box<dyn MigrationStep>>,
}

impl MigrationEngine {
    pub fn new(cache: KeyValueCache) -> Self {
        Self::with_steps(cache, default_steps())
    }

    pub fn with_steps(cache: KeyValueCache, mut steps: Vec<Box<dyn MigrationStep>>) -> Self {
        steps.sort_by_key(|step| step.version());
        Self { cache, steps }
    }

    /// Stored version; absent or non-numeric reads as 0.
    pub fn current_version(&self) -> u32 {
        let Some(raw) = self.cache.get_raw(org::MIGRATION_VERSION) else {
            return 0;
        };
        match raw.trim().parse() {
            Ok(version) => version,
            Err(_) => {
                debug!(raw = raw.as_str(), "ignoring non-numeric migration version");
                0
            }
        }
    }

    pub fn target_version(&self) -> u32 {
        self.steps.iter().map(|step| step.version()).max().unwrap_or(0)
    }

    pub fn is_migration_needed(&self) -> bool {
        self.current_version() < self.target_version()
    }

    pub fn status(&self) -> MigrationStatus {
        let current_version = self.current_version();
        let target_version = self.target_version();
        MigrationStatus {
            current_version,
            target_version,
            needs_migration: current_version < target_version,
            organization_data_exists: self.organization_data_exists(),
        }
    }

    /// True once there is at least one tag or project record. Machine,
    /// queue and bookkeeping keys alone do not count.
    fn organization_data_exists(&self) -> bool {
        let tags: Vec<Value> = self.cache.get(org::TAGS, Vec::new());
        let projects: serde_json::Map<String, Value> =
            self.cache.get(org::PROJECTS, serde_json::Map::new());
        !tags.is_empty() || !projects.is_empty()
    }

    pub fn run(&self) -> MigrationOutcome {
        let current = self.current_version();
        let target = self.target_version();
        let mut warnings = self.preflight();

        if current > target {
            warn!(current, target, "stored migration version is newer than this build");
            warnings.push(format!(
                "stored version {current} is newer than supported version {target}"
            ));
            return MigrationOutcome {
                success: true,
                version: current,
                errors: vec![],
                warnings,
            };
        }
        if current == target {
            debug!(version = current, "migrations up to date");
            return MigrationOutcome {
                success: true,
                version: current,
                errors: vec![],
                warnings,
            };
        }

        info!(from = current, to = target, "running migrations");
        for version in current + 1..=target {
            if let Err(e) = self.run_step(version, &mut warnings) {
                error!(version, kept = current, error = %e, "migration failed");
                return MigrationOutcome {
                    success: false,
                    version: current,
                    errors: vec![e.to_string()],
                    warnings,
                };
            }
        }

        if let Err(e) = self.cache.try_set_raw(org::MIGRATION_VERSION, &target.to_string()) {
            let e = MigrationError::from(e);
            error!(error = %e, "could not record migration version");
            return MigrationOutcome {
                success: false,
                version: current,
                errors: vec![e.to_string()],
                warnings,
            };
        }

        info!(version = target, warnings = warnings.len(), "migrations complete");
        MigrationOutcome {
            success: true,
            version: target,
            errors: vec![],
            warnings,
        }
    }

    /// Remove every organization key, the version counter included.
    /// Activity cache, credentials and settings are untouched.
    pub fn reset_organization_data(&self) -> usize {
        let removed = self.cache.remove_by_prefix(keys::ORG_NAMESPACE);
        warn!(removed, "organization data reset");
        removed
    }

    fn run_step(&self, version: u32, warnings: &mut Vec<String>) -> Result<(), MigrationError> {
        let step = self
            .steps
            .iter()
            .find(|step| step.version() == version)
            .ok_or(MigrationError::MissingStep(version))?;
        info!(version, name = step.name(), "applying migration");
        step.run(&self.cache, warnings).map_err(|e| match e {
            MigrationError::Step { .. } => e,
            other => MigrationError::Step {
                version,
                name: step.name(),
                reason: other.to_string(),
            },
        })
    }

    /// Flags preserved keys whose contents no longer parse.
    fn preflight(&self) -> Vec<String> {
        let mut checked: Vec<&str> = cache::ALL.to_vec();
        for source in self.steps.iter().flat_map(|step| step.reads()) {
            if !checked.contains(&source.key) {
                checked.push(source.key);
            }
        }
        checked
            .into_iter()
            .filter(|key| {
                self.cache
                    .get_raw(key)
                    .is_some_and(|raw| serde_json::from_str::<Value>(&raw).is_err())
            })
            .map(|key| format!("cache key {key} may be corrupted"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{KeyValueStore, MemoryStore};
    use crate::models::{ProjectOrganization, Tag};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryStore>, KeyValueCache) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), KeyValueCache::new(store))
    }

    struct Flaky {
        fail: Arc<AtomicBool>,
    }

    impl MigrationStep for Flaky {
        fn version(&self) -> u32 {
            2
        }

        fn name(&self) -> &'static str {
            "flaky"
        }

        fn run(&self, _cache: &KeyValueCache, _warnings: &mut Vec<String>) -> Result<(), MigrationError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(MigrationError::Step {
                    version: 2,
                    name: "flaky",
                    reason: "boom".into(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn fresh_store_reaches_current_version() {
        let (store, kv) = setup();
        let engine = MigrationEngine::new(kv);
        assert!(engine.is_migration_needed());
        let outcome = engine.run();
        assert!(outcome.success, "{outcome:?}");
        assert_eq!(outcome.version, CURRENT_VERSION);
        assert_eq!(
            store.get(org::MIGRATION_VERSION).unwrap().as_deref(),
            Some("1")
        );
        assert!(!engine.is_migration_needed());
    }

    #[test]
    fn second_run_is_a_no_op() {
        let (store, kv) = setup();
        store.set(cache::REPOSITORIES, r#"[{"id": 1}]"#).unwrap();
        let engine = MigrationEngine::new(kv.clone());
        engine.run();
        store.remove(org::MIGRATION_VERSION).unwrap();
        engine.run();

        let tags: Vec<Tag> = kv.get(org::TAGS, Vec::new());
        let orgs: BTreeMap<u64, ProjectOrganization> = kv.get(org::PROJECTS, BTreeMap::new());
        assert_eq!(tags.len(), 4);
        assert_eq!(orgs.len(), 1);
    }

    #[test]
    fn failing_step_keeps_version_then_recovers() {
        let (store, kv) = setup();
        let fail = Arc::new(AtomicBool::new(true));
        let steps: Vec<Box<dyn MigrationStep>> = vec![
            Box::new(Flaky { fail: fail.clone() }),
            Box::new(SeedOrganization),
        ];
        let engine = MigrationEngine::with_steps(kv.clone(), steps);
        assert_eq!(engine.target_version(), 2);

        let outcome = engine.run();
        assert!(!outcome.success);
        assert_eq!(outcome.version, 0);
        assert_eq!(outcome.errors.len(), 1);
        assert!(store.get(org::MIGRATION_VERSION).unwrap().is_none());
        // v1 work stays
        assert_eq!(kv.get::<Vec<Tag>>(org::TAGS, Vec::new()).len(), 4);

        fail.store(false, Ordering::SeqCst);
        let outcome = engine.run();
        assert!(outcome.success);
        assert_eq!(outcome.version, 2);
        assert_eq!(engine.current_version(), 2);
        assert_eq!(kv.get::<Vec<Tag>>(org::TAGS, Vec::new()).len(), 4);
    }

    #[test]
    fn unavailable_store_fails_without_advancing() {
        let (store, kv) = setup();
        store.set_available(false);
        let engine = MigrationEngine::new(kv);
        let outcome = engine.run();
        assert!(!outcome.success);
        assert_eq!(outcome.version, 0);
        store.set_available(true);
        assert_eq!(engine.current_version(), 0);
    }

    #[test]
    fn newer_stored_version_is_left_alone() {
        let (store, kv) = setup();
        store.set(org::MIGRATION_VERSION, "7").unwrap();
        let outcome = MigrationEngine::new(kv).run();
        assert!(outcome.success);
        assert_eq!(outcome.version, 7);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(store.get(org::MIGRATION_VERSION).unwrap().as_deref(), Some("7"));
    }

    #[test]
    fn garbage_version_reads_as_zero() {
        let (store, kv) = setup();
        store.set(org::MIGRATION_VERSION, "v1").unwrap();
        let engine = MigrationEngine::new(kv);
        assert_eq!(engine.current_version(), 0);
        assert!(engine.run().success);
        assert_eq!(engine.current_version(), 1);
    }

    #[test]
    fn gap_in_steps_fails() {
        let (_, kv) = setup();
        let engine = MigrationEngine::with_steps(
            kv,
            vec![Box::new(Flaky { fail: Arc::new(AtomicBool::new(false)) })],
        );
        let outcome = engine.run();
        assert!(!outcome.success);
        assert!(outcome.errors[0].contains("v1"));
        assert_eq!(engine.current_version(), 0);
    }

    #[test]
    fn corrupt_preserved_keys_produce_warnings() {
        let (store, kv) = setup();
        store.set(cache::COMMITS, "{truncated").unwrap();
        store.set(crate::keys::legacy::REPOS, "[oops").unwrap();
        let outcome = MigrationEngine::new(kv).run();
        assert!(outcome.success);
        assert!(outcome
            .warnings
            .contains(&format!("cache key {} may be corrupted", cache::COMMITS)));
        assert!(outcome
            .warnings
            .contains(&format!("cache key {} may be corrupted", crate::keys::legacy::REPOS)));
    }

    #[test]
    fn reset_wipes_only_the_organization_namespace() {
        let (store, kv) = setup();
        store.set(cache::AUTH, r#"{"username":"a"}"#).unwrap();
        store.set(cache::COMMITS, "[]").unwrap();
        let engine = MigrationEngine::new(kv);
        engine.run();
        assert!(engine.status().organization_data_exists);

        assert!(engine.reset_organization_data() >= 2);
        let status = engine.status();
        assert_eq!(status.current_version, 0);
        assert!(status.needs_migration);
        assert!(!status.organization_data_exists);
        assert!(store.get(cache::AUTH).unwrap().is_some());
        assert!(store.get(cache::COMMITS).unwrap().is_some());
    }

    #[test]
    fn bookkeeping_keys_alone_are_not_organization_data() {
        let (store, kv) = setup();
        let engine = MigrationEngine::new(kv);
        store.set(org::MACHINE, r#"{"machineId":"x"}"#).unwrap();
        store.set(org::SYNC_QUEUE, "[]").unwrap();
        store.set(org::LAST_SYNC, "2024-01-01T00:00:00Z").unwrap();
        store.set(org::TAGS, "[]").unwrap();
        store.set(org::PROJECTS, "{}").unwrap();
        assert!(!engine.status().organization_data_exists);

        store.set(org::PROJECTS, r#"{"5": {"projectId": 5}}"#).unwrap();
        assert!(engine.status().organization_data_exists);
    }
}
