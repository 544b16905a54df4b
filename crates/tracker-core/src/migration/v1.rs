use chrono::Utc;
use serde_json::{Map, Value};
use tracing::info;

use super::registry::{collect_project_ids, LegacyShape, LegacySource, MigrationStep};
use crate::error::MigrationError;
use crate::keys::{cache, legacy, org};
use crate::kv::KeyValueCache;
use crate::models::{ProjectOrganization, Tag};

const ANY_LIST: &[LegacyShape] = &[LegacyShape::RecordArray, LegacyShape::WrappedRecordArray];

const SOURCES: &[LegacySource] = &[
    LegacySource { key: legacy::REPOS, shapes: ANY_LIST },
    LegacySource { key: legacy::USER_REPOS, shapes: ANY_LIST },
    LegacySource { key: cache::REPOSITORIES, shapes: ANY_LIST },
];

/// v0 → v1: seed default tags and give every known project an empty
/// organization record.
///
/// Existing data is handled as raw JSON: records this build cannot parse are
/// kept untouched, and a value that is not the expected container at all
/// fails the step instead of being replaced.
pub struct SeedOrganization;

impl SeedOrganization {
    fn fail(&self, reason: String) -> MigrationError {
        MigrationError::Step {
            version: self.version(),
            name: self.name(),
            reason,
        }
    }

    fn seed_tags(&self, kv: &KeyValueCache) -> Result<(), MigrationError> {
        let existing: Option<Value> = kv
            .try_get(org::TAGS)
            .map_err(|e| self.fail(e.to_string()))?;
        match existing {
            None => {}
            Some(Value::Array(tags)) if tags.is_empty() => {}
            Some(Value::Array(_)) => return Ok(()),
            Some(_) => return Err(self.fail(format!("{} is not a list", org::TAGS))),
        }
        let defaults = Tag::defaults(Utc::now());
        kv.try_set(org::TAGS, &defaults)?;
        info!(count = defaults.len(), "created default tags");
        Ok(())
    }

    fn seed_projects(&self, kv: &KeyValueCache, ids: &[u64]) -> Result<(), MigrationError> {
        let mut orgs: Map<String, Value> = match kv
            .try_get(org::PROJECTS)
            .map_err(|e| self.fail(e.to_string()))?
        {
            None => Map::new(),
            Some(Value::Object(orgs)) => orgs,
            Some(_) => return Err(self.fail(format!("{} is not an object", org::PROJECTS))),
        };

        let mut created = 0usize;
        for id in ids {
            let key = id.to_string();
            if orgs.contains_key(&key) {
                continue;
            }
            let record = serde_json::to_value(ProjectOrganization::empty(*id))
                .map_err(|e| self.fail(e.to_string()))?;
            orgs.insert(key, record);
            created += 1;
        }
        if created > 0 {
            kv.try_set(org::PROJECTS, &orgs)?;
            info!(created, "created organization records for known projects");
        }
        Ok(())
    }
}

impl MigrationStep for SeedOrganization {
    fn version(&self) -> u32 {
        1
    }

    fn name(&self) -> &'static str {
        "seed-organization"
    }

    fn reads(&self) -> &[LegacySource] {
        SOURCES
    }

    fn run(&self, kv: &KeyValueCache, warnings: &mut Vec<String>) -> Result<(), MigrationError> {
        self.seed_tags(kv)?;
        let ids = collect_project_ids(kv, self.reads(), warnings);
        self.seed_projects(kv, &ids)
    }
}
