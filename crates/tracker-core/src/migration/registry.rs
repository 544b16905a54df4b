//! Steps and the legacy keys they are allowed to read.
//!
//! A step declares every key it pulls data from together with the shapes it
//! accepts. Anything not declared here is never read during a migration.

use serde_json::Value;
use tracing::debug;

use crate::error::MigrationError;
use crate::kv::KeyValueCache;

/// Accepted layouts of a stored record list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyShape {
    /// `[ {...}, {...} ]`
    RecordArray,
    /// `{ "data": [ {...}, {...} ] }`
    WrappedRecordArray,
}

#[derive(Debug, Clone, Copy)]
pub struct LegacySource {
    pub key: &'static str,
    pub shapes: &'static [LegacyShape],
}

/// One idempotent upgrade unit. Running it twice must leave the store as
/// running it once would.
pub trait MigrationStep: Send + Sync {
    /// Version the store is at after this step.
    fn version(&self) -> u32;

    fn name(&self) -> &'static str;

    fn reads(&self) -> &[LegacySource] {
        &[]
    }

    fn run(&self, cache: &KeyValueCache, warnings: &mut Vec<String>) -> Result<(), MigrationError>;
}

/// Non-zero numeric `id` fields of every record found under `sources`,
/// deduplicated in first-seen order.
pub fn collect_project_ids(
    cache: &KeyValueCache,
    sources: &[LegacySource],
    warnings: &mut Vec<String>,
) -> Vec<u64> {
    let mut ids = Vec::new();
    for source in sources {
        let Some(raw) = cache.get_raw(source.key) else {
            continue;
        };
        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(_) => {
                warnings.push(format!("skipped unreadable legacy key {}", source.key));
                continue;
            }
        };
        let Some(records) = records_of(&value, source.shapes) else {
            warnings.push(format!("legacy key {} has an unexpected shape", source.key));
            continue;
        };
        for id in records.iter().filter_map(record_id) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        debug!(key = source.key, found = records.len(), "scanned legacy records");
    }
    ids
}

fn records_of<'a>(value: &'a Value, shapes: &[LegacyShape]) -> Option<&'a Vec<Value>> {
    shapes.iter().find_map(|shape| match shape {
        LegacyShape::RecordArray => value.as_array(),
        LegacyShape::WrappedRecordArray => value.get("data").and_then(Value::as_array),
    })
}

fn record_id(record: &Value) -> Option<u64> {
    record.get("id").and_then(Value::as_u64).filter(|id| *id != 0)
}
