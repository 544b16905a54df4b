use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_MAX_CACHE_BYTES;
use crate::error::StoreError;
use crate::paths;

/// Operator settings. Key derivation cost is not configurable: stored tokens
/// must stay readable by every build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// `None` defers to `TRACKER_DATA_DIR` and then the platform directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    pub max_cache_bytes: u64,
    pub log_filter: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            max_cache_bytes: DEFAULT_MAX_CACHE_BYTES,
            log_filter: "info".into(),
        }
    }
}

impl TrackerConfig {
    /// Missing file means defaults; a present but malformed file is an error.
    pub fn load_or_default(path: &Path) -> Result<Self, StoreError> {
        match fs::read_to_string(path) {
            Ok(text) if text.trim().is_empty() => Ok(Self::default()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Environment override first, then the configured path, then the
    /// platform default.
    pub fn resolve_data_dir(&self) -> Result<PathBuf, StoreError> {
        if let Ok(dir) = std::env::var(paths::DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                return Ok(PathBuf::from(dir));
            }
        }
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::default_data_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = TrackerConfig::load_or_default(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.max_cache_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"log_filter": "debug"}"#).unwrap();
        let config = TrackerConfig::load_or_default(&path).unwrap();
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.max_cache_bytes, DEFAULT_MAX_CACHE_BYTES);
    }

    #[test]
    fn retired_iteration_setting_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"kdf_iterations": 1000, "max_cache_bytes": 10}"#).unwrap();
        let config = TrackerConfig::load_or_default(&path).unwrap();
        assert_eq!(config.max_cache_bytes, 10);
        assert!(!serde_json::to_string(&config).unwrap().contains("kdf"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = TrackerConfig {
            data_dir: Some(dir.path().to_path_buf()),
            max_cache_bytes: 1024,
            ..TrackerConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(TrackerConfig::load_or_default(&path).unwrap(), config);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{oops").unwrap();
        assert!(matches!(
            TrackerConfig::load_or_default(&path),
            Err(StoreError::Serialisation(_))
        ));
    }
}
