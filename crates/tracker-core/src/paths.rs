use directories::ProjectDirs;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "github-tracker";
pub const APP_NAME: &str = "tracker";

/// Overrides the platform data directory.
pub const DATA_DIR_ENV: &str = "TRACKER_DATA_DIR";

pub const STORE_FILE: &str = "store.json";
pub const CONFIG_FILE: &str = "config.json";

pub fn data_dir() -> Result<PathBuf, StoreError> {
    if let Ok(override_path) = std::env::var(DATA_DIR_ENV) {
        if !override_path.trim().is_empty() {
            return Ok(PathBuf::from(override_path));
        }
    }
    default_data_dir()
}

pub fn default_data_dir() -> Result<PathBuf, StoreError> {
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| StoreError::Unavailable("cannot determine data directory".into()))?;
    Ok(dirs.data_dir().to_path_buf())
}

pub fn store_path(data_dir: &Path) -> PathBuf {
    data_dir.join(STORE_FILE)
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}
