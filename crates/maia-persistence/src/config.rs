//! Persistence configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Settings for the tenant-aware store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Base directory under which dedicated tenant stores are opened as
    /// `{base}/{tenant_id}`. When unset, every tenant shares the main
    /// store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedicated_base_dir: Option<PathBuf>,
}

impl PersistenceConfig {
    /// Read settings from the environment (`MAIA_DEDICATED_STORAGE_DIR`)
    pub fn from_env() -> Self {
        Self {
            dedicated_base_dir: std::env::var("MAIA_DEDICATED_STORAGE_DIR")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        }
    }
}
