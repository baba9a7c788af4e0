use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;
use crate::error::SelectionError;

/// Tunables for a [`crate::SelectionEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Rows requested per page at every level.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Quiet window before a search keystroke turns into a request.
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,

    /// Namespace for the persisted selection record.
    #[serde(default = "default_storage_prefix")]
    pub storage_prefix: String,

    /// Subscribe to backend change feeds for the client and farm levels.
    #[serde(default = "default_true")]
    pub realtime: bool,

    /// Ask the backend whether hydrated ids are still valid on start.
    #[serde(default = "default_true")]
    pub validate_on_start: bool,
}

fn default_page_size() -> usize {
    50
}

fn default_search_debounce_ms() -> u64 {
    300
}

fn default_storage_prefix() -> String {
    "fieldscope".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            search_debounce_ms: default_search_debounce_ms(),
            storage_prefix: default_storage_prefix(),
            realtime: true,
            validate_on_start: true,
        }
    }
}

impl EngineConfig {
    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.page_size == 0 {
            return Err("page_size must be > 0".to_string());
        }

        if self.storage_prefix.trim().is_empty() {
            return Err("storage_prefix must not be empty".to_string());
        }

        Ok(())
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate().map_err(SelectionError::Config)?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}
