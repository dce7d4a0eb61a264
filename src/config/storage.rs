//! Storage configuration types.

use serde::Deserialize;

/// Storage backend selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend name: `memory` or `sqlite`.
    #[serde(rename = "type")]
    pub storage_type: String,
    /// SQLite database file. Ignored by the memory backend.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: "sqlite".to_string(),
            path: "./data/storefront.db".to_string(),
        }
    }
}
