use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, StoreError};

const CONFIG_PATH_VAR: &str = "CHAT_STORE_CONFIG";
const STORAGE_DIR_VAR: &str = "CHAT_STORE_DIR";

/// Tunables for the chat store and its mocked collaborators.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Key the persisted snapshot lives under.
    pub namespace_key: String,
    pub reply_delay_min_ms: u64,
    pub reply_delay_max_ms: u64,
    pub history_delay_ms: u64,
    /// Number of pages `load_more_history` may fetch per activation.
    pub page_limit: u32,
    pub page_size: usize,
    pub initial_batch_size: usize,
    pub max_image_bytes: usize,
    pub event_capacity: usize,
    /// Snapshots are written to files here when set, kept in memory otherwise.
    pub storage_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            namespace_key: "chat-storage".to_string(),
            reply_delay_min_ms: 1000,
            reply_delay_max_ms: 3000,
            history_delay_ms: 800,
            page_limit: 3,
            page_size: 20,
            initial_batch_size: 10,
            max_image_bytes: 10 * 1024 * 1024, // 10MB
            event_capacity: 256,
            storage_dir: None,
        }
    }
}

impl StoreConfig {
    /// Reads the JSON file named by `CHAT_STORE_CONFIG` (defaults when unset)
    /// and applies the `CHAT_STORE_DIR` override.
    pub fn load() -> Result<Self> {
        let mut config = match env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_json(&std::fs::read_to_string(path)?)?,
            Err(_) => StoreConfig::default(),
        };

        if let Ok(dir) = env::var(STORAGE_DIR_VAR) {
            if !dir.trim().is_empty() {
                config.storage_dir = Some(PathBuf::from(dir));
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: StoreConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.namespace_key.trim().is_empty() {
            return Err(StoreError::Validation("namespace_key must not be empty".to_string()));
        }
        if self.reply_delay_min_ms > self.reply_delay_max_ms {
            return Err(StoreError::Validation(format!(
                "reply delay bounds are inverted: {} > {}",
                self.reply_delay_min_ms, self.reply_delay_max_ms
            )));
        }
        if self.page_limit == 0 {
            return Err(StoreError::Validation("page_limit must be positive".to_string()));
        }
        if self.page_size == 0 {
            return Err(StoreError::Validation("page_size must be positive".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(StoreError::Validation("event_capacity must be positive".to_string()));
        }
        Ok(())
    }

    pub fn reply_delay_bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.reply_delay_min_ms),
            Duration::from_millis(self.reply_delay_max_ms),
        )
    }

    pub fn history_delay(&self) -> Duration {
        Duration::from_millis(self.history_delay_ms)
    }
}
