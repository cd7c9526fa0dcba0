//! Runtime configuration.
//!
//! Loaded from a TOML file. Every key is optional:
//!
//! ```toml
//! server_root = "https://boards.example.com"
//! fanout_workers = 4
//! notify_freq_card_ms = 120000
//! notify_freq_board_ms = 86400000
//! flow_capacity = 1024
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Debounce delay for card subscriptions: two minutes.
pub const DEFAULT_NOTIFY_FREQ_CARD_MS: i64 = 120_000;

/// Debounce delay for board subscriptions: one day.
pub const DEFAULT_NOTIFY_FREQ_BOARD_MS: i64 = 86_400_000;

pub const DEFAULT_FANOUT_WORKERS: usize = 4;

pub const DEFAULT_FLOW_CAPACITY: usize = 1024;

/// Configuration for a corkboard kernel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorkboardConfig {
    /// Base URL notification links point at.
    pub server_root: String,
    /// Maximum fan-out jobs running at once.
    pub fanout_workers: usize,
    pub notify_freq_card_ms: i64,
    pub notify_freq_board_ms: i64,
    /// Broadcast channel capacity of the board flow bus.
    pub flow_capacity: usize,
}

impl Default for CorkboardConfig {
    fn default() -> Self {
        Self {
            server_root: String::new(),
            fanout_workers: DEFAULT_FANOUT_WORKERS,
            notify_freq_card_ms: DEFAULT_NOTIFY_FREQ_CARD_MS,
            notify_freq_board_ms: DEFAULT_NOTIFY_FREQ_BOARD_MS,
            flow_capacity: DEFAULT_FLOW_CAPACITY,
        }
    }
}

impl CorkboardConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Set the server root.
    pub fn with_server_root(mut self, server_root: impl Into<String>) -> Self {
        self.server_root = server_root.into();
        self
    }
}
