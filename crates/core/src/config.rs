//! Watcher configuration
//!
//! Loaded from TOML:
//! ```toml
//! targets = [".watched", "#sidebar"]
//! debounce_ms = 150
//!
//! [observe]
//! child_list = true
//! subtree = true
//! attributes = true
//! ```

use crate::error::{DomwatchError, Result};
use crate::host::ObserveOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default quiet period before the callback fires
pub const DEFAULT_DEBOUNCE_MS: u64 = 150;

/// Accepted range for `debounce_ms`
pub const DEBOUNCE_RANGE_MS: std::ops::RangeInclusive<u64> = 1..=60_000;

/// Watcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Selectors resolved at start time
    pub targets: Vec<String>,
    /// Debounce delay in milliseconds (default: 150)
    pub debounce_ms: u64,
    /// What each target reports
    pub observe: ObserveOptions,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            observe: ObserveOptions::default(),
        }
    }
}

impl WatcherConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| DomwatchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DomwatchError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !DEBOUNCE_RANGE_MS.contains(&self.debounce_ms) {
            return Err(DomwatchError::Config(format!(
                "debounce_ms must be within {}-{}, got {}",
                DEBOUNCE_RANGE_MS.start(),
                DEBOUNCE_RANGE_MS.end(),
                self.debounce_ms
            )));
        }
        if let Some(empty) = self.targets.iter().position(|t| t.trim().is_empty()) {
            return Err(DomwatchError::Config(format!("targets[{}] is empty", empty)));
        }
        Ok(())
    }

    /// Debounce delay as a `Duration`
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
