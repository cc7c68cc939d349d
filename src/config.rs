//! Engine tuning knobs, loadable from a TOML file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::{Error, Result};

fn default_max_concurrent() -> usize {
    4
}

fn default_event_capacity() -> usize {
    100
}

/// Configuration for an [`OperationQueue`](crate::core::queue::OperationQueue).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of operations evaluating conditions or executing at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Capacity of the queue event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl QueueConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        tracing::debug!(
            max_concurrent = config.max_concurrent,
            event_capacity = config.event_capacity,
            "config loaded"
        );
        Ok(config)
    }

    /// Write configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject configurations the queue cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(Error::Validation(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::Validation(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
