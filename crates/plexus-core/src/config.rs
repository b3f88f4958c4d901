//! Hub configuration.
//!
//! Configuration can be built in code or loaded from TOML:
//!
//! ```toml
//! name = "telemetry"
//! capacity = 128
//! overflow = "drop_newest"
//! ack_timeout_ms = 500
//! ```

use crate::error::HubError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// What broadcast delivery does when a subscriber's buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for the subscriber to make room. A stalled subscriber stalls the
    /// whole hub, control messages included.
    #[default]
    Block,
    /// Skip the value for that subscriber and keep delivering to the rest.
    DropNewest,
}

/// Hub configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Hub name, used in logs and metric labels.
    #[serde(default = "default_name")]
    pub name: String,

    /// Capacity of the inbound channel and of every allocated endpoint channel.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Broadcast overflow policy. Ignored by collect hubs.
    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// Upper bound on waiting for a control acknowledgement, in milliseconds.
    #[serde(default)]
    pub ack_timeout_ms: Option<u64>,
}

fn default_name() -> String {
    "hub".to_string()
}

fn default_capacity() -> usize {
    64
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            capacity: default_capacity(),
            overflow: OverflowPolicy::default(),
            ack_timeout_ms: None,
        }
    }
}

impl HubConfig {
    /// Create a configuration with the given capacity and defaults otherwise.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Set the hub name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the overflow policy.
    #[must_use]
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Bound every acknowledgement wait by `timeout`, rounded up to whole
    /// milliseconds.
    #[must_use]
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_nanos().div_ceil(1_000_000);
        self.ack_timeout_ms = Some(u64::try_from(millis).unwrap_or(u64::MAX));
        self
    }

    /// Get the acknowledgement timeout, if any.
    #[must_use]
    pub fn ack_timeout(&self) -> Option<Duration> {
        self.ack_timeout_ms.map(Duration::from_millis)
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidCapacity`] for a zero capacity and
    /// [`HubError::Config`] for an empty name or a zero timeout.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.capacity == 0 {
            return Err(HubError::InvalidCapacity);
        }
        if self.name.is_empty() {
            return Err(HubError::Config("hub name cannot be empty".to_string()));
        }
        if self.ack_timeout_ms == Some(0) {
            return Err(HubError::Config(
                "ack_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or fails validation.
    pub fn from_toml_str(contents: &str) -> Result<Self, HubError> {
        let config: HubConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, HubError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| HubError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }
}
