//! Soak runner configuration.
//!
//! Configuration is loaded from the first file found in:
//! - `plexus.toml`
//! - `/etc/plexus/plexus.toml`
//! - `~/.config/plexus/plexus.toml`
//!
//! Missing files fall back to defaults, with `PLEXUS_*` environment
//! overrides for the workload size.

use anyhow::{Context, Result};
use plexus_core::HubConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Soak runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoakConfig {
    /// Broadcast hub under test.
    #[serde(default = "default_broadcast_hub")]
    pub broadcast: HubConfig,

    /// Collect hub under test.
    #[serde(default = "default_collect_hub")]
    pub collect: HubConfig,

    /// Workload shape.
    #[serde(default)]
    pub workload: WorkloadConfig,
}

/// Workload configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Subscribers registered with the broadcast hub.
    #[serde(default = "default_subscribers")]
    pub subscribers: usize,

    /// Sources registered with the collect hub.
    #[serde(default = "default_sources")]
    pub sources: usize,

    /// Values published to the broadcast hub, and written to each source.
    #[serde(default = "default_values")]
    pub values: u64,

    /// Replace one subscriber halfway through the broadcast run.
    #[serde(default = "default_true")]
    pub churn: bool,
}

fn default_broadcast_hub() -> HubConfig {
    HubConfig::default().with_name("soak-broadcast")
}

fn default_collect_hub() -> HubConfig {
    HubConfig::default().with_name("soak-collect")
}

fn default_subscribers() -> usize {
    std::env::var("PLEXUS_SUBSCRIBERS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(16)
}

fn default_sources() -> usize {
    std::env::var("PLEXUS_SOURCES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(16)
}

fn default_values() -> u64 {
    std::env::var("PLEXUS_VALUES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(100_000)
}

fn default_true() -> bool {
    true
}

impl Default for SoakConfig {
    fn default() -> Self {
        Self {
            broadcast: default_broadcast_hub(),
            collect: default_collect_hub(),
            workload: WorkloadConfig::default(),
        }
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            subscribers: default_subscribers(),
            sources: default_sources(),
            values: default_values(),
            churn: true,
        }
    }
}

impl SoakConfig {
    /// Load configuration from the first default path found, or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "plexus.toml",
            "/etc/plexus/plexus.toml",
            "~/.config/plexus/plexus.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: SoakConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate both hub configurations.
    ///
    /// # Errors
    ///
    /// Returns the first hub configuration error.
    pub fn validate(&self) -> Result<()> {
        self.broadcast.validate().context("broadcast hub")?;
        self.collect.validate().context("collect hub")?;
        Ok(())
    }
}
