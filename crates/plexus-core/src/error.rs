//! Error types for hub operations.

use crate::endpoint::EndpointId;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Hub errors.
#[derive(Debug, Error)]
pub enum HubError {
    /// Channel capacity of zero.
    #[error("Invalid capacity: channel capacity must be greater than zero")]
    InvalidCapacity,

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be parsed.
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Hub creation outside a tokio runtime.
    #[error("No tokio runtime available to spawn the hub")]
    NoRuntime,

    /// Operation on a terminated hub.
    #[error("Hub terminated: control channel invalid")]
    Terminated,

    /// Release called on a hub that was already released.
    #[error("Hub already released")]
    AlreadyReleased,

    /// An endpoint with the same id is already registered.
    #[error("Endpoint already registered: {0}")]
    DuplicateEndpoint(EndpointId),

    /// The hub did not acknowledge in time.
    #[error("Acknowledgement not received within {0:?}")]
    AckTimeout(Duration),
}

impl HubError {
    /// Whether this error means the hub is no longer running.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, HubError::Terminated | HubError::AlreadyReleased)
    }
}
