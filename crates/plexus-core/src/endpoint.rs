//! Endpoint identity.
//!
//! An endpoint is one peer channel registered with a hub, paired with the id
//! the hub's registry is keyed by.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of a registered endpoint.
///
/// Backed by a random 128-bit UUID, so ids from independent callers do not
/// collide in practice. The hub still refuses a duplicate id on registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(Uuid);

impl EndpointId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EndpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for EndpointId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// A channel handle paired with its endpoint id.
#[derive(Debug)]
pub struct Endpoint<C> {
    id: EndpointId,
    channel: C,
}

impl<C> Endpoint<C> {
    /// Wrap a channel with a freshly generated id.
    #[must_use]
    pub fn new(channel: C) -> Self {
        Self::with_id(EndpointId::new(), channel)
    }

    /// Wrap a channel with an existing id.
    #[must_use]
    pub fn with_id(id: EndpointId, channel: C) -> Self {
        Self { id, channel }
    }

    /// Get the endpoint id.
    #[must_use]
    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// Borrow the channel handle.
    #[must_use]
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Mutably borrow the channel handle.
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Consume the endpoint, keeping only the channel handle.
    #[must_use]
    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Split into id and channel handle.
    #[must_use]
    pub fn into_parts(self) -> (EndpointId, C) {
        (self.id, self.channel)
    }
}

impl<C> From<&Endpoint<C>> for EndpointId {
    fn from(endpoint: &Endpoint<C>) -> Self {
        endpoint.id
    }
}
