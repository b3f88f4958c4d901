//! The hub event loop.
//!
//! A hub is a single tokio task that owns its registry outright. Handles talk
//! to it only through the control protocol, so registry mutations never race
//! with delivery and no locks are needed. Broadcast and collect hubs share
//! this loop and differ only in their [`Mode`].

use crate::control::Command;
use crate::endpoint::{Endpoint, EndpointId};
use crate::error::HubError;
use crate::metrics;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

/// Which way a hub moves values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HubKind {
    /// One input replicated to every subscriber.
    Broadcast,
    /// Every source merged into one output.
    Collect,
}

impl fmt::Display for HubKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubKind::Broadcast => f.write_str("broadcast"),
            HubKind::Collect => f.write_str("collect"),
        }
    }
}

/// Hub statistics, as seen by the hub loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Hub name.
    pub name: String,
    /// Hub kind.
    pub kind: HubKind,
    /// Number of registered endpoints.
    pub endpoints: usize,
    /// Values delivered to subscribers (broadcast) or forwarded from sources
    /// (collect).
    pub delivered: u64,
    /// Values skipped because a subscriber was full.
    pub dropped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HubState {
    Running,
    Terminated,
}

/// Mode-specific half of a hub: the registry and how values move through it.
#[async_trait]
pub(crate) trait Mode: Send + 'static {
    /// Channel half carried by an `Add` command.
    type Channel: Send + 'static;

    /// Event the mode waits on besides control messages.
    type Event: Send;

    const KIND: HubKind;

    /// Wait for the next mode event. Stays pending when there is nothing to
    /// wait on; must be cancel safe.
    async fn next_event(&mut self) -> Self::Event;

    async fn on_event(&mut self, event: Self::Event);

    fn add(&mut self, endpoint: Endpoint<Self::Channel>) -> Result<(), HubError>;

    /// Close and forget an endpoint. Returns `false` if it was not registered.
    async fn remove(&mut self, id: EndpointId) -> bool;

    /// Close every endpoint and the hub's own inbound side.
    async fn close_all(&mut self);

    fn len(&self) -> usize;

    fn delivered(&self) -> u64;

    fn dropped(&self) -> u64;
}

/// The hub event loop.
pub(crate) struct Hub<M: Mode> {
    name: Arc<str>,
    mode: M,
    control: mpsc::Receiver<Command<M::Channel>>,
    state: HubState,
}

impl<M: Mode> Hub<M> {
    pub(crate) fn new(
        name: Arc<str>,
        mode: M,
        control: mpsc::Receiver<Command<M::Channel>>,
    ) -> Self {
        Self {
            name,
            mode,
            control,
            state: HubState::Running,
        }
    }

    /// Spawn the loop on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NoRuntime`] outside a tokio runtime.
    pub(crate) fn spawn(self) -> Result<(), HubError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| HubError::NoRuntime)?;
        runtime.spawn(self.run());
        Ok(())
    }

    async fn run(mut self) {
        info!(hub = %self.name, kind = %M::KIND, "Hub started");
        metrics::record_hub_started();

        while self.state == HubState::Running {
            tokio::select! {
                command = self.control.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => {
                        debug!(hub = %self.name, "All handles dropped");
                        self.terminate().await;
                    }
                },
                event = self.mode.next_event() => self.mode.on_event(event).await,
            }
        }

        metrics::record_hub_terminated(&self.name);
        info!(hub = %self.name, kind = %M::KIND, "Hub terminated");
    }

    async fn handle(&mut self, command: Command<M::Channel>) {
        metrics::record_control(&self.name, command.kind());
        trace!(hub = %self.name, command = ?command, "Control message");

        match command {
            Command::Add { endpoint, ack } => {
                let id = endpoint.id();
                let result = self.mode.add(endpoint);
                if result.is_ok() {
                    debug!(
                        hub = %self.name,
                        endpoint = %id,
                        endpoints = self.mode.len(),
                        "Endpoint added"
                    );
                    metrics::set_endpoints(&self.name, self.mode.len());
                }
                let _ = ack.send(result);
            }
            Command::Remove { id, ack } => {
                if self.mode.remove(id).await {
                    debug!(
                        hub = %self.name,
                        endpoint = %id,
                        endpoints = self.mode.len(),
                        "Endpoint removed"
                    );
                    metrics::set_endpoints(&self.name, self.mode.len());
                } else {
                    trace!(hub = %self.name, endpoint = %id, "Remove of unknown endpoint");
                }
                let _ = ack.send(Ok(()));
            }
            Command::Stats { ack } => {
                let _ = ack.send(Ok(self.stats()));
            }
            Command::Release { ack } => {
                self.terminate().await;
                let _ = ack.send(Ok(()));
            }
        }
    }

    fn stats(&self) -> HubStats {
        HubStats {
            name: self.name.to_string(),
            kind: M::KIND,
            endpoints: self.mode.len(),
            delivered: self.mode.delivered(),
            dropped: self.mode.dropped(),
        }
    }

    /// Close everything the hub owns and refuse further commands.
    async fn terminate(&mut self) {
        let endpoints = self.mode.len();
        self.mode.close_all().await;
        self.control.close();
        self.state = HubState::Terminated;

        // Commands that were already queued get an error instead of silence.
        let mut rejected = 0usize;
        while let Ok(command) = self.control.try_recv() {
            command.reject();
            rejected += 1;
        }

        debug!(
            hub = %self.name,
            endpoints,
            rejected,
            "Hub released"
        );
    }
}
