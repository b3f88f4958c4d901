//! Control protocol between hub handles and the hub loop.
//!
//! Every registry mutation is a [`Command`] carrying a oneshot
//! acknowledgement. The command queue holds a single slot, so a caller is
//! parked until the loop is ready for it, and then parked again until the
//! loop has fully applied the command and answered.

use crate::endpoint::{Endpoint, EndpointId};
use crate::error::HubError;
use crate::hub::HubStats;
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Depth of the command queue.
const CONTROL_QUEUE_DEPTH: usize = 1;

/// Acknowledgement half of a command.
pub(crate) type Ack<R> = oneshot::Sender<Result<R, HubError>>;

/// A command for the hub loop.
pub(crate) enum Command<C> {
    Add { endpoint: Endpoint<C>, ack: Ack<()> },
    Remove { id: EndpointId, ack: Ack<()> },
    Stats { ack: Ack<HubStats> },
    Release { ack: Ack<()> },
}

impl<C> Command<C> {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Command::Add { .. } => "add",
            Command::Remove { .. } => "remove",
            Command::Stats { .. } => "stats",
            Command::Release { .. } => "release",
        }
    }

    /// Answer a command that arrived after the hub stopped accepting work.
    pub(crate) fn reject(self) {
        // The caller may have timed out and gone away.
        match self {
            Command::Add { ack, .. } | Command::Remove { ack, .. } => {
                let _ = ack.send(Err(HubError::Terminated));
            }
            Command::Stats { ack } => {
                let _ = ack.send(Err(HubError::Terminated));
            }
            Command::Release { ack } => {
                let _ = ack.send(Err(HubError::AlreadyReleased));
            }
        }
    }
}

impl<C> fmt::Debug for Command<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Add { endpoint, .. } => f
                .debug_struct("Add")
                .field("id", &endpoint.id())
                .finish_non_exhaustive(),
            Command::Remove { id, .. } => f.debug_struct("Remove").field("id", id).finish(),
            Command::Stats { .. } => f.write_str("Stats"),
            Command::Release { .. } => f.write_str("Release"),
        }
    }
}

/// Handle-side end of the control protocol.
pub(crate) struct ControlChannel<C> {
    commands: mpsc::Sender<Command<C>>,
    ack_timeout: Option<Duration>,
}

impl<C> Clone for ControlChannel<C> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            ack_timeout: self.ack_timeout,
        }
    }
}

impl<C> fmt::Debug for ControlChannel<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlChannel")
            .field("closed", &self.commands.is_closed())
            .field("ack_timeout", &self.ack_timeout)
            .finish()
    }
}

impl<C: Send + 'static> ControlChannel<C> {
    /// Create the control channel, returning the loop-side receiver.
    pub(crate) fn new(ack_timeout: Option<Duration>) -> (Self, mpsc::Receiver<Command<C>>) {
        let (commands, receiver) = mpsc::channel(CONTROL_QUEUE_DEPTH);
        (
            Self {
                commands,
                ack_timeout,
            },
            receiver,
        )
    }

    pub(crate) async fn add(&self, endpoint: Endpoint<C>) -> Result<(), HubError> {
        self.request(|ack| Command::Add { endpoint, ack }, || HubError::Terminated)
            .await
    }

    pub(crate) async fn remove(&self, id: EndpointId) -> Result<(), HubError> {
        self.request(|ack| Command::Remove { id, ack }, || HubError::Terminated)
            .await
    }

    pub(crate) async fn stats(&self) -> Result<HubStats, HubError> {
        self.request(|ack| Command::Stats { ack }, || HubError::Terminated)
            .await
    }

    pub(crate) async fn release(&self) -> Result<(), HubError> {
        self.request(|ack| Command::Release { ack }, || HubError::AlreadyReleased)
            .await
    }

    /// Whether the hub loop has stopped accepting commands.
    pub(crate) fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Send a command and wait for its acknowledgement.
    ///
    /// `closed` builds the error reported when the loop is gone, either
    /// before the command was queued or before it was answered.
    async fn request<R>(
        &self,
        build: impl FnOnce(Ack<R>) -> Command<C>,
        closed: fn() -> HubError,
    ) -> Result<R, HubError> {
        let (ack, answer) = oneshot::channel();
        let exchange = async move {
            if self.commands.send(build(ack)).await.is_err() {
                return Err(closed());
            }
            match answer.await {
                Ok(result) => result,
                Err(_) => Err(closed()),
            }
        };

        match self.ack_timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| HubError::AckTimeout(limit))?,
            None => exchange.await,
        }
    }
}
