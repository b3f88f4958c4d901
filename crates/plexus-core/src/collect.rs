//! Collect hubs: many sources merged into one aggregate channel.
//!
//! Each registered source is drained by its own relay worker, so a slow
//! consumer applies backpressure per source rather than stalling the hub.
//! Values from one source keep their order; values from different sources
//! interleave in arrival order.

use crate::config::HubConfig;
use crate::control::ControlChannel;
use crate::endpoint::{Endpoint, EndpointId};
use crate::error::HubError;
use crate::hub::{Hub, HubKind, HubStats, Mode};
use crate::metrics;
use crate::relay::{RelayContext, RelayHandle};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Fan-in registry owned by a collect hub loop.
pub(crate) struct Fanin<T> {
    hub: Arc<str>,
    output: Option<mpsc::Sender<T>>,
    relays: HashMap<EndpointId, RelayHandle>,
    retired_tx: mpsc::UnboundedSender<EndpointId>,
    retired_rx: mpsc::UnboundedReceiver<EndpointId>,
    forwarded: Arc<AtomicU64>,
}

impl<T: Send + 'static> Fanin<T> {
    pub(crate) fn new(hub: Arc<str>, output: mpsc::Sender<T>) -> Self {
        let (retired_tx, retired_rx) = mpsc::unbounded_channel();
        Self {
            hub,
            output: Some(output),
            relays: HashMap::new(),
            retired_tx,
            retired_rx,
            forwarded: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Mode for Fanin<T> {
    type Channel = mpsc::Receiver<T>;
    type Event = Option<EndpointId>;

    const KIND: HubKind = HubKind::Collect;

    async fn next_event(&mut self) -> Option<EndpointId> {
        // Never yields `None`: the hub keeps its own retirement sender.
        self.retired_rx.recv().await
    }

    async fn on_event(&mut self, event: Option<EndpointId>) {
        let Some(id) = event else {
            return;
        };
        // A relay that was removed in the meantime is already gone.
        if let Some(relay) = self.relays.remove(&id) {
            relay.stop().await;
            debug!(
                hub = %self.hub,
                endpoint = %id,
                endpoints = self.relays.len(),
                "Source retired"
            );
            metrics::set_endpoints(&self.hub, self.relays.len());
        }
    }

    fn add(&mut self, endpoint: Endpoint<mpsc::Receiver<T>>) -> Result<(), HubError> {
        let (id, source) = endpoint.into_parts();
        if self.relays.contains_key(&id) {
            return Err(HubError::DuplicateEndpoint(id));
        }
        let output = self.output.clone().ok_or(HubError::Terminated)?;

        let context = RelayContext {
            hub: self.hub.clone(),
            output,
            retired: self.retired_tx.clone(),
            forwarded: self.forwarded.clone(),
        };
        self.relays.insert(id, RelayHandle::spawn(id, source, context));
        Ok(())
    }

    async fn remove(&mut self, id: EndpointId) -> bool {
        match self.relays.remove(&id) {
            Some(relay) => {
                relay.stop().await;
                true
            }
            None => false,
        }
    }

    async fn close_all(&mut self) {
        for (_, relay) in self.relays.drain() {
            relay.stop().await;
        }
        // Consumers see the aggregate closed once buffered values are read.
        self.output = None;
    }

    fn len(&self) -> usize {
        self.relays.len()
    }

    fn delivered(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    fn dropped(&self) -> u64 {
        0
    }
}

/// Handle to a collect hub.
///
/// Handles are cheap to clone. The aggregate receiver is returned once, at
/// creation. The hub shuts down on [`release`] or when the last handle is
/// dropped.
///
/// [`release`]: CollectHub::release
pub struct CollectHub<T> {
    name: Arc<str>,
    capacity: usize,
    control: ControlChannel<mpsc::Receiver<T>>,
}

impl<T> Clone for CollectHub<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            capacity: self.capacity,
            control: self.control.clone(),
        }
    }
}

impl<T> fmt::Debug for CollectHub<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectHub")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("control", &self.control)
            .finish()
    }
}

impl<T: Send + 'static> CollectHub<T> {
    /// Create a collect hub with the given channel capacity.
    ///
    /// Returns the hub handle and the aggregate receiver.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidCapacity`] for a zero capacity and
    /// [`HubError::NoRuntime`] outside a tokio runtime.
    pub fn new(capacity: usize) -> Result<(Self, mpsc::Receiver<T>), HubError> {
        Self::with_config(HubConfig::new(capacity))
    }

    /// Create a collect hub from a configuration.
    ///
    /// The overflow policy does not apply to collect hubs.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or there is no
    /// tokio runtime.
    pub fn with_config(config: HubConfig) -> Result<(Self, mpsc::Receiver<T>), HubError> {
        config.validate()?;

        let name: Arc<str> = Arc::from(config.name.as_str());
        let (output, aggregate) = mpsc::channel(config.capacity);
        let (control, commands) = ControlChannel::new(config.ack_timeout());

        let fanin = Fanin::new(name.clone(), output);
        Hub::new(name.clone(), fanin, commands).spawn()?;

        let hub = Self {
            name,
            capacity: config.capacity,
            control,
        };
        Ok((hub, aggregate))
    }

    /// Get the hub name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the hub has been released.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.control.is_closed()
    }

    /// Register an existing channel as a source.
    ///
    /// The hub drains `source` until its senders are dropped, and closes it
    /// on remove or release.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Terminated`] if the hub has been released.
    pub async fn register(&self, source: mpsc::Receiver<T>) -> Result<EndpointId, HubError> {
        let endpoint = Endpoint::new(source);
        let id = endpoint.id();
        self.control.add(endpoint).await?;
        Ok(id)
    }

    /// Create a source channel of the hub's capacity and register it.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Terminated`] if the hub has been released.
    pub async fn allocate(&self) -> Result<Endpoint<mpsc::Sender<T>>, HubError> {
        let (sender, source) = mpsc::channel(self.capacity);
        let id = self.register(source).await?;
        Ok(Endpoint::with_id(id, sender))
    }

    /// Stop draining a source and close it.
    ///
    /// Values still buffered in the source are discarded. Removing an
    /// unknown or already removed endpoint is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Terminated`] if the hub has been released.
    pub async fn remove(&self, id: impl Into<EndpointId>) -> Result<(), HubError> {
        self.control.remove(id.into()).await
    }

    /// Get hub statistics.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Terminated`] if the hub has been released.
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        self.control.stats().await
    }

    /// Stop every relay worker, close every source and the aggregate
    /// channel, and stop the hub.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::AlreadyReleased`] on a second release.
    pub async fn release(&self) -> Result<(), HubError> {
        self.control.release().await
    }
}
