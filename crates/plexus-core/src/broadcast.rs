//! Broadcast hubs: one inbound channel, many subscribers.
//!
//! Every value published to the hub is cloned to every subscriber registered
//! when the hub loop picks the value up.

use crate::config::{HubConfig, OverflowPolicy};
use crate::control::ControlChannel;
use crate::endpoint::{Endpoint, EndpointId};
use crate::error::HubError;
use crate::hub::{Hub, HubKind, HubStats, Mode};
use crate::metrics;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};

/// Fan-out registry owned by a broadcast hub loop.
pub(crate) struct Fanout<T> {
    hub: Arc<str>,
    inbound: mpsc::Receiver<T>,
    inbound_open: bool,
    subscribers: HashMap<EndpointId, mpsc::Sender<T>>,
    overflow: OverflowPolicy,
    delivered: u64,
    dropped: u64,
}

impl<T: Clone + Send + 'static> Fanout<T> {
    pub(crate) fn new(hub: Arc<str>, inbound: mpsc::Receiver<T>, overflow: OverflowPolicy) -> Self {
        Self {
            hub,
            inbound,
            inbound_open: true,
            subscribers: HashMap::new(),
            overflow,
            delivered: 0,
            dropped: 0,
        }
    }

    /// Send one value to every subscriber.
    async fn deliver(&mut self, value: T) {
        let mut delivered = 0u64;
        let mut dropped = 0u64;
        let mut gone = Vec::new();

        for (id, subscriber) in &self.subscribers {
            match self.overflow {
                OverflowPolicy::Block => match subscriber.send(value.clone()).await {
                    Ok(()) => delivered += 1,
                    Err(_) => gone.push(*id),
                },
                OverflowPolicy::DropNewest => match subscriber.try_send(value.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        trace!(hub = %self.hub, endpoint = %id, "Subscriber full, value dropped");
                        dropped += 1;
                    }
                    Err(TrySendError::Closed(_)) => gone.push(*id),
                },
            }
        }

        if !gone.is_empty() {
            for id in gone {
                self.subscribers.remove(&id);
                warn!(hub = %self.hub, endpoint = %id, "Subscriber receiver dropped, pruned");
            }
            metrics::set_endpoints(&self.hub, self.subscribers.len());
        }

        self.delivered += delivered;
        self.dropped += dropped;
        metrics::record_delivered(&self.hub, delivered);
        metrics::record_dropped(&self.hub, dropped);
        trace!(hub = %self.hub, recipients = delivered, "Broadcast value");
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> Mode for Fanout<T> {
    type Channel = mpsc::Sender<T>;
    type Event = Option<T>;

    const KIND: HubKind = HubKind::Broadcast;

    async fn next_event(&mut self) -> Option<T> {
        if self.inbound_open {
            self.inbound.recv().await
        } else {
            std::future::pending().await
        }
    }

    async fn on_event(&mut self, event: Option<T>) {
        match event {
            Some(value) => self.deliver(value).await,
            None => {
                debug!(hub = %self.hub, "Inbound channel closed");
                self.inbound_open = false;
            }
        }
    }

    fn add(&mut self, endpoint: Endpoint<mpsc::Sender<T>>) -> Result<(), HubError> {
        let (id, subscriber) = endpoint.into_parts();
        if self.subscribers.contains_key(&id) {
            return Err(HubError::DuplicateEndpoint(id));
        }
        self.subscribers.insert(id, subscriber);
        Ok(())
    }

    async fn remove(&mut self, id: EndpointId) -> bool {
        // Dropping the hub's sender closes the subscriber's channel.
        self.subscribers.remove(&id).is_some()
    }

    async fn close_all(&mut self) {
        self.subscribers.clear();
        self.inbound.close();
        self.inbound_open = false;
    }

    fn len(&self) -> usize {
        self.subscribers.len()
    }

    fn delivered(&self) -> u64 {
        self.delivered
    }

    fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Handle to a broadcast hub.
///
/// Handles are cheap to clone. The hub shuts down on [`release`] or when the
/// last handle is dropped.
///
/// [`release`]: BroadcastHub::release
pub struct BroadcastHub<T> {
    name: Arc<str>,
    capacity: usize,
    inbound: mpsc::Sender<T>,
    control: ControlChannel<mpsc::Sender<T>>,
}

impl<T> Clone for BroadcastHub<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            capacity: self.capacity,
            inbound: self.inbound.clone(),
            control: self.control.clone(),
        }
    }
}

impl<T> fmt::Debug for BroadcastHub<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("control", &self.control)
            .finish()
    }
}

impl<T: Clone + Send + 'static> BroadcastHub<T> {
    /// Create a broadcast hub with the given channel capacity.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidCapacity`] for a zero capacity and
    /// [`HubError::NoRuntime`] outside a tokio runtime.
    pub fn new(capacity: usize) -> Result<Self, HubError> {
        Self::with_config(HubConfig::new(capacity))
    }

    /// Create a broadcast hub from a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or there is no
    /// tokio runtime.
    pub fn with_config(config: HubConfig) -> Result<Self, HubError> {
        config.validate()?;

        let name: Arc<str> = Arc::from(config.name.as_str());
        let (inbound, inbound_rx) = mpsc::channel(config.capacity);
        let (control, commands) = ControlChannel::new(config.ack_timeout());

        let fanout = Fanout::new(name.clone(), inbound_rx, config.overflow);
        Hub::new(name.clone(), fanout, commands).spawn()?;

        Ok(Self {
            name,
            capacity: config.capacity,
            inbound,
            control,
        })
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

    /// Number of published values the hub loop has not picked up yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inbound.max_capacity() - self.inbound.capacity()
    }

    /// Get a sender for the hub's inbound channel.
    ///
    /// Sends fail once the hub is released.
    #[must_use]
    pub fn publisher(&self) -> mpsc::Sender<T> {
        self.inbound.clone()
    }

    /// Publish a value to all current subscribers.
    ///
    /// Waits while the inbound channel is full.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Terminated`] if the hub has been released.
    pub async fn publish(&self, value: T) -> Result<(), HubError> {
        self.inbound
            .send(value)
            .await
            .map_err(|_| HubError::Terminated)
    }

    /// Register an existing channel as a subscriber.
    ///
    /// The hub takes over `subscriber` and drops it on remove or release.
    /// The channel only closes at that point if the hub held the only
    /// sender: keep no clones of `subscriber` if you rely on the receiver
    /// seeing the channel closed.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Terminated`] if the hub has been released.
    pub async fn register(&self, subscriber: mpsc::Sender<T>) -> Result<EndpointId, HubError> {
        let endpoint = Endpoint::new(subscriber);
        let id = endpoint.id();
        self.control.add(endpoint).await?;
        Ok(id)
    }

    /// Create a subscriber channel of the hub's capacity and register it.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Terminated`] if the hub has been released.
    pub async fn allocate(&self) -> Result<Endpoint<mpsc::Receiver<T>>, HubError> {
        let (subscriber, receiver) = mpsc::channel(self.capacity);
        let id = self.register(subscriber).await?;
        Ok(Endpoint::with_id(id, receiver))
    }

    /// Remove a subscriber and close its channel.
    ///
    /// Removing an unknown or already removed endpoint is a no-op.
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

    /// Close every subscriber channel and stop the hub.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::AlreadyReleased`] on a second release.
    pub async fn release(&self) -> Result<(), HubError> {
        self.control.release().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    fn fanout(overflow: OverflowPolicy) -> (mpsc::Sender<u32>, Fanout<u32>) {
        let (tx, rx) = mpsc::channel(4);
        (tx, Fanout::new(Arc::from("test"), rx, overflow))
    }

    #[tokio::test]
    async fn test_fanout_duplicate_id_rejected() {
        let (_tx, mut fanout) = fanout(OverflowPolicy::Block);
        let id = EndpointId::new();
        let (a, _ra) = mpsc::channel(1);
        let (b, _rb) = mpsc::channel(1);

        assert!(fanout.add(Endpoint::with_id(id, a)).is_ok());
        assert!(matches!(
            fanout.add(Endpoint::with_id(id, b)),
            Err(HubError::DuplicateEndpoint(dup)) if dup == id
        ));
        assert_eq!(fanout.len(), 1);
    }

    #[tokio::test]
    async fn test_fanout_prunes_dropped_subscriber() {
        let (_tx, mut fanout) = fanout(OverflowPolicy::Block);
        let (a, ra) = mpsc::channel(1);
        let (b, mut rb) = mpsc::channel(1);
        fanout.add(Endpoint::new(a)).unwrap();
        fanout.add(Endpoint::new(b)).unwrap();
        drop(ra);

        fanout.deliver(5).await;

        assert_eq!(fanout.len(), 1);
        assert_eq!(fanout.delivered(), 1);
        assert_eq!(rb.try_recv(), Ok(5));
    }

    #[tokio::test]
    async fn test_fanout_drop_newest_skips_full_subscriber() {
        let (_tx, mut fanout) = fanout(OverflowPolicy::DropNewest);
        let (slow, mut slow_rx) = mpsc::channel(1);
        let (fast, mut fast_rx) = mpsc::channel(4);
        fanout.add(Endpoint::new(slow)).unwrap();
        fanout.add(Endpoint::new(fast)).unwrap();

        fanout.deliver(1).await;
        fanout.deliver(2).await;

        assert_eq!(fanout.dropped(), 1);
        assert_eq!(fanout.delivered(), 3);
        assert_eq!(slow_rx.try_recv(), Ok(1));
        assert_eq!(slow_rx.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(fast_rx.try_recv(), Ok(1));
        assert_eq!(fast_rx.try_recv(), Ok(2));
    }

    #[tokio::test]
    async fn test_fanout_close_all() {
        let (tx, mut fanout) = fanout(OverflowPolicy::Block);
        let (a, mut ra) = mpsc::channel::<u32>(1);
        fanout.add(Endpoint::new(a)).unwrap();

        fanout.close_all().await;

        assert_eq!(fanout.len(), 0);
        assert_eq!(ra.recv().await, None);
        assert!(tx.send(1).await.is_err());
    }

    #[tokio::test]
    async fn test_broadcast_hub_publish() {
        let hub = BroadcastHub::new(4).unwrap();
        let mut a = hub.allocate().await.unwrap();
        let mut b = hub.allocate().await.unwrap();

        hub.publish("hello".to_string()).await.unwrap();

        assert_eq!(a.channel_mut().recv().await.as_deref(), Some("hello"));
        assert_eq!(b.channel_mut().recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_broadcast_hub_zero_capacity() {
        assert!(matches!(
            BroadcastHub::<u32>::new(0),
            Err(HubError::InvalidCapacity)
        ));
    }

    #[test]
    fn test_broadcast_hub_requires_runtime() {
        assert!(matches!(
            BroadcastHub::<u32>::new(4),
            Err(HubError::NoRuntime)
        ));
    }

    #[tokio::test]
    async fn test_broadcast_hub_stats() {
        let hub = BroadcastHub::with_config(HubConfig::new(4).with_name("stats")).unwrap();
        let mut sub = hub.allocate().await.unwrap();
        hub.publish(1u32).await.unwrap();
        sub.channel_mut().recv().await.unwrap();

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.name, "stats");
        assert_eq!(stats.kind, HubKind::Broadcast);
        assert_eq!(stats.endpoints, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.dropped, 0);
    }
}
