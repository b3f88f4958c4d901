//! Relay workers for collect hubs.
//!
//! Each registered source gets one relay task that drains it into the hub's
//! aggregate channel. The hub keeps a [`RelayHandle`] per worker and stops it
//! through a oneshot signal on remove and release.

use crate::endpoint::EndpointId;
use crate::metrics;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Why a relay worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RelayExit {
    /// The source was closed by its owner and fully drained.
    SourceClosed,
    /// Nobody is reading the aggregate channel anymore.
    OutputClosed,
    /// The hub asked the worker to stop.
    Stopped,
}

/// Everything a relay worker shares with its hub.
#[derive(Debug)]
pub(crate) struct RelayContext<T> {
    pub(crate) hub: Arc<str>,
    pub(crate) output: mpsc::Sender<T>,
    pub(crate) retired: mpsc::UnboundedSender<EndpointId>,
    pub(crate) forwarded: Arc<AtomicU64>,
}

/// Hub-side handle to a running relay worker.
#[derive(Debug)]
pub(crate) struct RelayHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<RelayExit>,
}

impl RelayHandle {
    /// Spawn a relay worker draining `source`.
    pub(crate) fn spawn<T: Send + 'static>(
        id: EndpointId,
        source: mpsc::Receiver<T>,
        context: RelayContext<T>,
    ) -> Self {
        let (stop, stop_signal) = oneshot::channel();
        let task = tokio::spawn(run(id, source, context, stop_signal));
        Self { stop, task }
    }

    /// Signal the worker to stop and wait for it to finish.
    pub(crate) async fn stop(self) -> Option<RelayExit> {
        // Fails only if the worker already exited.
        let _ = self.stop.send(());
        match self.task.await {
            Ok(exit) => Some(exit),
            Err(e) => {
                warn!(error = %e, "Relay worker did not finish cleanly");
                None
            }
        }
    }
}

async fn run<T: Send + 'static>(
    id: EndpointId,
    mut source: mpsc::Receiver<T>,
    context: RelayContext<T>,
    mut stop: oneshot::Receiver<()>,
) -> RelayExit {
    debug!(hub = %context.hub, endpoint = %id, "Relay started");

    let exit = loop {
        // A dropped stop sender means the hub itself is gone.
        let value = tokio::select! {
            biased;
            _ = &mut stop => break RelayExit::Stopped,
            value = source.recv() => value,
        };

        let Some(value) = value else {
            break RelayExit::SourceClosed;
        };

        tokio::select! {
            biased;
            _ = &mut stop => break RelayExit::Stopped,
            sent = context.output.send(value) => {
                if sent.is_err() {
                    break RelayExit::OutputClosed;
                }
            }
        }

        context.forwarded.fetch_add(1, Ordering::Relaxed);
        metrics::record_delivered(&context.hub, 1);
        trace!(hub = %context.hub, endpoint = %id, "Forwarded value");
    };

    // Producers still holding the source now see it closed.
    source.close();

    if exit != RelayExit::Stopped {
        // The hub may already be tearing down.
        let _ = context.retired.send(id);
    }

    debug!(hub = %context.hub, endpoint = %id, reason = ?exit, "Relay finished");
    exit
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        output: mpsc::Receiver<u32>,
        retired: mpsc::UnboundedReceiver<EndpointId>,
        forwarded: Arc<AtomicU64>,
        context: Option<RelayContext<u32>>,
    }

    fn harness(capacity: usize) -> Harness {
        let (output_tx, output) = mpsc::channel(capacity);
        let (retired_tx, retired) = mpsc::unbounded_channel();
        let forwarded = Arc::new(AtomicU64::new(0));
        Harness {
            output,
            retired,
            forwarded: forwarded.clone(),
            context: Some(RelayContext {
                hub: Arc::from("test"),
                output: output_tx,
                retired: retired_tx,
                forwarded,
            }),
        }
    }

    #[tokio::test]
    async fn test_relay_forwards_until_source_closes() {
        let mut h = harness(8);
        let (tx, rx) = mpsc::channel(4);
        let id = EndpointId::new();
        let relay = RelayHandle::spawn(id, rx, h.context.take().unwrap());

        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        drop(tx);

        assert_eq!(h.output.recv().await, Some(1));
        assert_eq!(h.output.recv().await, Some(2));
        assert_eq!(h.retired.recv().await, Some(id));
        assert_eq!(h.forwarded.load(Ordering::Relaxed), 2);

        assert_eq!(relay.stop().await, Some(RelayExit::SourceClosed));
    }

    #[tokio::test]
    async fn test_relay_stop_closes_source() {
        let mut h = harness(8);
        let (tx, rx) = mpsc::channel::<u32>(4);
        let relay = RelayHandle::spawn(EndpointId::new(), rx, h.context.take().unwrap());

        assert_eq!(relay.stop().await, Some(RelayExit::Stopped));
        assert!(tx.send(1).await.is_err());
        // Stopped workers do not report retirement.
        assert!(h.retired.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_relay_stop_while_output_full() {
        let mut h = harness(1);
        let (tx, rx) = mpsc::channel(4);
        let relay = RelayHandle::spawn(EndpointId::new(), rx, h.context.take().unwrap());

        // First value fills the output, second parks the worker on send.
        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        while h.forwarded.load(Ordering::Relaxed) < 1 {
            tokio::task::yield_now().await;
        }

        assert_eq!(relay.stop().await, Some(RelayExit::Stopped));
        assert_eq!(h.output.recv().await, Some(1));
    }

    #[tokio::test]
    async fn test_relay_exits_when_output_closed() {
        let mut h = harness(4);
        let (tx, rx) = mpsc::channel(4);
        let id = EndpointId::new();
        let relay = RelayHandle::spawn(id, rx, h.context.take().unwrap());

        h.output.close();
        tx.send(7).await.unwrap();

        assert_eq!(h.retired.recv().await, Some(id));
        assert_eq!(relay.stop().await, Some(RelayExit::OutputClosed));
    }
}
