//! Soak runs against live hubs.
//!
//! Each run drives one hub with a configurable workload, releases it, and
//! reports what the endpoints actually saw next to the hub's own stats.

use crate::config::{SoakConfig, WorkloadConfig};
use anyhow::{ensure, Context, Result};
use plexus_core::{BroadcastHub, CollectHub, HubConfig, HubStats};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Poll interval while waiting for the hub to catch up.
const SETTLE_INTERVAL: Duration = Duration::from_millis(1);

/// Outcome of one soak run.
#[derive(Debug, Clone)]
pub struct SoakReport {
    /// Values published (broadcast) or written across all sources (collect).
    pub sent: u64,
    /// Values observed by subscribers or the aggregate consumer.
    pub received: u64,
    /// Hub statistics taken just before release.
    pub stats: HubStats,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl SoakReport {
    /// Received values per second.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        self.received as f64 / self.elapsed.as_secs_f64().max(f64::EPSILON)
    }
}

/// Run both soak phases.
///
/// # Errors
///
/// Returns the first hub error encountered.
pub async fn run(config: &SoakConfig) -> Result<(SoakReport, SoakReport)> {
    let broadcast = run_broadcast(&config.broadcast, &config.workload)
        .await
        .context("broadcast soak")?;
    let collect = run_collect(&config.collect, &config.workload)
        .await
        .context("collect soak")?;
    Ok((broadcast, collect))
}

fn spawn_reader(mut receiver: mpsc::Receiver<u64>) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut count = 0;
        while receiver.recv().await.is_some() {
            count += 1;
        }
        count
    })
}

/// Publish `workload.values` values to a broadcast hub.
///
/// # Errors
///
/// Returns an error if the hub cannot be created or fails mid-run.
pub async fn run_broadcast(hub_config: &HubConfig, workload: &WorkloadConfig) -> Result<SoakReport> {
    let hub = BroadcastHub::<u64>::with_config(hub_config.clone())?;
    let mut ids = Vec::with_capacity(workload.subscribers);
    let mut readers = Vec::with_capacity(workload.subscribers);
    for _ in 0..workload.subscribers {
        let (id, receiver) = hub.allocate().await?.into_parts();
        ids.push(id);
        readers.push(spawn_reader(receiver));
    }

    info!(
        hub = hub.name(),
        subscribers = workload.subscribers,
        values = workload.values,
        "Broadcast soak started"
    );

    let churn_at = workload.values / 2;
    let start = Instant::now();
    for value in 0..workload.values {
        if workload.churn && value == churn_at {
            if let Some(id) = ids.first().copied() {
                hub.remove(id).await?;
                let (id, receiver) = hub.allocate().await?.into_parts();
                ids[0] = id;
                readers.push(spawn_reader(receiver));
                debug!(hub = hub.name(), endpoint = %id, "Subscriber replaced");
            }
        }
        hub.publish(value).await?;
    }

    // Once the inbound queue is empty, the next control round trip is
    // answered only after the last value was delivered.
    while hub.pending() > 0 {
        tokio::time::sleep(SETTLE_INTERVAL).await;
    }
    let stats = hub.stats().await?;
    hub.release().await?;

    let mut received = 0;
    for reader in readers {
        received += reader.await?;
    }
    let elapsed = start.elapsed();

    ensure!(
        received == stats.delivered,
        "subscribers saw {} values but hub delivered {}",
        received,
        stats.delivered
    );

    Ok(SoakReport {
        sent: workload.values,
        received,
        stats,
        elapsed,
    })
}

/// Write `workload.values` values into each of `workload.sources` sources.
///
/// # Errors
///
/// Returns an error if the hub cannot be created or fails mid-run.
pub async fn run_collect(hub_config: &HubConfig, workload: &WorkloadConfig) -> Result<SoakReport> {
    let (hub, mut aggregate) = CollectHub::<u64>::with_config(hub_config.clone())?;

    info!(
        hub = hub.name(),
        sources = workload.sources,
        values = workload.values,
        "Collect soak started"
    );

    let start = Instant::now();
    let mut producers = Vec::with_capacity(workload.sources);
    for _ in 0..workload.sources {
        let sender = hub.allocate().await?.into_channel();
        let values = workload.values;
        producers.push(tokio::spawn(async move {
            for value in 0..values {
                if sender.send(value).await.is_err() {
                    break;
                }
            }
        }));
    }

    let sent = workload.values * workload.sources as u64;
    let mut received = 0;
    while received < sent {
        if aggregate.recv().await.is_none() {
            break;
        }
        received += 1;
    }
    for producer in producers {
        producer.await?;
    }

    // Relays retire once their producer is gone.
    let mut stats = hub.stats().await?;
    while stats.endpoints > 0 {
        tokio::time::sleep(SETTLE_INTERVAL).await;
        stats = hub.stats().await?;
    }
    hub.release().await?;
    let elapsed = start.elapsed();

    ensure!(
        received == sent,
        "aggregate yielded {} of {} values",
        received,
        sent
    );

    Ok(SoakReport {
        sent,
        received,
        stats,
        elapsed,
    })
}
