//! Hub metrics as seen by an installed recorder.

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use plexus_core::metrics::names;
use plexus_core::{BroadcastHub, CollectHub, HubConfig};
use std::future::Future;

/// Run `test` on a current-thread runtime with a local debugging recorder.
///
/// Every hub task runs on this thread, so all of them report to the recorder.
fn with_recorder<F, Fut>(test: F)
where
    F: FnOnce(Snapshotter) -> Fut,
    Fut: Future<Output = ()>,
{
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    metrics::with_local_recorder(&recorder, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(test(snapshotter));
    });
}

fn metric(snapshotter: &Snapshotter, name: &str, hub: &str) -> Option<DebugValue> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find_map(|(key, _, _, value)| {
            let key = key.key();
            let found = key.name() == name
                && key
                    .labels()
                    .any(|label| label.key() == "hub" && label.value() == hub);
            found.then_some(value)
        })
}

#[test]
fn test_collect_delivered_counter_tracks_forwarded_values() {
    with_recorder(|snapshotter| async move {
        let (hub, mut aggregate) =
            CollectHub::with_config(HubConfig::new(8).with_name("fanin")).unwrap();
        let source = hub.allocate().await.unwrap();

        for value in 0u32..5 {
            source.channel().send(value).await.unwrap();
        }
        for value in 0u32..5 {
            assert_eq!(aggregate.recv().await, Some(value));
        }

        // Membership never changed while the values flowed.
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.endpoints, 1);
        assert_eq!(stats.delivered, 5);
        assert_eq!(
            metric(&snapshotter, names::VALUES_DELIVERED, "fanin"),
            Some(DebugValue::Counter(5))
        );
    });
}

#[test]
fn test_broadcast_endpoint_gauge_follows_pruning() {
    with_recorder(|snapshotter| async move {
        let hub = BroadcastHub::with_config(HubConfig::new(4).with_name("fanout")).unwrap();
        let gone = hub.allocate().await.unwrap();
        let mut kept = hub.allocate().await.unwrap();
        drop(gone);

        hub.publish(1u32).await.unwrap();
        assert_eq!(kept.channel_mut().recv().await, Some(1));
        assert_eq!(hub.stats().await.unwrap().endpoints, 1);

        match metric(&snapshotter, names::ENDPOINTS_ACTIVE, "fanout") {
            Some(DebugValue::Gauge(value)) => assert_eq!(value.into_inner(), 1.0),
            other => panic!("expected endpoint gauge, got {:?}", other),
        }
        assert_eq!(
            metric(&snapshotter, names::VALUES_DELIVERED, "fanout"),
            Some(DebugValue::Counter(1))
        );
    });
}
