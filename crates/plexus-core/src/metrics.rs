//! Hub instrumentation.
//!
//! Uses the `metrics` facade; installing an exporter is left to the
//! embedding application.

use metrics::{counter, gauge};

/// Metric names.
pub mod names {
    pub const HUBS_ACTIVE: &str = "plexus_hubs_active";
    pub const ENDPOINTS_ACTIVE: &str = "plexus_endpoints_active";
    pub const VALUES_DELIVERED: &str = "plexus_values_delivered_total";
    pub const VALUES_DROPPED: &str = "plexus_values_dropped_total";
    pub const CONTROL_TOTAL: &str = "plexus_control_total";
}

/// Describe all hub metrics to the installed recorder.
pub fn describe_metrics() {
    metrics::describe_gauge!(names::HUBS_ACTIVE, "Number of running hubs");
    metrics::describe_gauge!(
        names::ENDPOINTS_ACTIVE,
        "Number of endpoints registered with a hub"
    );
    metrics::describe_counter!(
        names::VALUES_DELIVERED,
        "Values delivered to subscribers or forwarded from sources"
    );
    metrics::describe_counter!(
        names::VALUES_DROPPED,
        "Values skipped for a full subscriber"
    );
    metrics::describe_counter!(names::CONTROL_TOTAL, "Control messages processed");
}

pub(crate) fn record_hub_started() {
    gauge!(names::HUBS_ACTIVE).increment(1.0);
}

pub(crate) fn record_hub_terminated(hub: &str) {
    gauge!(names::HUBS_ACTIVE).decrement(1.0);
    set_endpoints(hub, 0);
}

pub(crate) fn record_control(hub: &str, kind: &'static str) {
    counter!(names::CONTROL_TOTAL, "hub" => hub.to_string(), "kind" => kind).increment(1);
}

pub(crate) fn set_endpoints(hub: &str, count: usize) {
    gauge!(names::ENDPOINTS_ACTIVE, "hub" => hub.to_string()).set(count as f64);
}

pub(crate) fn record_delivered(hub: &str, count: u64) {
    if count > 0 {
        counter!(names::VALUES_DELIVERED, "hub" => hub.to_string()).increment(count);
    }
}

pub(crate) fn record_dropped(hub: &str, count: u64) {
    if count > 0 {
        counter!(names::VALUES_DROPPED, "hub" => hub.to_string()).increment(count);
    }
}
