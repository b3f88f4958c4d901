//! # Plexus soak runner
//!
//! Drives a broadcast hub and a collect hub with a sustained workload and
//! prints what each delivered.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! plexus-soak
//!
//! # Run with a specific config file
//! plexus-soak /path/to/plexus.toml
//!
//! # Run with environment overrides
//! PLEXUS_SUBSCRIBERS=64 PLEXUS_VALUES=1000000 plexus-soak
//! ```

use anyhow::Result;
use plexus_bench::{soak, SoakConfig, SoakReport};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plexus_core=info,plexus_bench=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    plexus_core::metrics::describe_metrics();

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => SoakConfig::from_file(path)?,
        None => SoakConfig::load()?,
    };

    tracing::info!(
        subscribers = config.workload.subscribers,
        sources = config.workload.sources,
        values = config.workload.values,
        "Starting soak run"
    );

    let (broadcast, collect) = soak::run(&config).await?;

    print_report("broadcast", &broadcast);
    print_report("collect", &collect);

    Ok(())
}

fn print_report(label: &str, report: &SoakReport) {
    println!(
        "{:<10} sent={:<10} received={:<10} dropped={:<8} endpoints={:<4} {:>12.0} values/s ({:.2?})",
        label,
        report.sent,
        report.received,
        report.stats.dropped,
        report.stats.endpoints,
        report.throughput(),
        report.elapsed,
    );
}
