//! Benchmark and soak support for plexus hubs.

pub mod config;
pub mod soak;

pub use config::{SoakConfig, WorkloadConfig};
pub use soak::SoakReport;
