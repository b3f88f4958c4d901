//! # plexus-core
//!
//! Dynamic channel hubs for tokio.
//!
//! A hub is a single task owning a set of peer channels. It runs in one of
//! two modes:
//!
//! - **Broadcast** - every value published to the hub is cloned to every
//!   registered subscriber
//! - **Collect** - every registered source is drained into one aggregate
//!   channel
//!
//! Subscribers and sources can be added and removed while values flow.
//! Membership changes go through a command/acknowledgement rendezvous with
//! the hub task, so the registry has exactly one writer and needs no lock.
//!
//! ## Architecture
//!
//! ```text
//!  Broadcast                               Collect
//!
//!  publisher ──▶ inbound ──┐               source ──▶ relay ──┐
//!                          ▼               source ──▶ relay ──┼──▶ aggregate
//!                     ┌─────────┐          source ──▶ relay ──┘
//!  handles ─control─▶ │   Hub   │                       ▲
//!                     └─────────┘          handles ─control─▶ Hub
//!                      │   │   │
//!                      ▼   ▼   ▼
//!                    subscribers
//! ```
//!
//! ## Example
//!
//! ```no_run
//! # async fn demo() -> Result<(), plexus_core::HubError> {
//! use plexus_core::BroadcastHub;
//!
//! let hub = BroadcastHub::new(16)?;
//! let mut subscriber = hub.allocate().await?;
//!
//! hub.publish("hello").await?;
//! assert_eq!(subscriber.channel_mut().recv().await, Some("hello"));
//!
//! hub.release().await?;
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod collect;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod metrics;

mod control;
mod hub;
mod relay;

pub use broadcast::BroadcastHub;
pub use collect::CollectHub;
pub use config::{HubConfig, OverflowPolicy};
pub use endpoint::{Endpoint, EndpointId};
pub use error::HubError;
pub use hub::{HubKind, HubStats};
