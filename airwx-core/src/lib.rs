//! Core library for the `airwx` service.
//!
//! This crate defines:
//! - Configuration of airports and their weather feeds
//! - Upstream clients for personal weather stations and METAR
//! - Aggregation of one refresh cycle into a [`WeatherRecord`]
//! - Daily extremes, snapshot persistence and staleness suppression
//! - The stale-while-revalidate delivery protocol
//!
//! It is used by `airwx-cli`, but can also be reused by other binaries or services.

use std::sync::Arc;

pub mod aggregator;
pub mod config;
pub mod delivery;
pub mod derived;
pub mod error;
pub mod extremes;
pub mod model;
pub mod rate_limit;
pub mod snapshot;
pub mod source;
pub mod staleness;

pub use aggregator::Aggregator;
pub use config::{AirportConfig, Config, WeatherSource};
pub use delivery::{CacheStatus, Conditional, Delivery, DeliveryStatus, WeatherService};
pub use error::WeatherError;
pub use model::{CloudCover, FlightCategory, WeatherRecord};
pub use snapshot::{CachedSnapshot, FileSnapshotStore, SnapshotStore};
pub use source::{SourceKind, UpstreamClient};

/// Wall clock shared by every component that stamps or ages data.
pub type SharedClock = Arc<dyn mockable::Clock + Send + Sync>;
