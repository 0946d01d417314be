//! Redistat - time-bucketed analytics on top of Redis
//!
//! Counters, unique-member sets and per-entity mosaics, written with
//! calendar rollup fan-out and read back with single-round-trip
//! aggregation:
//! - one atomic store call per operation, however many keys it spans
//! - counters packed 1000 ids per hash for memory efficiency
//! - day / week / month / year rollups maintained on every write
//! - ranged aggregation with per-interval breakdowns
//! - pluggable store: Redis with Lua scripts, or in-memory for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use redistat::{
//!     AggregateQuery, Event, MetricConfig, Resolution, StatsClient, StatsConfig,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = StatsClient::connect(&StatsConfig::default()).await?;
//! let visits = client.metric(
//!     MetricConfig::counter("visits").resolution(Resolution::Day).build()?,
//! );
//!
//! visits.increment(redistat::Event::id(1042).on("2026-01-05")).await?;
//! visits.increment(Event::ids([7, 8]).on("2026-01-05").by(2)).await?;
//!
//! let report = visits
//!     .aggregate(AggregateQuery::between("2026-01-01", "2026-01-31").id(1042))
//!     .await?;
//! println!("total {} across {} days", report.total, report.series.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod keys;
pub mod metric;
pub mod time;
pub mod types;

/// Configuration files with TOML support and environment overrides
pub mod config;

/// Store backends: the trait seam, Redis with Lua scripts, in-memory
pub mod store;

// Re-export the working surface
pub use config::StatsConfig;
pub use error::{Error, Result, StoreError};
pub use metric::{
    AggregateQuery, Event, Metric, MetricConfig, MetricConfigBuilder, StatsClient,
};
pub use store::{MemoryStore, ScriptStore};
pub use time::{DateSpec, Resolution, TimeFrame};
pub use types::{Aggregate, EntityId, SeriesPoint, Variant};
