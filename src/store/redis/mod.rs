//! Redis backend for the analytics store
//!
//! Production [`ScriptStore`](crate::store::ScriptStore) implementation.
//! All multi-key work runs as server-side Lua so every operation is one
//! atomic round trip regardless of how many rollup keys it touches.
//!
//! # Redis Schema
//!
//! ```text
//! [ns:]metric:label:bucket     HASH   counter values, field = id % 1000
//! [ns:]metric:label:id         HASH   mosaic values, keyed per id
//! [ns:]metric:label[:id]       SET    unique members
//! [ns:]attribute               SET    global attribute members
//! [ns:]scratch:<random>        SET    transient union staging
//! ```
//!
//! # Components
//!
//! - [`RedisStore`]: the store implementation
//! - [`RedisPool`] / [`RedisConfig`]: connection sharing, timeouts, retry
//! - [`LuaScripts`]: cached script definitions

mod backend;
mod connection;
mod scripts;
mod util;

pub use backend::RedisStore;
pub use connection::{PoolMetrics, PoolMetricsSnapshot, RedisConfig, RedisPool, RetryPolicy};
pub use scripts::LuaScripts;
