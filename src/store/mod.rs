//! Pluggable store boundary
//!
//! The analytics layer never talks wire protocol directly; it plans key
//! and argument batches and hands them to a [`ScriptStore`]. Each trait
//! method is one atomic round trip covering a whole batch, mirroring the
//! server-side scripts of the Redis backend.
//!
//! # Architecture
//!
//! ```text
//!   Metric operations (increment / find / aggregate)
//!            |
//!            |  keys + fields + members, planned client-side
//!            v
//!   ScriptStore trait  <-- one atomic round trip per operation
//!            |
//!     +------+---------+
//!     |                |
//!  RedisStore      MemoryStore
//!  (Lua scripts)   (tests, prototyping)
//! ```
//!
//! Two implementations ship with the crate: [`redis::RedisStore`] for
//! production and [`MemoryStore`] for tests and prototyping.

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;

use crate::error::StoreError;
use async_trait::async_trait;

/// Atomic batch operations the analytics layer delegates to a store.
///
/// Contracts shared by all methods:
///
/// - `keys` and `fields` slices are index-aligned where both appear
/// - operations on an empty key batch succeed without touching the store
/// - absent keys and fields read as 0 (or `false` for membership)
/// - replies carrying per-step breakdowns are flat `Vec<i64>`s with the
///   grand total first, then one value per step
#[async_trait]
pub trait ScriptStore: Send + Sync + 'static {
    /// Add `delta` to `fields[i]` of the hash at `keys[i]`, for every
    /// pair, in one atomic step.
    async fn hash_increment_by(
        &self,
        keys: &[String],
        fields: &[i64],
        delta: i64,
    ) -> Result<(), StoreError>;

    /// Read `fields[i]` of the hash at `keys[i]` for every pair.
    async fn hash_multi_find(
        &self,
        keys: &[String],
        fields: &[i64],
    ) -> Result<Vec<i64>, StoreError>;

    /// Add `member` to every listed set.
    async fn set_add_member(&self, keys: &[String], member: &str) -> Result<(), StoreError>;

    /// Remove `member` from every listed set.
    async fn set_remove_member(&self, keys: &[String], member: &str) -> Result<(), StoreError>;

    /// Test `member` against every listed set.
    async fn set_multi_ismember(
        &self,
        keys: &[String],
        member: &str,
    ) -> Result<Vec<bool>, StoreError>;

    /// Sum `fields[i]` of the hash at `keys[i]` across all pairs.
    async fn sum_hash_fields(&self, keys: &[String], fields: &[i64]) -> Result<i64, StoreError>;

    /// Per-step sums. `keys` and `fields` are consumed in chunks of
    /// `ids_per_step`, one chunk per interval step.
    async fn sum_per_step(
        &self,
        keys: &[String],
        fields: &[i64],
        ids_per_step: usize,
    ) -> Result<Vec<i64>, StoreError>;

    /// Cardinality of the union of all listed sets. The union is staged
    /// under `scratch_key` and removed again before the call returns.
    async fn union_cardinality(
        &self,
        keys: &[String],
        scratch_key: &str,
    ) -> Result<i64, StoreError>;

    /// Per-step union cardinalities. The leading `steps * ids_per_step`
    /// entries of `keys` are consumed in chunks of `ids_per_step`; the
    /// trailing `attribute_keys` entries are merged into every step. The
    /// combined union across steps is left under `scratch_key` so the
    /// caller must remove it with [`delete_key`](ScriptStore::delete_key)
    /// once done.
    async fn union_per_step_cardinality(
        &self,
        keys: &[String],
        ids_per_step: usize,
        attribute_keys: usize,
        scratch_key: &str,
    ) -> Result<Vec<i64>, StoreError>;

    /// Remove one key. Used for scratch cleanup.
    async fn delete_key(&self, key: &str) -> Result<(), StoreError>;
}
