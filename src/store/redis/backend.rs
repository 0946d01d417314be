//! Redis-backed [`ScriptStore`] implementation
//!
//! Thin glue between the trait contract and the Lua scripts: each
//! operation prepares one script invocation, hands it to the pool's
//! retry machinery and decodes the flat integer replies. Empty key
//! batches short-circuit locally since the matching script would do
//! nothing server-side either.

use super::connection::{RedisConfig, RedisPool};
use super::scripts::LuaScripts;
use crate::error::StoreError;
use crate::store::ScriptStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// [`ScriptStore`] over a shared Redis connection.
///
/// # Example
///
/// ```rust,no_run
/// use redistat::store::redis::{RedisConfig, RedisStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = RedisStore::connect(RedisConfig::default()).await?;
/// # Ok(())
/// # }
/// ```
pub struct RedisStore {
    pool: RedisPool,
    scripts: LuaScripts,
}

impl RedisStore {
    /// Build a store without touching the network; the connection is
    /// established by the first operation.
    pub fn new(config: RedisConfig) -> Result<Self, StoreError> {
        Ok(Self {
            pool: RedisPool::new(config)?,
            scripts: LuaScripts::new(),
        })
    }

    /// Build a store and connect eagerly, failing fast on a bad target.
    pub async fn connect(config: RedisConfig) -> Result<Self, StoreError> {
        let store = Self {
            pool: RedisPool::connect(config).await?,
            scripts: LuaScripts::new(),
        };
        debug!(
            "redis store ready (pool size {})",
            store.pool.config().pool_size
        );
        Ok(store)
    }

    /// The underlying connection pool, for metrics and pings.
    pub fn pool(&self) -> &RedisPool {
        &self.pool
    }
}

#[async_trait]
impl ScriptStore for RedisStore {
    async fn hash_increment_by(
        &self,
        keys: &[String],
        fields: &[i64],
        delta: i64,
    ) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let script = self.scripts.hash_increment_by();
        let _touched: i64 = self
            .pool
            .execute(|mut conn| {
                let script = Arc::clone(&script);
                async move {
                    let mut invocation = script.prepare_invoke();
                    for key in keys {
                        invocation.key(key.as_str());
                    }
                    invocation.arg(delta);
                    for field in fields {
                        invocation.arg(*field);
                    }
                    invocation.invoke_async(&mut conn).await
                }
            })
            .await?;
        Ok(())
    }

    async fn hash_multi_find(
        &self,
        keys: &[String],
        fields: &[i64],
    ) -> Result<Vec<i64>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let script = self.scripts.hash_multi_find();
        let values: Vec<i64> = self
            .pool
            .execute(|mut conn| {
                let script = Arc::clone(&script);
                async move {
                    let mut invocation = script.prepare_invoke();
                    for key in keys {
                        invocation.key(key.as_str());
                    }
                    for field in fields {
                        invocation.arg(*field);
                    }
                    invocation.invoke_async(&mut conn).await
                }
            })
            .await?;
        if values.len() != keys.len() {
            return Err(StoreError::Response(format!(
                "asked for {} values, got {}",
                keys.len(),
                values.len()
            )));
        }
        Ok(values)
    }

    async fn set_add_member(&self, keys: &[String], member: &str) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let script = self.scripts.set_add_member();
        let _touched: i64 = self
            .pool
            .execute(|mut conn| {
                let script = Arc::clone(&script);
                async move {
                    let mut invocation = script.prepare_invoke();
                    for key in keys {
                        invocation.key(key.as_str());
                    }
                    invocation.arg(member);
                    invocation.invoke_async(&mut conn).await
                }
            })
            .await?;
        Ok(())
    }

    async fn set_remove_member(&self, keys: &[String], member: &str) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let script = self.scripts.set_remove_member();
        let _touched: i64 = self
            .pool
            .execute(|mut conn| {
                let script = Arc::clone(&script);
                async move {
                    let mut invocation = script.prepare_invoke();
                    for key in keys {
                        invocation.key(key.as_str());
                    }
                    invocation.arg(member);
                    invocation.invoke_async(&mut conn).await
                }
            })
            .await?;
        Ok(())
    }

    async fn set_multi_ismember(
        &self,
        keys: &[String],
        member: &str,
    ) -> Result<Vec<bool>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let script = self.scripts.set_multi_ismember();
        let hits: Vec<bool> = self
            .pool
            .execute(|mut conn| {
                let script = Arc::clone(&script);
                async move {
                    let mut invocation = script.prepare_invoke();
                    for key in keys {
                        invocation.key(key.as_str());
                    }
                    invocation.arg(member);
                    invocation.invoke_async(&mut conn).await
                }
            })
            .await?;
        if hits.len() != keys.len() {
            return Err(StoreError::Response(format!(
                "asked for {} membership flags, got {}",
                keys.len(),
                hits.len()
            )));
        }
        Ok(hits)
    }

    async fn sum_hash_fields(&self, keys: &[String], fields: &[i64]) -> Result<i64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let script = self.scripts.sum_fields();
        let total: i64 = self
            .pool
            .execute(|mut conn| {
                let script = Arc::clone(&script);
                async move {
                    let mut invocation = script.prepare_invoke();
                    for key in keys {
                        invocation.key(key.as_str());
                    }
                    for field in fields {
                        invocation.arg(*field);
                    }
                    invocation.invoke_async(&mut conn).await
                }
            })
            .await?;
        Ok(total)
    }

    async fn sum_per_step(
        &self,
        keys: &[String],
        fields: &[i64],
        ids_per_step: usize,
    ) -> Result<Vec<i64>, StoreError> {
        if keys.is_empty() {
            return Ok(vec![0]);
        }
        let script = self.scripts.sum_per_step();
        let reply: Vec<i64> = self
            .pool
            .execute(|mut conn| {
                let script = Arc::clone(&script);
                async move {
                    let mut invocation = script.prepare_invoke();
                    for key in keys {
                        invocation.key(key.as_str());
                    }
                    invocation.arg(ids_per_step as i64);
                    for field in fields {
                        invocation.arg(*field);
                    }
                    invocation.invoke_async(&mut conn).await
                }
            })
            .await?;
        Ok(reply)
    }

    async fn union_cardinality(
        &self,
        keys: &[String],
        scratch_key: &str,
    ) -> Result<i64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let script = self.scripts.union_cardinality();
        let count: i64 = self
            .pool
            .execute(|mut conn| {
                let script = Arc::clone(&script);
                async move {
                    let mut invocation = script.prepare_invoke();
                    for key in keys {
                        invocation.key(key.as_str());
                    }
                    invocation.arg(scratch_key);
                    invocation.invoke_async(&mut conn).await
                }
            })
            .await?;
        Ok(count)
    }

    async fn union_per_step_cardinality(
        &self,
        keys: &[String],
        ids_per_step: usize,
        attribute_keys: usize,
        scratch_key: &str,
    ) -> Result<Vec<i64>, StoreError> {
        if keys.len() <= attribute_keys {
            return Ok(vec![0]);
        }
        let script = self.scripts.union_per_step_cardinality();
        let reply: Vec<i64> = self
            .pool
            .execute(|mut conn| {
                let script = Arc::clone(&script);
                async move {
                    let mut invocation = script.prepare_invoke();
                    for key in keys {
                        invocation.key(key.as_str());
                    }
                    invocation.arg(ids_per_step as i64);
                    invocation.arg(scratch_key);
                    for _ in 0..attribute_keys {
                        invocation.arg(1);
                    }
                    invocation.invoke_async(&mut conn).await
                }
            })
            .await?;
        Ok(reply)
    }

    async fn delete_key(&self, key: &str) -> Result<(), StoreError> {
        let _removed: i64 = self
            .pool
            .execute(|mut conn| async move {
                redis::cmd("DEL").arg(key).query_async(&mut conn).await
            })
            .await?;
        Ok(())
    }
}
