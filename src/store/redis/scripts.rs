//! Lua scripts for atomic analytics operations
//!
//! Every store operation that touches more than one key runs as a
//! single server-side script, so a rollup fan-out (day, week, month,
//! year) or a multi-step aggregation is atomic and costs one round
//! trip. Scripts are invoked by SHA with automatic reload, so the
//! parse cost is paid once per server.
//!
//! # Scripts Provided
//!
//! - `hash_increment_by` / `hash_multi_find`: bucketed counter writes and reads
//! - `set_add_member` / `set_remove_member` / `set_multi_ismember`: unique sets
//! - `sum_fields` / `sum_per_step`: counter aggregation
//! - `union_cardinality` / `union_per_step_cardinality`: unique aggregation
//!
//! # Example
//!
//! ```rust,no_run
//! use redistat::store::redis::LuaScripts;
//!
//! let scripts = LuaScripts::new();
//! let increment = scripts.hash_increment_by();
//! ```

use parking_lot::RwLock;
use redis::Script;
use std::collections::HashMap;
use std::sync::Arc;

/// Collection of Lua scripts used by the Redis store.
///
/// Scripts are cached after first use so repeated operations share one
/// compiled [`Script`] (and therefore one SHA).
pub struct LuaScripts {
    cache: RwLock<HashMap<String, Arc<Script>>>,
}

impl LuaScripts {
    /// Create an empty script cache.
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_create(&self, name: &str, lua: &str) -> Arc<Script> {
        {
            let cache = self.cache.read();
            if let Some(script) = cache.get(name) {
                return Arc::clone(script);
            }
        }

        let script = Arc::new(Script::new(lua));
        {
            let mut cache = self.cache.write();
            cache.insert(name.to_string(), Arc::clone(&script));
        }
        script
    }

    /// Add one shared delta to a hash field per key.
    ///
    /// # Keys
    /// - KEYS[i]: counter hash (one per rollup per id)
    ///
    /// # Arguments
    /// - ARGV[1]: signed delta applied to every pair
    /// - ARGV[1 + i]: hash field for KEYS[i]
    ///
    /// # Returns
    /// - number of keys touched
    pub fn hash_increment_by(&self) -> Arc<Script> {
        self.get_or_create(
            "hash_increment_by",
            r#"
            local delta = ARGV[1]

            for i = 1, #KEYS do
                redis.call('HINCRBY', KEYS[i], ARGV[1 + i], delta)
            end

            return #KEYS
            "#,
        )
    }

    /// Read one hash field per key, treating absent values as 0.
    ///
    /// # Keys
    /// - KEYS[i]: counter hash
    ///
    /// # Arguments
    /// - ARGV[i]: hash field for KEYS[i]
    ///
    /// # Returns
    /// - array of integers, one per key
    pub fn hash_multi_find(&self) -> Arc<Script> {
        self.get_or_create(
            "hash_multi_find",
            r#"
            local values = {}

            for i = 1, #KEYS do
                local value = redis.call('HGET', KEYS[i], ARGV[i])
                values[i] = value and tonumber(value) or 0
            end

            return values
            "#,
        )
    }

    /// Add one member to every set.
    ///
    /// # Keys
    /// - KEYS[i]: member set (one per rollup)
    ///
    /// # Arguments
    /// - ARGV[1]: member id
    ///
    /// # Returns
    /// - number of keys touched
    pub fn set_add_member(&self) -> Arc<Script> {
        self.get_or_create(
            "set_add_member",
            r#"
            for i = 1, #KEYS do
                redis.call('SADD', KEYS[i], ARGV[1])
            end

            return #KEYS
            "#,
        )
    }

    /// Remove one member from every set.
    ///
    /// # Keys
    /// - KEYS[i]: member set (one per rollup)
    ///
    /// # Arguments
    /// - ARGV[1]: member id
    ///
    /// # Returns
    /// - number of keys touched
    pub fn set_remove_member(&self) -> Arc<Script> {
        self.get_or_create(
            "set_remove_member",
            r#"
            for i = 1, #KEYS do
                redis.call('SREM', KEYS[i], ARGV[1])
            end

            return #KEYS
            "#,
        )
    }

    /// Test one member against every set.
    ///
    /// # Keys
    /// - KEYS[i]: member set
    ///
    /// # Arguments
    /// - ARGV[1]: member id
    ///
    /// # Returns
    /// - array of 0/1 flags, one per key
    pub fn set_multi_ismember(&self) -> Arc<Script> {
        self.get_or_create(
            "set_multi_ismember",
            r#"
            local hits = {}

            for i = 1, #KEYS do
                hits[i] = redis.call('SISMEMBER', KEYS[i], ARGV[1])
            end

            return hits
            "#,
        )
    }

    /// Sum one hash field per key across all keys.
    ///
    /// # Keys
    /// - KEYS[i]: counter hash
    ///
    /// # Arguments
    /// - ARGV[i]: hash field for KEYS[i]
    ///
    /// # Returns
    /// - single integer total
    pub fn sum_fields(&self) -> Arc<Script> {
        self.get_or_create(
            "sum_fields",
            r#"
            local total = 0

            for i = 1, #KEYS do
                local value = redis.call('HGET', KEYS[i], ARGV[i])
                if value then
                    total = total + tonumber(value)
                end
            end

            return total
            "#,
        )
    }

    /// Sum hash fields in per-step chunks.
    ///
    /// # Keys
    /// - KEYS[i]: counter hash, grouped in chunks of ARGV[1] per step
    ///
    /// # Arguments
    /// - ARGV[1]: keys per step
    /// - ARGV[1 + i]: hash field for KEYS[i]
    ///
    /// # Returns
    /// - array: grand total first, then one sum per step
    pub fn sum_per_step(&self) -> Arc<Script> {
        self.get_or_create(
            "sum_per_step",
            r#"
            local per_step = tonumber(ARGV[1])
            local reply = {0}

            for base = 0, #KEYS - 1, per_step do
                local sum = 0
                for offset = 1, per_step do
                    local index = base + offset
                    local value = redis.call('HGET', KEYS[index], ARGV[1 + index])
                    if value then
                        sum = sum + tonumber(value)
                    end
                end
                reply[#reply + 1] = sum
                reply[1] = reply[1] + sum
            end

            return reply
            "#,
        )
    }

    /// Cardinality of the union of all sets, self-cleaning.
    ///
    /// # Keys
    /// - KEYS[i]: member set (step keys plus any attribute keys)
    ///
    /// # Arguments
    /// - ARGV[1]: scratch key for the union, removed before returning
    ///
    /// # Returns
    /// - single integer cardinality
    pub fn union_cardinality(&self) -> Arc<Script> {
        self.get_or_create(
            "union_cardinality",
            r#"
            local scratch = ARGV[1]
            local count = 0

            if #KEYS > 0 then
                count = redis.call('SUNIONSTORE', scratch, unpack(KEYS))
                redis.call('DEL', scratch)
            end

            return count
            "#,
        )
    }

    /// Per-step union cardinalities with shared attribute filters.
    ///
    /// # Keys
    /// - KEYS[1..n-a]: step sets, grouped in chunks of ARGV[1] per step
    /// - KEYS[n-a+1..n]: attribute sets merged into every step
    ///
    /// # Arguments
    /// - ARGV[1]: keys per step
    /// - ARGV[2]: scratch key for the combined union; left behind for
    ///   the caller to delete
    /// - ARGV[2 + j]: marker (always 1), one per attribute key
    ///
    /// # Returns
    /// - array: combined cardinality first, then one cardinality per step
    pub fn union_per_step_cardinality(&self) -> Arc<Script> {
        self.get_or_create(
            "union_per_step_cardinality",
            r#"
            local per_step = tonumber(ARGV[1])
            local scratch = ARGV[2]
            local attr_count = #ARGV - 2
            local step_keys = #KEYS - attr_count
            local step_scratch = scratch .. ':step'
            local reply = {0}

            for base = 0, step_keys - 1, per_step do
                local group = {}
                for offset = 1, per_step do
                    group[#group + 1] = KEYS[base + offset]
                end
                for a = step_keys + 1, #KEYS do
                    group[#group + 1] = KEYS[a]
                end
                reply[#reply + 1] = redis.call('SUNIONSTORE', step_scratch, unpack(group))
                redis.call('SUNIONSTORE', scratch, scratch, step_scratch)
            end

            redis.call('DEL', step_scratch)
            reply[1] = redis.call('SCARD', scratch)

            return reply
            "#,
        )
    }
}

impl Default for LuaScripts {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_are_cached_by_name() {
        let scripts = LuaScripts::new();

        let first = scripts.sum_per_step();
        let second = scripts.sum_per_step();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn distinct_scripts_get_distinct_hashes() {
        let scripts = LuaScripts::new();
        let add = scripts.set_add_member();
        let remove = scripts.set_remove_member();
        assert_ne!(add.get_hash(), remove.get_hash());
    }

    #[test]
    fn all_scripts_construct() {
        let scripts = LuaScripts::new();

        let _ = scripts.hash_increment_by();
        let _ = scripts.hash_multi_find();
        let _ = scripts.set_add_member();
        let _ = scripts.set_remove_member();
        let _ = scripts.set_multi_ismember();
        let _ = scripts.sum_fields();
        let _ = scripts.sum_per_step();
        let _ = scripts.union_cardinality();
        let _ = scripts.union_per_step_cardinality();
    }
}
