//! In-memory store implementation
//!
//! A [`ScriptStore`] backed by a process-local map, useful for unit
//! tests, doctests and prototyping. Single-node, unbounded and not
//! persisted; it is NOT suitable for production use.
//!
//! Behavior mirrors the Redis backend where it matters to callers:
//! absent keys read as zero, hash and set operations on a key of the
//! other kind fail with a wrong-type script error, and the per-step
//! union materializes its combined result under the caller's scratch
//! key so cleanup paths are exercised in tests too.

use super::ScriptStore;
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// One stored value: a field-indexed hash or a member set.
#[derive(Debug, Clone)]
enum Entry {
    Hash(HashMap<i64, i64>),
    Set(HashSet<String>),
}

/// Process-local [`ScriptStore`] for tests and prototyping.
///
/// # Example
///
/// ```rust,no_run
/// use redistat::{MemoryStore, StatsClient};
///
/// let client = StatsClient::new(MemoryStore::new());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Number of live keys.
    pub fn key_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether `key` currently exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Names of all live keys, sorted for stable assertions.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Drop every key.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn read_hash_field(
        entries: &HashMap<String, Entry>,
        key: &str,
        field: i64,
    ) -> Result<i64, StoreError> {
        match entries.get(key) {
            None => Ok(0),
            Some(Entry::Hash(hash)) => Ok(hash.get(&field).copied().unwrap_or(0)),
            Some(Entry::Set(_)) => Err(wrong_type(key)),
        }
    }

    fn collect_members(
        entries: &HashMap<String, Entry>,
        key: &str,
        into: &mut HashSet<String>,
    ) -> Result<(), StoreError> {
        match entries.get(key) {
            None => Ok(()),
            Some(Entry::Set(set)) => {
                into.extend(set.iter().cloned());
                Ok(())
            }
            Some(Entry::Hash(_)) => Err(wrong_type(key)),
        }
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Script(format!(
        "key {key:?} holds the wrong kind of value for this operation"
    ))
}

fn aligned(keys: &[String], fields: &[i64]) -> Result<(), StoreError> {
    if keys.len() == fields.len() {
        Ok(())
    } else {
        Err(StoreError::Response(format!(
            "{} keys but {} fields",
            keys.len(),
            fields.len()
        )))
    }
}

fn step_span(total_keys: usize, ids_per_step: usize) -> Result<(), StoreError> {
    if ids_per_step == 0 {
        return Err(StoreError::Response("ids_per_step must be positive".into()));
    }
    if total_keys % ids_per_step != 0 {
        return Err(StoreError::Response(format!(
            "{total_keys} keys do not divide into steps of {ids_per_step}"
        )));
    }
    Ok(())
}

#[async_trait]
impl ScriptStore for MemoryStore {
    async fn hash_increment_by(
        &self,
        keys: &[String],
        fields: &[i64],
        delta: i64,
    ) -> Result<(), StoreError> {
        aligned(keys, fields)?;
        let mut entries = self.entries.write();
        // Validate up front so a wrong-type key leaves the batch unapplied,
        // matching the all-or-nothing behavior of a server-side script.
        for key in keys {
            if let Some(Entry::Set(_)) = entries.get(key.as_str()) {
                return Err(wrong_type(key));
            }
        }
        for (key, field) in keys.iter().zip(fields) {
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::Hash(HashMap::new()));
            if let Entry::Hash(hash) = entry {
                *hash.entry(*field).or_insert(0) += delta;
            }
        }
        Ok(())
    }

    async fn hash_multi_find(
        &self,
        keys: &[String],
        fields: &[i64],
    ) -> Result<Vec<i64>, StoreError> {
        aligned(keys, fields)?;
        let entries = self.entries.read();
        keys.iter()
            .zip(fields)
            .map(|(key, field)| Self::read_hash_field(&entries, key, *field))
            .collect()
    }

    async fn set_add_member(&self, keys: &[String], member: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        for key in keys {
            if let Some(Entry::Hash(_)) = entries.get(key.as_str()) {
                return Err(wrong_type(key));
            }
        }
        for key in keys {
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::Set(HashSet::new()));
            if let Entry::Set(set) = entry {
                set.insert(member.to_string());
            }
        }
        Ok(())
    }

    async fn set_remove_member(&self, keys: &[String], member: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        for key in keys {
            match entries.get_mut(key.as_str()) {
                None => {}
                Some(Entry::Set(set)) => {
                    set.remove(member);
                }
                Some(Entry::Hash(_)) => return Err(wrong_type(key)),
            }
        }
        Ok(())
    }

    async fn set_multi_ismember(
        &self,
        keys: &[String],
        member: &str,
    ) -> Result<Vec<bool>, StoreError> {
        let entries = self.entries.read();
        keys.iter()
            .map(|key| match entries.get(key.as_str()) {
                None => Ok(false),
                Some(Entry::Set(set)) => Ok(set.contains(member)),
                Some(Entry::Hash(_)) => Err(wrong_type(key)),
            })
            .collect()
    }

    async fn sum_hash_fields(&self, keys: &[String], fields: &[i64]) -> Result<i64, StoreError> {
        aligned(keys, fields)?;
        let entries = self.entries.read();
        let mut total = 0;
        for (key, field) in keys.iter().zip(fields) {
            total += Self::read_hash_field(&entries, key, *field)?;
        }
        Ok(total)
    }

    async fn sum_per_step(
        &self,
        keys: &[String],
        fields: &[i64],
        ids_per_step: usize,
    ) -> Result<Vec<i64>, StoreError> {
        aligned(keys, fields)?;
        step_span(keys.len(), ids_per_step)?;
        let entries = self.entries.read();
        let mut reply = vec![0i64];
        for (key_chunk, field_chunk) in keys.chunks(ids_per_step).zip(fields.chunks(ids_per_step)) {
            let mut step = 0;
            for (key, field) in key_chunk.iter().zip(field_chunk) {
                step += Self::read_hash_field(&entries, key, *field)?;
            }
            reply[0] += step;
            reply.push(step);
        }
        Ok(reply)
    }

    async fn union_cardinality(
        &self,
        keys: &[String],
        _scratch_key: &str,
    ) -> Result<i64, StoreError> {
        let entries = self.entries.read();
        let mut union = HashSet::new();
        for key in keys {
            Self::collect_members(&entries, key, &mut union)?;
        }
        Ok(union.len() as i64)
    }

    async fn union_per_step_cardinality(
        &self,
        keys: &[String],
        ids_per_step: usize,
        attribute_keys: usize,
        scratch_key: &str,
    ) -> Result<Vec<i64>, StoreError> {
        if attribute_keys > keys.len() {
            return Err(StoreError::Response(format!(
                "{attribute_keys} attribute keys but only {} keys",
                keys.len()
            )));
        }
        let (step_keys, attr_keys) = keys.split_at(keys.len() - attribute_keys);
        step_span(step_keys.len(), ids_per_step)?;

        let mut entries = self.entries.write();
        let mut combined = HashSet::new();
        let mut reply = vec![0i64];
        for chunk in step_keys.chunks(ids_per_step) {
            let mut step_union = HashSet::new();
            for key in chunk.iter().chain(attr_keys) {
                Self::collect_members(&entries, key, &mut step_union)?;
            }
            reply.push(step_union.len() as i64);
            combined.extend(step_union);
        }
        reply[0] = combined.len() as i64;
        // The Redis script leaves the combined union behind for the
        // caller to delete; stage it here too so cleanup is observable.
        if !combined.is_empty() {
            entries.insert(scratch_key.to_string(), Entry::Set(combined));
        }
        Ok(reply)
    }

    async fn delete_key(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().remove(key);
        Ok(())
    }
}
