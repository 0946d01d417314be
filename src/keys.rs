//! Store-key construction and counter bucketing
//!
//! Every piece of state the crate touches lives under a deterministic
//! key assembled here. The shape is always
//! `[namespace:]metric[:label][:id-or-bucket]`:
//!
//! ```text
//! app:visits:2026-01-05:1        counter, ids 1000-1999 share bucket 1
//! app:uv:2026-W2:1042            unique, keyed per id
//! app:premium                    attribute set (no label segment)
//! app:scratch:<random>           scratch key for union accumulation
//! ```
//!
//! Counter hashes pack 1000 ids per key: the key carries
//! `floor(id / 1000)` and the hash field inside it `id % 1000`. Unique
//! and mosaic keys carry the id verbatim, and global (id-less) writes
//! omit the segment entirely for sets but still land in bucket 0 for
//! counters.
//!
//! # Example
//!
//! ```rust
//! use redistat::{keys, Variant, EntityId};
//!
//! let id = EntityId::from(1042);
//! let key = keys::build_key(Some("app"), "visits", Variant::Counter, Some(&id), Some("2026-01-05"));
//! assert_eq!(key, "app:visits:2026-01-05:1");
//! assert_eq!(keys::field_index(&id), 42);
//! ```

use crate::types::{EntityId, Variant};
use std::fmt;
use uuid::Uuid;

/// Separator between key segments.
pub const KEY_SEPARATOR: &str = ":";

/// Ids per counter bucket.
pub const BUCKET_SPAN: i64 = 1000;

/// Leading segment of scratch keys.
const SCRATCH_SEGMENT: &str = "scratch";

// =============================================================================
// KeyBuilder
// =============================================================================

/// Ordered key segments joined by [`KEY_SEPARATOR`].
///
/// Displayable segments are rendered as-is; there is no escaping, so
/// metric names are validated against separator characters upstream.
#[derive(Debug, Default)]
pub struct KeyBuilder {
    segments: Vec<String>,
}

impl KeyBuilder {
    /// Start an empty key.
    pub fn new() -> Self {
        KeyBuilder::default()
    }

    /// Append one segment.
    pub fn segment<T: fmt::Display>(mut self, part: T) -> Self {
        self.segments.push(part.to_string());
        self
    }

    /// Append a segment when present, otherwise leave the key unchanged.
    pub fn maybe<T: fmt::Display>(self, part: Option<T>) -> Self {
        match part {
            Some(part) => self.segment(part),
            None => self,
        }
    }

    /// Join the collected segments.
    pub fn build(self) -> String {
        self.segments.join(KEY_SEPARATOR)
    }
}

// =============================================================================
// Bucketing
// =============================================================================

/// Bucket number a counter id lands in: `floor(id / 1000)`.
///
/// Floor division keeps negative ids stable: id -5 lands in bucket -1
/// with field 995, never colliding with id 5.
pub fn bucket(id: &EntityId) -> i64 {
    id.to_int().div_euclid(BUCKET_SPAN)
}

/// Hash field a counter id occupies inside its bucket: `id % 1000`,
/// always non-negative.
pub fn field_index(id: &EntityId) -> i64 {
    id.to_int().rem_euclid(BUCKET_SPAN)
}

// =============================================================================
// Key construction
// =============================================================================

/// Store key for one metric, id and label coordinate.
///
/// Segments are emitted in namespace, metric, label, id order. The final
/// segment depends on the variant: counters always carry a bucket number
/// (bucket 0 when no id is given), unique and mosaic keys carry the id
/// verbatim and omit the segment for global writes.
pub fn build_key(
    namespace: Option<&str>,
    metric: &str,
    variant: Variant,
    id: Option<&EntityId>,
    label: Option<&str>,
) -> String {
    let builder = KeyBuilder::new()
        .maybe(nonempty(namespace))
        .segment(metric)
        .maybe(label);
    match variant {
        Variant::Counter => {
            let bucket = id.map(bucket).unwrap_or(0);
            builder.segment(bucket).build()
        }
        Variant::Unique | Variant::Mosaic => builder.maybe(id).build(),
    }
}

/// Key of a global attribute set, e.g. `app:premium`.
pub fn attribute_key(namespace: Option<&str>, attribute: &str) -> String {
    KeyBuilder::new()
        .maybe(nonempty(namespace))
        .segment(attribute)
        .build()
}

/// Freshly named scratch key for union accumulation.
///
/// The random suffix makes concurrent aggregations collision-free; the
/// key is short-lived and removed by whoever created it.
pub fn scratch_key(namespace: Option<&str>) -> String {
    KeyBuilder::new()
        .maybe(nonempty(namespace))
        .segment(SCRATCH_SEGMENT)
        .segment(Uuid::new_v4().simple())
        .build()
}

/// Whether `key` is a scratch key under `namespace`.
pub fn is_scratch_key(namespace: Option<&str>, key: &str) -> bool {
    let prefix = KeyBuilder::new()
        .maybe(nonempty(namespace))
        .segment(SCRATCH_SEGMENT)
        .segment("")
        .build();
    key.starts_with(&prefix)
}

fn nonempty(namespace: Option<&str>) -> Option<&str> {
    namespace.filter(|ns| !ns.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_id(value: i64) -> EntityId {
        EntityId::from(value)
    }

    // ===== Bucketing tests =====

    #[test]
    fn ids_pack_one_thousand_per_bucket() {
        assert_eq!(bucket(&int_id(0)), 0);
        assert_eq!(bucket(&int_id(999)), 0);
        assert_eq!(bucket(&int_id(1000)), 1);
        assert_eq!(bucket(&int_id(1042)), 1);
        assert_eq!(bucket(&int_id(2000)), 2);
    }

    #[test]
    fn fields_are_the_offset_within_the_bucket() {
        assert_eq!(field_index(&int_id(0)), 0);
        assert_eq!(field_index(&int_id(999)), 999);
        assert_eq!(field_index(&int_id(1042)), 42);
    }

    #[test]
    fn negative_ids_floor_into_their_own_buckets() {
        assert_eq!(bucket(&int_id(-5)), -1);
        assert_eq!(field_index(&int_id(-5)), 995);
        assert_eq!(bucket(&int_id(-1000)), -1);
        assert_eq!(field_index(&int_id(-1000)), 0);
    }

    #[test]
    fn string_ids_bucket_through_integer_coercion() {
        let id = EntityId::from("1042-west");
        assert_eq!(bucket(&id), 1);
        assert_eq!(field_index(&id), 42);
    }

    // ===== Key construction tests =====

    #[test]
    fn counter_keys_carry_the_bucket_number() {
        let id = int_id(1042);
        assert_eq!(
            build_key(Some("app"), "visits", Variant::Counter, Some(&id), Some("2026-01-05")),
            "app:visits:2026-01-05:1"
        );
    }

    #[test]
    fn counter_keys_without_an_id_use_bucket_zero() {
        assert_eq!(
            build_key(Some("app"), "visits", Variant::Counter, None, Some("2026")),
            "app:visits:2026:0"
        );
    }

    #[test]
    fn unique_keys_carry_the_id_verbatim() {
        let id = int_id(1042);
        assert_eq!(
            build_key(Some("app"), "uv", Variant::Unique, Some(&id), Some("2026-W2")),
            "app:uv:2026-W2:1042"
        );
        let id = EntityId::from("device-a1");
        assert_eq!(
            build_key(None, "uv", Variant::Unique, Some(&id), None),
            "uv:device-a1"
        );
    }

    #[test]
    fn global_set_keys_omit_the_id_segment() {
        assert_eq!(
            build_key(Some("app"), "signups", Variant::Unique, None, Some("2026-01")),
            "app:signups:2026-01"
        );
    }

    #[test]
    fn mosaic_keys_match_unique_keying() {
        let id = int_id(7);
        assert_eq!(
            build_key(None, "usage", Variant::Mosaic, Some(&id), Some("2026-01-05")),
            "usage:2026-01-05:7"
        );
    }

    #[test]
    fn empty_namespaces_are_dropped() {
        assert_eq!(
            build_key(Some(""), "visits", Variant::Counter, None, None),
            "visits:0"
        );
        assert_eq!(attribute_key(Some(""), "premium"), "premium");
    }

    #[test]
    fn attribute_keys_have_no_label_segment() {
        assert_eq!(attribute_key(Some("app"), "premium"), "app:premium");
        assert_eq!(attribute_key(None, "premium"), "premium");
    }

    // ===== Scratch key tests =====

    #[test]
    fn scratch_keys_are_namespaced_and_unique() {
        let a = scratch_key(Some("app"));
        let b = scratch_key(Some("app"));
        assert!(a.starts_with("app:scratch:"));
        assert_ne!(a, b);
        assert!(is_scratch_key(Some("app"), &a));
        assert!(!is_scratch_key(Some("app"), "app:visits:2026:0"));
    }

    #[test]
    fn unnamespaced_scratch_keys_start_at_the_segment() {
        let key = scratch_key(None);
        assert!(key.starts_with("scratch:"));
        assert!(is_scratch_key(None, &key));
    }
}
