//! Core value types shared across the crate
//!
//! # Key Types
//!
//! - **`Variant`**: storage family of a metric (counter, unique, mosaic)
//! - **`EntityId`**: identifier of the business entity a measurement is
//!   scoped to, integer or free-form string
//! - **`Aggregate`** / **`SeriesPoint`**: outcome of a ranged aggregation
//!
//! # Example
//!
//! ```rust
//! use redistat::{EntityId, Variant};
//!
//! let id = EntityId::from(1042);
//! assert_eq!(id.to_int(), 1042);
//!
//! // String ids coerce through their leading integer, like "42-north" -> 42
//! let id = EntityId::from("42-north");
//! assert_eq!(id.to_int(), 42);
//!
//! assert_eq!("unique".parse::<Variant>().unwrap(), Variant::Unique);
//! ```

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Variant
// =============================================================================

/// Storage family of a metric.
///
/// The variant decides how updates are written and how aggregation reads
/// them back:
///
/// - `Counter`: numeric sums in bucketed hashes, ids packed 1000 per key
/// - `Unique`: distinct-member sets, cardinality instead of sums
/// - `Mosaic`: numeric sums keyed per id, for per-entity drill-down maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Bucketed hash counters.
    Counter,
    /// Distinct-member sets.
    Unique,
    /// Per-id hash counters.
    Mosaic,
}

impl Variant {
    /// Short lowercase name, matching the configuration file spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Counter => "counter",
            Variant::Unique => "unique",
            Variant::Mosaic => "mosaic",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "counter" => Ok(Variant::Counter),
            "unique" => Ok(Variant::Unique),
            "mosaic" => Ok(Variant::Mosaic),
            other => Err(Error::InvalidConfiguration(format!(
                "unknown metric variant {other:?}"
            ))),
        }
    }
}

// =============================================================================
// EntityId
// =============================================================================

/// Identifier of the entity a measurement is scoped to.
///
/// Ids are carried verbatim into store keys. Counter bucketing needs a
/// numeric view of the id, which [`EntityId::to_int`] provides: integers
/// are themselves, strings coerce through their leading integer and fall
/// back to 0 when none is present.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    /// Numeric identifier.
    Int(i64),
    /// Free-form string identifier.
    Str(String),
}

impl EntityId {
    /// Numeric view used by the bucketing policy.
    ///
    /// Strings parse an optional sign followed by leading digits;
    /// anything after the digits is ignored and a string without a
    /// leading integer coerces to 0.
    pub fn to_int(&self) -> i64 {
        match self {
            EntityId::Int(value) => *value,
            EntityId::Str(text) => leading_int(text),
        }
    }
}

fn leading_int(text: &str) -> i64 {
    let text = text.trim_start();
    let sign_len = if text.starts_with(['-', '+']) { 1 } else { 0 };
    let end = text[sign_len..]
        .find(|c: char| !c.is_ascii_digit())
        .map(|offset| sign_len + offset)
        .unwrap_or(text.len());
    // The sign stays in the parsed slice: i64::MIN has no positive
    // counterpart, so parsing magnitude and sign separately loses it.
    text[..end].parse::<i64>().unwrap_or(0)
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(value) => write!(f, "{value}"),
            EntityId::Str(text) => f.write_str(text),
        }
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        EntityId::Int(value)
    }
}

impl From<i32> for EntityId {
    fn from(value: i32) -> Self {
        EntityId::Int(i64::from(value))
    }
}

impl From<u32> for EntityId {
    fn from(value: u32) -> Self {
        EntityId::Int(i64::from(value))
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId::Str(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        EntityId::Str(value)
    }
}

impl From<&EntityId> for EntityId {
    fn from(value: &EntityId) -> Self {
        value.clone()
    }
}

// =============================================================================
// Aggregation results
// =============================================================================

/// One date-labeled value in an aggregation breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Summed value (counter, mosaic) or distinct-member count (unique)
    /// for this interval step.
    pub value: i64,
    /// Canonical label of the interval step, e.g. `2026-01-05` or `2026-W3`.
    pub date: String,
}

/// Outcome of a ranged aggregation with a per-interval breakdown.
///
/// `total` is the grand value across the whole range; `series` holds one
/// point per interval step in ascending date order. For unique metrics
/// the total is the cardinality of the union across all steps, so it is
/// usually smaller than the sum of the step values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Grand value across the whole requested range.
    pub total: i64,
    /// Per-step breakdown, ascending by date.
    pub series: Vec<SeriesPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===== Variant tests =====

    #[test]
    fn variant_parses_known_names() {
        assert_eq!("counter".parse::<Variant>().unwrap(), Variant::Counter);
        assert_eq!("UNIQUE".parse::<Variant>().unwrap(), Variant::Unique);
        assert_eq!(" mosaic ".parse::<Variant>().unwrap(), Variant::Mosaic);
    }

    #[test]
    fn variant_rejects_unknown_names() {
        let err = "gauge".parse::<Variant>().unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
        assert!(err.to_string().contains("gauge"));
    }

    #[test]
    fn variant_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Variant::Unique).unwrap();
        assert_eq!(json, "\"unique\"");
        let back: Variant = serde_json::from_str("\"mosaic\"").unwrap();
        assert_eq!(back, Variant::Mosaic);
    }

    // ===== EntityId tests =====

    #[test]
    fn integer_ids_round_trip() {
        assert_eq!(EntityId::from(1042).to_int(), 1042);
        assert_eq!(EntityId::from(-3).to_int(), -3);
        assert_eq!(EntityId::from(1042).to_string(), "1042");
    }

    #[test]
    fn string_ids_coerce_through_leading_digits() {
        assert_eq!(EntityId::from("123").to_int(), 123);
        assert_eq!(EntityId::from("123abc").to_int(), 123);
        assert_eq!(EntityId::from("-7x").to_int(), -7);
        assert_eq!(EntityId::from("+9").to_int(), 9);
    }

    #[test]
    fn extreme_decimal_strings_keep_their_value() {
        assert_eq!(EntityId::from("-9223372036854775808").to_int(), i64::MIN);
        assert_eq!(EntityId::from("9223372036854775807").to_int(), i64::MAX);
        assert_eq!(EntityId::from("-9223372036854775809").to_int(), 0);
        assert_eq!(EntityId::from("9223372036854775808").to_int(), 0);
    }

    #[test]
    fn non_numeric_strings_coerce_to_zero() {
        assert_eq!(EntityId::from("abc").to_int(), 0);
        assert_eq!(EntityId::from("").to_int(), 0);
        assert_eq!(EntityId::from("-").to_int(), 0);
    }

    #[test]
    fn string_ids_display_verbatim() {
        assert_eq!(EntityId::from("device-a1").to_string(), "device-a1");
    }

    #[test]
    fn entity_id_serde_is_untagged() {
        let ids: Vec<EntityId> = serde_json::from_str(r#"[7, "seven"]"#).unwrap();
        assert_eq!(ids, vec![EntityId::Int(7), EntityId::Str("seven".into())]);
    }

    // ===== Aggregate tests =====

    #[test]
    fn aggregate_serializes_breakdown() {
        let aggregate = Aggregate {
            total: 12,
            series: vec![
                SeriesPoint { value: 5, date: "2026-01-01".into() },
                SeriesPoint { value: 7, date: "2026-01-02".into() },
            ],
        };
        let json = serde_json::to_value(&aggregate).unwrap();
        assert_eq!(json["total"], 12);
        assert_eq!(json["series"][1]["date"], "2026-01-02");
    }
}
