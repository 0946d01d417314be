//! Metric definitions and the operations that drive them
//!
//! The flow is always client -> metric -> store:
//!
//! ```text
//!   StatsClient (store handle + namespace)
//!        |
//!        |  .metric(config)
//!        v
//!   Metric ---- increment / decrement --(Event)------> hash or set writes
//!          ---- find / contains --------(TimeFrame)--> point reads
//!          ---- aggregate --------------(AggregateQuery)
//!                 |                                    per-step sums or unions
//!                 v
//!            ScriptStore
//! ```
//!
//! A [`Metric`] owns no state of its own; it plans key batches from its
//! [`MetricConfig`] and delegates each operation to the store in one
//! atomic round trip. Updates fan out to every rollup the metric's
//! resolution maintains, which is what makes reads at any granularity a
//! plain point lookup.
//!
//! # Example
//!
//! ```rust,no_run
//! use redistat::{Event, MetricConfig, MemoryStore, Resolution, StatsClient, TimeFrame};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = StatsClient::with_namespace(MemoryStore::new(), "app");
//! let visits = client.metric(
//!     MetricConfig::counter("visits").resolution(Resolution::Day).build()?,
//! );
//!
//! visits.increment(Event::id(1042).on("2026-01-05")).await?;
//! visits.increment(Event::id(1042).on("2026-01-05").by(4)).await?;
//!
//! let today = visits.find_one(1042, TimeFrame::year(2026).month(1).day(5)).await?;
//! assert_eq!(today, 5);
//! # Ok(())
//! # }
//! ```

use crate::config::StatsConfig;
use crate::error::{Error, Result, StoreError};
use crate::keys::{attribute_key, build_key, field_index, scratch_key};
use crate::store::redis::RedisStore;
use crate::store::ScriptStore;
use crate::time::{DateSpec, Resolution, TimeFrame};
use crate::types::{Aggregate, EntityId, SeriesPoint, Variant};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

// =============================================================================
// MetricConfig
// =============================================================================

/// Immutable definition of one metric: name, variant and resolution.
///
/// Configs are cheap to clone and can come from code (the builder) or
/// from a configuration file (serde). Deserialized configs should be
/// run through [`MetricConfig::validate`], which the builder does
/// automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfig {
    name: String,
    variant: Variant,
    #[serde(default)]
    resolution: Option<Resolution>,
}

impl MetricConfig {
    /// Start a counter metric definition.
    pub fn counter(name: impl Into<String>) -> MetricConfigBuilder {
        MetricConfigBuilder::new(name, Variant::Counter)
    }

    /// Start a unique-members metric definition.
    pub fn unique(name: impl Into<String>) -> MetricConfigBuilder {
        MetricConfigBuilder::new(name, Variant::Unique)
    }

    /// Start a mosaic metric definition.
    pub fn mosaic(name: impl Into<String>) -> MetricConfigBuilder {
        MetricConfigBuilder::new(name, Variant::Mosaic)
    }

    /// The metric name, used as a key segment.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The storage family.
    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// The configured resolution, if any.
    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    /// Rollups an update to this metric maintains; empty when the metric
    /// has no resolution.
    pub fn scoped_resolutions(&self) -> &'static [Resolution] {
        self.resolution.map(Resolution::scoped).unwrap_or(&[])
    }

    /// Check the definition for key-safety.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidConfiguration(
                "metric name cannot be empty".to_string(),
            ));
        }
        if self.name.contains(crate::keys::KEY_SEPARATOR) {
            return Err(Error::InvalidConfiguration(format!(
                "metric name {:?} contains the key separator",
                self.name
            )));
        }
        if self.name.chars().any(char::is_whitespace) {
            return Err(Error::InvalidConfiguration(format!(
                "metric name {:?} contains whitespace",
                self.name
            )));
        }
        Ok(())
    }
}

/// Builder for [`MetricConfig`].
#[derive(Debug, Clone)]
pub struct MetricConfigBuilder {
    name: String,
    variant: Variant,
    resolution: Option<Resolution>,
}

impl MetricConfigBuilder {
    fn new(name: impl Into<String>, variant: Variant) -> Self {
        Self {
            name: name.into(),
            variant,
            resolution: None,
        }
    }

    /// Set the rollup resolution.
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Validate and finish the definition.
    pub fn build(self) -> Result<MetricConfig> {
        let config = MetricConfig {
            name: self.name,
            variant: self.variant,
            resolution: self.resolution,
        };
        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Event
// =============================================================================

/// One update to record: who, when, how much.
///
/// Built fluently and consumed by [`Metric::increment`] and
/// [`Metric::decrement`]:
///
/// ```rust
/// use redistat::Event;
///
/// let event = Event::id(1042).on("2026-01-05").by(3);
/// let signup = Event::ids([7, 8]).on("2026-01-05").member("device-a1");
/// let global = Event::global().on("2026-01-05");
/// ```
#[derive(Debug, Clone)]
pub struct Event {
    ids: Vec<EntityId>,
    date: Option<DateSpec>,
    amount: i64,
    member: Option<String>,
}

impl Event {
    /// Event scoped to one entity.
    pub fn id(id: impl Into<EntityId>) -> Self {
        Self {
            ids: vec![id.into()],
            date: None,
            amount: 1,
            member: None,
        }
    }

    /// Event applied to several entities at once.
    pub fn ids<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EntityId>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            date: None,
            amount: 1,
            member: None,
        }
    }

    /// Event with no entity scope, recorded against the metric's global
    /// keys.
    pub fn global() -> Self {
        Self {
            ids: Vec::new(),
            date: None,
            amount: 1,
            member: None,
        }
    }

    /// Date the event happened on. Without a date the update targets the
    /// metric's undated keys and no rollup fan-out happens.
    pub fn on(mut self, date: impl Into<DateSpec>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// Amount to add or subtract (counter and mosaic only; default 1).
    pub fn by(mut self, amount: i64) -> Self {
        self.amount = amount;
        self
    }

    /// Member whose presence is recorded (required for unique metrics,
    /// ignored by the others).
    pub fn member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }
}

// =============================================================================
// AggregateQuery
// =============================================================================

/// A ranged aggregation request.
///
/// ```rust
/// use redistat::{AggregateQuery, Resolution};
///
/// let query = AggregateQuery::between("2026-01-01", "2026-03-31")
///     .ids([7, 8, 9])
///     .interval(Resolution::Month);
/// ```
#[derive(Debug, Clone)]
pub struct AggregateQuery {
    ids: Vec<EntityId>,
    start: DateSpec,
    end: DateSpec,
    interval: Option<Resolution>,
    attributes: Vec<String>,
}

impl AggregateQuery {
    /// Aggregate over the inclusive date range `start..=end`.
    pub fn between(start: impl Into<DateSpec>, end: impl Into<DateSpec>) -> Self {
        Self {
            ids: Vec::new(),
            start: start.into(),
            end: end.into(),
            interval: None,
            attributes: Vec::new(),
        }
    }

    /// Add one entity to the scope. Without any ids the query reads the
    /// metric's global keys.
    pub fn id(mut self, id: impl Into<EntityId>) -> Self {
        self.ids.push(id.into());
        self
    }

    /// Add several entities to the scope.
    pub fn ids<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EntityId>,
    {
        self.ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Step granularity for the range walk. Defaults to the metric's
    /// resolution; a coarser interval reads the matching rollup keys.
    pub fn interval(mut self, interval: Resolution) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Merge a global attribute set into the unique counts (set union
    /// with every step and the combined total). Repeatable; counters
    /// ignore attributes.
    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }
}

// =============================================================================
// StatsClient
// =============================================================================

/// Entry point: a store handle plus an optional key namespace.
///
/// Cloning is cheap; clones share the same store.
pub struct StatsClient<S> {
    store: Arc<S>,
    namespace: Option<Arc<str>>,
}

impl<S: ScriptStore> StatsClient<S> {
    /// Client without a namespace prefix.
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
            namespace: None,
        }
    }

    /// Client whose keys all start with `namespace:`.
    pub fn with_namespace(store: S, namespace: impl Into<String>) -> Self {
        Self {
            store: Arc::new(store),
            namespace: Some(Arc::from(namespace.into())),
        }
    }

    /// Client over an already-shared store.
    pub fn from_arc(store: Arc<S>, namespace: Option<String>) -> Self {
        Self {
            store,
            namespace: namespace.map(Arc::from),
        }
    }

    /// The namespace prefix, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Bind a metric definition to this client's store and namespace.
    pub fn metric(&self, config: MetricConfig) -> Metric<S> {
        Metric {
            config: Arc::new(config),
            namespace: self.namespace.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl StatsClient<RedisStore> {
    /// Build a Redis-backed client from a [`StatsConfig`], connecting
    /// eagerly.
    pub async fn connect(config: &StatsConfig) -> Result<Self> {
        config.validate()?;
        let store = RedisStore::connect(config.redis_config()).await?;
        Ok(Self {
            store: Arc::new(store),
            namespace: config.namespace.clone().map(Arc::from),
        })
    }
}

impl<S> Clone for StatsClient<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            namespace: self.namespace.clone(),
        }
    }
}

// =============================================================================
// Metric
// =============================================================================

/// A metric bound to a store, ready for updates, reads and aggregation.
///
/// Created by [`StatsClient::metric`]. Cheap to clone and safe to share
/// across tasks.
pub struct Metric<S> {
    config: Arc<MetricConfig>,
    namespace: Option<Arc<str>>,
    store: Arc<S>,
}

impl<S> Clone for Metric<S> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            namespace: self.namespace.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ScriptStore> Metric<S> {
    /// The definition this metric was bound with.
    pub fn config(&self) -> &MetricConfig {
        &self.config
    }

    /// Record an event, adding to counters or set membership.
    ///
    /// Dated events fan out to every rollup of the metric's resolution
    /// in one atomic store call. Undated events, and all events on a
    /// metric without a resolution, target the undated keys instead.
    pub async fn increment(&self, event: Event) -> Result<()> {
        self.apply(event, 1).await
    }

    /// Reverse an event: subtract from counters or remove membership.
    pub async fn decrement(&self, event: Event) -> Result<()> {
        self.apply(event, -1).await
    }

    async fn apply(&self, event: Event, sign: i64) -> Result<()> {
        let date = match &event.date {
            Some(spec) => Some(spec.resolve()?),
            None => None,
        };
        let (keys, fields) = self.update_targets(&event.ids, date);

        match self.config.variant {
            Variant::Unique => {
                let member = event.member.as_deref().ok_or(Error::MissingMember)?;
                if sign >= 0 {
                    self.store.set_add_member(&keys, member).await?;
                } else {
                    self.store.set_remove_member(&keys, member).await?;
                }
            }
            Variant::Counter | Variant::Mosaic => {
                // Saturating: i64::MIN has no positive counterpart.
                let delta = if sign >= 0 {
                    event.amount
                } else {
                    event.amount.saturating_neg()
                };
                self.store.hash_increment_by(&keys, &fields, delta).await?;
            }
        }

        debug!(
            "recorded {} on {} across {} keys",
            if sign >= 0 { "increment" } else { "decrement" },
            self.config.name,
            keys.len()
        );
        Ok(())
    }

    /// Read one entity's value at the rollup a [`TimeFrame`] addresses.
    ///
    /// Counter and mosaic metrics only; absent data reads as 0.
    pub async fn find_one(&self, id: impl Into<EntityId>, frame: TimeFrame) -> Result<i64> {
        let id = id.into();
        let values = self.find_ids(std::slice::from_ref(&id), frame).await?;
        Ok(values.into_iter().next().unwrap_or(0))
    }

    /// Read several entities' values at one rollup, in input order.
    ///
    /// An empty id list reads the metric's single global slot instead,
    /// mirroring how [`Event::global`] writes.
    pub async fn find_many<I, T>(&self, ids: I, frame: TimeFrame) -> Result<Vec<i64>>
    where
        I: IntoIterator<Item = T>,
        T: Into<EntityId>,
    {
        let ids: Vec<EntityId> = ids.into_iter().map(Into::into).collect();
        self.find_ids(&ids, frame).await
    }

    async fn find_ids(&self, ids: &[EntityId], frame: TimeFrame) -> Result<Vec<i64>> {
        let label = frame.label();
        let slots = id_slots(ids);
        let mut keys = Vec::with_capacity(slots.len());
        let mut fields = Vec::with_capacity(slots.len());
        for slot in &slots {
            keys.push(self.key_for(*slot, Some(&label)));
            fields.push(slot.map(field_index).unwrap_or(0));
        }
        Ok(self.store.hash_multi_find(&keys, &fields).await?)
    }

    /// Whether `member` was recorded for one entity in the given frame.
    ///
    /// Unique metrics only; absent data reads as `false`.
    pub async fn contains_one(
        &self,
        id: impl Into<EntityId>,
        frame: TimeFrame,
        member: &str,
    ) -> Result<bool> {
        let id = id.into();
        let hits = self
            .contains_ids(std::slice::from_ref(&id), frame, member)
            .await?;
        Ok(hits.into_iter().next().unwrap_or(false))
    }

    /// Membership of `member` across several entities, in input order.
    ///
    /// An empty id list checks the metric's single global set.
    pub async fn contains_many<I, T>(
        &self,
        ids: I,
        frame: TimeFrame,
        member: &str,
    ) -> Result<Vec<bool>>
    where
        I: IntoIterator<Item = T>,
        T: Into<EntityId>,
    {
        let ids: Vec<EntityId> = ids.into_iter().map(Into::into).collect();
        self.contains_ids(&ids, frame, member).await
    }

    async fn contains_ids(
        &self,
        ids: &[EntityId],
        frame: TimeFrame,
        member: &str,
    ) -> Result<Vec<bool>> {
        let label = frame.label();
        let keys: Vec<String> = id_slots(ids)
            .iter()
            .map(|slot| self.key_for(*slot, Some(&label)))
            .collect();
        Ok(self.store.set_multi_ismember(&keys, member).await?)
    }

    /// Aggregate over a date range with a per-interval breakdown.
    ///
    /// Counters and mosaics sum; unique metrics count distinct members,
    /// with the grand total deduplicated across the whole range. One
    /// store round trip regardless of range length or id count.
    pub async fn aggregate(&self, query: AggregateQuery) -> Result<Aggregate> {
        let interval = self.resolve_interval(&query)?;
        let plan = self.range_plan(&query, interval)?;
        let steps = plan.labels.len();

        let reply = match self.config.variant {
            Variant::Unique => {
                let mut keys = plan.keys;
                for attribute in &query.attributes {
                    keys.push(attribute_key(self.namespace.as_deref(), attribute));
                }
                let scratch = scratch_key(self.namespace.as_deref());
                let outcome = self
                    .store
                    .union_per_step_cardinality(
                        &keys,
                        plan.ids_per_step,
                        query.attributes.len(),
                        &scratch,
                    )
                    .await;
                // The combined union stays under the scratch key; remove
                // it whether or not the aggregation itself succeeded.
                if let Err(err) = self.store.delete_key(&scratch).await {
                    warn!("failed to remove scratch key {}: {}", scratch, err);
                }
                outcome?
            }
            Variant::Counter | Variant::Mosaic => {
                self.store
                    .sum_per_step(&plan.keys, &plan.fields, plan.ids_per_step)
                    .await?
            }
        };

        let mut values = reply.into_iter();
        let total = values.next().unwrap_or(0);
        let values: Vec<i64> = values.collect();
        if values.len() != steps {
            return Err(StoreError::Response(format!(
                "expected {} step values, store returned {}",
                steps,
                values.len()
            ))
            .into());
        }

        debug!(
            "aggregated {} over {} steps at {} resolution",
            self.config.name, steps, interval
        );
        let series = values
            .into_iter()
            .zip(plan.labels)
            .map(|(value, date)| SeriesPoint { value, date })
            .collect();
        Ok(Aggregate { total, series })
    }

    /// Aggregate over a date range, returning only the grand total.
    ///
    /// Cheaper than [`Metric::aggregate`] for unique metrics because the
    /// union is computed and discarded server-side in a single script.
    pub async fn aggregate_total(&self, query: AggregateQuery) -> Result<i64> {
        let interval = self.resolve_interval(&query)?;
        let plan = self.range_plan(&query, interval)?;

        match self.config.variant {
            Variant::Unique => {
                let mut keys = plan.keys;
                for attribute in &query.attributes {
                    keys.push(attribute_key(self.namespace.as_deref(), attribute));
                }
                let scratch = scratch_key(self.namespace.as_deref());
                Ok(self.store.union_cardinality(&keys, &scratch).await?)
            }
            Variant::Counter | Variant::Mosaic => {
                Ok(self.store.sum_hash_fields(&plan.keys, &plan.fields).await?)
            }
        }
    }

    // ===== Planning internals =====

    fn resolve_interval(&self, query: &AggregateQuery) -> Result<Resolution> {
        query
            .interval
            .or(self.config.resolution)
            .ok_or_else(|| Error::MissingResolution(self.config.name.clone()))
    }

    fn key_for(&self, id: Option<&EntityId>, label: Option<&str>) -> String {
        build_key(
            self.namespace.as_deref(),
            &self.config.name,
            self.config.variant,
            id,
            label,
        )
    }

    /// Keys and fields for one update, fanned out per id and rollup.
    fn update_targets(&self, ids: &[EntityId], date: Option<NaiveDate>) -> (Vec<String>, Vec<i64>) {
        let scoped = self.config.scoped_resolutions();
        let slots = id_slots(ids);
        let mut keys = Vec::new();
        let mut fields = Vec::new();
        for slot in &slots {
            let field = slot.map(field_index).unwrap_or(0);
            match date {
                Some(day) if !scoped.is_empty() => {
                    for resolution in scoped {
                        let label = resolution.label(day);
                        keys.push(self.key_for(*slot, Some(&label)));
                        fields.push(field);
                    }
                }
                _ => {
                    keys.push(self.key_for(*slot, None));
                    fields.push(field);
                }
            }
        }
        (keys, fields)
    }

    /// Walk `start..=end` at `interval`, collecting keys, fields and
    /// labels for every (step, id) pair.
    fn range_plan(&self, query: &AggregateQuery, interval: Resolution) -> Result<RangePlan> {
        let start = query.start.resolve()?;
        let end = query.end.resolve()?;
        let slots = id_slots(&query.ids);

        let mut plan = RangePlan {
            keys: Vec::new(),
            fields: Vec::new(),
            labels: Vec::new(),
            ids_per_step: slots.len(),
        };
        let mut current = start;
        while current <= end {
            let label = interval.label(current);
            for slot in &slots {
                plan.keys.push(self.key_for(*slot, Some(&label)));
                plan.fields
                    .push(slot.map(field_index).unwrap_or(0));
            }
            plan.labels.push(label);

            let next = interval.advance(current);
            if next <= current {
                break;
            }
            current = next;
        }
        Ok(plan)
    }
}

/// Id scope of an operation: an explicit list, or the single global
/// slot when no ids were given.
fn id_slots(ids: &[EntityId]) -> Vec<Option<&EntityId>> {
    if ids.is_empty() {
        vec![None]
    } else {
        ids.iter().map(Some).collect()
    }
}

struct RangePlan {
    keys: Vec<String>,
    fields: Vec<i64>,
    labels: Vec<String>,
    ids_per_step: usize,
}
