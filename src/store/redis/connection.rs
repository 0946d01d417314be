//! Redis connection handling for the analytics store
//!
//! One multiplexed connection shared behind a concurrency limit, with:
//! - configurable connect and command timeouts
//! - exponential backoff retry for transient failures
//! - automatic reconnection when the link drops
//! - lightweight operation metrics
//!
//! # Example
//!
//! ```rust
//! use redistat::store::redis::RedisConfig;
//! use std::time::Duration;
//!
//! let config = RedisConfig::with_url("redis://127.0.0.1:6379")
//!     .pool_size(32)
//!     .command_timeout(Duration::from_millis(500));
//! assert!(config.validate().is_ok());
//! ```

use super::util::{classify_error, host_port, sanitize_url};
use crate::error::StoreError;
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, warn};

/// Connection settings for the Redis store.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// Redis server URL, e.g. `redis://127.0.0.1:6379/0`.
    pub url: String,

    /// Maximum number of in-flight operations.
    /// Default: 16
    pub pool_size: u32,

    /// Timeout for establishing the connection.
    /// Default: 5 seconds
    pub connection_timeout: Duration,

    /// Timeout for a single store operation.
    /// Default: 1 second
    pub command_timeout: Duration,

    /// Retry policy for transient failures.
    pub retry_policy: RetryPolicy,

    /// Whether to connect over TLS (`rediss://` URLs).
    /// Default: false
    pub tls_enabled: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 16,
            connection_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(1),
            retry_policy: RetryPolicy::default(),
            tls_enabled: false,
        }
    }
}

impl RedisConfig {
    /// Config pointing at `url`, everything else defaulted.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the maximum number of in-flight operations.
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the connect timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the per-operation timeout.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Enable or disable TLS. Requires the `redis-tls` feature and a
    /// `rediss://` URL when enabled.
    pub fn tls(mut self, enabled: bool) -> Self {
        self.tls_enabled = enabled;
        self
    }

    /// Check the settings for internal consistency.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("redis url cannot be empty".to_string());
        }
        if self.pool_size == 0 {
            return Err("pool size must be greater than 0".to_string());
        }
        if self.pool_size > 1000 {
            return Err("pool size cannot exceed 1000".to_string());
        }
        if self.command_timeout.is_zero() {
            return Err("command timeout must be non-zero".to_string());
        }

        #[cfg(not(feature = "redis-tls"))]
        if self.tls_enabled {
            return Err(
                "tls is enabled but the crate was built without the 'redis-tls' feature"
                    .to_string(),
            );
        }

        if self.tls_enabled && !self.url.starts_with("rediss://") {
            return Err("tls is enabled but the url does not use the 'rediss://' scheme".to_string());
        }
        if !self.tls_enabled && self.url.starts_with("rediss://") {
            return Err("url uses the 'rediss://' scheme but tls is not enabled".to_string());
        }

        Ok(())
    }
}

/// Exponential backoff policy for transient command failures.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the initial try.
    /// Default: 3
    pub max_retries: u32,

    /// Delay before the first retry.
    /// Default: 100ms
    pub initial_delay: Duration,

    /// Upper bound on the backoff delay.
    /// Default: 5 seconds
    pub max_delay: Duration,

    /// Backoff multiplier per attempt.
    /// Default: 2.0
    pub multiplier: f64,

    /// Randomize delays by up to 25% to avoid thundering herds.
    /// Default: true
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after `attempt` failures (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        let delay_ms = if self.jitter {
            capped * (1.0 + rand::random::<f64>() * 0.25)
        } else {
            capped
        };
        Duration::from_millis(delay_ms as u64)
    }

    /// Whether another retry is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Operation counters for the connection.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    commands_executed: AtomicU64,
    command_failures: AtomicU64,
    retries: AtomicU64,
    total_latency_us: AtomicU64,
}

impl PoolMetrics {
    fn record_connection(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
    }

    fn record_connection_failure(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_command(&self, latency: Duration) {
        self.commands_executed.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    fn record_command_failure(&self) {
        self.command_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Average command latency in microseconds.
    pub fn average_latency_us(&self) -> f64 {
        let total = self.total_latency_us.load(Ordering::Relaxed);
        let count = self.commands_executed.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    /// Consistent point-in-time view of the counters.
    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            connections_established: self.connections_established.load(Ordering::Relaxed),
            connection_failures: self.connection_failures.load(Ordering::Relaxed),
            commands_executed: self.commands_executed.load(Ordering::Relaxed),
            command_failures: self.command_failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            average_latency_us: self.average_latency_us(),
        }
    }
}

/// Snapshot of [`PoolMetrics`] at one point in time.
#[derive(Debug, Clone)]
pub struct PoolMetricsSnapshot {
    /// Connections established over the pool lifetime.
    pub connections_established: u64,
    /// Failed connection attempts.
    pub connection_failures: u64,
    /// Operations completed successfully.
    pub commands_executed: u64,
    /// Operations that failed (including ones later retried).
    pub command_failures: u64,
    /// Retry attempts made.
    pub retries: u64,
    /// Average operation latency in microseconds.
    pub average_latency_us: f64,
}

/// Shared Redis connection with retry and reconnect handling.
///
/// Redis multiplexes concurrent commands over one connection, so the
/// pool holds a single [`MultiplexedConnection`] and bounds concurrency
/// with a semaphore sized by [`RedisConfig::pool_size`].
pub struct RedisPool {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    config: RedisConfig,
    metrics: Arc<PoolMetrics>,
    semaphore: Arc<Semaphore>,
}

// Manual impl: `MultiplexedConnection` is not `Debug`, so derive won't work.
impl std::fmt::Debug for RedisPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPool")
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl RedisPool {
    /// Build a pool without touching the network.
    ///
    /// The connection is established lazily by the first operation; use
    /// [`RedisPool::connect`] to fail fast instead.
    pub fn new(config: RedisConfig) -> Result<Self, StoreError> {
        if let Err(reason) = config.validate() {
            return Err(StoreError::Connection(format!(
                "invalid redis configuration: {reason}"
            )));
        }
        let client = Client::open(config.url.as_str()).map_err(|_| {
            StoreError::Connection(format!("invalid redis url {}", sanitize_url(&config.url)))
        })?;
        let semaphore = Arc::new(Semaphore::new(config.pool_size as usize));
        Ok(Self {
            client,
            connection: RwLock::new(None),
            config,
            metrics: Arc::new(PoolMetrics::default()),
            semaphore,
        })
    }

    /// Build a pool and establish the connection eagerly.
    pub async fn connect(config: RedisConfig) -> Result<Self, StoreError> {
        let pool = Self::new(config)?;
        pool.establish().await?;
        Ok(pool)
    }

    /// Establish or re-establish the connection and cache it.
    async fn establish(&self) -> Result<MultiplexedConnection, StoreError> {
        let start = Instant::now();
        let pending = self.client.get_multiplexed_async_connection();
        let conn = tokio::time::timeout(self.config.connection_timeout, pending)
            .await
            .map_err(|_| {
                self.metrics.record_connection_failure();
                StoreError::Connection(format!(
                    "connect to {} timed out after {:?}",
                    host_port(&self.config.url),
                    self.config.connection_timeout
                ))
            })?
            .map_err(|err| {
                self.metrics.record_connection_failure();
                classify_error(&self.config.url, err)
            })?;

        *self.connection.write().await = Some(conn.clone());
        self.metrics.record_connection();
        debug!(
            "redis connection to {} established in {:?}",
            host_port(&self.config.url),
            start.elapsed()
        );
        Ok(conn)
    }

    /// Cached connection, establishing one if none is live.
    async fn acquire(&self) -> Result<MultiplexedConnection, StoreError> {
        if let Some(conn) = self.connection.read().await.clone() {
            return Ok(conn);
        }
        self.establish().await
    }

    /// Forget the cached connection so the next operation reconnects.
    async fn invalidate(&self) {
        *self.connection.write().await = None;
    }

    /// Run one operation with timeout and retry handling.
    ///
    /// `operation` receives a cheap clone of the multiplexed connection
    /// and may be invoked several times when failures are retriable.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T, StoreError>
    where
        F: Fn(MultiplexedConnection) -> Fut,
        Fut: Future<Output = Result<T, RedisError>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| StoreError::Connection("connection pool is shut down".to_string()))?;

        let mut attempt = 0;
        loop {
            let conn = self.acquire().await?;
            let start = Instant::now();

            match tokio::time::timeout(self.config.command_timeout, operation(conn)).await {
                Ok(Ok(value)) => {
                    self.metrics.record_command(start.elapsed());
                    return Ok(value);
                }
                Ok(Err(err)) => {
                    self.metrics.record_command_failure();
                    if self.config.retry_policy.should_retry(attempt) && is_retriable_error(&err) {
                        self.metrics.record_retry();
                        let delay = self.config.retry_policy.delay_for_attempt(attempt);
                        warn!(
                            "redis command failed (attempt {}), retrying in {:?}: {}",
                            attempt + 1,
                            delay,
                            err
                        );
                        if is_connection_error(&err) {
                            self.invalidate().await;
                        }
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(classify_error(&self.config.url, err));
                }
                Err(_) => {
                    self.metrics.record_command_failure();
                    if self.config.retry_policy.should_retry(attempt) {
                        self.metrics.record_retry();
                        let delay = self.config.retry_policy.delay_for_attempt(attempt);
                        warn!(
                            "redis command timed out (attempt {}), retrying in {:?}",
                            attempt + 1,
                            delay
                        );
                        self.invalidate().await;
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(StoreError::Connection(format!(
                        "command timed out after {:?}",
                        self.config.command_timeout
                    )));
                }
            }
        }
    }

    /// Round-trip a PING and report its latency.
    pub async fn ping(&self) -> Result<Duration, StoreError> {
        let start = Instant::now();
        let reply: String = self
            .execute(|mut conn| async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        if reply == "PONG" {
            Ok(start.elapsed())
        } else {
            Err(StoreError::Response(format!(
                "unexpected ping reply {reply:?}"
            )))
        }
    }

    /// Operation counters.
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The settings this pool was built with.
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }
}

/// Transient failures worth retrying.
fn is_retriable_error(err: &RedisError) -> bool {
    err.is_connection_dropped()
        || err.is_timeout()
        || err.is_io_error()
        || matches!(
            err.kind(),
            redis::ErrorKind::BusyLoadingError
                | redis::ErrorKind::TryAgain
                | redis::ErrorKind::MasterDown
        )
}

/// Failures that invalidate the cached connection.
fn is_connection_error(err: &RedisError) -> bool {
    err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===== Config tests =====

    #[test]
    fn default_config_is_valid() {
        let config = RedisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pool_size, 16);
    }

    #[test]
    fn builder_methods_chain() {
        let config = RedisConfig::with_url("redis://cache.internal:6380")
            .pool_size(4)
            .connection_timeout(Duration::from_secs(2))
            .command_timeout(Duration::from_millis(250));
        assert_eq!(config.url, "redis://cache.internal:6380");
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.command_timeout, Duration::from_millis(250));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_rejects_degenerate_settings() {
        assert!(RedisConfig::with_url("").validate().is_err());
        assert!(RedisConfig::default().pool_size(0).validate().is_err());
        assert!(RedisConfig::default().pool_size(2000).validate().is_err());
        assert!(RedisConfig::default()
            .command_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn validation_cross_checks_tls_and_scheme() {
        let config = RedisConfig::with_url("rediss://secure.example:6380");
        assert!(config.validate().is_err());

        #[cfg(not(feature = "redis-tls"))]
        {
            let config = RedisConfig::with_url("rediss://secure.example:6380").tls(true);
            assert!(config.validate().is_err());
        }
    }

    // ===== Retry policy tests =====

    #[test]
    fn delays_grow_exponentially_and_cap() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(350));
    }

    #[test]
    fn jitter_stays_within_a_quarter_of_the_delay() {
        let policy = RetryPolicy {
            jitter: true,
            ..RetryPolicy::default()
        };
        for attempt in 0..3 {
            let base = RetryPolicy {
                jitter: false,
                ..policy.clone()
            }
            .delay_for_attempt(attempt);
            let jittered = policy.delay_for_attempt(attempt);
            assert!(jittered >= base);
            assert!(jittered <= base.mul_f64(1.25) + Duration::from_millis(1));
        }
    }

    #[test]
    fn retries_stop_at_the_limit() {
        let policy = RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default()
        };
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
    }

    // ===== Metrics tests =====

    #[test]
    fn metrics_average_over_recorded_commands() {
        let metrics = PoolMetrics::default();
        assert_eq!(metrics.average_latency_us(), 0.0);

        metrics.record_command(Duration::from_micros(100));
        metrics.record_command(Duration::from_micros(300));
        metrics.record_command_failure();
        metrics.record_retry();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.commands_executed, 2);
        assert_eq!(snapshot.command_failures, 1);
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.average_latency_us, 200.0);
    }

    // ===== Pool construction tests =====

    #[test]
    fn pool_rejects_invalid_configs_without_connecting() {
        let err = RedisPool::new(RedisConfig::with_url("")).unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));

        let err = RedisPool::new(RedisConfig::with_url("http://not-redis")).unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
    }

    #[test]
    fn pool_builds_lazily_for_reachable_looking_urls() {
        // No server needed: the connection is only opened on first use.
        let pool = RedisPool::new(RedisConfig::with_url("redis://127.0.0.1:6399")).unwrap();
        assert_eq!(pool.metrics().connections_established, 0);
        assert_eq!(pool.config().url, "redis://127.0.0.1:6399");
    }

    #[tokio::test]
    async fn operations_surface_connection_failures() {
        // Port 1 is never a redis server; expect a refused connection.
        let config = RedisConfig::with_url("redis://127.0.0.1:1")
            .connection_timeout(Duration::from_millis(500));
        let pool = RedisPool::new(config).unwrap();

        let result = pool.ping().await;
        assert!(matches!(result, Err(StoreError::Connection(_))));
        assert!(pool.metrics().connection_failures >= 1);
    }
}
