//! Redis backend for distributed caching.
//!
//! Entries are stored as JSON envelopes with `SETEX`. Tag membership uses a
//! server-side set per tag whose expiry is extended whenever a longer-lived
//! member is added.

use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use std::time::Duration;
use tiercache_config::CacheConfig;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

use crate::backend::{BackendKind, CacheBackend, ttl_seconds};
use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::keys::tag_set_key;

/// First delay between connection attempts; doubled after each failure.
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Bounded retry policy for the startup connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectPolicy {
    pub attempts: u32,
    pub max_delay: Duration,
    /// Upper bound for each individual attempt, readiness check included.
    pub attempt_timeout: Duration,
}

impl ConnectPolicy {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            attempts: config.connect_attempts.max(1),
            max_delay: config.max_retry_delay(),
            attempt_timeout: config.operation_timeout(),
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        INITIAL_RETRY_DELAY
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Redis cache backend with an auto-reconnecting connection.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    namespace: String,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Connects to Redis, retrying per `policy`, and checks readiness with `PING`.
    ///
    /// # Errors
    ///
    /// Returns the last attempt's error once every attempt has failed.
    pub async fn connect(
        redis_url: &str,
        namespace: &str,
        policy: ConnectPolicy,
    ) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)?;
        let attempts = policy.attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match timeout(policy.attempt_timeout, Self::open_ready(&client)).await {
                Ok(Ok(conn)) => {
                    info!(cache.attempt = attempt, "Connected to Redis");
                    return Ok(Self {
                        conn,
                        namespace: namespace.to_string(),
                    });
                }
                Ok(Err(e)) => {
                    warn!(cache.attempt = attempt, error = %e, "Redis connection attempt failed");
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!(cache.attempt = attempt, "Redis connection attempt timed out");
                    last_error = Some(CacheError::Timeout(policy.attempt_timeout));
                }
            }

            if attempt < attempts {
                sleep(policy.delay_after(attempt)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| CacheError::Unavailable("no connection attempts".into())))
    }

    async fn open_ready(client: &Client) -> Result<ConnectionManager, CacheError> {
        let mut conn = ConnectionManager::new(client.clone()).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(conn)
    }

    /// Deletes all keys matching a pattern.
    ///
    /// # Warning
    ///
    /// Uses SCAN which is safe for production, but may be slow with many keys.
    #[instrument(skip(self), fields(cache.operation = "SCAN_DEL"))]
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let count: u64 = conn.del(&keys).await?;
                deleted += count;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!(cache.pattern = %pattern, cache.deleted = %deleted, "Pattern invalidation complete");

        Ok(deleted)
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }

    #[instrument(skip(self), fields(cache.operation = "GET"))]
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let mut conn = self.conn.clone();

        let Some(raw) = conn.get::<_, Option<String>>(key).await? else {
            debug!(cache.key = %key, "Cache miss");
            return Ok(None);
        };

        let entry = CacheEntry::from_json(&raw)?;
        if entry.is_expired() {
            conn.del::<_, ()>(key).await?;
            debug!(cache.key = %key, "Expired entry removed");
            return Ok(None);
        }

        debug!(cache.key = %key, "Cache hit");
        Ok(Some(entry))
    }

    #[instrument(skip(self, entry), fields(cache.operation = "SETEX"))]
    async fn set(&self, key: &str, entry: &CacheEntry, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let json = entry.to_json()?;
        let seconds = ttl_seconds(ttl);

        conn.set_ex::<_, _, ()>(key, json, seconds).await?;

        debug!(cache.key = %key, cache.ttl_secs = %seconds, "Cache set");

        Ok(())
    }

    #[instrument(skip(self), fields(cache.operation = "DEL"))]
    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();

        conn.del::<_, ()>(key).await?;

        debug!(cache.key = %key, "Cache invalidated");

        Ok(())
    }

    #[instrument(skip(self), fields(cache.operation = "SADD"))]
    async fn add_to_tag_set(
        &self,
        tag: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let tag_key = tag_set_key(&self.namespace, tag);
        let seconds = ttl_seconds(ttl) as i64;

        let (_, remaining): (i64, i64) = redis::pipe()
            .sadd(&tag_key, key)
            .ttl(&tag_key)
            .query_async(&mut conn)
            .await?;

        // -1 means no expiry yet, so any positive TTL is an extension.
        if remaining < seconds {
            conn.expire::<_, ()>(&tag_key, seconds).await?;
        }

        Ok(())
    }

    #[instrument(skip(self), fields(cache.operation = "SMEMBERS"))]
    async fn tag_set_members(&self, tag: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(tag_set_key(&self.namespace, tag)).await?;
        Ok(members)
    }

    #[instrument(skip(self), fields(cache.operation = "DEL"))]
    async fn delete_tag_set(&self, tag: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(tag_set_key(&self.namespace, tag)).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(cache.operation = "CLEAR"))]
    async fn clear(&self, prefixes: &[String]) -> Result<(), CacheError> {
        let mut patterns: Vec<String> = prefixes.iter().map(|p| scan_pattern(p)).collect();
        let own = scan_pattern(&self.namespace);
        if !patterns.contains(&own) {
            patterns.push(own);
        }
        for pattern in &patterns {
            self.invalidate_pattern(pattern).await?;
        }
        Ok(())
    }
}

/// `SCAN MATCH` pattern selecting every key that starts with `prefix`.
/// Glob metacharacters inside the prefix are escaped.
fn scan_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}
