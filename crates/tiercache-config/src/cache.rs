//! Cache service configuration.
//!
//! Holds the inputs for backend selection (network store connection string,
//! managed HTTP store credentials) together with the defaults every backend
//! shares: TTL, key prefix, in-process bound and network timeouts.

use std::env;
use std::time::Duration;

use serde::Serialize;

use crate::{non_empty, parsed_or, positive_or};

/// Default time-to-live for cached entries, in seconds.
pub const DEFAULT_TTL_SECONDS: u64 = 300;

/// Default namespace prefix applied to every cache key.
pub const DEFAULT_KEY_PREFIX: &str = "cache:";

/// Default bound on the in-process store.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Which backend the configuration asks for, before any connection attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    Redis,
    HttpKv,
    Memory,
}

/// Cache configuration.
///
/// # Environment Variables
///
/// - `REDIS_URL`: network key-value store connection string (optional)
/// - `KV_REST_API_URL` / `KV_REST_API_TOKEN`: managed HTTP key-value store (optional)
/// - `CACHE_TTL_SECONDS`: default TTL in seconds (default: `300`, zero is ignored)
/// - `CACHE_PREFIX`: prefix for all cache keys (default: `cache:`)
/// - `CACHE_MAX_ENTRIES`: bound on the in-process store (default: `1000`)
/// - `CACHE_OPERATION_TIMEOUT_MS`: per-operation network timeout (default: `2000`, zero is ignored)
/// - `CACHE_CONNECT_ATTEMPTS`: startup connection attempts (default: `3`)
/// - `CACHE_MAX_RETRY_DELAY_MS`: cap on the delay between attempts (default: `2000`)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Network key-value store connection URL.
    pub redis_url: Option<String>,

    /// Base URL of the managed HTTP key-value store.
    pub kv_rest_api_url: Option<String>,

    /// Bearer token for the managed HTTP key-value store.
    pub kv_rest_api_token: Option<String>,

    /// Default time-to-live for cached items in seconds.
    pub default_ttl_seconds: u64,

    /// Prefix for all cache keys to avoid collisions.
    pub key_prefix: String,

    /// Maximum number of entries held by the in-process store.
    pub max_entries: usize,

    /// Upper bound for a single backend call.
    pub operation_timeout_ms: u64,

    /// Connection attempts made at startup before degrading.
    pub connect_attempts: u32,

    /// Cap on the backoff delay between connection attempts.
    pub max_retry_delay_ms: u64,
}

impl CacheConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            redis_url: non_empty(&lookup, "REDIS_URL"),
            kv_rest_api_url: non_empty(&lookup, "KV_REST_API_URL"),
            kv_rest_api_token: non_empty(&lookup, "KV_REST_API_TOKEN"),
            default_ttl_seconds: positive_or(&lookup, "CACHE_TTL_SECONDS", DEFAULT_TTL_SECONDS),
            key_prefix: non_empty(&lookup, "CACHE_PREFIX")
                .unwrap_or_else(|| DEFAULT_KEY_PREFIX.into()),
            max_entries: parsed_or(&lookup, "CACHE_MAX_ENTRIES", DEFAULT_MAX_ENTRIES),
            operation_timeout_ms: positive_or(&lookup, "CACHE_OPERATION_TIMEOUT_MS", 2000),
            connect_attempts: parsed_or(&lookup, "CACHE_CONNECT_ATTEMPTS", 3),
            max_retry_delay_ms: parsed_or(&lookup, "CACHE_MAX_RETRY_DELAY_MS", 2000),
        }
    }

    /// The backend this configuration asks for: the network store first, then
    /// the managed HTTP store when both URL and token are present, else memory.
    pub fn backend_preference(&self) -> BackendPreference {
        if self.redis_url.is_some() {
            BackendPreference::Redis
        } else if self.http_kv_credentials().is_some() {
            BackendPreference::HttpKv
        } else {
            BackendPreference::Memory
        }
    }

    /// Base URL and token of the managed HTTP store, if both are configured.
    pub fn http_kv_credentials(&self) -> Option<(&str, &str)> {
        match (&self.kv_rest_api_url, &self.kv_rest_api_token) {
            (Some(url), Some(token)) => Some((url.as_str(), token.as_str())),
            _ => None,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            kv_rest_api_url: None,
            kv_rest_api_token: None,
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
            key_prefix: DEFAULT_KEY_PREFIX.into(),
            max_entries: DEFAULT_MAX_ENTRIES,
            operation_timeout_ms: 2000,
            connect_attempts: 3,
            max_retry_delay_ms: 2000,
        }
    }
}
