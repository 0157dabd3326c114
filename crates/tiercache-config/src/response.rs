//! Request/response caching configuration.
//!
//! Controls which parts of a request identify it (query string, selected
//! headers), how long responses live, and how large a body may be stored.

use std::env;
use std::time::Duration;

use crate::{non_empty, parsed_or, positive_or};

/// Default TTL for cached responses, in seconds.
pub const DEFAULT_RESPONSE_TTL_SECONDS: u64 = 60;

/// Largest response body that will be stored (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Response cache configuration.
///
/// # Environment Variables
///
/// - `RESPONSE_CACHE_TTL_SECONDS`: TTL for stored responses (default: `60`, zero is ignored)
/// - `RESPONSE_CACHE_INCLUDE_QUERY`: include the sorted query string in keys (default: `true`)
/// - `RESPONSE_CACHE_VARY_HEADERS`: request headers that take part in the key
///   (default: `accept,accept-language`)
/// - `RESPONSE_CACHE_MAX_BODY_BYTES`: larger bodies are served but not stored
///   (default: `1048576`)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseCacheConfig {
    pub ttl_seconds: u64,
    pub include_query: bool,
    /// Lower-cased request header names.
    pub vary_headers: Vec<String>,
    pub max_body_bytes: usize,
}

impl ResponseCacheConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let vary_headers = non_empty(&lookup, "RESPONSE_CACHE_VARY_HEADERS")
            .map(|v| parse_header_list(&v))
            .unwrap_or(defaults.vary_headers);

        Self {
            ttl_seconds: positive_or(
                &lookup,
                "RESPONSE_CACHE_TTL_SECONDS",
                DEFAULT_RESPONSE_TTL_SECONDS,
            ),
            include_query: parsed_or(&lookup, "RESPONSE_CACHE_INCLUDE_QUERY", true),
            vary_headers,
            max_body_bytes: parsed_or(
                &lookup,
                "RESPONSE_CACHE_MAX_BODY_BYTES",
                DEFAULT_MAX_BODY_BYTES,
            ),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Replace the header allow-list used for key derivation.
    pub fn with_vary_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.vary_headers = headers
            .into_iter()
            .map(|h| h.as_ref().trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        self
    }
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_RESPONSE_TTL_SECONDS,
            include_query: true,
            vary_headers: vec!["accept".into(), "accept-language".into()],
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

fn parse_header_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vary_headers_are_normalised() {
        let config = ResponseCacheConfig::from_lookup(|name| match name {
            "RESPONSE_CACHE_VARY_HEADERS" => Some(" Accept , X-Tenant-Id,,".into()),
            "RESPONSE_CACHE_INCLUDE_QUERY" => Some("false".into()),
            _ => None,
        });
        assert_eq!(config.vary_headers, vec!["accept", "x-tenant-id"]);
        assert!(!config.include_query);
        assert_eq!(config.ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_zero_ttl_falls_back() {
        let config = ResponseCacheConfig::from_lookup(|name| match name {
            "RESPONSE_CACHE_TTL_SECONDS" => Some("0".into()),
            _ => None,
        });
        assert_eq!(config.ttl_seconds, DEFAULT_RESPONSE_TTL_SECONDS);
    }
}
