//! # Tiercache Config
//!
//! Configuration types for the tiercache service.
//!
//! This crate is the only place that reads environment variables. Every other
//! crate receives these structs by value, so they can be built by hand in tests:
//!
//! - [`cache`]: backend selection inputs, TTLs, bounds and timeouts
//! - [`response`]: request/response caching middleware settings
//! - [`server`]: HTTP listener settings
//! - [`logging`]: log level, log format and the metrics switch
//! - [`cors`]: CORS (Cross-Origin Resource Sharing) configuration
//!
//! # Example
//!
//! ```ignore
//! use tiercache_config::{CacheConfig, ServerConfig};
//!
//! let cache_config = CacheConfig::from_env();
//! let server_config = ServerConfig::from_env();
//! ```

pub mod cache;
pub mod cors;
pub mod logging;
pub mod response;
pub mod server;

pub use cache::{BackendPreference, CacheConfig};
pub use cors::CorsConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use response::ResponseCacheConfig;
pub use server::ServerConfig;

/// Reads a variable through `lookup`, treating empty strings as unset.
pub(crate) fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses a variable through `lookup`, falling back to `default` when the
/// variable is unset or unparseable.
pub(crate) fn parsed_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    non_empty(lookup, name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Like [`parsed_or`], but zero also counts as unusable.
pub(crate) fn positive_or<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    match parsed_or(lookup, name, default) {
        0 => default,
        value => value,
    }
}
