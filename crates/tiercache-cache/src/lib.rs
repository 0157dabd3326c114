//! # Tiercache Cache
//!
//! Tag-aware caching with a transparent in-process fallback.
//!
//! This crate provides:
//! - Three interchangeable backends: Redis, a managed HTTP key-value store and
//!   a bounded in-process map
//! - Backend selection from configuration, degrading when Redis is unreachable
//! - [`CacheService`], which hides backend failures from callers
//! - Tag-based bulk invalidation
//! - Response caching middleware for axum
//!
//! # Example
//!
//! ```ignore
//! use tiercache_cache::{CacheOptions, CacheService, KeyScope};
//! use tiercache_config::CacheConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = CacheService::from_config(&CacheConfig::from_env()).await;
//!
//!     let options = CacheOptions::new().ttl_secs(5).tag("user:42");
//!     cache.set("user:42:profile", &profile, &options).await;
//!
//!     let cached: Option<Profile> = cache.get("user:42:profile", &KeyScope::default()).await;
//!
//!     cache.invalidate_by_tag("user:42").await;
//! }
//! ```

pub mod backend;
pub mod entry;
pub mod error;
pub mod http_kv;
pub mod keys;
pub mod memory;
pub mod middleware;
pub mod redis;
pub mod selection;
pub mod service;
pub mod tags;

pub use backend::{BackendKind, CacheBackend};
pub use entry::{CacheEntry, CacheOptions, CacheStats, KeyScope};
pub use error::CacheError;
pub use http_kv::HttpKvBackend;
pub use memory::MemoryBackend;
pub use middleware::{CachedResponse, ResponseCache, response_cache_middleware};
pub use self::redis::{ConnectPolicy, RedisBackend};
pub use selection::select_backend;
pub use service::CacheService;
