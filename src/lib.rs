//! # Tiercache
//!
//! An axum service around a tag-aware cache that keeps answering when its
//! shared backend does not.
//!
//! ## Overview
//!
//! At startup one backend is selected from the environment:
//!
//! - **Redis** when `REDIS_URL` is set and reachable
//! - **HTTP key-value store** when `KV_REST_API_URL` and `KV_REST_API_TOKEN` are set
//! - **In-process map** otherwise (not shared, lost on restart)
//!
//! Whatever is selected, every operation that fails against it is served by
//! the in-process map instead. Callers never see a cache error.
//!
//! ## Architecture
//!
//! ```text
//! crates/
//! ├── tiercache-config/         # Environment-driven configuration structs
//! ├── tiercache-cache/          # Backends, tag index, CacheService, response middleware
//! └── tiercache-observability/  # Logging and Prometheus metrics
//! src/
//! ├── modules/
//! │   ├── cache/   # Operational cache endpoints
//! │   └── health/  # Liveness
//! └── utils/       # Error responses
//! ```
//!
//! Each feature module follows the same structure:
//!
//! - `mod.rs`: Module exports
//! - `controller.rs`: HTTP handlers
//! - `model.rs`: DTOs
//! - `router.rs`: Axum router configuration
//!
//! ## Quick Start
//!
//! ```bash
//! REDIS_URL=redis://localhost:6379
//! CACHE_TTL_SECONDS=300
//! CACHE_PREFIX=cache:
//! ```
//!
//! When the server is running, API documentation is available at
//! `http://localhost:3000/swagger-ui` and metrics at `http://localhost:9091/metrics`.

pub mod docs;
pub mod modules;
pub mod router;
pub mod state;
pub mod utils;
pub mod validator;

// Re-export workspace crates for convenience
pub use tiercache_cache;
pub use tiercache_config;
pub use tiercache_observability;
