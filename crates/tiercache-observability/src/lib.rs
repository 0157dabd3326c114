//! Tiercache Observability
//!
//! - Structured logging via `tracing-subscriber` (compact text or JSON)
//! - HTTP request logging middleware
//! - Prometheus metrics recorder, HTTP metrics middleware and `/metrics` router
//!
//! # Examples
//!
//! ```no_run
//! use tiercache_config::LoggingConfig;
//! use tiercache_observability::{init_logging, init_metrics};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = LoggingConfig::from_env();
//!     init_logging(&config)?;
//!     let _handle = init_metrics(&config);
//!     Ok(())
//! }
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, logging_middleware};
pub use self::metrics::{init_metrics, is_observability_enabled, metrics_app, metrics_middleware};
pub use metrics_exporter_prometheus::PrometheusHandle;
