//! HTTP listener configuration.

use std::env;

use crate::{non_empty, parsed_or};

/// Listener settings for the operational API and the metrics endpoint.
///
/// # Environment Variables
///
/// - `HOST`: bind address (default: `0.0.0.0`)
/// - `PORT`: API port (default: `3000`)
/// - `METRICS_PORT`: Prometheus scrape port (default: `9091`)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub metrics_port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let lookup = |name: &str| env::var(name).ok();
        Self {
            host: non_empty(&lookup, "HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed_or(&lookup, "PORT", 3000),
            metrics_port: parsed_or(&lookup, "METRICS_PORT", 9091),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn metrics_bind_address(&self) -> String {
        format!("{}:{}", self.host, self.metrics_port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            metrics_port: 9091,
        }
    }
}
