//! Logging and observability switches.

use std::env;

use crate::non_empty;

/// Console output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// # Environment Variables
///
/// - `LOG_LEVEL`: level for this service's crates when `RUST_LOG` is unset (default: `info`)
/// - `LOG_FORMAT`: `json` for one JSON object per line, anything else for compact text
/// - `OBSERVABILITY_ENABLED`: `false` or `0` disables the Prometheus recorder
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub observability_enabled: bool,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let format = match non_empty(&lookup, "LOG_FORMAT") {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        };

        let observability_enabled = non_empty(&lookup, "OBSERVABILITY_ENABLED")
            .map(|v| !v.eq_ignore_ascii_case("false") && v != "0")
            .unwrap_or(true);

        Self {
            level: non_empty(&lookup, "LOG_LEVEL").unwrap_or_else(|| "info".into()),
            format,
            observability_enabled,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Compact,
            observability_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> LoggingConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LoggingConfig::from_lookup(move |name: &str| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(from_vars(&[]), LoggingConfig::default());
    }

    #[test]
    fn test_json_format_and_disabled_observability() {
        let config = from_vars(&[
            ("LOG_FORMAT", "JSON"),
            ("LOG_LEVEL", "debug"),
            ("OBSERVABILITY_ENABLED", "0"),
        ]);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "debug");
        assert!(!config.observability_enabled);
    }
}
