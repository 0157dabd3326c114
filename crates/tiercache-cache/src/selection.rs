//! Startup backend selection.

use std::sync::Arc;
use tiercache_config::{BackendPreference, CacheConfig};
use tracing::{info, warn};

use crate::backend::CacheBackend;
use crate::http_kv::HttpKvBackend;
use crate::redis::{ConnectPolicy, RedisBackend};

/// Picks the primary backend for the process lifetime.
///
/// Follows [`CacheConfig::backend_preference`]. A Redis connection failure
/// degrades to the managed HTTP store when it is configured, instead of
/// failing startup. Returns `None` when the in-process store must serve
/// everything.
pub async fn select_backend(config: &CacheConfig) -> Option<Arc<dyn CacheBackend>> {
    let selected = match config.backend_preference() {
        BackendPreference::Redis => match connect_redis(config).await {
            Some(backend) => Some(backend),
            None => open_http_kv(config),
        },
        BackendPreference::HttpKv => open_http_kv(config),
        BackendPreference::Memory => None,
    };

    if selected.is_none() {
        warn!(
            cache.backend = "memory",
            "No shared cache backend available; using the in-process cache. \
             Cached state will not survive a restart and is not shared across instances"
        );
    }
    selected
}

async fn connect_redis(config: &CacheConfig) -> Option<Arc<dyn CacheBackend>> {
    let redis_url = config.redis_url.as_deref()?;
    let policy = ConnectPolicy::from_config(config);
    match RedisBackend::connect(redis_url, &config.key_prefix, policy).await {
        Ok(backend) => {
            info!(cache.backend = "redis", "Using Redis cache backend");
            Some(Arc::new(backend))
        }
        Err(e) => {
            warn!(
                error = %e,
                cache.attempts = policy.attempts,
                "Redis unavailable at startup, trying next cache backend"
            );
            None
        }
    }
}

fn open_http_kv(config: &CacheConfig) -> Option<Arc<dyn CacheBackend>> {
    let (base_url, token) = config.http_kv_credentials()?;
    match HttpKvBackend::new(base_url, token, &config.key_prefix, config.operation_timeout()) {
        Ok(backend) => {
            info!(cache.backend = "http_kv", "Using HTTP key-value cache backend");
            Some(Arc::new(backend))
        }
        Err(e) => {
            warn!(error = %e, "HTTP key-value store misconfigured, trying next cache backend");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;

    fn unreachable_redis() -> CacheConfig {
        CacheConfig {
            redis_url: Some("redis://127.0.0.1:1".into()),
            connect_attempts: 1,
            operation_timeout_ms: 300,
            max_retry_delay_ms: 10,
            ..CacheConfig::default()
        }
    }

    #[tokio::test]
    async fn test_no_configuration_selects_memory() {
        assert!(select_backend(&CacheConfig::default()).await.is_none());
    }

    #[tokio::test]
    async fn test_http_store_selected_with_url_and_token() {
        let config = CacheConfig {
            kv_rest_api_url: Some("https://kv.example.com".into()),
            kv_rest_api_token: Some("token".into()),
            ..CacheConfig::default()
        };
        let backend = select_backend(&config).await.unwrap();
        assert_eq!(backend.kind(), BackendKind::HttpKv);
    }

    #[tokio::test]
    async fn test_unreachable_redis_degrades_to_http_store() {
        let config = CacheConfig {
            kv_rest_api_url: Some("https://kv.example.com".into()),
            kv_rest_api_token: Some("token".into()),
            ..unreachable_redis()
        };
        let backend = select_backend(&config).await.unwrap();
        assert_eq!(backend.kind(), BackendKind::HttpKv);
    }

    #[tokio::test]
    async fn test_unreachable_redis_degrades_to_memory() {
        assert!(select_backend(&unreachable_redis()).await.is_none());
    }

    #[tokio::test]
    async fn test_http_url_without_token_selects_memory() {
        let config = CacheConfig {
            kv_rest_api_url: Some("https://kv.example.com".into()),
            ..CacheConfig::default()
        };
        assert_eq!(config.backend_preference(), BackendPreference::Memory);
        assert!(select_backend(&config).await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_http_url_degrades_to_memory() {
        let config = CacheConfig {
            kv_rest_api_url: Some("::not a url::".into()),
            kv_rest_api_token: Some("token".into()),
            ..CacheConfig::default()
        };
        assert!(select_backend(&config).await.is_none());
    }
}
