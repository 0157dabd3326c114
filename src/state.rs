use tiercache_cache::{CacheService, ResponseCache};
use tiercache_config::{CacheConfig, CorsConfig, ResponseCacheConfig};

use crate::modules::cache::ENTRY_RESPONSES_TAG;

#[derive(Clone, Debug)]
pub struct AppState {
    pub cache: CacheService,
    /// Response cache in front of the entry read route, backed by `cache`.
    pub responses: ResponseCache,
    pub cors_config: CorsConfig,
}

impl AppState {
    pub fn new(
        cache: CacheService,
        response_config: ResponseCacheConfig,
        cors_config: CorsConfig,
    ) -> Self {
        let responses =
            ResponseCache::new(cache.clone(), response_config).with_tags([ENTRY_RESPONSES_TAG]);
        Self {
            cache,
            responses,
            cors_config,
        }
    }
}

/// Builds the one cache instance shared by every request handler.
pub async fn init_app_state(
    cache_config: &CacheConfig,
    response_config: ResponseCacheConfig,
    cors_config: CorsConfig,
) -> AppState {
    let cache = CacheService::from_config(cache_config).await;
    AppState::new(cache, response_config, cors_config)
}
