//! Response caching middleware for idempotent read requests.
//!
//! Each eligible request gets a key derived from its method, path, sorted query
//! string and a configured set of request headers. On a hit the stored status,
//! selected headers and body are replayed without running the handler. On a
//! miss the handler runs and a successful response is stored.
//!
//! # Example
//!
//! ```ignore
//! use tiercache_cache::middleware::{ResponseCache, response_cache_middleware};
//! use axum::{Router, middleware};
//!
//! let responses = ResponseCache::new(cache_service, ResponseCacheConfig::from_env())
//!     .with_tags(["catalog"]);
//!
//! let app = Router::new()
//!     .route("/api/catalog", get(handler))
//!     .layer(middleware::from_fn_with_state(responses, response_cache_middleware));
//! ```

use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
        header::{
            CACHE_CONTROL, CONTENT_ENCODING, CONTENT_LANGUAGE, CONTENT_TYPE, ETAG, LAST_MODIFIED,
            VARY,
        },
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use data_encoding::BASE64;
use http_body_util::BodyExt;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tiercache_config::ResponseCacheConfig;
use tracing::{debug, warn};

use crate::entry::{CacheOptions, KeyScope};
use crate::keys::stable_hash;
use crate::service::CacheService;

/// Response header carrying `HIT`, `MISS` or `BYPASS`.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");
/// Response header carrying the derived cache key.
pub const X_CACHE_KEY: HeaderName = HeaderName::from_static("x-cache-key");

/// Response headers replayed on a hit. Anything else is dropped.
const STORED_HEADERS: [HeaderName; 7] = [
    CONTENT_TYPE,
    CONTENT_LANGUAGE,
    CONTENT_ENCODING,
    ETAG,
    LAST_MODIFIED,
    CACHE_CONTROL,
    VARY,
];

/// Caller-supplied predicate; `true` skips the cache for that request.
pub type BypassPredicate = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// A stored response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Base64 of the response body.
    pub body: String,
}

impl CachedResponse {
    fn capture(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Self {
        let headers = STORED_HEADERS
            .iter()
            .flat_map(|name| {
                headers.get_all(name).iter().filter_map(move |value| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
            })
            .collect();

        Self {
            status: status.as_u16(),
            headers,
            body: BASE64.encode(body),
        }
    }

    /// Rebuilds the response. `None` if the stored record is unusable.
    fn replay(&self) -> Option<Response> {
        let status = StatusCode::from_u16(self.status).ok()?;
        let body = BASE64.decode(self.body.as_bytes()).ok()?;

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }
        Some(response)
    }
}

/// Shared state for [`response_cache_middleware`].
#[derive(Clone)]
pub struct ResponseCache {
    cache: CacheService,
    config: Arc<ResponseCacheConfig>,
    bypass: Option<BypassPredicate>,
    tags: Arc<Vec<String>>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("config", &self.config)
            .field("bypass", &self.bypass.is_some())
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

impl ResponseCache {
    pub fn new(cache: CacheService, config: ResponseCacheConfig) -> Self {
        Self {
            cache,
            config: Arc::new(config),
            bypass: None,
            tags: Arc::new(Vec::new()),
        }
    }

    /// Skips the cache for requests where `predicate` returns `true`
    /// (personalized content, for instance).
    pub fn with_bypass<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.bypass = Some(Arc::new(predicate));
        self
    }

    /// Tags attached to every stored response, for use with [`invalidate`](Self::invalidate).
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Arc::new(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Drops every stored response tagged with `tag`.
    ///
    /// Only tags are supported; invalidating by key pattern is not.
    pub async fn invalidate(&self, tag: &str) {
        self.cache.invalidate_by_tag(tag).await;
    }

    /// Whether `request` may be served from or stored in the cache.
    pub fn is_eligible(&self, request: &Request) -> bool {
        let method = request.method();
        if method != Method::GET && method != Method::HEAD {
            return false;
        }
        !self.bypass.as_ref().is_some_and(|bypass| bypass(request))
    }

    /// Derives the cache key for `request`.
    ///
    /// Query parameters are sorted, so `?b=2&a=1` and `?a=1&b=2` share a key.
    /// Missing vary headers count as empty values.
    pub fn derive_key(&self, request: &Request) -> String {
        let uri = request.uri();
        let mut canonical = format!("{} {}", request.method(), uri.path());

        if self.config.include_query
            && let Some(query) = uri.query()
        {
            let mut pairs: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
            pairs.sort_unstable();
            canonical.push('?');
            canonical.push_str(&pairs.join("&"));
        }

        for name in &self.config.vary_headers {
            let value = request
                .headers()
                .get(name.as_str())
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            canonical.push('\n');
            canonical.push_str(name);
            canonical.push(':');
            canonical.push_str(value);
        }

        format!("response:{}", stable_hash(&canonical))
    }

    async fn lookup(&self, key: &str) -> Option<Response> {
        let cached: CachedResponse = self.cache.get(key, &KeyScope::default()).await?;
        let replayed = cached.replay();
        if replayed.is_none() {
            warn!(cache.key = %key, "Stored response could not be replayed");
        }
        replayed
    }

    /// Buffers the handler's response and stores it when it is small enough.
    async fn store(&self, key: &str, response: Response) -> Response {
        let (parts, body) = response.into_parts();

        let bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(_) => return (parts, Body::empty()).into_response(),
        };

        if bytes.len() > self.config.max_body_bytes {
            debug!(
                cache.key = %key,
                cache.body_bytes = bytes.len(),
                "Response too large to cache"
            );
        } else {
            let cached = CachedResponse::capture(parts.status, &parts.headers, &bytes);
            let options = CacheOptions::new()
                .ttl(self.config.ttl())
                .tags(self.tags.iter().cloned());
            self.cache.set(key, &cached, &options).await;
        }

        Response::from_parts(parts, Body::from(bytes))
    }
}

fn annotate(response: &mut Response, status: &'static str, key: Option<&str>) {
    let headers = response.headers_mut();
    headers.insert(X_CACHE, HeaderValue::from_static(status));
    if let Some(key) = key
        && let Ok(value) = HeaderValue::from_str(key)
    {
        headers.insert(X_CACHE_KEY, value);
    }
}

/// Serves eligible requests from the cache, storing successful misses.
///
/// Only 2xx responses are stored.
pub async fn response_cache_middleware(
    State(cache): State<ResponseCache>,
    request: Request,
    next: Next,
) -> Response {
    if !cache.is_eligible(&request) {
        counter!("response_cache_requests_total", "status" => "bypass").increment(1);
        let mut response = next.run(request).await;
        annotate(&mut response, "BYPASS", None);
        return response;
    }

    let key = cache.derive_key(&request);

    if let Some(mut response) = cache.lookup(&key).await {
        counter!("response_cache_requests_total", "status" => "hit").increment(1);
        annotate(&mut response, "HIT", Some(&key));
        return response;
    }

    counter!("response_cache_requests_total", "status" => "miss").increment(1);
    let response = next.run(request).await;
    let mut response = if response.status().is_success() {
        cache.store(&key, response).await
    } else {
        response
    };
    annotate(&mut response, "MISS", Some(&key));
    response
}
