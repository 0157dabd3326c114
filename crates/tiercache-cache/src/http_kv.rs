//! Managed HTTP key-value store backend.
//!
//! Every operation is one request carrying a bearer token:
//!
//! - `GET  {base}/get/{key}` answers `{"result": <string|null>}`
//! - `POST {base}/set/{key}` with `{"value": <envelope>, "expiration": <seconds>}`
//! - `POST {base}/delete/{key}`
//! - `POST {base}/flushdb`
//!
//! The store has no set type, so a tag's members are kept as a JSON array
//! under a synthetic key and rewritten on every add. Concurrent adds can lose
//! a member; tag invalidation is best-effort bookkeeping.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::backend::{BackendKind, CacheBackend, ttl_seconds};
use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::keys::tag_set_key;

#[derive(Debug, Deserialize)]
struct GetResponse {
    result: Option<String>,
}

#[derive(Debug, Serialize)]
struct SetRequest<'a> {
    value: &'a str,
    expiration: u64,
}

/// HTTP key-value store client.
#[derive(Clone)]
pub struct HttpKvBackend {
    client: Client,
    base_url: Url,
    token: String,
    namespace: String,
}

impl std::fmt::Debug for HttpKvBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpKvBackend")
            .field("base_url", &self.base_url.as_str())
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl HttpKvBackend {
    /// Creates a client whose every request is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Unavailable` if `base_url` cannot be used as a base.
    pub fn new(
        base_url: &str,
        token: &str,
        namespace: &str,
        timeout: Duration,
    ) -> Result<Self, CacheError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| CacheError::Unavailable(format!("invalid KV base URL: {base_url}")))?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            token: token.to_string(),
            namespace: namespace.to_string(),
        })
    }

    /// `{base}/{segments...}` with each segment encoded as a URI component,
    /// so `:` and `/` inside a key travel as `%3A` and `%2F`.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut path = self.base_url.path().trim_end_matches('/').to_string();
        for segment in segments {
            path.push('/');
            path.push_str(&urlencoding::encode(segment));
        }
        let mut url = self.base_url.clone();
        url.set_path(&path);
        url
    }

    async fn send(&self, request: RequestBuilder, key: &str) -> Result<(), CacheError> {
        let response = request.bearer_auth(&self.token).send().await?;
        if !response.status().is_success() {
            return Err(CacheError::HttpStatus {
                status: response.status().as_u16(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let response = self
            .client
            .get(self.endpoint(&["get", key]))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CacheError::HttpStatus {
                status: response.status().as_u16(),
                key: key.to_string(),
            });
        }

        let body: GetResponse = response.json().await?;
        let Some(raw) = body.result else {
            return Ok(None);
        };

        let entry = CacheEntry::from_json(&raw)?;
        if entry.is_expired() {
            self.remove(key).await?;
            debug!(cache.key = %key, "Expired entry removed");
            return Ok(None);
        }
        Ok(Some(entry))
    }

    async fn store(&self, key: &str, entry: &CacheEntry, ttl: Duration) -> Result<(), CacheError> {
        let envelope = entry.to_json()?;
        let body = SetRequest {
            value: &envelope,
            expiration: ttl_seconds(ttl),
        };
        self.send(self.client.post(self.endpoint(&["set", key])).json(&body), key)
            .await
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.send(self.client.post(self.endpoint(&["delete", key])), key)
            .await
    }
}

#[async_trait]
impl CacheBackend for HttpKvBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::HttpKv
    }

    #[instrument(skip(self), fields(cache.operation = "GET"))]
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        self.fetch(key).await
    }

    #[instrument(skip(self, entry), fields(cache.operation = "SET"))]
    async fn set(&self, key: &str, entry: &CacheEntry, ttl: Duration) -> Result<(), CacheError> {
        self.store(key, entry, ttl).await?;
        debug!(cache.key = %key, cache.ttl_secs = %ttl_seconds(ttl), "Cache set");
        Ok(())
    }

    #[instrument(skip(self), fields(cache.operation = "DELETE"))]
    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.remove(key).await
    }

    /// Read-modify-write of the tag's JSON array. The record is kept alive for
    /// the longer of its remaining lifetime and `ttl`.
    #[instrument(skip(self), fields(cache.operation = "TAG_ADD"))]
    async fn add_to_tag_set(
        &self,
        tag: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let tag_key = tag_set_key(&self.namespace, tag);
        let (mut members, remaining) = match self.fetch(&tag_key).await? {
            Some(record) => (
                serde_json::from_str::<Vec<String>>(&record.value)?,
                record.remaining_ttl(),
            ),
            None => (Vec::new(), Duration::ZERO),
        };

        if !members.iter().any(|m| m == key) {
            members.push(key.to_string());
        }

        let ttl = ttl.max(remaining);
        let record = CacheEntry::new(serde_json::to_string(&members)?, ttl, Vec::new());
        self.store(&tag_key, &record, ttl).await
    }

    #[instrument(skip(self), fields(cache.operation = "TAG_MEMBERS"))]
    async fn tag_set_members(&self, tag: &str) -> Result<Vec<String>, CacheError> {
        match self.fetch(&tag_set_key(&self.namespace, tag)).await? {
            Some(record) => Ok(serde_json::from_str(&record.value)?),
            None => Ok(Vec::new()),
        }
    }

    async fn delete_tag_set(&self, tag: &str) -> Result<(), CacheError> {
        self.remove(&tag_set_key(&self.namespace, tag)).await
    }

    /// The store has no key scan, so the whole database is flushed whatever
    /// the prefixes.
    #[instrument(skip(self), fields(cache.operation = "FLUSHDB"))]
    async fn clear(&self, _prefixes: &[String]) -> Result<(), CacheError> {
        self.send(self.client.post(self.endpoint(&["flushdb"])), "*")
            .await
    }
}
