//! Cache orchestrator.
//!
//! [`CacheService`] presents one get/set/invalidate/clear/stats contract over
//! whichever backend was selected at startup. Any operational failure of that
//! backend is logged and the same operation is served by the in-process store
//! instead; callers never see a cache error.

use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tiercache_config::CacheConfig;
use tracing::{debug, error, instrument, warn};

use crate::backend::{BackendKind, CacheBackend, bounded};
use crate::entry::{CacheEntry, CacheOptions, CacheStats, KeyScope};
use crate::error::CacheError;
use crate::keys::namespaced;
use crate::memory::MemoryBackend;
use crate::selection::select_backend;
use crate::tags::TagIndex;

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    fallbacks: AtomicU64,
}

struct Inner {
    primary: Option<Arc<dyn CacheBackend>>,
    memory: MemoryBackend,
    key_prefix: String,
    /// Every prefix a key has been written under, the configured one included.
    written_prefixes: Mutex<BTreeSet<String>>,
    default_ttl: Duration,
    operation_timeout: Duration,
    counters: Counters,
}

/// Shared cache handle. Cloning is cheap; all clones use the same backends.
#[derive(Clone)]
pub struct CacheService {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("active_backend", &self.active_backend())
            .field("key_prefix", &self.inner.key_prefix)
            .field("default_ttl", &self.inner.default_ttl)
            .finish_non_exhaustive()
    }
}

impl CacheService {
    /// Creates a service over an explicitly chosen primary backend. `None`
    /// makes the in-process store the only backend.
    pub fn new(config: &CacheConfig, primary: Option<Arc<dyn CacheBackend>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                primary,
                memory: MemoryBackend::new(config.max_entries),
                key_prefix: config.key_prefix.clone(),
                written_prefixes: Mutex::new(BTreeSet::from([config.key_prefix.clone()])),
                default_ttl: config.default_ttl(),
                operation_timeout: config.operation_timeout(),
                counters: Counters::default(),
            }),
        }
    }

    /// Selects a backend from `config` (see [`select_backend`]) and builds the service.
    pub async fn from_config(config: &CacheConfig) -> Self {
        let primary = select_backend(config).await;
        Self::new(config, primary)
    }

    pub fn memory_only(config: &CacheConfig) -> Self {
        Self::new(config, None)
    }

    /// The backend selected at startup, or `Memory` when none was.
    pub fn active_backend(&self) -> BackendKind {
        self.inner
            .primary
            .as_ref()
            .map(|backend| backend.kind())
            .unwrap_or(BackendKind::Memory)
    }

    /// The stored key for `key` under `scope`.
    pub fn key_for(&self, key: &str, scope: &KeyScope) -> String {
        namespaced(&self.inner.key_prefix, scope, key)
    }

    /// Gets and deserializes a cached value.
    ///
    /// Returns `None` on a miss, an expired entry, a backend failure that the
    /// in-process store could not answer, or a value that fails to deserialize.
    pub async fn get<T>(&self, key: &str, scope: &KeyScope) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let raw = self.get_raw(key, scope).await?;
        match serde_json::from_str(&raw) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                error!(cache.key = %key, error = %e, "Failed to deserialize cached value");
                None
            }
        }
    }

    /// Gets the cached payload as the JSON text it was stored as.
    #[instrument(skip(self), fields(cache.operation = "GET"))]
    pub async fn get_raw(&self, key: &str, scope: &KeyScope) -> Option<String> {
        let full_key = self.key_for(key, scope);

        let (entry, served_by) = match &self.inner.primary {
            Some(primary) => match bounded(self.inner.operation_timeout, primary.get(&full_key))
                .await
            {
                Ok(entry) => (entry, primary.kind()),
                Err(e) => {
                    self.record_fallback("get", primary.kind(), &full_key, &e);
                    (self.inner.memory.lookup(&full_key), BackendKind::Memory)
                }
            },
            None => (self.inner.memory.lookup(&full_key), BackendKind::Memory),
        };

        let outcome = if entry.is_some() { "hit" } else { "miss" };
        counter!("cache_operations_total", "operation" => "get", "backend" => served_by.as_str(), "outcome" => outcome)
            .increment(1);

        match entry {
            Some(entry) => {
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(cache.key = %full_key, cache.backend = %served_by, "Cache hit");
                Some(entry.value)
            }
            None => {
                self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(cache.key = %full_key, cache.backend = %served_by, "Cache miss");
                None
            }
        }
    }

    /// Serializes and stores a value. Failures are logged, never returned.
    pub async fn set<T>(&self, key: &str, value: &T, options: &CacheOptions)
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_string(value) {
            Ok(json) => self.set_raw(key, json, options).await,
            Err(e) => {
                error!(cache.key = %key, error = %e, "Failed to serialize value for caching");
            }
        }
    }

    /// Stores a payload that is already JSON text.
    ///
    /// The write runs on its own task. If the caller is cancelled while
    /// awaiting, the write still completes.
    #[instrument(skip(self, json, options), fields(cache.operation = "SET"))]
    pub async fn set_raw(&self, key: &str, json: String, options: &CacheOptions) {
        let full_key = self.key_for(key, &options.scope);
        if let Some(prefix) = &options.scope.key_prefix {
            self.inner.written_prefixes.lock().insert(prefix.clone());
        }
        let ttl = options.ttl.unwrap_or(self.inner.default_ttl);
        let entry = CacheEntry::new(json, ttl, options.tags.clone());

        let service = self.clone();
        let write = tokio::spawn(async move { service.write_entry(&full_key, entry, ttl).await });
        if let Err(e) = write.await {
            error!(cache.key = %key, error = %e, "Cache write task failed");
        }
    }

    async fn write_entry(&self, key: &str, entry: CacheEntry, ttl: Duration) {
        let Some(primary) = &self.inner.primary else {
            self.write_memory(key, entry, ttl);
            return;
        };

        if let Err(e) = bounded(self.inner.operation_timeout, primary.set(key, &entry, ttl)).await {
            self.record_fallback("set", primary.kind(), key, &e);
            self.write_memory(key, entry, ttl);
            return;
        }

        counter!("cache_operations_total", "operation" => "set", "backend" => primary.kind().as_str(), "outcome" => "ok")
            .increment(1);

        if !entry.tags.is_empty() {
            TagIndex::new(primary.as_ref(), self.inner.operation_timeout)
                .attach(&entry.tags, key, ttl)
                .await;
        }
    }

    fn write_memory(&self, key: &str, entry: CacheEntry, ttl: Duration) {
        let tags = entry.tags.clone();
        self.inner.memory.insert(key, entry);
        for tag in &tags {
            self.inner.memory.tag_key(tag, key, ttl);
        }
        counter!("cache_operations_total", "operation" => "set", "backend" => "memory", "outcome" => "ok")
            .increment(1);
    }

    /// Returns the cached value, or runs `fetch` and caches its `Ok` result.
    ///
    /// Errors from `fetch` are returned untouched and nothing is cached.
    pub async fn remember<T, E, F, Fut>(
        &self,
        key: &str,
        options: &CacheOptions,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get(key, &options.scope).await {
            return Ok(cached);
        }
        let value = fetch().await?;
        self.set(key, &value, options).await;
        Ok(value)
    }

    /// Deletes one key from the active backend and the in-process store.
    #[instrument(skip(self), fields(cache.operation = "DEL"))]
    pub async fn delete(&self, key: &str, scope: &KeyScope) {
        let full_key = self.key_for(key, scope);
        if let Some(primary) = &self.inner.primary
            && let Err(e) = bounded(self.inner.operation_timeout, primary.delete(&full_key)).await
        {
            self.record_fallback("delete", primary.kind(), &full_key, &e);
        }
        self.inner.memory.remove(&full_key);
    }

    /// Deletes every key tagged with `tag`.
    ///
    /// The active backend's member set is read and each member deleted. If the
    /// set cannot be read, only the in-process store is cleaned. The in-process
    /// store is always cleaned as well, since it may hold writes made while the
    /// primary was failing.
    #[instrument(skip(self), fields(cache.operation = "INVALIDATE_TAG"))]
    pub async fn invalidate_by_tag(&self, tag: &str) {
        let mut invalidated = 0;

        if let Some(primary) = &self.inner.primary {
            match TagIndex::new(primary.as_ref(), self.inner.operation_timeout)
                .invalidate(tag)
                .await
            {
                Ok(report) => invalidated += report.members,
                Err(e) => self.record_fallback("invalidate_by_tag", primary.kind(), tag, &e),
            }
        }

        invalidated += self.inner.memory.invalidate_tag(tag);

        counter!("cache_operations_total", "operation" => "invalidate_by_tag", "backend" => self.active_backend().as_str(), "outcome" => "ok")
            .increment(1);
        debug!(cache.tag = %tag, cache.invalidated = invalidated, "Tag invalidated");
    }

    /// Removes every entry from the active backend and the in-process store,
    /// including entries written under a per-call prefix override.
    #[instrument(skip(self), fields(cache.operation = "CLEAR"))]
    pub async fn clear(&self) {
        let prefixes = self.written_prefixes();
        if let Some(primary) = &self.inner.primary
            && let Err(e) = bounded(self.inner.operation_timeout, primary.clear(&prefixes)).await
        {
            self.record_fallback("clear", primary.kind(), "*", &e);
        }
        self.inner.memory.clear_all();
        debug!("Cache cleared");
    }

    /// Prefixes `clear` has to cover, in sorted order.
    pub fn written_prefixes(&self) -> Vec<String> {
        self.inner.written_prefixes.lock().iter().cloned().collect()
    }

    pub fn stats(&self) -> CacheStats {
        let counters = &self.inner.counters;
        CacheStats {
            entry_count: self.inner.memory.len(),
            max_entries: self.inner.memory.capacity(),
            active_backend: self.active_backend(),
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            fallbacks: counters.fallbacks.load(Ordering::Relaxed),
        }
    }

    fn record_fallback(
        &self,
        operation: &'static str,
        backend: BackendKind,
        key: &str,
        err: &CacheError,
    ) {
        self.inner.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
        counter!("cache_fallbacks_total", "operation" => operation, "backend" => backend.as_str())
            .increment(1);

        if err.is_serialization() {
            error!(
                cache.operation = operation,
                cache.backend = %backend,
                cache.key = %key,
                error = %err,
                "Cached value could not be encoded or decoded, using in-process store"
            );
        } else {
            warn!(
                cache.operation = operation,
                cache.backend = %backend,
                cache.key = %key,
                error = %err,
                "Cache backend failed, using in-process store"
            );
        }
    }
}
