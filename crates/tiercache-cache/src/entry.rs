//! Stored entry envelope and per-call options.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backend::BackendKind;

/// The unit of storage.
///
/// `value` holds the caller's payload as JSON text and is passed through
/// untouched. Every backend stores this envelope, so expiry can be checked on
/// read even when the store ignores its own expiry argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl CacheEntry {
    pub fn new(value: String, ttl: Duration, tags: Vec<String>) -> Self {
        Self {
            value,
            expires_at: expiry_from_now(ttl),
            tags,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining_ttl(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Absolute expiry for a TTL starting now.
pub(crate) fn expiry_from_now(ttl: Duration) -> DateTime<Utc> {
    let now = Utc::now();
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
    now.checked_add_signed(ttl)
        .unwrap_or_else(|| now + chrono::Duration::days(36_500))
}

/// Key namespacing inputs supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyScope {
    /// Adds a `tenant:<id>:` segment after the prefix.
    pub tenant_id: Option<String>,
    /// Overrides the configured prefix for this call.
    pub key_prefix: Option<String>,
}

impl KeyScope {
    pub fn tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            key_prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }
}

/// Options for a write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Falls back to the configured default TTL when unset.
    pub ttl: Option<Duration>,
    pub tags: Vec<String>,
    pub scope: KeyScope,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn ttl_secs(self, seconds: u64) -> Self {
        self.ttl(Duration::from_secs(seconds))
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn scope(mut self, scope: KeyScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.scope.tenant_id = Some(tenant_id.into());
        self
    }
}

/// Operational snapshot returned by [`CacheService::stats`](crate::CacheService::stats).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries currently held by the in-process store.
    pub entry_count: usize,
    /// Bound of the in-process store.
    pub max_entries: usize,
    pub active_backend: BackendKind,
    pub hits: u64,
    pub misses: u64,
    /// Operations that failed on the primary backend and were served in-process.
    pub fallbacks: u64,
}
