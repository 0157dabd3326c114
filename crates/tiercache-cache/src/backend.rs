//! The contract every storage strategy implements.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::entry::CacheEntry;
use crate::error::CacheError;

/// Which storage strategy is serving a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Redis,
    HttpKv,
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Redis => "redis",
            BackendKind::HttpKv => "http_kv",
            BackendKind::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage strategy used by [`CacheService`](crate::CacheService).
///
/// A missing key is `Ok(None)`, never an error. Errors mean the backend could
/// not perform the operation and trigger the in-process fallback.
///
/// Tag methods take the bare tag name; each backend decides where its tag
/// records live.
#[async_trait]
pub trait CacheBackend: Send + Sync + fmt::Debug {
    fn kind(&self) -> BackendKind;

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    async fn set(&self, key: &str, entry: &CacheEntry, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Adds `key` to the tag's member set, keeping the set alive for at least `ttl`.
    async fn add_to_tag_set(
        &self,
        tag: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    async fn tag_set_members(&self, tag: &str) -> Result<Vec<String>, CacheError>;

    async fn delete_tag_set(&self, tag: &str) -> Result<(), CacheError>;

    /// Removes every key stored under any of `prefixes`, tag records included.
    ///
    /// Backends that cannot scope a wipe remove everything they hold.
    async fn clear(&self, prefixes: &[String]) -> Result<(), CacheError>;
}

/// Runs a backend call with an upper bound, turning the elapsed case into
/// [`CacheError::Timeout`].
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, CacheError>
where
    F: Future<Output = Result<T, CacheError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CacheError::Timeout(limit)),
    }
}

/// Whole seconds for stores that only accept second precision, rounded up and
/// never zero.
pub(crate) fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl
        .as_secs()
        .saturating_add(u64::from(ttl.subsec_nanos() > 0));
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_seconds_rounds_up() {
        assert_eq!(ttl_seconds(Duration::from_secs(5)), 5);
        assert_eq!(ttl_seconds(Duration::from_millis(5001)), 6);
        assert_eq!(ttl_seconds(Duration::from_millis(10)), 1);
        assert_eq!(ttl_seconds(Duration::ZERO), 1);
    }

    #[tokio::test]
    async fn test_bounded_times_out_slow_calls() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, CacheError>(())
        };
        let result = bounded(Duration::from_millis(20), slow).await;
        assert!(matches!(result, Err(CacheError::Timeout(_))));

        let fast = bounded(Duration::from_secs(1), async { Ok::<_, CacheError>(7) }).await;
        assert_eq!(fast.unwrap(), 7);
    }

    #[test]
    fn test_backend_kind_names() {
        assert_eq!(BackendKind::HttpKv.to_string(), "http_kv");
        assert_eq!(
            serde_json::to_string(&BackendKind::Memory).unwrap(),
            "\"memory\""
        );
    }
}
