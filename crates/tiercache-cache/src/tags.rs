//! Tag index: tag → member keys, kept in whichever backend is active.
//!
//! Used only for bulk invalidation. Reading the member set and deleting its
//! members are separate calls, so a write landing in between can survive an
//! invalidation.

use std::time::Duration;
use tracing::warn;

use crate::backend::{CacheBackend, bounded};
use crate::error::CacheError;

/// Outcome of invalidating one tag on one backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Invalidation {
    /// Keys found in the tag's member set.
    pub members: usize,
    /// Member deletes that failed.
    pub failed: usize,
}

/// Tag bookkeeping over a single backend, each call bounded by `limit`.
pub struct TagIndex<'a> {
    backend: &'a dyn CacheBackend,
    limit: Duration,
}

impl<'a> TagIndex<'a> {
    pub fn new(backend: &'a dyn CacheBackend, limit: Duration) -> Self {
        Self { backend, limit }
    }

    /// Adds `key` to each tag's member set. Failures are logged and counted,
    /// never returned: the entry itself is already written.
    pub async fn attach(&self, tags: &[String], key: &str, ttl: Duration) -> usize {
        let mut failed = 0;
        for tag in tags {
            let result = bounded(self.limit, self.backend.add_to_tag_set(tag, key, ttl)).await;
            if let Err(e) = result {
                failed += 1;
                warn!(
                    cache.backend = %self.backend.kind(),
                    cache.tag = %tag,
                    cache.key = %key,
                    error = %e,
                    "Tag bookkeeping failed"
                );
            }
        }
        failed
    }

    /// Deletes every member of `tag`, then the member set itself.
    ///
    /// # Errors
    ///
    /// Returns the error from reading the member set. Failures deleting
    /// individual members or the set are logged and the rest proceed.
    pub async fn invalidate(&self, tag: &str) -> Result<Invalidation, CacheError> {
        let members = bounded(self.limit, self.backend.tag_set_members(tag)).await?;
        let mut report = Invalidation {
            members: members.len(),
            failed: 0,
        };

        for key in &members {
            if let Err(e) = bounded(self.limit, self.backend.delete(key)).await {
                report.failed += 1;
                warn!(
                    cache.backend = %self.backend.kind(),
                    cache.tag = %tag,
                    cache.key = %key,
                    error = %e,
                    "Failed to delete tagged key"
                );
            }
        }

        if let Err(e) = bounded(self.limit, self.backend.delete_tag_set(tag)).await {
            warn!(
                cache.backend = %self.backend.kind(),
                cache.tag = %tag,
                error = %e,
                "Failed to delete tag set"
            );
        }

        Ok(report)
    }
}
