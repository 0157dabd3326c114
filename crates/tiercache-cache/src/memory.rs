//! Bounded in-process cache store.
//!
//! Always available and used as the last resort when no shared backend is
//! configured or the configured one fails. State lives in this process only,
//! so separate instances do not see each other's entries.
//!
//! Eviction is first-in-first-out by insertion: once the bound is exceeded the
//! oldest written key goes first. Re-writing a key moves it to the back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tracing::debug;

use crate::backend::{BackendKind, CacheBackend};
use crate::entry::{CacheEntry, expiry_from_now};
use crate::error::CacheError;

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    seq: u64,
}

#[derive(Debug)]
struct TagRecord {
    keys: HashSet<String>,
    expires_at: DateTime<Utc>,
}

impl TagRecord {
    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, Slot>,
    /// Insertion order. Slots whose sequence no longer matches the live entry
    /// are stale and skipped.
    order: VecDeque<(String, u64)>,
    tags: HashMap<String, TagRecord>,
    next_seq: u64,
}

impl MemoryState {
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let slot = self.entries.remove(key)?;
        self.detach(key, &slot.entry.tags);
        Some(slot.entry)
    }

    /// Drops `key` from the given tag records, removing records left empty.
    fn detach(&mut self, key: &str, tags: &[String]) {
        for tag in tags {
            if let Some(record) = self.tags.get_mut(tag) {
                record.keys.remove(key);
                if record.keys.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
    }

    fn is_live_slot(&self, key: &str, seq: u64) -> bool {
        self.entries.get(key).is_some_and(|slot| slot.seq == seq)
    }

    fn compact_order(&mut self, max_entries: usize) {
        if self.order.len() <= max_entries.saturating_mul(2) + 16 {
            return;
        }
        let entries = &self.entries;
        self.order
            .retain(|(key, seq)| entries.get(key).is_some_and(|slot| slot.seq == *seq));
    }
}

/// In-process cache store with a hard entry bound.
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    max_entries: usize,
}

impl MemoryBackend {
    /// Creates a store holding at most `max_entries` entries (minimum one).
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    /// Number of entries held, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a live entry, deleting it if it has expired.
    pub fn lookup(&self, key: &str) -> Option<CacheEntry> {
        let mut state = self.state.lock();
        let expired = match state.entries.get(key) {
            None => return None,
            Some(slot) => slot.entry.is_expired(),
        };
        if expired {
            state.remove_entry(key);
            debug!(cache.key = %key, "Expired in-process entry removed");
            return None;
        }
        state.entries.get(key).map(|slot| slot.entry.clone())
    }

    /// Inserts or replaces an entry, evicting the oldest entries past the bound.
    ///
    /// Replacing a key detaches it from tags the new entry no longer carries.
    pub fn insert(&self, key: &str, entry: CacheEntry) {
        let mut evicted = 0u64;
        {
            let mut state = self.state.lock();

            if let Some(previous) = state.entries.remove(key) {
                let dropped: Vec<String> = previous
                    .entry
                    .tags
                    .into_iter()
                    .filter(|tag| !entry.tags.contains(tag))
                    .collect();
                state.detach(key, &dropped);
            }

            let seq = state.next_seq;
            state.next_seq += 1;
            state.order.push_back((key.to_string(), seq));
            state.entries.insert(key.to_string(), Slot { entry, seq });

            while state.entries.len() > self.max_entries {
                let Some((oldest, seq)) = state.order.pop_front() else {
                    break;
                };
                if state.is_live_slot(&oldest, seq) {
                    state.remove_entry(&oldest);
                    evicted += 1;
                }
            }

            state.compact_order(self.max_entries);
        }

        if evicted > 0 {
            counter!("cache_evictions_total").increment(evicted);
            debug!(cache.evicted = evicted, "In-process cache evicted oldest entries");
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.state.lock().remove_entry(key).is_some()
    }

    /// Adds `key` to a tag record, extending the record's expiry to cover `ttl`.
    pub fn tag_key(&self, tag: &str, key: &str, ttl: Duration) {
        let expires_at = expiry_from_now(ttl);
        let mut state = self.state.lock();
        let record = state.tags.entry(tag.to_string()).or_insert_with(|| TagRecord {
            keys: HashSet::new(),
            expires_at,
        });
        record.keys.insert(key.to_string());
        if record.expires_at < expires_at {
            record.expires_at = expires_at;
        }
    }

    pub fn tag_members(&self, tag: &str) -> Vec<String> {
        let mut state = self.state.lock();
        let expired = match state.tags.get(tag) {
            None => return Vec::new(),
            Some(record) => record.is_expired(),
        };
        if expired {
            state.tags.remove(tag);
            return Vec::new();
        }
        let mut keys: Vec<String> = state
            .tags
            .get(tag)
            .map(|record| record.keys.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn remove_tag(&self, tag: &str) {
        self.state.lock().tags.remove(tag);
    }

    /// Every key associated with `tag`, from tag records and from the tags
    /// carried by the entries themselves.
    pub fn keys_tagged(&self, tag: &str) -> Vec<String> {
        let state = self.state.lock();
        let mut keys: HashSet<String> = state
            .tags
            .get(tag)
            .map(|record| record.keys.clone())
            .unwrap_or_default();
        keys.extend(
            state
                .entries
                .iter()
                .filter(|(_, slot)| slot.entry.tags.iter().any(|t| t == tag))
                .map(|(key, _)| key.clone()),
        );
        let mut keys: Vec<String> = keys.into_iter().collect();
        keys.sort();
        keys
    }

    /// Deletes every key associated with `tag` and the tag record itself.
    /// Returns the number of keys that were present.
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        let keys = self.keys_tagged(tag);
        let mut state = self.state.lock();
        let removed = keys
            .iter()
            .filter(|key| state.remove_entry(key).is_some())
            .count();
        state.tags.remove(tag);
        removed
    }

    pub fn clear_all(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
        state.tags.clear();
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.lookup(key))
    }

    async fn set(&self, key: &str, entry: &CacheEntry, _ttl: Duration) -> Result<(), CacheError> {
        self.insert(key, entry.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.remove(key);
        Ok(())
    }

    async fn add_to_tag_set(
        &self,
        tag: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.tag_key(tag, key, ttl);
        Ok(())
    }

    async fn tag_set_members(&self, tag: &str) -> Result<Vec<String>, CacheError> {
        Ok(self.tag_members(tag))
    }

    async fn delete_tag_set(&self, tag: &str) -> Result<(), CacheError> {
        self.remove_tag(tag);
        Ok(())
    }

    async fn clear(&self, _prefixes: &[String]) -> Result<(), CacheError> {
        self.clear_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn entry(value: &str, ttl: Duration, tags: &[&str]) -> CacheEntry {
        CacheEntry::new(
            value.to_string(),
            ttl,
            tags.iter().map(|t| t.to_string()).collect(),
        )
    }

    fn minute(value: &str) -> CacheEntry {
        entry(value, Duration::from_secs(60), &[])
    }

    #[test]
    fn test_insert_and_lookup() {
        let store = MemoryBackend::new(10);
        store.insert("a", minute("1"));
        assert_eq!(store.lookup("a").map(|e| e.value), Some("1".into()));
        assert!(store.lookup("b").is_none());
    }

    #[test]
    fn test_bound_evicts_oldest_first() {
        let store = MemoryBackend::new(3);
        for key in ["a", "b", "c", "d", "e"] {
            store.insert(key, minute(key));
            assert!(store.len() <= 3);
        }
        assert!(store.lookup("a").is_none());
        assert!(store.lookup("b").is_none());
        assert!(store.lookup("c").is_some());
        assert!(store.lookup("e").is_some());
    }

    #[test]
    fn test_rewrite_moves_key_to_back_of_queue() {
        let store = MemoryBackend::new(2);
        store.insert("a", minute("1"));
        store.insert("b", minute("2"));
        store.insert("a", minute("3"));
        store.insert("c", minute("4"));

        assert_eq!(store.len(), 2);
        assert!(store.lookup("b").is_none());
        assert_eq!(store.lookup("a").map(|e| e.value), Some("3".into()));
    }

    #[test]
    fn test_many_rewrites_keep_queue_compact() {
        let store = MemoryBackend::new(4);
        for i in 0..1000 {
            store.insert("hot", minute(&i.to_string()));
        }
        assert_eq!(store.len(), 1);
        assert!(store.state.lock().order.len() <= 4 * 2 + 16);
    }

    #[tokio::test]
    async fn test_expired_entry_is_removed_on_read() {
        let store = MemoryBackend::new(10);
        store.insert("short", entry("1", Duration::from_millis(30), &[]));
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(store.lookup("short").is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_tag_records_and_invalidation() {
        let store = MemoryBackend::new(10);
        let ttl = Duration::from_secs(60);
        store.insert("p", entry("1", ttl, &["user:42"]));
        store.tag_key("user:42", "p", ttl);
        store.insert("o", entry("2", ttl, &["user:42"]));
        store.tag_key("user:42", "o", ttl);
        store.insert("x", entry("3", ttl, &["user:7"]));

        assert_eq!(store.tag_members("user:42"), vec!["o", "p"]);
        assert_eq!(store.invalidate_tag("user:42"), 2);
        assert!(store.lookup("p").is_none());
        assert!(store.lookup("o").is_none());
        assert!(store.lookup("x").is_some());
        assert!(store.tag_members("user:42").is_empty());
    }

    #[test]
    fn test_rewrite_detaches_dropped_tags() {
        let store = MemoryBackend::new(10);
        let ttl = Duration::from_secs(60);
        store.insert("k", entry("1", ttl, &["old"]));
        store.tag_key("old", "k", ttl);
        store.insert("k", entry("2", ttl, &["new"]));
        store.tag_key("new", "k", ttl);

        assert!(store.tag_members("old").is_empty());
        assert_eq!(store.invalidate_tag("old"), 0);
        assert_eq!(store.lookup("k").map(|e| e.value), Some("2".into()));
    }

    #[test]
    fn test_keys_tagged_scans_entries_without_records() {
        let store = MemoryBackend::new(10);
        store.insert("k", entry("1", Duration::from_secs(60), &["orphan"]));
        assert_eq!(store.keys_tagged("orphan"), vec!["k"]);
    }

    #[test]
    fn test_eviction_detaches_tags() {
        let store = MemoryBackend::new(1);
        let ttl = Duration::from_secs(60);
        store.insert("a", entry("1", ttl, &["t"]));
        store.tag_key("t", "a", ttl);
        store.insert("b", minute("2"));

        assert!(store.tag_members("t").is_empty());
    }

    #[test]
    fn test_clear_drops_everything() {
        let store = MemoryBackend::new(10);
        store.insert("a", entry("1", Duration::from_secs(60), &["t"]));
        store.tag_key("t", "a", Duration::from_secs(60));
        store.clear_all();

        assert!(store.is_empty());
        assert!(store.keys_tagged("t").is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_respect_bound() {
        let store = Arc::new(MemoryBackend::new(50));
        let mut handles = Vec::new();
        for worker in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for i in 0..200 {
                    let key = format!("w{worker}:{i}");
                    store
                        .set(&key, &minute("v"), Duration::from_secs(60))
                        .await
                        .unwrap();
                    assert!(store.len() <= 50);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.len(), 50);
    }
}
