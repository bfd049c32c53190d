use std::time::{Duration, Instant};

use moka::{sync::Cache, Expiry};
use regex::Regex;

/// Cached GET body plus the TTL it was stored with.
#[derive(Clone, Debug)]
struct CachedResponse {
    value: serde_json::Value,
    ttl: Duration,
}

/// Expires every entry after its own TTL, counted from the last write.
struct PerEntryTtl;

impl Expiry<String, CachedResponse> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedResponse,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedResponse,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Bounded GET response cache keyed by request key.
///
/// Backed by moka's LRU + per-entry TTL cache, so it is safe to share
/// without an outer lock.
pub(crate) struct ResponseCache {
    entries: Cache<String, CachedResponse>,
}

impl ResponseCache {
    pub(crate) fn new(max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { entries }
    }

    pub(crate) fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.get(key).map(|cached| cached.value)
    }

    /// Stores `value` for `ttl`. A zero TTL stores nothing.
    pub(crate) fn insert(&self, key: String, value: serde_json::Value, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.entries.insert(key, CachedResponse { value, ttl });
    }

    /// Removes every entry, returning how many live entries were dropped.
    pub(crate) fn clear(&self) -> usize {
        self.invalidate_where(|_| true)
    }

    /// Removes entries whose key matches `pattern`.
    pub(crate) fn clear_matching(&self, pattern: &Regex) -> usize {
        self.invalidate_where(|key| pattern.is_match(key))
    }

    fn invalidate_where(&self, matches: impl Fn(&str) -> bool) -> usize {
        let keys: Vec<_> = self
            .entries
            .iter()
            .map(|(key, _)| key)
            .filter(|key| matches(key.as_str()))
            .collect();
        for key in &keys {
            self.entries.invalidate(key.as_str());
        }
        keys.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        usize::try_from(self.entries.entry_count()).unwrap_or(usize::MAX)
    }
}
