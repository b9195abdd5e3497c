//! A single process-wide, reader-writer-locked `(key -> (value, expiry))`
//! map (spec §4.7).
//!
//! The only datum the core ever caches is the sprint-folder lookup
//! (§3, "Cache entry"), keyed `sprint:<pattern-list>` with a 1-hour TTL.
//! There is no background sweeper; expiry is checked lazily on `get`.
//! Because the process is single-use, the cache's entire lifecycle is one
//! command invocation — treat it as a per-invocation optimization, not
//! shared infrastructure.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A TTL-bounded cache. Cloning the handle is cheap and shares the
/// underlying map — intended use is one [`Cache`] per process, held by
/// `CommandContext` for the duration of a single command.
pub struct Cache<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
}

impl<V> Default for Cache<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V: Clone> Cache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `key` if present and not yet expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().expect("cache lock poisoned");
        entries.get(key).and_then(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    /// Inserts or overwrites `key` with `value`, expiring after `ttl`.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.insert(
            key.into(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn delete(&self, key: &str) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.remove(key);
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.clear();
    }

    /// Drops every entry whose TTL has already elapsed. Not called
    /// automatically anywhere — there is no background sweeper, per spec.
    pub fn clean_expired(&self) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the cache key for a sprint-folder lookup from its ordered list
/// of date-window regex patterns, per spec's `sprint:<pattern-list>` key
/// shape.
pub fn sprint_cache_key(patterns: &[String]) -> String {
    format!("sprint:{}", patterns.join(","))
}

/// TTL for sprint-folder lookups (spec §3, "Cache entry").
pub const SPRINT_FOLDER_TTL: Duration = Duration::from_secs(3600);

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn set_then_get_returns_value() {
        let cache: Cache<String> = Cache::new();
        cache.set("k", "v".to_string(), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[test]
    fn set_then_delete_then_get_misses() {
        let cache: Cache<String> = Cache::new();
        cache.set("k", "v".to_string(), Duration::from_secs(60));
        cache.delete("k");
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn set_twice_keeps_latest() {
        let cache: Cache<String> = Cache::new();
        cache.set("k", "v1".to_string(), Duration::from_secs(60));
        cache.set("k", "v2".to_string(), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some("v2".to_string()));
    }

    #[test]
    fn expired_entry_misses() {
        let cache: Cache<String> = Cache::new();
        cache.set("k", "v".to_string(), Duration::from_millis(10));
        sleep(Duration::from_millis(30));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn clean_expired_removes_only_stale_entries() {
        let cache: Cache<String> = Cache::new();
        cache.set("stale", "v".to_string(), Duration::from_millis(5));
        cache.set("fresh", "v".to_string(), Duration::from_secs(60));
        sleep(Duration::from_millis(30));
        cache.clean_expired();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("fresh"), Some("v".to_string()));
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache: Cache<String> = Cache::new();
        cache.set("a", "1".to_string(), Duration::from_secs(60));
        cache.set("b", "2".to_string(), Duration::from_secs(60));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn sprint_cache_key_joins_patterns() {
        let key = sprint_cache_key(&["Sprint.*".to_string(), "2024-Q[0-9]".to_string()]);
        assert_eq!(key, "sprint:Sprint.*,2024-Q[0-9]");
    }
}
