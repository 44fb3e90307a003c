//! Time-bounded cache of `/process_images` responses.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

struct CachedResponse {
    stored_at: Instant,
    body: Value,
}

/// Response bodies keyed by the raw query string.
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedResponse>>,
}

impl ResponseCache {
    /// A zero `ttl` disables caching.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// The stored body for `key`, unless it has expired.
    pub fn get(&self, key: &str) -> Option<Value> {
        if !self.is_enabled() {
            return None;
        }
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.body.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `body` and drops every expired entry.
    pub fn insert(&self, key: String, body: Value) {
        if !self.is_enabled() {
            return;
        }
        let mut entries = self.lock();
        entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        entries.insert(
            key,
            CachedResponse {
                stored_at: Instant::now(),
                body,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedResponse>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hit_within_ttl() {
        let cache = ResponseCache::new(Duration::from_secs(500));
        assert!(cache.get("folderPath=/scans").is_none());

        cache.insert("folderPath=/scans".to_string(), json!({"scans": []}));
        assert_eq!(cache.get("folderPath=/scans"), Some(json!({"scans": []})));
        assert!(cache.get("folderPath=/scans&imp=1").is_none());
    }

    #[test]
    fn test_entries_expire() {
        let cache = ResponseCache::new(Duration::from_millis(20));
        cache.insert("a".to_string(), json!(1));
        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("a").is_none());
        assert_eq!(cache.len(), 0);

        cache.insert("b".to_string(), json!(2));
        std::thread::sleep(Duration::from_millis(40));
        cache.insert("c".to_string(), json!(3));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_ttl_disables() {
        let cache = ResponseCache::new(Duration::ZERO);
        cache.insert("a".to_string(), json!(1));
        assert!(cache.get("a").is_none());
        assert_eq!(cache.len(), 0);
    }
}
