use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    body: Vec<u8>,
    expires_at: Instant,
}

/// Whole-page output cache with a fixed lifetime per entry.
///
/// Entries are never invalidated by writes elsewhere; they expire or are
/// dropped by `clear`.
#[derive(Default)]
pub struct PageCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock().ok()?;
        let expired = match entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => return Some(entry.body.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        None
    }

    pub fn put(&self, key: &str, body: Vec<u8>, ttl: Duration) {
        if let Ok(mut entries) = self.entries.lock() {
            let expires_at = Instant::now() + ttl;
            entries.insert(key.to_string(), Entry { body, expires_at });
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            tracing::debug!(dropped = entries.len(), "page cache cleared");
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Key under which a page of the global feed is cached. The navigation bar
/// differs per visitor, so the viewer is part of the key.
pub fn index_key(page: Option<&str>, viewer: Option<u64>) -> String {
    match viewer {
        Some(id) => format!("index_page:{}:user{}", page.unwrap_or(""), id),
        None => format!("index_page:{}:anon", page.unwrap_or("")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_within_ttl() {
        let cache = PageCache::new();
        cache.put("index_page::anon", b"<html>".to_vec(), Duration::from_secs(20));
        assert_eq!(cache.get("index_page::anon"), Some(b"<html>".to_vec()));
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let cache = PageCache::new();
        cache.put("k", b"v".to_vec(), Duration::ZERO);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let cache = PageCache::new();
        cache.put(&index_key(None, None), b"a".to_vec(), Duration::from_secs(20));
        cache.put(&index_key(Some("2"), None), b"b".to_vec(), Duration::from_secs(20));
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert_eq!(cache.get(&index_key(None, None)), None);
    }

    #[test]
    fn pages_and_viewers_are_cached_separately() {
        assert_ne!(index_key(None, None), index_key(Some("2"), None));
        assert_ne!(index_key(None, None), index_key(None, Some(1)));
    }
}
