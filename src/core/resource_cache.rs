//! URL-keyed LRU cache of video resources.
//!
//! Two jobs:
//! - Bound the number of live player/item pairs (capacity + memory-pressure reclaim)
//! - Guarantee at most one in-flight probe per URL
//!
//! Evicted resources are returned to the caller instead of being torn down:
//! whoever still holds an `Arc` keeps a working player, only new lookups miss.

use log::debug;
use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use super::resource::VideoResource;

/// Counters for monitoring cache behavior
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub probes_started: u64,
    pub evictions: u64,
    pub len: usize,
    pub in_flight: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

#[derive(Debug)]
pub struct ResourceCache {
    entries: LruCache<String, Arc<VideoResource>>,
    in_flight: HashSet<String>,
    stats: CacheStats,
}

impl ResourceCache {
    /// Cache holding up to `capacity` resources (min 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        debug!("ResourceCache created: capacity={}", capacity);
        Self {
            entries: LruCache::new(capacity),
            in_flight: HashSet::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains(url)
    }

    pub fn is_in_flight(&self, url: &str) -> bool {
        self.in_flight.contains(url)
    }

    /// Mark a probe for `url` as started.
    ///
    /// Returns false when the URL is already cached or already being probed;
    /// the caller must not start another probe in that case.
    pub fn begin_probe(&mut self, url: &str) -> bool {
        if self.entries.contains(url) || self.in_flight.contains(url) {
            return false;
        }
        self.in_flight.insert(url.to_string());
        self.stats.probes_started += 1;
        true
    }

    /// Clear the in-flight mark, whatever the probe outcome
    pub fn finish_probe(&mut self, url: &str) {
        self.in_flight.remove(url);
    }

    /// Resource for `url`, promoted to most recently used
    pub fn get(&mut self, url: &str) -> Option<Arc<VideoResource>> {
        match self.entries.get(url) {
            Some(res) => {
                self.stats.hits += 1;
                Some(Arc::clone(res))
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Resource for `url` without touching LRU order or stats
    pub fn peek(&self, url: &str) -> Option<Arc<VideoResource>> {
        self.entries.peek(url).cloned()
    }

    /// Insert a resource. Returns whatever had to leave the cache to make room
    /// (or the previous resource under the same URL).
    pub fn insert(&mut self, resource: Arc<VideoResource>) -> Option<Arc<VideoResource>> {
        let url = resource.url().to_string();
        let evicted = self.entries.push(url.clone(), resource).map(|(_, old)| old);
        if let Some(old) = &evicted {
            self.stats.evictions += 1;
            debug!("Evicted {} to cache {}", old.url(), url);
        } else {
            debug!("Cached {} ({}/{})", url, self.len(), self.capacity());
        }
        evicted
    }

    /// Drop one resource (explicit invalidation)
    pub fn remove(&mut self, url: &str) -> Option<Arc<VideoResource>> {
        let removed = self.entries.pop(url);
        if removed.is_some() {
            self.stats.evictions += 1;
        }
        removed
    }

    /// Evict least recently used resources until at most `retain` remain.
    pub fn reclaim(&mut self, retain: usize) -> Vec<Arc<VideoResource>> {
        let mut evicted = Vec::new();
        while self.entries.len() > retain {
            match self.entries.pop_lru() {
                Some((_, res)) => evicted.push(res),
                None => break,
            }
        }
        if !evicted.is_empty() {
            self.stats.evictions += evicted.len() as u64;
            debug!("Reclaimed {} resources, {} left", evicted.len(), self.len());
        }
        evicted
    }

    /// URLs from most to least recently used
    pub fn urls(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            len: self.entries.len(),
            in_flight: self.in_flight.len(),
            ..self.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBackend;

    fn res(backend: &SimBackend, url: &str) -> Arc<VideoResource> {
        let (player, item) = backend.handles_for(url);
        Arc::new(VideoResource::new(url, player, item))
    }

    #[test]
    fn test_single_in_flight() {
        let mut cache = ResourceCache::new(4);
        let url = "https://cdn.example.com/a.mp4";
        assert!(cache.begin_probe(url));
        assert!(!cache.begin_probe(url));
        assert!(cache.is_in_flight(url));

        cache.finish_probe(url);
        assert!(!cache.is_in_flight(url));
        // Failed probe left nothing behind, retry allowed
        assert!(cache.begin_probe(url));
        assert_eq!(cache.stats().probes_started, 2);
    }

    #[test]
    fn test_cached_url_not_probed() {
        let backend = SimBackend::new();
        let mut cache = ResourceCache::new(4);
        let url = "https://cdn.example.com/b.mp4";
        cache.insert(res(&backend, url));
        assert!(!cache.begin_probe(url));
        assert!(cache.get(url).is_some());
        assert!(cache.get("https://cdn.example.com/none.mp4").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_lru_eviction() {
        let backend = SimBackend::new();
        let mut cache = ResourceCache::new(2);
        cache.insert(res(&backend, "u1"));
        cache.insert(res(&backend, "u2"));
        // Touch u1 so u2 becomes the oldest
        cache.get("u1");
        let evicted = cache.insert(res(&backend, "u3")).unwrap();
        assert_eq!(evicted.url(), "u2");
        assert!(cache.peek("u2").is_none());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.urls(), vec!["u3".to_string(), "u1".to_string()]);
    }

    #[test]
    fn test_evicted_resource_outlives_cache() {
        let backend = SimBackend::new();
        let mut cache = ResourceCache::new(1);
        let first = res(&backend, "u1");
        cache.insert(Arc::clone(&first));
        first.play(&Default::default());

        let evicted = cache.insert(res(&backend, "u2")).unwrap();
        drop(evicted);
        assert!(cache.peek("u1").is_none());
        // Still held here, still playing
        assert!(first.is_playing());
    }

    #[test]
    fn test_evicted_resource_freed_by_last_holder() {
        let backend = SimBackend::new();
        let mut cache = ResourceCache::new(1);
        cache.insert(res(&backend, "u1"));
        let item = Arc::downgrade(&backend.item("u1").unwrap());

        let evicted = cache.insert(res(&backend, "u2")).unwrap();
        assert!(item.upgrade().is_some());
        drop(evicted);
        assert!(item.upgrade().is_none());
        assert!(backend.item("u1").is_none());
    }

    #[test]
    fn test_reclaim_and_remove() {
        let backend = SimBackend::new();
        let mut cache = ResourceCache::new(8);
        for u in ["u1", "u2", "u3", "u4"] {
            cache.insert(res(&backend, u));
        }
        let evicted = cache.reclaim(1);
        assert_eq!(evicted.len(), 3);
        assert_eq!(evicted[0].url(), "u1");
        assert_eq!(cache.urls(), vec!["u4".to_string()]);

        assert!(cache.remove("u4").is_some());
        assert!(cache.remove("u4").is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 4);
    }
}
