//! Search Cache
//!
//! Short-lived cache for web search responses, keyed by a SHA256 of the
//! normalized query. Repeated searches inside one session (common when an
//! autonomous loop revisits a topic) skip the network round trip.

use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_MAX_ENTRIES: u64 = 1_000;

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Clone)]
pub struct SearchCache {
    cache: Cache<String, String>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    enabled: bool,
}

impl SearchCache {
    /// Create new cache with TTL
    pub fn new(ttl_secs: u64, enabled: bool) -> Self {
        let cache = Cache::builder()
            .max_capacity(DEFAULT_MAX_ENTRIES)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            cache,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            enabled,
        }
    }

    /// Key = SHA256(lowercased, trimmed, whitespace-collapsed query)
    pub fn compute_key(query: &str) -> String {
        let normalized = query
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        hex::encode(Sha256::digest(normalized.as_bytes()))
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }

        if let Some(body) = self.cache.get(key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Search cache HIT: {}", &key[..16]);
            Some(body)
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("Search cache MISS: {}", &key[..16]);
            None
        }
    }

    pub async fn set(&self, key: &str, body: String) {
        if !self.enabled {
            return;
        }
        self.cache.insert(key.to_string(), body).await;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_hit_miss() {
        let cache = SearchCache::new(60, true);
        let key = SearchCache::compute_key("rust async");

        assert!(cache.get(&key).await.is_none());
        cache.set(&key, "{\"organic\":[]}".to_string()).await;
        assert_eq!(cache.get(&key).await.as_deref(), Some("{\"organic\":[]}"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_never_hits() {
        let cache = SearchCache::new(60, false);
        let key = SearchCache::compute_key("q");
        cache.set(&key, "body".to_string()).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[test]
    fn test_key_normalization() {
        assert_eq!(
            SearchCache::compute_key("Rust  Async "),
            SearchCache::compute_key("rust async")
        );
        assert_ne!(
            SearchCache::compute_key("rust async"),
            SearchCache::compute_key("rust sync")
        );
    }
}
