//! Caching layer for the pipeline
//!
//! Caches embedding vectors keyed by a hash of the embedded text, so
//! unchanged chunks are not re-embedded across re-initializations and
//! repeated questions skip the embedding round-trip. Embeddings are
//! deterministic for a fixed model, so caching is semantically
//! transparent.
//!
//! Uses the moka crate for thread-safe, async-compatible LRU caching
//! with TTL support.

use moka::future::Cache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Cache Configuration
// ============================================================================

/// Configuration for cache behavior
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached embeddings
    pub max_capacity: u64,

    /// Time-to-live for cache entries (in seconds)
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            // 10k embeddings @ ~1.5KB each = ~15MB
            max_capacity: 10_000,
            // Embeddings are stable, cache for 1 hour
            ttl_seconds: 3600,
        }
    }
}

// ============================================================================
// Embedding Cache
// ============================================================================

/// Cache for embedding vectors
///
/// Thread-safe and suitable for async contexts.
#[derive(Clone)]
pub struct EmbeddingCache {
    cache: Cache<u64, Vec<f32>>,
    stats: Arc<CacheStats>,
}

impl EmbeddingCache {
    /// Create a new embedding cache with default configuration
    pub fn new() -> Self {
        Self::with_config(&CacheConfig::default())
    }

    /// Create a new embedding cache with custom configuration
    pub fn with_config(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(Duration::from_secs(config.ttl_seconds))
            .build();

        Self {
            cache,
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Get an embedding from cache
    pub async fn get(&self, text: &str) -> Option<Vec<f32>> {
        let key = hash_text(text);
        let result = self.cache.get(&key).await;

        if result.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }

        result
    }

    /// Store an embedding in cache
    pub async fn put(&self, text: &str, embedding: Vec<f32>) {
        let key = hash_text(text);
        self.cache.insert(key, embedding).await;
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Clear all cached embeddings
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        // Wait for all pending invalidations to complete
        self.cache.run_pending_tasks().await;
    }

    /// Snapshot of cache statistics
    pub fn stats(&self) -> CacheStatsReport {
        self.stats.report()
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl CacheStats {
    fn report(&self) -> CacheStatsReport {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStatsReport {
            hits,
            misses,
            writes: self.writes.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStatsReport {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub hit_rate: f64,
}

fn hash_text(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = EmbeddingCache::new();

        assert!(cache.get("some chunk text").await.is_none());

        cache.put("some chunk text", vec![0.1, 0.2, 0.3]).await;
        assert_eq!(
            cache.get("some chunk text").await,
            Some(vec![0.1, 0.2, 0.3])
        );

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[tokio::test]
    async fn test_distinct_texts_do_not_collide() {
        let cache = EmbeddingCache::new();

        cache.put("alpha", vec![1.0]).await;
        cache.put("beta", vec![2.0]).await;

        assert_eq!(cache.get("alpha").await, Some(vec![1.0]));
        assert_eq!(cache.get("beta").await, Some(vec![2.0]));
    }

    #[tokio::test]
    async fn test_clear_empties_the_cache() {
        let cache = EmbeddingCache::new();

        cache.put("alpha", vec![1.0]).await;
        cache.clear().await;

        assert!(cache.get("alpha").await.is_none());
    }
}
