//! Port definition for the byte cache tiers.

use bytes::Bytes;

use crate::domain::entities::CacheKey;
use crate::domain::errors::LoadError;

/// Result type for cache storage operations.
pub type CacheResult<T> = std::result::Result<T, LoadError>;

/// Port for a key to encoded-bytes cache tier.
/// Implementations must be safe under concurrent calls.
#[async_trait::async_trait]
pub trait ImageCachePort: Send + Sync {
    /// Returns the stored bytes, or `None` on a miss or expired entry.
    async fn get(&self, key: &CacheKey) -> Option<Bytes>;

    /// Stores bytes under the key. Failures are swallowed by the tier.
    async fn put(&self, key: CacheKey, bytes: Bytes);

    /// Removes an entry from the cache.
    async fn evict(&self, key: &CacheKey);

    /// Returns the current number of cached entries.
    fn len(&self) -> usize;

    /// Returns true if the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all entries from the cache.
    async fn clear(&self);
}

/// Statistics about cache performance.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached entries.
    pub size: usize,
}

impl CacheStats {
    /// Builds stats from raw counters.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(hits: u64, misses: u64, size: usize) -> Self {
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            hits,
            misses,
            hit_rate,
            size,
        }
    }

    /// Total number of lookups.
    #[must_use]
    pub const fn lookups(&self) -> u64 {
        self.hits + self.misses
    }
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} entries, {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.hit_rate, self.hits, self.misses
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_hit_rate() {
        let stats = CacheStats::new(3, 1, 2);
        assert!((stats.hit_rate - 75.0).abs() < f64::EPSILON);
        assert_eq!(stats.lookups(), 4);
    }

    #[test]
    fn test_stats_empty() {
        let stats = CacheStats::new(0, 0, 0);
        assert!(stats.hit_rate.abs() < f64::EPSILON);
    }
}
