//! Cacheable value marker and cache statistics.

use serde_json::Value;

/// Marker trait for types that can be stored in a freshness cache.
///
/// The cache never records the absence of data as a cached fact, so values
/// that represent "nothing" report it through [`CacheableValue::is_absent`]
/// and are rejected on write.
pub trait CacheableValue: Clone + Send + Sync + 'static {
    fn is_absent(&self) -> bool {
        false
    }
}

impl CacheableValue for Value {
    fn is_absent(&self) -> bool {
        self.is_null()
    }
}

impl<T: Clone + Send + Sync + 'static> CacheableValue for Option<T> {
    fn is_absent(&self) -> bool {
        self.is_none()
    }
}

impl<T: Clone + Send + Sync + 'static> CacheableValue for Vec<T> {}

impl CacheableValue for String {}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Fresh lookups served from the cache.
    pub hits: u64,
    /// Lookups that found nothing fresh.
    pub misses: u64,
    /// Entries removed because they were found stale.
    pub evictions: u64,
    /// Expired entries served after a failed refresh.
    pub stale_fallbacks: u64,
    /// Requests that joined an in-flight fetch instead of issuing their own.
    pub coalesced: u64,
    /// Entries currently held.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_absent_values() {
        assert!(Value::Null.is_absent());
        assert!(!json!({"n": 1}).is_absent());
        assert!(!json!([]).is_absent());
        assert!(None::<u32>.is_absent());
        assert!(!Some(0u32).is_absent());
        assert!(!String::new().is_absent());
    }
}
