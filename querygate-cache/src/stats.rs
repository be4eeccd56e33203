//! Cache usage statistics.

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests served from fresh resolved data.
    pub hits: u64,
    /// Fetches started.
    pub misses: u64,
    /// Requests that joined a fetch already in flight.
    pub joins: u64,
    /// Completions discarded because their generation no longer owned the entry.
    pub stale_completions: u64,
    /// Producer failures recorded into an entry.
    pub failures: u64,
    /// Entries removed by the skip policy or explicit removal.
    pub drops: u64,
    /// Number of entries currently in the store.
    pub entry_count: u64,
    /// Number of keys with an open observer channel.
    pub observed_keys: u64,
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
    fn test_joins_do_not_count_toward_hit_rate() {
        let stats = CacheStats {
            hits: 1,
            misses: 1,
            joins: 50,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.5).abs() < 0.001);
    }
}
