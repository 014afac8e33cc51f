use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

/// Hit and miss counters, global and per label.
///
/// Counters are informational only; nothing reads them to make decisions.
#[derive(Debug, Default)]
pub struct CacheStatsTracker {
    hits: AtomicU64,
    misses: AtomicU64,
    per_trigger_hits: DashMap<String, AtomicU64>,
    per_trigger_misses: DashMap<String, AtomicU64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

impl CacheStatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, label: &str) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        Self::bump(&self.per_trigger_hits, label);
    }

    pub fn record_miss(&self, label: &str) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        Self::bump(&self.per_trigger_misses, label);
    }

    fn bump(counters: &DashMap<String, AtomicU64>, label: &str) {
        if let Some(counter) = counters.get(label) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        counters
            .entry(label.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Hits over lookups; 0.0 before the first lookup.
    pub fn global_hit_rate(&self) -> f64 {
        let hits = self.hit_count();
        let total = hits + self.miss_count();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn hits_for(&self, label: &str) -> u64 {
        Self::read(&self.per_trigger_hits, label)
    }

    pub fn misses_for(&self, label: &str) -> u64 {
        Self::read(&self.per_trigger_misses, label)
    }

    fn read(counters: &DashMap<String, AtomicU64>, label: &str) -> u64 {
        counters
            .get(label)
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn per_trigger_hits(&self) -> HashMap<String, u64> {
        Self::collect(&self.per_trigger_hits)
    }

    pub fn per_trigger_misses(&self) -> HashMap<String, u64> {
        Self::collect(&self.per_trigger_misses)
    }

    fn collect(counters: &DashMap<String, AtomicU64>) -> HashMap<String, u64> {
        counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hit_count(),
            misses: self.miss_count(),
            hit_rate: self.global_hit_rate(),
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.per_trigger_hits.clear();
        self.per_trigger_misses.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_counts_and_rate() {
        let stats = CacheStatsTracker::new();
        assert_eq!(stats.global_hit_rate(), 0.0);

        stats.record_miss("a");
        stats.record_hit("a");
        stats.record_hit("a");
        stats.record_hit("b");

        assert_eq!(stats.hit_count(), 3);
        assert_eq!(stats.miss_count(), 1);
        assert_eq!(stats.global_hit_rate(), 0.75);
        assert_eq!(stats.hits_for("a"), 2);
        assert_eq!(stats.misses_for("b"), 0);
        assert_eq!(stats.per_trigger_hits().get("b"), Some(&1));
        assert_eq!(stats.per_trigger_misses().len(), 1);
    }

    #[test]
    fn test_reset() {
        let stats = CacheStatsTracker::new();
        stats.record_hit("x");
        stats.reset();
        assert_eq!(
            stats.snapshot(),
            CacheStats {
                hits: 0,
                misses: 0,
                hit_rate: 0.0
            }
        );
        assert!(stats.per_trigger_hits().is_empty());
    }

    #[test]
    fn test_concurrent_recording() {
        let stats = Arc::new(CacheStatsTracker::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stats = stats.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        stats.record_hit("shared");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.hit_count(), 1000);
        assert_eq!(stats.hits_for("shared"), 1000);
    }
}
