use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use super::key::BucketKey;
use super::stats::LatencyStats;

// ─── Public types ────────────────────────────────────────────────

/// Shared per-route latency store.
///
/// Request tasks call `record()`, the flusher calls `take()` once per key
/// per cycle. A bucket lives in its shard under the shard lock, so an
/// append either lands before a `take()` (and is part of that cycle) or
/// after it (and lazily starts the next bucket).
pub struct LatencyAggregator {
    instance: String,
    buckets: DashMap<BucketKey, Vec<u64>>,
}

/// Non-draining view of one pending bucket, for the JSON endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PendingBucket {
    pub instance: String,
    pub path: String,
    pub stats: LatencyStats,
}

// ─── LatencyAggregator impl ──────────────────────────────────────

impl LatencyAggregator {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            buckets: DashMap::new(),
        }
    }

    /// Instance identifier stamped on every key this aggregator creates.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Append one sample for `path`, creating the bucket on first use.
    pub fn record(&self, path: &str, millis: u64) {
        let key = BucketKey::new(self.instance.as_str(), path);
        self.buckets.entry(key).or_default().push(millis);
    }

    /// Same as `record`, truncating the duration to whole milliseconds.
    pub fn record_elapsed(&self, path: &str, elapsed: Duration) {
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.record(path, millis);
    }

    /// Keys present right now. New keys may appear while the caller
    /// iterates; they are picked up by the next cycle.
    pub fn keys(&self) -> Vec<BucketKey> {
        self.buckets.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Atomically remove and hand over a bucket. `None` if another pass
    /// already took it.
    pub fn take(&self, key: &BucketKey) -> Option<Vec<u64>> {
        self.buckets.remove(key).map(|(_, samples)| samples)
    }

    /// Number of samples waiting in a bucket (0 when absent).
    pub fn pending(&self, key: &BucketKey) -> usize {
        self.buckets.get(key).map(|b| b.len()).unwrap_or(0)
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Current statistics for every non-empty bucket without removing
    /// anything. Sorted by key for stable output.
    pub fn snapshot(&self) -> Vec<PendingBucket> {
        let mut out: Vec<PendingBucket> = self
            .buckets
            .iter()
            .filter_map(|entry| {
                let stats = LatencyStats::from_samples(entry.value())?;
                Some(PendingBucket {
                    instance: entry.key().instance.clone(),
                    path: entry.key().path.clone(),
                    stats,
                })
            })
            .collect();
        out.sort_by(|a, b| (&a.instance, &a.path).cmp(&(&b.instance, &b.path)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn buckets_are_created_lazily() {
        let agg = LatencyAggregator::new("pod-a");
        assert!(agg.is_empty());

        agg.record("/a", 5);
        agg.record("/a", 7);
        agg.record("/b", 1);

        assert_eq!(agg.bucket_count(), 2);
        assert_eq!(agg.pending(&BucketKey::new("pod-a", "/a")), 2);
        assert_eq!(agg.pending(&BucketKey::new("pod-a", "/b")), 1);
    }

    #[test]
    fn paths_are_case_sensitive() {
        let agg = LatencyAggregator::new("pod-a");
        agg.record("/Users", 1);
        agg.record("/users", 1);
        assert_eq!(agg.bucket_count(), 2);
    }

    #[test]
    fn take_removes_exactly_once() {
        let agg = LatencyAggregator::new("pod-a");
        let key = BucketKey::new("pod-a", "/a");
        agg.record("/a", 3);

        assert_eq!(agg.take(&key), Some(vec![3]));
        assert_eq!(agg.take(&key), None);
        assert_eq!(agg.pending(&key), 0);

        agg.record("/a", 4);
        assert_eq!(agg.take(&key), Some(vec![4]));
    }

    #[test]
    fn record_elapsed_truncates_to_millis() {
        let agg = LatencyAggregator::new("pod-a");
        agg.record_elapsed("/a", Duration::from_micros(2_999));
        assert_eq!(agg.take(&BucketKey::new("pod-a", "/a")), Some(vec![2]));
    }

    #[test]
    fn snapshot_does_not_drain() {
        let agg = LatencyAggregator::new("pod-a");
        agg.record("/b", 10);
        agg.record("/a", 10);
        agg.record("/a", 30);

        let snap = agg.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].path, "/a");
        assert_eq!(snap[0].stats.average, 20.0);
        assert_eq!(agg.bucket_count(), 2);
    }

    #[test]
    fn concurrent_appends_are_not_lost() {
        let agg = Arc::new(LatencyAggregator::new("pod-a"));
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let agg = agg.clone();
                std::thread::spawn(move || {
                    for i in 0..1_000 {
                        agg.record("/hot", t * 1_000 + i);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(agg.pending(&BucketKey::new("pod-a", "/hot")), 8_000);
    }
}
