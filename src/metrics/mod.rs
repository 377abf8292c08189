pub mod aggregator;
pub mod flusher;
pub mod key;
pub mod sink;
pub mod stats;

pub use aggregator::{LatencyAggregator, PendingBucket};
pub use flusher::{flush_once, FlushRecord, FlushReport, Flusher};
pub use key::{BucketKey, MetricName, Statistic};
pub use sink::{Measurement, MemorySink, MetricsSink, Tags, TracingSink};
pub use stats::LatencyStats;

/// Metric name of the per-request (non-aggregated) measurement.
pub const REQUEST_LATENCY_METRIC: &str = "RequestLatency";
