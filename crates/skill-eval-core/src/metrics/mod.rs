//! Execution metrics: records, aggregation and the collector.

pub mod aggregate;
pub mod collector;
pub mod record;

pub use aggregate::{percentile, AggregatedMetrics, LatencyStats};
pub use collector::{MetricsCollector, MetricsSummary, OverallRates};
pub use record::ExecutionRecord;
