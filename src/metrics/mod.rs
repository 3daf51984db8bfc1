//! # Windowed Metrics
//!
//! In-process windowed statistics over agent and system metrics. Samples are
//! folded into streaming Welford accumulators bucketed by time, so windows
//! slide without retaining raw samples in memory; the raw rows stay queryable
//! in the store for audit and recomputation. The anomaly detector reads
//! point-in-time snapshots of these windows, never the database.

pub mod aggregator;
pub mod window;

pub use aggregator::MetricsAggregator;
pub use window::{MetricKey, MetricScope, StatsWindow, WindowedStats};
