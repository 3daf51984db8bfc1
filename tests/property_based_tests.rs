//! Property-based checks over the numeric and commutativity invariants.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use overseer_core::metrics::aggregator::MetricsAggregator;
use overseer_core::metrics::window::{MetricKey, StatsWindow};

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
}

fn naive_mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn naive_sample_stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = naive_mean(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

proptest! {
    /// Streaming Welford statistics agree with the direct two-pass
    /// computation, within floating-point tolerance.
    #[test]
    fn welford_matches_naive(values in prop::collection::vec(-1e6f64..1e6, 1..200)) {
        let aggregator = MetricsAggregator::new();
        let key = MetricKey::agent("w-1", "metric");
        for (i, v) in values.iter().enumerate() {
            aggregator.ingest(key.clone(), *v, at(i as i64), at(i as i64));
        }

        let stats = aggregator.windowed_stats(&key, StatsWindow::Hourly, at(values.len() as i64));

        prop_assert_eq!(stats.count, values.len() as u64);

        let mean = stats.mean.unwrap();
        prop_assert!((mean - naive_mean(&values)).abs() < 1e-6 * (1.0 + mean.abs()));

        let stddev = stats.stddev.unwrap();
        let expected = naive_sample_stddev(&values);
        prop_assert!((stddev - expected).abs() < 1e-6 * (1.0 + expected.abs()));

        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        prop_assert_eq!(stats.min.unwrap(), min);
        prop_assert_eq!(stats.max.unwrap(), max);
    }

    /// `latest` is determined by sample timestamps, not arrival order:
    /// ingesting any permutation of the same timestamped samples converges
    /// on the same latest value.
    #[test]
    fn latest_is_arrival_order_independent(
        mut offsets in prop::collection::vec(0i64..3600, 2..50),
    ) {
        // Distinct timestamps so "latest" is unambiguous.
        offsets.sort_unstable();
        offsets.dedup();
        prop_assume!(offsets.len() >= 2);

        let samples: Vec<(i64, f64)> = offsets.iter().map(|o| (*o, *o as f64)).collect();
        let expected_latest = samples.last().unwrap().1;
        let now = at(3600);

        let forward = MetricsAggregator::new();
        let reversed = MetricsAggregator::new();
        let key = MetricKey::system("metric");

        for (offset, value) in &samples {
            forward.ingest(key.clone(), *value, at(*offset), now);
        }
        for (offset, value) in samples.iter().rev() {
            reversed.ingest(key.clone(), *value, at(*offset), now);
        }

        prop_assert_eq!(forward.latest(&key), Some(expected_latest));
        prop_assert_eq!(reversed.latest(&key), Some(expected_latest));
    }

    /// Windowed stats are permutation-invariant over arrival order.
    #[test]
    fn window_stats_are_arrival_order_independent(
        values in prop::collection::vec(0f64..1000.0, 2..50),
    ) {
        let now = at(values.len() as i64);
        let key = MetricKey::system("metric");

        let forward = MetricsAggregator::new();
        for (i, v) in values.iter().enumerate() {
            forward.ingest(key.clone(), *v, at(i as i64), now);
        }

        let reversed = MetricsAggregator::new();
        for (i, v) in values.iter().enumerate().rev() {
            reversed.ingest(key.clone(), *v, at(i as i64), now);
        }

        let a = forward.windowed_stats(&key, StatsWindow::Hourly, now);
        let b = reversed.windowed_stats(&key, StatsWindow::Hourly, now);

        prop_assert_eq!(a.count, b.count);
        prop_assert!((a.mean.unwrap() - b.mean.unwrap()).abs() < 1e-9);
        prop_assert_eq!(a.min, b.min);
        prop_assert_eq!(a.max, b.max);
        prop_assert!((a.stddev.unwrap() - b.stddev.unwrap()).abs() < 1e-6);
    }
}
