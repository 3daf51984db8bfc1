//! # Metrics Aggregator
//!
//! Per-key tiered windows over agent and system metrics. Ingestion is the
//! only path that mutates a key's windows; readers get point-in-time copies,
//! so the anomaly detector never holds a lock across its evaluation pass.
//! Heartbeat reports are folded in as built-in metrics (health score, CPU,
//! memory) alongside agent-reported samples.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::window::{MetricKey, MetricScope, StatsWindow, TierWindow, WindowedStats};
use crate::constants::builtin_metrics;
use crate::models::core::agent_heartbeat::HeartbeatReport;
use crate::models::core::performance_metric::MetricSample;

struct KeyWindows {
    tiers: Vec<TierWindow>,
    latest: Option<(DateTime<Utc>, f64)>,
}

impl KeyWindows {
    fn new() -> Self {
        Self {
            tiers: StatsWindow::ALL.iter().map(|w| TierWindow::new(*w)).collect(),
            latest: None,
        }
    }
}

/// Streaming windowed statistics keyed by `(scope, metric_name)`.
pub struct MetricsAggregator {
    windows: DashMap<MetricKey, KeyWindows>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Fold one value into every tier for the key. `latest` is max-wins by
    /// sample timestamp, so out-of-order batches never regress it.
    pub fn ingest(&self, key: MetricKey, value: f64, at: DateTime<Utc>, now: DateTime<Utc>) {
        if !value.is_finite() {
            return;
        }

        let mut entry = self.windows.entry(key).or_insert_with(KeyWindows::new);
        for tier in &mut entry.tiers {
            tier.record(at, value, now);
        }
        match entry.latest {
            Some((seen_at, _)) if seen_at > at => {}
            _ => entry.latest = Some((at, value)),
        }
    }

    pub fn ingest_sample(&self, sample: &MetricSample, now: DateTime<Utc>) {
        let key = MetricKey::new(
            MetricScope::from_agent_id(sample.agent_id.as_deref()),
            sample.metric_name.clone(),
        );
        self.ingest(key, sample.metric_value, sample.recorded_at, now);
    }

    /// At-least-once batch ingestion from agents.
    pub fn ingest_batch(&self, samples: &[MetricSample], now: DateTime<Utc>) {
        for sample in samples {
            self.ingest_sample(sample, now);
        }
    }

    /// Derive built-in metrics from a heartbeat report.
    pub fn ingest_heartbeat(&self, report: &HeartbeatReport, now: DateTime<Utc>) {
        let at = report.timestamp;
        for (name, value) in [
            (builtin_metrics::HEALTH_SCORE, f64::from(report.health_score)),
            (builtin_metrics::CPU_PERCENT, f64::from(report.cpu_percent)),
            (
                builtin_metrics::MEMORY_PERCENT,
                f64::from(report.memory_percent),
            ),
            (
                builtin_metrics::ERROR_COUNT,
                report.error_count as f64,
            ),
        ] {
            self.ingest(MetricKey::agent(report.agent_id.clone(), name), value, at, now);
        }
    }

    /// Point-in-time statistics for a key's window. Missing keys and empty
    /// windows both come back as `count = 0`; this never raises.
    pub fn windowed_stats(
        &self,
        key: &MetricKey,
        window: StatsWindow,
        now: DateTime<Utc>,
    ) -> WindowedStats {
        match self.windows.get_mut(key) {
            Some(mut entry) => {
                let index = StatsWindow::ALL
                    .iter()
                    .position(|w| *w == window)
                    .unwrap_or(0);
                entry.tiers[index].stats(now)
            }
            None => WindowedStats::empty(),
        }
    }

    /// Most recent value observed for a key, by sample timestamp.
    pub fn latest(&self, key: &MetricKey) -> Option<f64> {
        self.windows.get(key).and_then(|e| e.latest.map(|(_, v)| v))
    }

    /// Snapshot of every known key; the detector iterates this copy instead
    /// of holding the map open across its pass.
    pub fn keys(&self) -> Vec<MetricKey> {
        self.windows.iter().map(|e| e.key().clone()).collect()
    }

    pub fn key_count(&self) -> usize {
        self.windows.len()
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}
