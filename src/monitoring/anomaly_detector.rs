//! # Anomaly Detector
//!
//! Z-score deviation detection against a continuously sliding baseline. Each
//! evaluation pass snapshots the aggregator's windows, scores the latest
//! observation of every key with enough baseline samples, and emits at most
//! one anomaly per `(scope, metric)` per pass. There is no trained model: a
//! behavior shift stops alerting once the baseline window rolls past it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::constants::event_types;
use crate::events::recorder::EventRecorder;
use crate::metrics::aggregator::MetricsAggregator;
use crate::metrics::window::{MetricKey, StatsWindow};
use crate::models::core::system_event::{EventSeverity, NewSystemEvent};
use crate::optimization::{OptimizationTrigger, TriggerReason};

/// A flagged metric deviation, retained for audit in the event log and
/// consumed once by the optimization engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    /// `None` for system-scope metrics.
    pub agent_id: Option<String>,
    pub metric_name: String,
    pub observed_value: f64,
    pub baseline_mean: f64,
    pub baseline_stddev: f64,
    /// Infinite when the baseline has zero spread and the observation moved.
    pub z_score: f64,
    pub severity: EventSeverity,
    pub detected_at: DateTime<Utc>,
}

pub struct AnomalyDetector {
    aggregator: Arc<MetricsAggregator>,
    recorder: Arc<EventRecorder>,
    trigger_tx: mpsc::Sender<OptimizationTrigger>,
    min_samples: usize,
    warning_z: f64,
    critical_z: f64,
    baseline_window: StatsWindow,
}

impl AnomalyDetector {
    pub fn new(
        aggregator: Arc<MetricsAggregator>,
        recorder: Arc<EventRecorder>,
        trigger_tx: mpsc::Sender<OptimizationTrigger>,
        config: &crate::config::CoordinatorConfig,
    ) -> Self {
        Self {
            aggregator,
            recorder,
            trigger_tx,
            min_samples: config.anomaly_min_samples,
            warning_z: config.anomaly_warning_z,
            critical_z: config.anomaly_critical_z,
            baseline_window: StatsWindow::Hourly,
        }
    }

    /// Override the baseline tier (default: hourly).
    pub fn with_baseline_window(mut self, window: StatsWindow) -> Self {
        self.baseline_window = window;
        self
    }

    /// Score one observation against a baseline. Returns `None` when the
    /// deviation is inside the warning threshold. A zero-spread baseline
    /// treats any movement off the mean as infinitely deviant.
    pub fn classify(&self, observed: f64, mean: f64, stddev: f64) -> Option<(f64, EventSeverity)> {
        let z = if stddev == 0.0 {
            if observed == mean {
                return None;
            }
            if observed > mean { f64::INFINITY } else { f64::NEG_INFINITY }
        } else {
            (observed - mean) / stddev
        };

        if z.abs() >= self.critical_z {
            Some((z, EventSeverity::Critical))
        } else if z.abs() >= self.warning_z {
            Some((z, EventSeverity::Warning))
        } else {
            None
        }
    }

    /// One evaluation pass over every known metric key. Emits events and
    /// engine triggers for each anomaly; returns the anomalies for callers
    /// that want them (tests, diagnostics).
    pub async fn evaluate(&self, now: DateTime<Utc>) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();
        let mut seen: HashSet<MetricKey> = HashSet::new();

        for key in self.aggregator.keys() {
            if !seen.insert(key.clone()) {
                continue;
            }

            let stats = self
                .aggregator
                .windowed_stats(&key, self.baseline_window, now);
            if (stats.count as usize) < self.min_samples {
                continue;
            }

            let (Some(mean), Some(stddev)) = (stats.mean, stats.stddev) else {
                continue;
            };
            let Some(observed) = self.aggregator.latest(&key) else {
                continue;
            };

            let Some((z, severity)) = self.classify(observed, mean, stddev) else {
                continue;
            };

            let anomaly = Anomaly {
                agent_id: key.scope.agent_id().map(str::to_string),
                metric_name: key.name.clone(),
                observed_value: observed,
                baseline_mean: mean,
                baseline_stddev: stddev,
                z_score: z,
                severity,
                detected_at: now,
            };

            debug!(
                scope = %key.scope,
                metric = %key.name,
                z_score = z,
                severity = %severity,
                "anomaly detected"
            );

            self.emit(&anomaly, now).await;
            anomalies.push(anomaly);
        }

        anomalies
    }

    async fn emit(&self, anomaly: &Anomaly, now: DateTime<Utc>) {
        let correlation_id = Uuid::new_v4();

        let mut event = NewSystemEvent::new(event_types::ANOMALY_DETECTED, anomaly.severity, now)
            .correlated(correlation_id)
            .with_context(serde_json::json!({
                "metric_name": anomaly.metric_name,
                "observed_value": anomaly.observed_value,
                "baseline_mean": anomaly.baseline_mean,
                "baseline_stddev": anomaly.baseline_stddev,
                "z_score": if anomaly.z_score.is_finite() {
                    serde_json::json!(anomaly.z_score)
                } else {
                    serde_json::json!(anomaly.z_score.to_string())
                },
            }));
        if let Some(agent_id) = &anomaly.agent_id {
            event = event.for_agent(agent_id.clone());
        }
        self.recorder.record(event).await;

        let trigger = OptimizationTrigger {
            agent_id: anomaly.agent_id.clone(),
            reason: TriggerReason::Anomaly(anomaly.clone()),
            correlation_id,
            triggered_at: now,
        };
        if self.trigger_tx.send(trigger).await.is_err() {
            warn!(metric = %anomaly.metric_name, "optimization channel closed, dropping anomaly");
        }
    }
}
