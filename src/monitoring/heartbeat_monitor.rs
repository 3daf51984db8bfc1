//! # Heartbeat Monitor
//!
//! Liveness evaluation on a fixed tick. For each monitored agent the age of
//! its last heartbeat is held against two thresholds: the warning band emits
//! a `heartbeat.overdue` event without touching state, the critical band
//! escalates to `Error` and requests a `soft_recovery`. Escalation requires
//! the age threshold AND the consecutive-missed-tick counter to agree, so a
//! clock-skewed timestamp alone never flips an agent. Both the warning and
//! the escalation are latched per outage and re-armed by the next heartbeat,
//! which is how a 160-second-stale agent produces exactly one recovery
//! request rather than one per tick.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::constants::{builtin_metrics, event_types};
use crate::database::store::CoordinationStore;
use crate::error::{CoordinatorError, Result};
use crate::events::recorder::EventRecorder;
use crate::metrics::aggregator::MetricsAggregator;
use crate::metrics::window::MetricKey;
use crate::models::core::agent::Agent;
use crate::models::core::agent_health_history::HealthSnapshotRecord;
use crate::models::core::system_event::{EventSeverity, NewSystemEvent};
use crate::optimization::{OptimizationTrigger, TriggerReason};
use crate::registry::agent_registry::AgentRegistry;
use crate::resilience::retry::{with_retry, RetryPolicy};
use crate::state_machine::states::AgentState;
use crate::state_machine::transitions::is_liveness_monitored;

/// Outcome counts for one monitor tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorTickSummary {
    pub evaluated: usize,
    pub overdue: usize,
    pub escalated: usize,
}

pub struct HeartbeatMonitor {
    registry: Arc<AgentRegistry>,
    aggregator: Arc<MetricsAggregator>,
    recorder: Arc<EventRecorder>,
    store: Arc<dyn CoordinationStore>,
    trigger_tx: mpsc::Sender<OptimizationTrigger>,
    interval: chrono::Duration,
    warning_age: chrono::Duration,
    critical_age: chrono::Duration,
    missed_ticks_threshold: u32,
    retry: RetryPolicy,
}

impl HeartbeatMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<AgentRegistry>,
        aggregator: Arc<MetricsAggregator>,
        recorder: Arc<EventRecorder>,
        store: Arc<dyn CoordinationStore>,
        trigger_tx: mpsc::Sender<OptimizationTrigger>,
        config: &crate::config::CoordinatorConfig,
    ) -> Self {
        Self {
            registry,
            aggregator,
            recorder,
            store,
            trigger_tx,
            interval: chrono::Duration::seconds(config.heartbeat_interval_seconds as i64),
            warning_age: config.warning_age(),
            critical_age: config.critical_age(),
            missed_ticks_threshold: config.missed_ticks_threshold,
            retry: RetryPolicy::new(config.store_retry_attempts),
        }
    }

    /// Evaluate liveness for the whole fleet at `now`.
    pub async fn evaluate(&self, now: DateTime<Utc>) -> MonitorTickSummary {
        let mut summary = MonitorTickSummary::default();

        for agent in self.registry.list(None) {
            if !is_liveness_monitored(agent.state) {
                continue;
            }
            summary.evaluated += 1;

            // Agents that never beat age from their registration instant.
            let epoch = agent.last_seen.unwrap_or(agent.updated_at);
            let age = now - epoch;

            if age < self.interval {
                self.write_snapshot(&agent, Some(age), now).await;
                continue;
            }

            let missed = self.registry.bump_missed_ticks(&agent.agent_id);

            if age >= self.critical_age {
                summary.overdue += 1;
                // Flap guard: the rolling counter and the age threshold must
                // both agree before we escalate.
                if missed >= self.missed_ticks_threshold
                    && self.registry.mark_escalated(&agent.agent_id)
                {
                    self.escalate(&agent, age, missed, now).await;
                    summary.escalated += 1;
                }
            } else if age >= self.warning_age {
                summary.overdue += 1;
                if self.registry.mark_warned(&agent.agent_id) {
                    self.warn_overdue(&agent, age, now).await;
                }
            }

            self.write_snapshot(&agent, Some(age), now).await;
        }

        debug!(
            evaluated = summary.evaluated,
            overdue = summary.overdue,
            escalated = summary.escalated,
            "heartbeat tick complete"
        );

        summary
    }

    async fn warn_overdue(&self, agent: &Agent, age: chrono::Duration, now: DateTime<Utc>) {
        warn!(
            agent_id = %agent.agent_id,
            age_seconds = age.num_seconds(),
            "agent heartbeat overdue"
        );
        self.recorder
            .record(
                NewSystemEvent::new(event_types::HEARTBEAT_OVERDUE, EventSeverity::Warning, now)
                    .for_agent(agent.agent_id.clone())
                    .with_context(serde_json::json!({
                        "age_seconds": age.num_seconds(),
                        "warning_threshold_seconds": self.warning_age.num_seconds(),
                    })),
            )
            .await;
    }

    async fn escalate(&self, agent: &Agent, age: chrono::Duration, missed: u32, now: DateTime<Utc>) {
        let correlation_id = Uuid::new_v4();

        info!(
            agent_id = %agent.agent_id,
            age_seconds = age.num_seconds(),
            missed_ticks = missed,
            correlation_id = %correlation_id,
            "heartbeat timeout, escalating to error"
        );

        if agent.state != AgentState::Error {
            match self
                .registry
                .transition_correlated(
                    &agent.agent_id,
                    agent.state,
                    AgentState::Error,
                    Some(correlation_id),
                    now,
                )
                .await
            {
                Ok(_) => {}
                Err(CoordinatorError::StaleState { actual, .. }) => {
                    // Another control-loop pass moved the agent first; the
                    // recovery request still goes out under this correlation.
                    debug!(
                        agent_id = %agent.agent_id,
                        actual = %actual,
                        "concurrent transition during escalation"
                    );
                }
                Err(err) => {
                    error!(agent_id = %agent.agent_id, error = %err, "escalation transition failed");
                }
            }
        }

        self.recorder
            .record(
                NewSystemEvent::new(event_types::HEARTBEAT_TIMEOUT, EventSeverity::Error, now)
                    .for_agent(agent.agent_id.clone())
                    .correlated(correlation_id)
                    .with_context(serde_json::json!({
                        "age_seconds": age.num_seconds(),
                        "missed_ticks": missed,
                        "critical_threshold_seconds": self.critical_age.num_seconds(),
                    })),
            )
            .await;

        let trigger = OptimizationTrigger {
            agent_id: Some(agent.agent_id.clone()),
            reason: TriggerReason::HeartbeatTimeout,
            correlation_id,
            triggered_at: now,
        };
        if self.trigger_tx.send(trigger).await.is_err() {
            warn!(agent_id = %agent.agent_id, "optimization channel closed, dropping trigger");
        }
    }

    async fn write_snapshot(&self, agent: &Agent, age: Option<chrono::Duration>, now: DateTime<Utc>) {
        let health_score = self
            .aggregator
            .latest(&MetricKey::agent(
                agent.agent_id.clone(),
                builtin_metrics::HEALTH_SCORE,
            ))
            .map(|v| v as f32);

        // Re-read the state: escalation in this same tick may have moved it.
        let state = self
            .registry
            .get(&agent.agent_id)
            .map_or(agent.state, |a| a.state);

        let snapshot = HealthSnapshotRecord {
            agent_id: agent.agent_id.clone(),
            state,
            health_score,
            heartbeat_age_seconds: age.map(|a| a.num_seconds()),
            missed_ticks: self
                .registry
                .liveness(&agent.agent_id)
                .map_or(0, |l| l.missed_ticks as i32),
            recorded_at: now,
        };

        let result: Result<()> = with_retry(&self.retry, "append_health_snapshot", || {
            let store = self.store.clone();
            let snapshot = snapshot.clone();
            async move { store.append_health_snapshot(&snapshot).await }
        })
        .await;

        if let Err(err) = result {
            debug!(agent_id = %agent.agent_id, error = %err, "health snapshot write failed");
            self.recorder.store_health().record_failure();
        }
    }
}
