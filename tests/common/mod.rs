//! Shared test doubles and builders for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use overseer_core::config::CoordinatorConfig;
use overseer_core::database::store::CoordinationStore;
use overseer_core::error::{CoordinatorError, Result};
use overseer_core::events::publisher::EventPublisher;
use overseer_core::events::recorder::EventRecorder;
use overseer_core::models::core::agent::Agent;
use overseer_core::models::core::agent_health_history::HealthSnapshotRecord;
use overseer_core::models::core::agent_heartbeat::{AgentHeartbeat, HeartbeatReport};
use overseer_core::models::core::optimization_action::{
    ActionStatus, ActionType, OptimizationAction,
};
use overseer_core::models::core::performance_metric::{MetricSample, PerformanceMetric};
use overseer_core::models::core::system_event::{EventSeverity, NewSystemEvent, SystemEvent};
use overseer_core::models::insights::agent_status_dashboard::AgentStatusRow;
use overseer_core::models::insights::performance_summary::PerformanceSummaryRow;
use overseer_core::models::insights::system_health_overview::SystemHealthOverview;
use overseer_core::optimization::actions::RecoveryDelegate;
use overseer_core::registry::agent_registry::AgentRegistry;
use overseer_core::resilience::retry::{RetryPolicy, StoreHealth};
use overseer_core::state_machine::states::AgentState;

/// In-memory `CoordinationStore` double. Mirrors the Postgres trigger's
/// max-wins `last_seen` behavior on heartbeat insert, and can simulate a
/// store outage via `fail_writes`.
#[derive(Default)]
pub struct InMemoryStore {
    pub agents: Mutex<HashMap<String, Agent>>,
    pub heartbeats: Mutex<Vec<HeartbeatReport>>,
    pub metrics: Mutex<Vec<MetricSample>>,
    pub events: Mutex<Vec<NewSystemEvent>>,
    pub actions: Mutex<Vec<OptimizationAction>>,
    pub snapshots: Mutex<Vec<HealthSnapshotRecord>>,
    pub fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(CoordinatorError::TransientStore(
                "simulated store outage".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<NewSystemEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn actions_with_status(&self, status: ActionStatus) -> Vec<OptimizationAction> {
        self.actions
            .lock()
            .iter()
            .filter(|a| a.status == status)
            .cloned()
            .collect()
    }

    pub fn actions_of_type(&self, action_type: ActionType) -> Vec<OptimizationAction> {
        self.actions
            .lock()
            .iter()
            .filter(|a| a.action_type == action_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryStore {
    async fn upsert_agent(&self, agent: &Agent) -> Result<Agent> {
        self.check_writable()?;
        self.agents
            .lock()
            .insert(agent.agent_id.clone(), agent.clone());
        Ok(agent.clone())
    }

    async fn load_agents(&self) -> Result<Vec<Agent>> {
        Ok(self.agents.lock().values().cloned().collect())
    }

    async fn update_agent_state(
        &self,
        agent_id: &str,
        state: AgentState,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.check_writable()?;
        if let Some(agent) = self.agents.lock().get_mut(agent_id) {
            agent.state = state;
            agent.updated_at = updated_at;
        }
        Ok(())
    }

    async fn touch_last_seen(&self, agent_id: &str, seen_at: DateTime<Utc>) -> Result<()> {
        self.check_writable()?;
        if let Some(agent) = self.agents.lock().get_mut(agent_id) {
            agent.last_seen = Some(agent.last_seen.map_or(seen_at, |seen| seen.max(seen_at)));
        }
        Ok(())
    }

    async fn append_heartbeat(&self, report: &HeartbeatReport) -> Result<()> {
        self.check_writable()?;
        self.heartbeats.lock().push(report.clone());
        // Mirror the agents_touch_last_seen trigger.
        if let Some(agent) = self.agents.lock().get_mut(&report.agent_id) {
            agent.last_seen = Some(
                agent
                    .last_seen
                    .map_or(report.timestamp, |seen| seen.max(report.timestamp)),
            );
        }
        Ok(())
    }

    async fn append_metric(&self, sample: &MetricSample) -> Result<()> {
        self.check_writable()?;
        self.metrics.lock().push(sample.clone());
        Ok(())
    }

    async fn append_event(&self, event: &NewSystemEvent) -> Result<()> {
        self.check_writable()?;
        self.events.lock().push(event.clone());
        Ok(())
    }

    async fn append_action(&self, action: &OptimizationAction) -> Result<()> {
        self.check_writable()?;
        self.actions.lock().push(action.clone());
        Ok(())
    }

    async fn append_health_snapshot(&self, snapshot: &HealthSnapshotRecord) -> Result<()> {
        self.check_writable()?;
        self.snapshots.lock().push(snapshot.clone());
        Ok(())
    }

    async fn update_action_status(
        &self,
        action_id: Uuid,
        status: ActionStatus,
        applied_at: Option<DateTime<Utc>>,
        result_summary: Option<String>,
    ) -> Result<()> {
        self.check_writable()?;
        if let Some(action) = self
            .actions
            .lock()
            .iter_mut()
            .find(|a| a.action_id == action_id)
        {
            action.status = status;
            action.applied_at = applied_at;
            action.result_summary = result_summary;
        }
        Ok(())
    }

    async fn latest_heartbeat(&self, agent_id: &str) -> Result<Option<AgentHeartbeat>> {
        let report = self
            .heartbeats
            .lock()
            .iter()
            .filter(|h| h.agent_id == agent_id)
            .max_by_key(|h| h.timestamp)
            .cloned();
        Ok(report.map(|r| AgentHeartbeat {
            id: 0,
            agent_id: r.agent_id,
            heartbeat_at: r.timestamp,
            health_score: r.health_score,
            cpu_percent: r.cpu_percent,
            memory_percent: r.memory_percent,
            work_items_processed: r.work_items_processed,
            error_count: r.error_count,
            payload: r.payload,
        }))
    }

    async fn metric_samples_since(
        &self,
        agent_id: Option<&str>,
        metric_name: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PerformanceMetric>> {
        let samples = self
            .metrics
            .lock()
            .iter()
            .filter(|m| {
                m.agent_id.as_deref() == agent_id
                    && m.metric_name == metric_name
                    && m.recorded_at >= since
            })
            .enumerate()
            .map(|(i, m)| PerformanceMetric {
                id: i as i64,
                agent_id: m.agent_id.clone(),
                metric_name: m.metric_name.clone(),
                metric_value: m.metric_value,
                unit: m.unit.clone(),
                recorded_at: m.recorded_at,
                tags: m.tags.clone(),
            })
            .collect();
        Ok(samples)
    }

    async fn recent_events(
        &self,
        min_severity: Option<EventSeverity>,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<SystemEvent>> {
        let mut events: Vec<SystemEvent> = self
            .events
            .lock()
            .iter()
            .filter(|e| min_severity.map_or(true, |min| e.severity >= min))
            .filter(|e| since.map_or(true, |s| e.created_at >= s))
            .map(|e| SystemEvent {
                event_id: Uuid::new_v4(),
                event_type: e.event_type.clone(),
                severity: e.severity,
                agent_id: e.agent_id.clone(),
                correlation_id: e.correlation_id,
                context: e.context.clone(),
                created_at: e.created_at,
            })
            .collect();
        events.sort_by_key(|e| std::cmp::Reverse(e.created_at));
        events.truncate(limit as usize);
        Ok(events)
    }

    async fn agent_status_dashboard(&self) -> Result<Vec<AgentStatusRow>> {
        let now = Utc::now();
        let heartbeats = self.heartbeats.lock();
        let actions = self.actions.lock();
        let mut rows: Vec<AgentStatusRow> = self
            .agents
            .lock()
            .values()
            .map(|agent| {
                let latest = heartbeats
                    .iter()
                    .filter(|h| h.agent_id == agent.agent_id)
                    .max_by_key(|h| h.timestamp);
                AgentStatusRow {
                    agent_id: agent.agent_id.clone(),
                    agent_type: agent.agent_type.clone(),
                    state: agent.state.to_string(),
                    last_seen: agent.last_seen,
                    seconds_since_heartbeat: agent
                        .last_seen
                        .map(|seen| (now - seen).num_milliseconds() as f64 / 1000.0),
                    latest_health_score: latest.map(|h| h.health_score),
                    latest_cpu_percent: latest.map(|h| h.cpu_percent),
                    latest_memory_percent: latest.map(|h| h.memory_percent),
                    actions_last_day: actions
                        .iter()
                        .filter(|a| {
                            a.agent_id.as_deref() == Some(agent.agent_id.as_str())
                                && now - a.created_at <= Duration::days(1)
                        })
                        .count() as i64,
                }
            })
            .collect();
        rows.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(rows)
    }

    async fn performance_summary(&self, window_hours: i64) -> Result<Vec<PerformanceSummaryRow>> {
        let cutoff = Utc::now() - Duration::hours(window_hours);
        let metrics = self.metrics.lock();

        let mut grouped: HashMap<(Option<String>, String), Vec<f64>> = HashMap::new();
        for metric in metrics.iter().filter(|m| m.recorded_at >= cutoff) {
            grouped
                .entry((metric.agent_id.clone(), metric.metric_name.clone()))
                .or_default()
                .push(metric.metric_value);
        }

        let mut rows: Vec<PerformanceSummaryRow> = grouped
            .into_iter()
            .map(|((agent_id, metric_name), values)| {
                let count = values.len() as i64;
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                let stddev = if values.len() < 2 {
                    0.0
                } else {
                    let variance = values
                        .iter()
                        .map(|v| (v - mean).powi(2))
                        .sum::<f64>()
                        / (values.len() - 1) as f64;
                    variance.sqrt()
                };
                PerformanceSummaryRow {
                    agent_id,
                    metric_name,
                    sample_count: count,
                    mean_value: Some(mean),
                    min_value: values.iter().cloned().reduce(f64::min),
                    max_value: values.iter().cloned().reduce(f64::max),
                    stddev_value: Some(stddev),
                }
            })
            .collect();
        rows.sort_by(|a, b| (&a.agent_id, &a.metric_name).cmp(&(&b.agent_id, &b.metric_name)));
        Ok(rows)
    }

    async fn system_health_overview(&self) -> Result<SystemHealthOverview> {
        let now = Utc::now();
        let agents = self.agents.lock();
        let events = self.events.lock();
        let actions = self.actions.lock();

        Ok(SystemHealthOverview {
            total_agents: agents.len() as i64,
            operational_agents: agents.values().filter(|a| a.state.is_operational()).count()
                as i64,
            error_agents: agents.values().filter(|a| a.state.is_error()).count() as i64,
            maintenance_agents: agents
                .values()
                .filter(|a| a.state == AgentState::Maintenance)
                .count() as i64,
            shutdown_agents: agents
                .values()
                .filter(|a| a.state == AgentState::Shutdown)
                .count() as i64,
            overdue_agents: agents
                .values()
                .filter(|a| {
                    a.last_seen
                        .map_or(false, |seen| now - seen > Duration::seconds(60))
                })
                .count() as i64,
            anomalies_last_hour: events
                .iter()
                .filter(|e| {
                    e.event_type == "anomaly.detected" && now - e.created_at <= Duration::hours(1)
                })
                .count() as i64,
            actions_last_hour: actions
                .iter()
                .filter(|a| now - a.created_at <= Duration::hours(1))
                .count() as i64,
            critical_events_last_day: events
                .iter()
                .filter(|e| {
                    e.severity == EventSeverity::Critical && now - e.created_at <= Duration::days(1)
                })
                .count() as i64,
        })
    }

    async fn cleanup_old_data(
        &self,
        metrics_retention_days: u32,
        events_retention_days: u32,
    ) -> Result<u64> {
        self.check_writable()?;
        let now = Utc::now();
        let metrics_cutoff = now - Duration::days(i64::from(metrics_retention_days));
        let events_cutoff = now - Duration::days(i64::from(events_retention_days));
        let mut removed = 0u64;

        {
            let mut heartbeats = self.heartbeats.lock();
            let before = heartbeats.len();
            heartbeats.retain(|h| h.timestamp >= metrics_cutoff);
            removed += (before - heartbeats.len()) as u64;
        }
        {
            let mut metrics = self.metrics.lock();
            let before = metrics.len();
            metrics.retain(|m| m.recorded_at >= metrics_cutoff);
            removed += (before - metrics.len()) as u64;
        }
        {
            let mut events = self.events.lock();
            let before = events.len();
            events.retain(|e| {
                if e.severity.is_audit_retained() {
                    e.created_at >= events_cutoff
                } else {
                    e.created_at >= metrics_cutoff
                }
            });
            removed += (before - events.len()) as u64;
        }

        Ok(removed)
    }
}

/// Recovery delegate that records every invocation and answers from a
/// per-action script (default: success).
#[derive(Default)]
pub struct ScriptedDelegate {
    pub invocations: Mutex<Vec<(String, ActionType)>>,
    pub failures: Mutex<Vec<ActionType>>,
}

impl ScriptedDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_on(&self, action_type: ActionType) {
        self.failures.lock().push(action_type);
    }

    pub fn invocation_count(&self, action_type: ActionType) -> usize {
        self.invocations
            .lock()
            .iter()
            .filter(|(_, a)| *a == action_type)
            .count()
    }
}

#[async_trait]
impl RecoveryDelegate for ScriptedDelegate {
    async fn invoke_recovery(&self, agent_id: &str, action_type: ActionType) -> Result<bool> {
        self.invocations
            .lock()
            .push((agent_id.to_string(), action_type));
        Ok(!self.failures.lock().contains(&action_type))
    }
}

/// Wire a registry + recorder over a store, the way the coordinator does.
pub fn build_registry(store: Arc<InMemoryStore>) -> (Arc<AgentRegistry>, Arc<EventRecorder>) {
    let recorder = build_recorder(store.clone(), 5);
    let registry = Arc::new(AgentRegistry::new(
        store,
        recorder.clone(),
        test_retry_policy(),
    ));
    (registry, recorder)
}

pub fn build_recorder(store: Arc<InMemoryStore>, failure_threshold: u32) -> Arc<EventRecorder> {
    Arc::new(EventRecorder::new(
        EventPublisher::new(64),
        store,
        test_retry_policy(),
        Arc::new(StoreHealth::new(failure_threshold)),
    ))
}

/// Fast backoff so retry paths don't slow the suite down.
pub fn test_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff_base: std::time::Duration::from_millis(1),
        backoff_max: std::time::Duration::from_millis(2),
    }
}

pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig::default()
}
