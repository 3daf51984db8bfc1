//! # Coordination Store
//!
//! The durable-store contract. Every control-loop component writes through
//! this trait; the registry is the only writer of `agents.state`, heartbeat
//! and metric rows are append-only, and dashboard reads are display-only
//! aggregates the control loop never consults.
//!
//! `PgStore` is the production implementation. Every call is bounded by the
//! configured timeout; a timeout or connection loss surfaces as
//! `CoordinatorError::TransientStore`, which callers retry with backoff and
//! then treat as a degraded-mode signal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{CoordinatorError, Result};
use crate::models::core::agent::Agent;
use crate::models::core::agent_health_history::HealthSnapshotRecord;
use crate::models::core::agent_heartbeat::{AgentHeartbeat, HeartbeatReport};
use crate::models::core::optimization_action::{ActionStatus, OptimizationAction};
use crate::models::core::performance_metric::{MetricSample, PerformanceMetric};
use crate::models::core::system_event::{EventSeverity, NewSystemEvent, SystemEvent};
use crate::models::insights::agent_status_dashboard::AgentStatusRow;
use crate::models::insights::performance_summary::PerformanceSummaryRow;
use crate::models::insights::system_health_overview::SystemHealthOverview;
use crate::state_machine::states::AgentState;

/// Durable storage contract for the coordination engine.
#[async_trait]
pub trait CoordinationStore: Send + Sync + 'static {
    // Agents
    async fn upsert_agent(&self, agent: &Agent) -> Result<Agent>;
    async fn load_agents(&self) -> Result<Vec<Agent>>;
    async fn update_agent_state(
        &self,
        agent_id: &str,
        state: AgentState,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn touch_last_seen(&self, agent_id: &str, seen_at: DateTime<Utc>) -> Result<()>;

    // Append-only streams
    async fn append_heartbeat(&self, report: &HeartbeatReport) -> Result<()>;
    async fn append_metric(&self, sample: &MetricSample) -> Result<()>;
    async fn append_event(&self, event: &NewSystemEvent) -> Result<()>;
    async fn append_action(&self, action: &OptimizationAction) -> Result<()>;
    async fn append_health_snapshot(&self, snapshot: &HealthSnapshotRecord) -> Result<()>;

    async fn update_action_status(
        &self,
        action_id: Uuid,
        status: ActionStatus,
        applied_at: Option<DateTime<Utc>>,
        result_summary: Option<String>,
    ) -> Result<()>;

    // Audit reads
    async fn latest_heartbeat(&self, agent_id: &str) -> Result<Option<AgentHeartbeat>>;
    async fn metric_samples_since(
        &self,
        agent_id: Option<&str>,
        metric_name: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PerformanceMetric>>;

    // Display-only dashboard reads
    async fn recent_events(
        &self,
        min_severity: Option<EventSeverity>,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<SystemEvent>>;
    async fn agent_status_dashboard(&self) -> Result<Vec<AgentStatusRow>>;
    async fn performance_summary(&self, window_hours: i64) -> Result<Vec<PerformanceSummaryRow>>;
    async fn system_health_overview(&self) -> Result<SystemHealthOverview>;

    /// Retention sweep. Returns rows removed.
    async fn cleanup_old_data(
        &self,
        metrics_retention_days: u32,
        events_retention_days: u32,
    ) -> Result<u64>;
}

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Bound a store call; an elapsed timeout is a transient failure.
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(CoordinatorError::from),
            Err(_) => Err(CoordinatorError::TransientStore(format!(
                "{operation} timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

#[async_trait]
impl CoordinationStore for PgStore {
    async fn upsert_agent(&self, agent: &Agent) -> Result<Agent> {
        self.bounded("upsert_agent", Agent::upsert(&self.pool, agent))
            .await
    }

    async fn load_agents(&self) -> Result<Vec<Agent>> {
        self.bounded("load_agents", Agent::list_all(&self.pool)).await
    }

    async fn update_agent_state(
        &self,
        agent_id: &str,
        state: AgentState,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.bounded(
            "update_agent_state",
            Agent::update_state(&self.pool, agent_id, state, updated_at),
        )
        .await
    }

    async fn touch_last_seen(&self, agent_id: &str, seen_at: DateTime<Utc>) -> Result<()> {
        self.bounded(
            "touch_last_seen",
            Agent::touch_last_seen(&self.pool, agent_id, seen_at),
        )
        .await
    }

    async fn append_heartbeat(&self, report: &HeartbeatReport) -> Result<()> {
        self.bounded("append_heartbeat", AgentHeartbeat::append(&self.pool, report))
            .await
    }

    async fn append_metric(&self, sample: &MetricSample) -> Result<()> {
        self.bounded("append_metric", PerformanceMetric::append(&self.pool, sample))
            .await
    }

    async fn append_event(&self, event: &NewSystemEvent) -> Result<()> {
        self.bounded("append_event", SystemEvent::append(&self.pool, event))
            .await
    }

    async fn append_action(&self, action: &OptimizationAction) -> Result<()> {
        self.bounded("append_action", OptimizationAction::append(&self.pool, action))
            .await
    }

    async fn append_health_snapshot(&self, snapshot: &HealthSnapshotRecord) -> Result<()> {
        self.bounded(
            "append_health_snapshot",
            HealthSnapshotRecord::append(&self.pool, snapshot),
        )
        .await
    }

    async fn update_action_status(
        &self,
        action_id: Uuid,
        status: ActionStatus,
        applied_at: Option<DateTime<Utc>>,
        result_summary: Option<String>,
    ) -> Result<()> {
        self.bounded(
            "update_action_status",
            OptimizationAction::update_status(
                &self.pool,
                action_id,
                status,
                applied_at,
                result_summary.as_deref(),
            ),
        )
        .await
    }

    async fn latest_heartbeat(&self, agent_id: &str) -> Result<Option<AgentHeartbeat>> {
        self.bounded(
            "latest_heartbeat",
            AgentHeartbeat::latest_for_agent(&self.pool, agent_id),
        )
        .await
    }

    async fn metric_samples_since(
        &self,
        agent_id: Option<&str>,
        metric_name: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PerformanceMetric>> {
        self.bounded(
            "metric_samples_since",
            PerformanceMetric::samples_since(&self.pool, agent_id, metric_name, since),
        )
        .await
    }

    async fn recent_events(
        &self,
        min_severity: Option<EventSeverity>,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<SystemEvent>> {
        self.bounded(
            "recent_events",
            SystemEvent::recent(&self.pool, min_severity, since, limit),
        )
        .await
    }

    async fn agent_status_dashboard(&self) -> Result<Vec<AgentStatusRow>> {
        self.bounded("agent_status_dashboard", AgentStatusRow::fetch_all(&self.pool))
            .await
    }

    async fn performance_summary(&self, window_hours: i64) -> Result<Vec<PerformanceSummaryRow>> {
        self.bounded(
            "performance_summary",
            PerformanceSummaryRow::fetch_window(&self.pool, window_hours),
        )
        .await
    }

    async fn system_health_overview(&self) -> Result<SystemHealthOverview> {
        self.bounded(
            "system_health_overview",
            SystemHealthOverview::fetch(&self.pool),
        )
        .await
    }

    async fn cleanup_old_data(
        &self,
        metrics_retention_days: u32,
        events_retention_days: u32,
    ) -> Result<u64> {
        let pool = self.pool.clone();
        self.bounded("cleanup_old_data", async move {
            let row: (i64,) = sqlx::query_as("SELECT cleanup_old_data($1, $2)")
                .bind(metrics_retention_days as i32)
                .bind(events_retention_days as i32)
                .fetch_one(&pool)
                .await?;
            Ok(row.0.max(0) as u64)
        })
        .await
    }
}
