//! # Agent Heartbeat Model
//!
//! Append-only liveness reports. Maps to the `agent_heartbeats` table, whose
//! insert trigger advances `agents.last_seen` (max-wins). Consumers must
//! tolerate out-of-order delivery; the maximum observed timestamp is the
//! agent's `last_seen`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// A persisted heartbeat row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AgentHeartbeat {
    pub id: i64,
    pub agent_id: String,
    pub heartbeat_at: DateTime<Utc>,
    pub health_score: f32,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub work_items_processed: i64,
    pub error_count: i64,
    pub payload: serde_json::Value,
}

/// Heartbeat as reported over the ingress interface, before clamping and
/// persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatReport {
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    pub health_score: f32,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub work_items_processed: i64,
    pub error_count: i64,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl HeartbeatReport {
    pub fn new(agent_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            agent_id: agent_id.into(),
            timestamp,
            health_score: 100.0,
            cpu_percent: 0.0,
            memory_percent: 0.0,
            work_items_processed: 0,
            error_count: 0,
            payload: serde_json::Value::Null,
        }
    }

    /// Bound scores and resource samples to the documented 0-100 range.
    pub fn clamped(mut self) -> Self {
        self.health_score = self.health_score.clamp(0.0, 100.0);
        self.cpu_percent = self.cpu_percent.clamp(0.0, 100.0);
        self.memory_percent = self.memory_percent.clamp(0.0, 100.0);
        self
    }
}

impl AgentHeartbeat {
    /// Append a heartbeat row. The `agents_touch_last_seen` trigger advances
    /// `agents.last_seen` in the same statement.
    pub async fn append(pool: &PgPool, report: &HeartbeatReport) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO agent_heartbeats
                (agent_id, heartbeat_at, health_score, cpu_percent, memory_percent,
                 work_items_processed, error_count, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&report.agent_id)
        .bind(report.timestamp)
        .bind(report.health_score)
        .bind(report.cpu_percent)
        .bind(report.memory_percent)
        .bind(report.work_items_processed)
        .bind(report.error_count)
        .bind(&report.payload)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Most recent heartbeat for an agent by report timestamp.
    pub async fn latest_for_agent(
        pool: &PgPool,
        agent_id: &str,
    ) -> Result<Option<AgentHeartbeat>, sqlx::Error> {
        sqlx::query_as::<_, AgentHeartbeat>(
            r#"
            SELECT id, agent_id, heartbeat_at, health_score, cpu_percent, memory_percent,
                   work_items_processed, error_count, payload
            FROM agent_heartbeats
            WHERE agent_id = $1
            ORDER BY heartbeat_at DESC
            LIMIT 1
            "#,
        )
        .bind(agent_id)
        .fetch_optional(pool)
        .await
    }

    /// Retention sweep: drop rows older than the cutoff. Returns rows removed.
    pub async fn purge_older_than(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM agent_heartbeats WHERE heartbeat_at < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
