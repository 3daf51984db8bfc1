//! # Agent Health History Model
//!
//! Point-in-time health snapshots written by the heartbeat monitor on each
//! tick. Maps to the `agent_health_history` table. Audit and dashboard
//! sparklines only; every value here is recomputable from raw heartbeats and
//! metrics, so this table is never a source of truth for the control loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::state_machine::states::AgentState;

/// One monitor-tick snapshot of an agent's health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshotRecord {
    pub agent_id: String,
    pub state: AgentState,
    pub health_score: Option<f32>,
    pub heartbeat_age_seconds: Option<i64>,
    pub missed_ticks: i32,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct SnapshotRow {
    agent_id: String,
    state: String,
    health_score: Option<f32>,
    heartbeat_age_seconds: Option<i64>,
    missed_ticks: i32,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<SnapshotRow> for HealthSnapshotRecord {
    type Error = sqlx::Error;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        let state = row
            .state
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;
        Ok(HealthSnapshotRecord {
            agent_id: row.agent_id,
            state,
            health_score: row.health_score,
            heartbeat_age_seconds: row.heartbeat_age_seconds,
            missed_ticks: row.missed_ticks,
            recorded_at: row.recorded_at,
        })
    }
}

impl HealthSnapshotRecord {
    pub async fn append(pool: &PgPool, snapshot: &HealthSnapshotRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO agent_health_history
                (agent_id, state, health_score, heartbeat_age_seconds, missed_ticks, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&snapshot.agent_id)
        .bind(snapshot.state.to_string())
        .bind(snapshot.health_score)
        .bind(snapshot.heartbeat_age_seconds)
        .bind(snapshot.missed_ticks)
        .bind(snapshot.recorded_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Recent snapshots for an agent, newest first.
    pub async fn recent_for_agent(
        pool: &PgPool,
        agent_id: &str,
        limit: i64,
    ) -> Result<Vec<HealthSnapshotRecord>, sqlx::Error> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT agent_id, state, health_score, heartbeat_age_seconds, missed_ticks, recorded_at
            FROM agent_health_history
            WHERE agent_id = $1
            ORDER BY recorded_at DESC
            LIMIT $2
            "#,
        )
        .bind(agent_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(HealthSnapshotRecord::try_from).collect()
    }

    pub async fn purge_older_than(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM agent_health_history WHERE recorded_at < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
