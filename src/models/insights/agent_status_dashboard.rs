//! # Agent Status Dashboard
//!
//! Row shape of the `agent_status_dashboard` view: one row per agent with
//! liveness age and the latest heartbeat's resource samples joined in.
//! Display-only; no CRUD.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// One agent's row on the status dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AgentStatusRow {
    pub agent_id: String,
    pub agent_type: String,
    pub state: String,
    pub last_seen: Option<DateTime<Utc>>,
    pub seconds_since_heartbeat: Option<f64>,
    pub latest_health_score: Option<f32>,
    pub latest_cpu_percent: Option<f32>,
    pub latest_memory_percent: Option<f32>,
    pub actions_last_day: i64,
}

impl AgentStatusRow {
    pub async fn fetch_all(pool: &PgPool) -> Result<Vec<AgentStatusRow>, sqlx::Error> {
        sqlx::query_as::<_, AgentStatusRow>(
            r#"
            SELECT agent_id, agent_type, state, last_seen, seconds_since_heartbeat,
                   latest_health_score, latest_cpu_percent, latest_memory_percent,
                   actions_last_day
            FROM agent_status_dashboard
            ORDER BY agent_id
            "#,
        )
        .fetch_all(pool)
        .await
    }
}
