//! # System Health Overview
//!
//! Row shape of the `system_health_overview` view: fleet-wide counts for the
//! dashboard's health banner. Computed, never stored; no CRUD.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// Fleet-wide health counts at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SystemHealthOverview {
    pub total_agents: i64,
    pub operational_agents: i64,
    pub error_agents: i64,
    pub maintenance_agents: i64,
    pub shutdown_agents: i64,
    pub overdue_agents: i64,
    pub anomalies_last_hour: i64,
    pub actions_last_hour: i64,
    pub critical_events_last_day: i64,
}

impl SystemHealthOverview {
    pub async fn fetch(pool: &PgPool) -> Result<SystemHealthOverview, sqlx::Error> {
        sqlx::query_as::<_, SystemHealthOverview>(
            r#"
            SELECT total_agents, operational_agents, error_agents, maintenance_agents,
                   shutdown_agents, overdue_agents, anomalies_last_hour, actions_last_hour,
                   critical_events_last_day
            FROM system_health_overview
            "#,
        )
        .fetch_one(pool)
        .await
    }
}
