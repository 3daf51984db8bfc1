//! # System Event Model
//!
//! Append-only audit log in the `system_events` table: state transitions,
//! anomalies, and recovery actions, linked into causal chains by
//! `correlation_id` (heartbeat miss -> anomaly -> action). Rows are never
//! mutated; retention is severity-aware.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;
use uuid::Uuid;

/// Severity ladder for events. Retention keeps `Error`/`Critical` rows on the
/// long audit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl EventSeverity {
    /// Severities retained on the long audit window.
    pub fn is_audit_retained(&self) -> bool {
        matches!(self, Self::Error | Self::Critical)
    }
}

impl fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for EventSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Invalid event severity: {s}")),
        }
    }
}

/// A persisted event row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub severity: EventSeverity,
    pub agent_id: Option<String>,
    pub correlation_id: Option<Uuid>,
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Event payload before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSystemEvent {
    pub event_type: String,
    pub severity: EventSeverity,
    pub agent_id: Option<String>,
    pub correlation_id: Option<Uuid>,
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl NewSystemEvent {
    pub fn new(
        event_type: impl Into<String>,
        severity: EventSeverity,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            severity,
            agent_id: None,
            correlation_id: None,
            context: serde_json::json!({}),
            created_at,
        }
    }

    pub fn for_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn correlated(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, FromRow)]
struct SystemEventRow {
    event_id: Uuid,
    event_type: String,
    severity: String,
    agent_id: Option<String>,
    correlation_id: Option<Uuid>,
    context: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<SystemEventRow> for SystemEvent {
    type Error = sqlx::Error;

    fn try_from(row: SystemEventRow) -> Result<Self, Self::Error> {
        let severity = row
            .severity
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;
        Ok(SystemEvent {
            event_id: row.event_id,
            event_type: row.event_type,
            severity,
            agent_id: row.agent_id,
            correlation_id: row.correlation_id,
            context: row.context,
            created_at: row.created_at,
        })
    }
}

impl SystemEvent {
    pub async fn append(pool: &PgPool, event: &NewSystemEvent) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO system_events
                (event_id, event_type, severity, agent_id, correlation_id, context, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&event.event_type)
        .bind(event.severity.to_string())
        .bind(&event.agent_id)
        .bind(event.correlation_id)
        .bind(&event.context)
        .bind(event.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Recent events, newest first, optionally filtered by minimum severity
    /// and a time floor. Display-only query.
    pub async fn recent(
        pool: &PgPool,
        min_severity: Option<EventSeverity>,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<SystemEvent>, sqlx::Error> {
        let severities: Vec<String> = match min_severity {
            Some(min) => [
                EventSeverity::Info,
                EventSeverity::Warning,
                EventSeverity::Error,
                EventSeverity::Critical,
            ]
            .iter()
            .filter(|s| **s >= min)
            .map(ToString::to_string)
            .collect(),
            None => Vec::new(),
        };

        let rows = sqlx::query_as::<_, SystemEventRow>(
            r#"
            SELECT event_id, event_type, severity, agent_id, correlation_id, context, created_at
            FROM system_events
            WHERE ($1 OR severity = ANY($2))
              AND ($3::timestamptz IS NULL OR created_at >= $3)
            ORDER BY created_at DESC
            LIMIT $4
            "#,
        )
        .bind(min_severity.is_none())
        .bind(&severities)
        .bind(since)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(SystemEvent::try_from).collect()
    }

    /// Severity-aware retention sweep: sub-ERROR rows age out at
    /// `standard_cutoff`, ERROR/CRITICAL rows at the longer `audit_cutoff`.
    pub async fn purge_older_than(
        pool: &PgPool,
        standard_cutoff: DateTime<Utc>,
        audit_cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM system_events
            WHERE (severity IN ('info', 'warning') AND created_at < $1)
               OR (severity IN ('error', 'critical') AND created_at < $2)
            "#,
        )
        .bind(standard_cutoff)
        .bind(audit_cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
