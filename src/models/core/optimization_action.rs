//! # Optimization Action Model
//!
//! Remediation actions selected by the optimization engine. Maps to the
//! `optimization_recommendations` table. Invariant: at most one `applied` row
//! per `(agent_id, action_type)` inside the cooldown window; in-cooldown
//! requests are recorded as `skipped_cooldown` for audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;
use uuid::Uuid;

/// The bounded remediation vocabulary, ordered by escalation tier.
/// `EscalateAlert` is the terminal tier with no further automatic escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SoftRecovery,
    HardRestart,
    ResourceTune,
    EscalateAlert,
}

impl ActionType {
    /// Next rung of the escalation ladder, if any. `ResourceTune` sits
    /// outside the ladder and escalates straight to alerting.
    pub fn next_escalation(&self) -> Option<ActionType> {
        match self {
            Self::SoftRecovery => Some(Self::HardRestart),
            Self::HardRestart => Some(Self::EscalateAlert),
            Self::ResourceTune => Some(Self::EscalateAlert),
            Self::EscalateAlert => None,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SoftRecovery => write!(f, "soft_recovery"),
            Self::HardRestart => write!(f, "hard_restart"),
            Self::ResourceTune => write!(f, "resource_tune"),
            Self::EscalateAlert => write!(f, "escalate_alert"),
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "soft_recovery" => Ok(Self::SoftRecovery),
            "hard_restart" => Ok(Self::HardRestart),
            "resource_tune" => Ok(Self::ResourceTune),
            "escalate_alert" => Ok(Self::EscalateAlert),
            _ => Err(format!("Invalid action type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Applied,
    Failed,
    SkippedCooldown,
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Applied => write!(f, "applied"),
            Self::Failed => write!(f, "failed"),
            Self::SkippedCooldown => write!(f, "skipped_cooldown"),
        }
    }
}

impl std::str::FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "applied" => Ok(Self::Applied),
            "failed" => Ok(Self::Failed),
            "skipped_cooldown" => Ok(Self::SkippedCooldown),
            _ => Err(format!("Invalid action status: {s}")),
        }
    }
}

/// A recorded action, from selection through application and verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationAction {
    pub action_id: Uuid,
    /// `None` for system-wide actions.
    pub agent_id: Option<String>,
    pub action_type: ActionType,
    pub trigger_reason: String,
    pub status: ActionStatus,
    pub correlation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub applied_at: Option<DateTime<Utc>>,
    pub result_summary: Option<String>,
}

impl OptimizationAction {
    pub fn request(
        agent_id: Option<String>,
        action_type: ActionType,
        trigger_reason: impl Into<String>,
        correlation_id: Option<Uuid>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            action_id: Uuid::new_v4(),
            agent_id,
            action_type,
            trigger_reason: trigger_reason.into(),
            status: ActionStatus::Pending,
            correlation_id,
            created_at,
            applied_at: None,
            result_summary: None,
        }
    }
}

#[derive(Debug, FromRow)]
struct ActionRow {
    action_id: Uuid,
    agent_id: Option<String>,
    action_type: String,
    trigger_reason: String,
    status: String,
    correlation_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    applied_at: Option<DateTime<Utc>>,
    result_summary: Option<String>,
}

impl TryFrom<ActionRow> for OptimizationAction {
    type Error = sqlx::Error;

    fn try_from(row: ActionRow) -> Result<Self, Self::Error> {
        let action_type = row
            .action_type
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;
        let status = row
            .status
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;
        Ok(OptimizationAction {
            action_id: row.action_id,
            agent_id: row.agent_id,
            action_type,
            trigger_reason: row.trigger_reason,
            status,
            correlation_id: row.correlation_id,
            created_at: row.created_at,
            applied_at: row.applied_at,
            result_summary: row.result_summary,
        })
    }
}

impl OptimizationAction {
    pub async fn append(pool: &PgPool, action: &OptimizationAction) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO optimization_recommendations
                (action_id, agent_id, action_type, trigger_reason, status,
                 correlation_id, created_at, applied_at, result_summary)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(action.action_id)
        .bind(&action.agent_id)
        .bind(action.action_type.to_string())
        .bind(&action.trigger_reason)
        .bind(action.status.to_string())
        .bind(action.correlation_id)
        .bind(action.created_at)
        .bind(action.applied_at)
        .bind(&action.result_summary)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn update_status(
        pool: &PgPool,
        action_id: Uuid,
        status: ActionStatus,
        applied_at: Option<DateTime<Utc>>,
        result_summary: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE optimization_recommendations
            SET status = $2, applied_at = $3, result_summary = $4
            WHERE action_id = $1
            "#,
        )
        .bind(action_id)
        .bind(status.to_string())
        .bind(applied_at)
        .bind(result_summary)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Action history for an agent, newest first. Audit/dashboard query.
    pub async fn recent_for_agent(
        pool: &PgPool,
        agent_id: &str,
        limit: i64,
    ) -> Result<Vec<OptimizationAction>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ActionRow>(
            r#"
            SELECT action_id, agent_id, action_type, trigger_reason, status,
                   correlation_id, created_at, applied_at, result_summary
            FROM optimization_recommendations
            WHERE agent_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(agent_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(OptimizationAction::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_ladder() {
        assert_eq!(
            ActionType::SoftRecovery.next_escalation(),
            Some(ActionType::HardRestart)
        );
        assert_eq!(
            ActionType::HardRestart.next_escalation(),
            Some(ActionType::EscalateAlert)
        );
        assert_eq!(ActionType::EscalateAlert.next_escalation(), None);
    }

    #[test]
    fn test_action_type_round_trip() {
        for action in [
            ActionType::SoftRecovery,
            ActionType::HardRestart,
            ActionType::ResourceTune,
            ActionType::EscalateAlert,
        ] {
            assert_eq!(action.to_string().parse::<ActionType>().unwrap(), action);
        }
    }

    #[test]
    fn test_request_starts_pending() {
        let action = OptimizationAction::request(
            Some("worker-1".to_string()),
            ActionType::SoftRecovery,
            "heartbeat_timeout",
            None,
            Utc::now(),
        );
        assert_eq!(action.status, ActionStatus::Pending);
        assert!(action.applied_at.is_none());
    }
}
