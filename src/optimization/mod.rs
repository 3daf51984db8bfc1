//! # Optimization & Recovery
//!
//! Consumes heartbeat timeouts and anomalies, selects bounded remediation
//! actions from a deterministic priority table, and applies them under a
//! per-`(agent, action)` cooldown with staged escalation
//! (`soft_recovery -> hard_restart -> escalate_alert`). Selection is pure
//! table lookup, never learned, so every action is auditable back to its
//! trigger through the shared correlation id.

pub mod actions;
pub mod engine;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::core::optimization_action::ActionType;
use crate::monitoring::anomaly_detector::Anomaly;

pub use actions::{select_action, RecoveryDelegate};
pub use engine::OptimizationEngine;

/// Why the engine is being asked to act.
#[derive(Debug, Clone)]
pub enum TriggerReason {
    /// The heartbeat monitor escalated a stale agent.
    HeartbeatTimeout,
    /// The anomaly detector flagged a metric deviation.
    Anomaly(Anomaly),
    /// A verification failure or failed action advanced the ladder.
    Escalation { from: ActionType },
}

impl TriggerReason {
    /// Trigger-reason string recorded on the action row.
    pub fn as_reason_str(&self) -> &'static str {
        match self {
            Self::HeartbeatTimeout => crate::constants::trigger_reasons::HEARTBEAT_TIMEOUT,
            Self::Anomaly(_) => crate::constants::trigger_reasons::ANOMALY,
            Self::Escalation { .. } => crate::constants::trigger_reasons::ESCALATION,
        }
    }
}

/// A unit of work for the optimization engine, delivered over its channel.
#[derive(Debug, Clone)]
pub struct OptimizationTrigger {
    /// `None` for system-wide triggers.
    pub agent_id: Option<String>,
    pub reason: TriggerReason,
    /// Shared with the SystemEvents of the causal chain that produced this
    /// trigger.
    pub correlation_id: Uuid,
    pub triggered_at: DateTime<Utc>,
}
