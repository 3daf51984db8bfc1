//! # Action Selection & Recovery Delegation
//!
//! The deterministic condition -> action priority table, kept as pure
//! functions so selection is unit-testable and auditable, and the egress
//! seam the engine uses to reach the actual agent process.

use async_trait::async_trait;

use super::TriggerReason;
use crate::constants::builtin_metrics;
use crate::error::Result;
use crate::models::core::optimization_action::ActionType;
use crate::models::core::system_event::EventSeverity;

/// Capability the external agent process implements for recovery. The engine
/// invokes it and records the boolean result; `false` or an error advances
/// the escalation ladder.
#[async_trait]
pub trait RecoveryDelegate: Send + Sync + 'static {
    async fn invoke_recovery(&self, agent_id: &str, action_type: ActionType) -> Result<bool>;
}

/// The priority table. `agent_operational` reflects whether the agent has a
/// concurrent heartbeat problem (non-operational agents belong to the
/// heartbeat escalation path, not resource tuning).
pub fn select_action(reason: &TriggerReason, agent_operational: bool) -> Option<ActionType> {
    match reason {
        TriggerReason::HeartbeatTimeout => Some(ActionType::SoftRecovery),
        TriggerReason::Anomaly(anomaly) => {
            let resource_metric = builtin_metrics::RESOURCE_METRICS
                .contains(&anomaly.metric_name.as_str());
            if anomaly.severity == EventSeverity::Critical && resource_metric && agent_operational {
                Some(ActionType::ResourceTune)
            } else {
                None
            }
        }
        TriggerReason::Escalation { from } => from.next_escalation(),
    }
}

/// Remediation steps per action, recorded in the action's result summary.
pub fn remediation_steps(action: ActionType) -> &'static [&'static str] {
    match action {
        ActionType::SoftRecovery => &[
            "clear agent caches",
            "force memory reclaim",
            "re-probe health endpoint",
        ],
        ActionType::HardRestart => &["stop agent process", "restart agent process"],
        ActionType::ResourceTune => &["reduce batch size", "lower concurrency limits"],
        ActionType::EscalateAlert => &["notify operations channel"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::anomaly_detector::Anomaly;
    use chrono::Utc;

    fn anomaly(metric: &str, severity: EventSeverity) -> TriggerReason {
        TriggerReason::Anomaly(Anomaly {
            agent_id: Some("worker-1".to_string()),
            metric_name: metric.to_string(),
            observed_value: 99.0,
            baseline_mean: 40.0,
            baseline_stddev: 5.0,
            z_score: 11.8,
            severity,
            detected_at: Utc::now(),
        })
    }

    #[test]
    fn test_heartbeat_timeout_selects_soft_recovery() {
        assert_eq!(
            select_action(&TriggerReason::HeartbeatTimeout, false),
            Some(ActionType::SoftRecovery)
        );
    }

    #[test]
    fn test_critical_resource_anomaly_selects_resource_tune() {
        assert_eq!(
            select_action(&anomaly("cpu_percent", EventSeverity::Critical), true),
            Some(ActionType::ResourceTune)
        );
        assert_eq!(
            select_action(&anomaly("memory_percent", EventSeverity::Critical), true),
            Some(ActionType::ResourceTune)
        );
    }

    #[test]
    fn test_resource_tune_requires_healthy_heartbeat() {
        // An agent with a concurrent heartbeat problem belongs to the
        // recovery ladder, not resource tuning.
        assert_eq!(
            select_action(&anomaly("cpu_percent", EventSeverity::Critical), false),
            None
        );
    }

    #[test]
    fn test_warning_anomalies_take_no_action() {
        assert_eq!(
            select_action(&anomaly("cpu_percent", EventSeverity::Warning), true),
            None
        );
    }

    #[test]
    fn test_non_resource_anomalies_take_no_action() {
        assert_eq!(
            select_action(&anomaly("latency_ms", EventSeverity::Critical), true),
            None
        );
    }

    #[test]
    fn test_escalation_walks_the_ladder() {
        assert_eq!(
            select_action(
                &TriggerReason::Escalation {
                    from: ActionType::SoftRecovery
                },
                false
            ),
            Some(ActionType::HardRestart)
        );
        assert_eq!(
            select_action(
                &TriggerReason::Escalation {
                    from: ActionType::HardRestart
                },
                false
            ),
            Some(ActionType::EscalateAlert)
        );
        assert_eq!(
            select_action(
                &TriggerReason::Escalation {
                    from: ActionType::EscalateAlert
                },
                false
            ),
            None
        );
    }
}
