//! # Optimization Engine
//!
//! Applies the selected remediation under a per-`(agent, action)` cooldown.
//! A request landing inside the cooldown is recorded as `skipped_cooldown`
//! and does not advance any escalation timer. Applied actions are verified
//! after a grace period: restored health emits `recovery_succeeded`; a still-
//! unhealthy agent advances the ladder (`soft_recovery -> hard_restart ->
//! escalate_alert`). Every action is idempotent - asking an already-
//! recovering agent to soft-recover reports success without re-invoking it.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::actions::{remediation_steps, select_action, RecoveryDelegate};
use super::{OptimizationTrigger, TriggerReason};
use crate::constants::{event_types, SYSTEM_SCOPE};
use crate::database::store::CoordinationStore;
use crate::error::Result;
use crate::events::recorder::EventRecorder;
use crate::models::core::optimization_action::{ActionStatus, ActionType, OptimizationAction};
use crate::models::core::system_event::{EventSeverity, NewSystemEvent};
use crate::registry::agent_registry::AgentRegistry;
use crate::resilience::retry::{with_retry, RetryPolicy};
use crate::state_machine::states::AgentState;

/// An applied action awaiting its post-grace health check.
#[derive(Debug, Clone)]
struct PendingVerification {
    agent_id: Option<String>,
    action_type: ActionType,
    applied_at: DateTime<Utc>,
    correlation_id: Uuid,
}

pub struct OptimizationEngine {
    registry: Arc<AgentRegistry>,
    store: Arc<dyn CoordinationStore>,
    recorder: Arc<EventRecorder>,
    delegate: Arc<dyn RecoveryDelegate>,
    cooldown: chrono::Duration,
    grace: chrono::Duration,
    retry: RetryPolicy,
    /// Last applied instant per `(agent scope, action)`.
    cooldowns: DashMap<(String, ActionType), DateTime<Utc>>,
    /// Tiers whose application or verification failed, with when. Entries
    /// inside the cooldown window route new triggers to the next tier.
    failed_tiers: DashMap<(String, ActionType), DateTime<Utc>>,
    pending: Mutex<Vec<PendingVerification>>,
}

impl OptimizationEngine {
    pub fn new(
        registry: Arc<AgentRegistry>,
        store: Arc<dyn CoordinationStore>,
        recorder: Arc<EventRecorder>,
        delegate: Arc<dyn RecoveryDelegate>,
        config: &crate::config::CoordinatorConfig,
    ) -> Self {
        Self {
            registry,
            store,
            recorder,
            delegate,
            cooldown: config.cooldown(),
            grace: config.verification_grace(),
            retry: RetryPolicy::new(config.store_retry_attempts),
            cooldowns: DashMap::new(),
            failed_tiers: DashMap::new(),
            pending: Mutex::new(Vec::new()),
        }
    }

    fn scope_key(agent_id: Option<&str>) -> String {
        agent_id.unwrap_or(SYSTEM_SCOPE).to_string()
    }

    /// Process one trigger: select, resolve the escalation tier, enforce
    /// cooldown, apply, and schedule verification.
    pub async fn handle_trigger(&self, trigger: &OptimizationTrigger, now: DateTime<Utc>) {
        let agent_operational = match trigger.agent_id.as_deref() {
            Some(agent_id) => self
                .registry
                .get(agent_id)
                .map(|a| a.state.is_operational())
                .unwrap_or(false),
            None => true,
        };

        let Some(base_action) = select_action(&trigger.reason, agent_operational) else {
            debug!(
                agent_id = trigger.agent_id.as_deref(),
                correlation_id = %trigger.correlation_id,
                "trigger selects no action"
            );
            return;
        };

        let scope = Self::scope_key(trigger.agent_id.as_deref());
        let action_type = self.resolve_tier(&scope, base_action, now);

        self.apply(trigger, action_type, now).await;
    }

    /// Walk the ladder past tiers that already failed recently. An agent
    /// whose `soft_recovery` failed verification gets `hard_restart` on the
    /// next trigger, never another `soft_recovery`.
    fn resolve_tier(&self, scope: &str, base: ActionType, now: DateTime<Utc>) -> ActionType {
        let mut action = base;
        loop {
            let failed_recently = self
                .failed_tiers
                .get(&(scope.to_string(), action))
                .map_or(false, |failed_at| now - *failed_at < self.cooldown);
            if !failed_recently {
                return action;
            }
            match action.next_escalation() {
                Some(next) => action = next,
                None => return action,
            }
        }
    }

    async fn apply(&self, trigger: &OptimizationTrigger, action_type: ActionType, now: DateTime<Utc>) {
        let scope = Self::scope_key(trigger.agent_id.as_deref());
        let cooldown_key = (scope.clone(), action_type);

        // Cooldown gate: record the suppressed request, advance nothing.
        let in_cooldown = self
            .cooldowns
            .get(&cooldown_key)
            .map_or(false, |applied_at| now - *applied_at < self.cooldown);
        if in_cooldown {
            self.record_skipped(trigger, action_type, now).await;
            return;
        }

        let mut action = OptimizationAction::request(
            trigger.agent_id.clone(),
            action_type,
            trigger.reason.as_reason_str(),
            Some(trigger.correlation_id),
            now,
        );
        self.persist_action(&action).await;

        // Idempotency: soft-recovering an agent already mid-recovery is a
        // successful no-op. Harder tiers always reach the agent.
        let already_recovering = action_type == ActionType::SoftRecovery
            && trigger
                .agent_id
                .as_deref()
                .and_then(|id| self.registry.get(id).ok())
                .map_or(false, |a| a.state == AgentState::Recovering);

        let outcome = if already_recovering {
            Ok(true)
        } else {
            self.mark_recovering(trigger, action_type, now).await;
            self.delegate
                .invoke_recovery(&scope, action_type)
                .await
        };

        match outcome {
            Ok(true) => {
                info!(
                    agent_id = trigger.agent_id.as_deref(),
                    action = %action_type,
                    correlation_id = %trigger.correlation_id,
                    "recovery action applied"
                );
                action.status = ActionStatus::Applied;
                action.applied_at = Some(now);
                action.result_summary = Some(remediation_steps(action_type).join("; "));
                self.persist_action_status(&action).await;
                self.cooldowns.insert(cooldown_key, now);

                self.recorder
                    .record(
                        self.action_event(event_types::ACTION_APPLIED, EventSeverity::Info, trigger, action_type, now),
                    )
                    .await;

                // The alert tier is terminal; there is nothing to verify and
                // no further automatic escalation.
                if action_type != ActionType::EscalateAlert {
                    self.pending.lock().push(PendingVerification {
                        agent_id: trigger.agent_id.clone(),
                        action_type,
                        applied_at: now,
                        correlation_id: trigger.correlation_id,
                    });
                }
            }
            Ok(false) | Err(_) => {
                if let Err(err) = &outcome {
                    error!(
                        agent_id = trigger.agent_id.as_deref(),
                        action = %action_type,
                        error = %err,
                        "recovery invocation failed"
                    );
                }
                action.status = ActionStatus::Failed;
                action.result_summary = Some("recovery endpoint declined or failed".to_string());
                self.persist_action_status(&action).await;
                self.failed_tiers.insert((scope.clone(), action_type), now);

                self.recorder
                    .record(
                        self.action_event(event_types::ACTION_FAILED, EventSeverity::Error, trigger, action_type, now),
                    )
                    .await;

                self.escalate_from(trigger, action_type, now).await;
            }
        }
    }

    /// Post-grace verification sweep. Due entries either close out with
    /// `recovery_succeeded` or advance the ladder.
    pub async fn run_verifications(&self, now: DateTime<Utc>) {
        let due: Vec<PendingVerification> = {
            let mut pending = self.pending.lock();
            let (due, remaining): (Vec<_>, Vec<_>) = pending
                .drain(..)
                .partition(|p| now - p.applied_at >= self.grace);
            *pending = remaining;
            due
        };

        for verification in due {
            let healthy = match verification.agent_id.as_deref() {
                Some(agent_id) => self
                    .registry
                    .get(agent_id)
                    .map(|a| a.state.is_operational())
                    .unwrap_or(false),
                // System-scope actions have no single agent to probe; the
                // absence of fresh system-scope triggers is the signal.
                None => true,
            };

            let scope = Self::scope_key(verification.agent_id.as_deref());

            if healthy {
                info!(
                    agent_id = verification.agent_id.as_deref(),
                    action = %verification.action_type,
                    correlation_id = %verification.correlation_id,
                    "recovery verified"
                );
                // Outage resolved; re-arm every tier for the next incident.
                for action in [
                    ActionType::SoftRecovery,
                    ActionType::HardRestart,
                    ActionType::ResourceTune,
                    ActionType::EscalateAlert,
                ] {
                    self.failed_tiers.remove(&(scope.clone(), action));
                }

                let mut event = NewSystemEvent::new(
                    event_types::RECOVERY_SUCCEEDED,
                    EventSeverity::Info,
                    now,
                )
                .correlated(verification.correlation_id)
                .with_context(serde_json::json!({
                    "action_type": verification.action_type.to_string(),
                }));
                if let Some(agent_id) = &verification.agent_id {
                    event = event.for_agent(agent_id.clone());
                }
                self.recorder.record(event).await;
            } else {
                warn!(
                    agent_id = verification.agent_id.as_deref(),
                    action = %verification.action_type,
                    correlation_id = %verification.correlation_id,
                    "recovery verification failed, escalating"
                );
                self.failed_tiers
                    .insert((scope, verification.action_type), now);

                let mut event = NewSystemEvent::new(
                    event_types::RECOVERY_ESCALATED,
                    EventSeverity::Error,
                    now,
                )
                .correlated(verification.correlation_id)
                .with_context(serde_json::json!({
                    "action_type": verification.action_type.to_string(),
                }));
                if let Some(agent_id) = &verification.agent_id {
                    event = event.for_agent(agent_id.clone());
                }
                self.recorder.record(event).await;

                let trigger = OptimizationTrigger {
                    agent_id: verification.agent_id.clone(),
                    reason: TriggerReason::Escalation {
                        from: verification.action_type,
                    },
                    correlation_id: verification.correlation_id,
                    triggered_at: now,
                };
                self.handle_trigger(&trigger, now).await;
            }
        }
    }

    pub fn pending_verifications(&self) -> usize {
        self.pending.lock().len()
    }

    async fn escalate_from(&self, trigger: &OptimizationTrigger, from: ActionType, now: DateTime<Utc>) {
        if from.next_escalation().is_none() {
            return;
        }
        let escalated = OptimizationTrigger {
            agent_id: trigger.agent_id.clone(),
            reason: TriggerReason::Escalation { from },
            correlation_id: trigger.correlation_id,
            triggered_at: now,
        };
        // The ladder is three tiers deep, so this recursion is bounded.
        Box::pin(self.handle_trigger(&escalated, now)).await;
    }

    async fn mark_recovering(&self, trigger: &OptimizationTrigger, action_type: ActionType, now: DateTime<Utc>) {
        if !matches!(action_type, ActionType::SoftRecovery | ActionType::HardRestart) {
            return;
        }
        let Some(agent_id) = trigger.agent_id.as_deref() else {
            return;
        };
        let Ok(agent) = self.registry.get(agent_id) else {
            return;
        };
        if agent.state != AgentState::Error {
            return;
        }

        if let Err(err) = self
            .registry
            .transition_correlated(
                agent_id,
                AgentState::Error,
                AgentState::Recovering,
                Some(trigger.correlation_id),
                now,
            )
            .await
        {
            // A concurrent pass (or a recovery heartbeat) moved it first.
            debug!(agent_id = %agent_id, error = %err, "recovering transition skipped");
        }
    }

    async fn record_skipped(&self, trigger: &OptimizationTrigger, action_type: ActionType, now: DateTime<Utc>) {
        debug!(
            agent_id = trigger.agent_id.as_deref(),
            action = %action_type,
            "action suppressed by cooldown"
        );

        let mut action = OptimizationAction::request(
            trigger.agent_id.clone(),
            action_type,
            trigger.reason.as_reason_str(),
            Some(trigger.correlation_id),
            now,
        );
        action.status = ActionStatus::SkippedCooldown;
        action.result_summary = Some("within cooldown window".to_string());
        self.persist_action(&action).await;

        self.recorder
            .record(self.action_event(
                event_types::ACTION_SKIPPED_COOLDOWN,
                EventSeverity::Info,
                trigger,
                action_type,
                now,
            ))
            .await;
    }

    fn action_event(
        &self,
        event_type: &str,
        severity: EventSeverity,
        trigger: &OptimizationTrigger,
        action_type: ActionType,
        now: DateTime<Utc>,
    ) -> NewSystemEvent {
        let mut event = NewSystemEvent::new(event_type, severity, now)
            .correlated(trigger.correlation_id)
            .with_context(serde_json::json!({
                "action_type": action_type.to_string(),
                "trigger_reason": trigger.reason.as_reason_str(),
            }));
        if let Some(agent_id) = &trigger.agent_id {
            event = event.for_agent(agent_id.clone());
        }
        event
    }

    async fn persist_action(&self, action: &OptimizationAction) {
        let result: Result<()> = with_retry(&self.retry, "append_action", || {
            let store = self.store.clone();
            let action = action.clone();
            async move { store.append_action(&action).await }
        })
        .await;

        if let Err(err) = result {
            warn!(action_id = %action.action_id, error = %err, "action persistence failed");
            self.recorder.store_health().record_failure();
        }
    }

    async fn persist_action_status(&self, action: &OptimizationAction) {
        let result: Result<()> = with_retry(&self.retry, "update_action_status", || {
            let store = self.store.clone();
            let action = action.clone();
            async move {
                store
                    .update_action_status(
                        action.action_id,
                        action.status,
                        action.applied_at,
                        action.result_summary.clone(),
                    )
                    .await
            }
        })
        .await;

        if let Err(err) = result {
            warn!(action_id = %action.action_id, error = %err, "action status persistence failed");
            self.recorder.store_health().record_failure();
        }
    }
}
