//! Recovery engine behavior: cooldown suppression, the escalation ladder,
//! verification outcomes, and action idempotency.

mod common;

use chrono::{DateTime, Duration, Utc};
use common::{build_registry, test_config, InMemoryStore, ScriptedDelegate};
use overseer_core::models::core::agent::NewAgent;
use overseer_core::models::core::agent_heartbeat::HeartbeatReport;
use overseer_core::models::core::optimization_action::{ActionStatus, ActionType};
use overseer_core::models::core::system_event::EventSeverity;
use overseer_core::monitoring::anomaly_detector::Anomaly;
use overseer_core::optimization::engine::OptimizationEngine;
use overseer_core::optimization::{OptimizationTrigger, TriggerReason};
use overseer_core::state_machine::states::AgentState;
use std::sync::Arc;
use uuid::Uuid;

struct Fixture {
    store: Arc<InMemoryStore>,
    registry: Arc<overseer_core::registry::agent_registry::AgentRegistry>,
    delegate: Arc<ScriptedDelegate>,
    engine: OptimizationEngine,
}

fn fixture() -> Fixture {
    let store = InMemoryStore::new();
    let (registry, recorder) = build_registry(store.clone());
    let delegate = ScriptedDelegate::new();
    let engine = OptimizationEngine::new(
        registry.clone(),
        store.clone(),
        recorder,
        delegate.clone(),
        &test_config(),
    );
    Fixture {
        store,
        registry,
        delegate,
        engine,
    }
}

/// Register an agent and drive it into `Error`, as the heartbeat monitor
/// would before handing the engine a timeout trigger.
async fn register_errored(fx: &Fixture, agent_id: &str, at: DateTime<Utc>) {
    fx.registry
        .register(NewAgent::new(agent_id, "ingest"), at)
        .await
        .unwrap();
    fx.registry
        .record_heartbeat(&HeartbeatReport::new(agent_id, at), at)
        .await
        .unwrap();
    fx.registry
        .transition(agent_id, AgentState::Active, AgentState::Error)
        .await
        .unwrap();
}

fn timeout_trigger(agent_id: &str, at: DateTime<Utc>) -> OptimizationTrigger {
    OptimizationTrigger {
        agent_id: Some(agent_id.to_string()),
        reason: TriggerReason::HeartbeatTimeout,
        correlation_id: Uuid::new_v4(),
        triggered_at: at,
    }
}

fn resource_anomaly_trigger(
    agent_id: Option<&str>,
    metric: &str,
    severity: EventSeverity,
    at: DateTime<Utc>,
) -> OptimizationTrigger {
    OptimizationTrigger {
        agent_id: agent_id.map(str::to_string),
        reason: TriggerReason::Anomaly(Anomaly {
            agent_id: agent_id.map(str::to_string),
            metric_name: metric.to_string(),
            observed_value: 97.0,
            baseline_mean: 40.0,
            baseline_stddev: 5.0,
            z_score: 11.4,
            severity,
            detected_at: at,
        }),
        correlation_id: Uuid::new_v4(),
        triggered_at: at,
    }
}

#[tokio::test]
async fn test_heartbeat_timeout_applies_soft_recovery() {
    let fx = fixture();
    let now = Utc::now();
    register_errored(&fx, "w-1", now).await;

    fx.engine.handle_trigger(&timeout_trigger("w-1", now), now).await;

    let applied = fx.store.actions_with_status(ActionStatus::Applied);
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].action_type, ActionType::SoftRecovery);
    assert_eq!(applied[0].trigger_reason, "heartbeat_timeout");
    assert_eq!(fx.delegate.invocation_count(ActionType::SoftRecovery), 1);
    // The engine moved the errored agent into Recovering before invoking.
    assert_eq!(fx.registry.get("w-1").unwrap().state, AgentState::Recovering);
    assert_eq!(fx.engine.pending_verifications(), 1);
}

#[tokio::test]
async fn test_cooldown_suppression_one_applied_one_skipped() {
    let fx = fixture();
    let now = Utc::now();
    register_errored(&fx, "w-1", now).await;

    fx.engine.handle_trigger(&timeout_trigger("w-1", now), now).await;
    // Second trigger inside the 300s cooldown window.
    let later = now + Duration::seconds(30);
    fx.engine
        .handle_trigger(&timeout_trigger("w-1", later), later)
        .await;

    let soft = fx.store.actions_of_type(ActionType::SoftRecovery);
    assert_eq!(soft.len(), 2);
    assert_eq!(
        fx.store.actions_with_status(ActionStatus::Applied).len(),
        1
    );
    assert_eq!(
        fx.store
            .actions_with_status(ActionStatus::SkippedCooldown)
            .len(),
        1
    );
    // The skipped request never reached the agent.
    assert_eq!(fx.delegate.invocation_count(ActionType::SoftRecovery), 1);
    assert_eq!(
        fx.store
            .events_of_type("optimization.action_skipped_cooldown")
            .len(),
        1
    );
}

#[tokio::test]
async fn test_failed_verification_escalates_to_hard_restart() {
    let fx = fixture();
    let now = Utc::now();
    register_errored(&fx, "w-1", now).await;

    fx.engine.handle_trigger(&timeout_trigger("w-1", now), now).await;

    // Grace elapses with the agent still unhealthy (no recovery heartbeat).
    let after_grace = now + Duration::seconds(61);
    fx.engine.run_verifications(after_grace).await;

    let hard = fx.store.actions_of_type(ActionType::HardRestart);
    assert_eq!(hard.len(), 1);
    assert_eq!(hard[0].status, ActionStatus::Applied);
    assert_eq!(fx.delegate.invocation_count(ActionType::HardRestart), 1);
    assert_eq!(
        fx.store.events_of_type("optimization.recovery_escalated").len(),
        1
    );
}

#[tokio::test]
async fn test_next_trigger_after_failed_soft_resolves_to_hard() {
    let fx = fixture();
    let now = Utc::now();
    register_errored(&fx, "w-1", now).await;

    fx.engine.handle_trigger(&timeout_trigger("w-1", now), now).await;
    let after_grace = now + Duration::seconds(61);
    fx.engine.run_verifications(after_grace).await;

    // A fresh timeout trigger now maps to the hard tier, not another soft
    // recovery; the hard restart just applied, so it lands in its cooldown.
    let next = after_grace + Duration::seconds(10);
    fx.engine.handle_trigger(&timeout_trigger("w-1", next), next).await;

    assert_eq!(fx.delegate.invocation_count(ActionType::SoftRecovery), 1);
    let hard = fx.store.actions_of_type(ActionType::HardRestart);
    assert_eq!(hard.len(), 2);
    assert_eq!(
        hard.iter()
            .filter(|a| a.status == ActionStatus::SkippedCooldown)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_ladder_tops_out_at_escalate_alert() {
    let fx = fixture();
    let now = Utc::now();
    register_errored(&fx, "w-1", now).await;

    fx.engine.handle_trigger(&timeout_trigger("w-1", now), now).await;
    // Soft fails verification -> hard applied.
    let t1 = now + Duration::seconds(61);
    fx.engine.run_verifications(t1).await;
    // Hard fails verification -> alert applied; the alert tier is terminal.
    let t2 = t1 + Duration::seconds(61);
    fx.engine.run_verifications(t2).await;

    assert_eq!(fx.delegate.invocation_count(ActionType::EscalateAlert), 1);
    // Nothing left to verify: alerts have no automatic follow-up tier.
    assert_eq!(fx.engine.pending_verifications(), 0);

    let t3 = t2 + Duration::seconds(61);
    fx.engine.run_verifications(t3).await;
    assert_eq!(fx.delegate.invocation_count(ActionType::EscalateAlert), 1);
}

#[tokio::test]
async fn test_successful_verification_emits_recovery_succeeded() {
    let fx = fixture();
    let now = Utc::now();
    register_errored(&fx, "w-1", now).await;

    fx.engine.handle_trigger(&timeout_trigger("w-1", now), now).await;

    // The agent comes back before the grace period ends.
    let beat_at = now + Duration::seconds(30);
    fx.registry
        .record_heartbeat(&HeartbeatReport::new("w-1", beat_at), beat_at)
        .await
        .unwrap();

    let after_grace = now + Duration::seconds(61);
    fx.engine.run_verifications(after_grace).await;

    assert_eq!(
        fx.store.events_of_type("optimization.recovery_succeeded").len(),
        1
    );
    assert!(fx.store.actions_of_type(ActionType::HardRestart).is_empty());
}

#[tokio::test]
async fn test_soft_recovery_on_recovering_agent_is_idempotent_noop() {
    let fx = fixture();
    let now = Utc::now();
    register_errored(&fx, "w-1", now).await;
    fx.registry
        .transition("w-1", AgentState::Error, AgentState::Recovering)
        .await
        .unwrap();

    fx.engine.handle_trigger(&timeout_trigger("w-1", now), now).await;

    // Reported as applied without touching the agent's recovery endpoint.
    let applied = fx.store.actions_with_status(ActionStatus::Applied);
    assert_eq!(applied.len(), 1);
    assert_eq!(fx.delegate.invocation_count(ActionType::SoftRecovery), 0);
}

#[tokio::test]
async fn test_failed_invocation_escalates_immediately() {
    let fx = fixture();
    let now = Utc::now();
    register_errored(&fx, "w-1", now).await;
    fx.delegate.fail_on(ActionType::SoftRecovery);

    fx.engine.handle_trigger(&timeout_trigger("w-1", now), now).await;

    assert_eq!(
        fx.store.actions_with_status(ActionStatus::Failed).len(),
        1
    );
    // The declined soft recovery advanced the ladder in the same pass.
    let hard = fx.store.actions_of_type(ActionType::HardRestart);
    assert_eq!(hard.len(), 1);
    assert_eq!(hard[0].status, ActionStatus::Applied);
    assert_eq!(
        fx.store.events_of_type("optimization.action_failed").len(),
        1
    );
}

#[tokio::test]
async fn test_critical_resource_anomaly_applies_resource_tune() {
    let fx = fixture();
    let now = Utc::now();
    fx.registry
        .register(NewAgent::new("w-1", "ingest"), now)
        .await
        .unwrap();
    fx.registry
        .record_heartbeat(&HeartbeatReport::new("w-1", now), now)
        .await
        .unwrap();

    fx.engine
        .handle_trigger(
            &resource_anomaly_trigger(Some("w-1"), "cpu_percent", EventSeverity::Critical, now),
            now,
        )
        .await;

    let tune = fx.store.actions_of_type(ActionType::ResourceTune);
    assert_eq!(tune.len(), 1);
    assert_eq!(tune[0].status, ActionStatus::Applied);
    assert_eq!(fx.delegate.invocation_count(ActionType::ResourceTune), 1);
    // Resource tuning never touches the lifecycle state.
    assert_eq!(fx.registry.get("w-1").unwrap().state, AgentState::Active);
}

#[tokio::test]
async fn test_resource_anomaly_on_errored_agent_takes_no_action() {
    let fx = fixture();
    let now = Utc::now();
    register_errored(&fx, "w-1", now).await;

    fx.engine
        .handle_trigger(
            &resource_anomaly_trigger(Some("w-1"), "cpu_percent", EventSeverity::Critical, now),
            now,
        )
        .await;

    assert!(fx.store.actions.lock().is_empty());
}

#[tokio::test]
async fn test_warning_anomaly_takes_no_action() {
    let fx = fixture();
    let now = Utc::now();
    fx.registry
        .register(NewAgent::new("w-1", "ingest"), now)
        .await
        .unwrap();
    fx.registry
        .record_heartbeat(&HeartbeatReport::new("w-1", now), now)
        .await
        .unwrap();

    fx.engine
        .handle_trigger(
            &resource_anomaly_trigger(Some("w-1"), "cpu_percent", EventSeverity::Warning, now),
            now,
        )
        .await;

    assert!(fx.store.actions.lock().is_empty());
}

#[tokio::test]
async fn test_system_scope_resource_tune() {
    let fx = fixture();
    let now = Utc::now();

    fx.engine
        .handle_trigger(
            &resource_anomaly_trigger(None, "memory_percent", EventSeverity::Critical, now),
            now,
        )
        .await;

    let tune = fx.store.actions_of_type(ActionType::ResourceTune);
    assert_eq!(tune.len(), 1);
    assert_eq!(tune[0].agent_id, None);
    let invocations = fx.delegate.invocations.lock();
    assert_eq!(invocations[0].0, "system");
}
