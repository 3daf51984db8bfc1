//! # Agent Registry
//!
//! Source of truth for "who exists" and "what state". Registration is
//! idempotent, state changes are optimistic compare-and-swap, and heartbeat
//! ingestion is commutative (max-wins `last_seen`). The registry writes
//! through to the durable store; a transient store failure during a control-
//! loop mutation degrades to in-memory-only until the store heals, it never
//! blocks or fails the tick.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::constants::event_types;
use crate::database::store::CoordinationStore;
use crate::error::{CoordinatorError, Result};
use crate::events::recorder::EventRecorder;
use crate::models::core::agent::{Agent, NewAgent};
use crate::models::core::agent_heartbeat::HeartbeatReport;
use crate::models::core::system_event::{EventSeverity, NewSystemEvent};
use crate::resilience::retry::{with_retry, RetryPolicy};
use crate::state_machine::states::AgentState;
use crate::state_machine::transitions::is_valid_transition;

/// Per-agent liveness bookkeeping maintained alongside the agent record.
/// In-memory only; rebuilt from zero after a coordinator restart.
#[derive(Debug, Clone, Copy, Default)]
pub struct LivenessMeta {
    /// Consecutive monitor ticks without a heartbeat.
    pub missed_ticks: u32,
    /// Whether the overdue warning for the current outage already fired.
    pub warned: bool,
    /// Whether the staleness escalation for the current outage already fired.
    pub escalated: bool,
}

struct AgentEntry {
    agent: Agent,
    liveness: LivenessMeta,
}

/// Authoritative agent registry with compare-and-swap transitions.
pub struct AgentRegistry {
    agents: DashMap<String, AgentEntry>,
    store: Arc<dyn CoordinationStore>,
    recorder: Arc<EventRecorder>,
    retry: RetryPolicy,
}

impl AgentRegistry {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        recorder: Arc<EventRecorder>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            agents: DashMap::new(),
            store,
            recorder,
            retry,
        }
    }

    /// Load the persisted fleet into memory at coordinator startup.
    pub async fn hydrate(&self) -> Result<usize> {
        let agents = with_retry(&self.retry, "load_agents", || {
            let store = self.store.clone();
            async move { store.load_agents().await }
        })
        .await?;

        let count = agents.len();
        for agent in agents {
            self.agents.insert(
                agent.agent_id.clone(),
                AgentEntry {
                    agent,
                    liveness: LivenessMeta::default(),
                },
            );
        }

        info!(agent_count = count, "registry hydrated from store");
        Ok(count)
    }

    /// Idempotent registration. A new id is created in `Starting`;
    /// re-registering updates metadata but not state, except from `Shutdown`
    /// which resets the lifecycle to `Starting`. Registering identical
    /// metadata twice is a no-op and emits no duplicate event.
    pub async fn register(&self, new_agent: NewAgent, now: DateTime<Utc>) -> Result<Agent> {
        enum Outcome {
            Created,
            Reset(AgentState),
            MetadataUpdated,
            Unchanged,
        }

        let (snapshot, outcome) = match self.agents.entry(new_agent.agent_id.clone()) {
            dashmap::Entry::Vacant(slot) => {
                let entry = slot.insert(AgentEntry {
                    agent: Agent {
                        agent_id: new_agent.agent_id.clone(),
                        agent_type: new_agent.agent_type.clone(),
                        capabilities: new_agent.capabilities.clone(),
                        configuration: new_agent.configuration.clone(),
                        state: AgentState::Starting,
                        created_at: now,
                        updated_at: now,
                        last_seen: None,
                    },
                    liveness: LivenessMeta::default(),
                });
                (entry.agent.clone(), Outcome::Created)
            }
            dashmap::Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                let agent = &mut entry.agent;
                let outcome = if agent.state == AgentState::Shutdown {
                    let from = agent.state;
                    agent.agent_type = new_agent.agent_type.clone();
                    agent.capabilities = new_agent.capabilities.clone();
                    agent.configuration = new_agent.configuration.clone();
                    agent.state = AgentState::Starting;
                    agent.updated_at = now;
                    entry.liveness = LivenessMeta::default();
                    Outcome::Reset(from)
                } else if agent.agent_type == new_agent.agent_type
                    && agent.capabilities == new_agent.capabilities
                    && agent.configuration == new_agent.configuration
                {
                    Outcome::Unchanged
                } else {
                    agent.agent_type = new_agent.agent_type.clone();
                    agent.capabilities = new_agent.capabilities.clone();
                    agent.configuration = new_agent.configuration.clone();
                    agent.updated_at = now;
                    Outcome::MetadataUpdated
                };

                (entry.agent.clone(), outcome)
            }
        };

        if matches!(outcome, Outcome::Unchanged) {
            debug!(agent_id = %snapshot.agent_id, "re-registration with identical metadata");
            return Ok(snapshot);
        }

        // Registration is an ingress call; a store failure here is the
        // caller's to retry, unlike control-loop writes.
        let persisted = with_retry(&self.retry, "upsert_agent", || {
            let store = self.store.clone();
            let agent = snapshot.clone();
            async move { store.upsert_agent(&agent).await }
        })
        .await?;

        match outcome {
            Outcome::Created => {
                info!(
                    agent_id = %persisted.agent_id,
                    agent_type = %persisted.agent_type,
                    "agent registered"
                );
                self.recorder
                    .record(
                        NewSystemEvent::new(event_types::AGENT_REGISTERED, EventSeverity::Info, now)
                            .for_agent(persisted.agent_id.clone())
                            .with_context(serde_json::json!({
                                "agent_type": persisted.agent_type,
                                "capabilities": persisted.capabilities,
                            })),
                    )
                    .await;
            }
            Outcome::Reset(from) => {
                self.record_transition_event(&persisted.agent_id, from, AgentState::Starting, None, now)
                    .await;
            }
            Outcome::MetadataUpdated | Outcome::Unchanged => {}
        }

        Ok(persisted)
    }

    /// Optimistic compare-and-swap transition. Exactly one of two concurrent
    /// callers with the same `expected` wins; the loser gets `StaleState` and
    /// must re-read.
    pub async fn transition(
        &self,
        agent_id: &str,
        expected: AgentState,
        new_state: AgentState,
    ) -> Result<Agent> {
        self.transition_correlated(agent_id, expected, new_state, None, Utc::now())
            .await
    }

    /// CAS transition carrying the caller's correlation id into the audit
    /// trail (heartbeat miss -> anomaly -> action chains).
    pub async fn transition_correlated(
        &self,
        agent_id: &str,
        expected: AgentState,
        new_state: AgentState,
        correlation_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Agent> {
        if !is_valid_transition(expected, new_state) {
            return Err(CoordinatorError::InvalidTransition {
                from: expected,
                to: new_state,
            });
        }

        let snapshot = {
            let mut entry = self
                .agents
                .get_mut(agent_id)
                .ok_or_else(|| CoordinatorError::NotFound(agent_id.to_string()))?;

            if entry.agent.state != expected {
                return Err(CoordinatorError::StaleState {
                    agent_id: agent_id.to_string(),
                    expected,
                    actual: entry.agent.state,
                });
            }

            entry.agent.state = new_state;
            entry.agent.updated_at = now;
            entry.agent.clone()
        };

        self.persist_state(agent_id, new_state, now).await;
        self.record_transition_event(agent_id, expected, new_state, correlation_id, now)
            .await;

        Ok(snapshot)
    }

    /// Ingest a heartbeat: max-wins `last_seen`, liveness counters reset, and
    /// recovery-by-heartbeat (`Starting|Error|Recovering -> Active`).
    pub async fn record_heartbeat(&self, report: &HeartbeatReport, now: DateTime<Utc>) -> Result<Agent> {
        let report = report.clone().clamped();

        let (snapshot, recovered_from) = {
            let mut entry = self
                .agents
                .get_mut(&report.agent_id)
                .ok_or_else(|| CoordinatorError::NotFound(report.agent_id.clone()))?;

            let last_seen = entry.agent.last_seen;
            entry.agent.last_seen = Some(match last_seen {
                Some(seen) => seen.max(report.timestamp),
                None => report.timestamp,
            });
            entry.liveness = LivenessMeta::default();

            let recovered_from = match entry.agent.state {
                AgentState::Error | AgentState::Recovering | AgentState::Starting => {
                    let from = entry.agent.state;
                    entry.agent.state = AgentState::Active;
                    entry.agent.updated_at = now;
                    Some(from)
                }
                _ => None,
            };

            (entry.agent.clone(), recovered_from)
        };

        // Heartbeat persistence is best-effort: the in-memory record already
        // advanced, and the store trigger will catch up on the next beat.
        let persist = with_retry(&self.retry, "append_heartbeat", || {
            let store = self.store.clone();
            let report = report.clone();
            async move {
                store.append_heartbeat(&report).await?;
                store.touch_last_seen(&report.agent_id, report.timestamp).await
            }
        })
        .await;
        if let Err(err) = persist {
            warn!(agent_id = %report.agent_id, error = %err, "heartbeat persistence failed");
            self.recorder.store_health().record_failure();
        } else {
            self.recorder.store_health().record_success();
        }

        if let Some(from) = recovered_from {
            self.persist_state(&report.agent_id, AgentState::Active, now).await;
            self.record_transition_event(&report.agent_id, from, AgentState::Active, None, now)
                .await;
            if from != AgentState::Starting {
                self.recorder
                    .record(
                        NewSystemEvent::new(
                            event_types::HEARTBEAT_RECOVERED,
                            EventSeverity::Info,
                            now,
                        )
                        .for_agent(report.agent_id.clone())
                        .with_context(serde_json::json!({ "recovered_from": from.to_string() })),
                    )
                    .await;
            }
        }

        Ok(snapshot)
    }

    /// Soft removal: drive the agent to `Shutdown` and keep the record for
    /// audit.
    pub async fn deregister(&self, agent_id: &str, now: DateTime<Utc>) -> Result<Agent> {
        let current = self.get(agent_id)?;
        if current.state == AgentState::Shutdown {
            return Ok(current);
        }

        if current.state != AgentState::Stopping {
            self.transition_correlated(agent_id, current.state, AgentState::Stopping, None, now)
                .await?;
        }
        let agent = self
            .transition_correlated(agent_id, AgentState::Stopping, AgentState::Shutdown, None, now)
            .await?;

        self.recorder
            .record(
                NewSystemEvent::new(event_types::AGENT_DEREGISTERED, EventSeverity::Info, now)
                    .for_agent(agent_id.to_string()),
            )
            .await;

        Ok(agent)
    }

    pub fn get(&self, agent_id: &str) -> Result<Agent> {
        self.agents
            .get(agent_id)
            .map(|e| e.agent.clone())
            .ok_or_else(|| CoordinatorError::NotFound(agent_id.to_string()))
    }

    pub fn list(&self, filter_by_state: Option<AgentState>) -> Vec<Agent> {
        let mut agents: Vec<Agent> = self
            .agents
            .iter()
            .filter(|e| filter_by_state.map_or(true, |s| e.agent.state == s))
            .map(|e| e.agent.clone())
            .collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        agents
    }

    pub fn liveness(&self, agent_id: &str) -> Option<LivenessMeta> {
        self.agents.get(agent_id).map(|e| e.liveness)
    }

    /// Monitor tick bookkeeping: bump the missed counter, returning the new
    /// count.
    pub fn bump_missed_ticks(&self, agent_id: &str) -> u32 {
        match self.agents.get_mut(agent_id) {
            Some(mut entry) => {
                entry.liveness.missed_ticks = entry.liveness.missed_ticks.saturating_add(1);
                entry.liveness.missed_ticks
            }
            None => 0,
        }
    }

    /// Latch the overdue warning for the current outage. Returns false if it
    /// had already fired.
    pub fn mark_warned(&self, agent_id: &str) -> bool {
        match self.agents.get_mut(agent_id) {
            Some(mut entry) if !entry.liveness.warned => {
                entry.liveness.warned = true;
                true
            }
            _ => false,
        }
    }

    /// Latch the escalation for the current outage. Returns false if it had
    /// already fired, so staleness produces exactly one recovery request.
    pub fn mark_escalated(&self, agent_id: &str) -> bool {
        match self.agents.get_mut(agent_id) {
            Some(mut entry) if !entry.liveness.escalated => {
                entry.liveness.escalated = true;
                true
            }
            _ => false,
        }
    }

    async fn persist_state(&self, agent_id: &str, state: AgentState, now: DateTime<Utc>) {
        let result = with_retry(&self.retry, "update_agent_state", || {
            let store = self.store.clone();
            let agent_id = agent_id.to_string();
            async move { store.update_agent_state(&agent_id, state, now).await }
        })
        .await;

        match result {
            Ok(()) => self.recorder.store_health().record_success(),
            Err(err) => {
                // In-memory state is authoritative for the control loop; the
                // durable copy converges on the next successful write.
                warn!(agent_id = %agent_id, state = %state, error = %err, "state persistence failed");
                self.recorder.store_health().record_failure();
            }
        }
    }

    async fn record_transition_event(
        &self,
        agent_id: &str,
        from: AgentState,
        to: AgentState,
        correlation_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) {
        let severity = if to == AgentState::Error {
            EventSeverity::Error
        } else {
            EventSeverity::Info
        };

        let mut event = NewSystemEvent::new(event_types::STATE_TRANSITION, severity, now)
            .for_agent(agent_id.to_string())
            .with_context(serde_json::json!({
                "from": from.to_string(),
                "to": to.to_string(),
            }));
        if let Some(correlation_id) = correlation_id {
            event = event.correlated(correlation_id);
        }

        self.recorder.record(event).await;
    }
}
