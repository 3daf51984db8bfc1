use crate::state_machine::states::AgentState;

/// Crate-wide error taxonomy for the coordination engine.
///
/// Recovery semantics:
/// - `StaleState` is an optimistic-concurrency conflict; callers re-read the
///   agent and retry the transition.
/// - `TransientStore` is retried with backoff and then treated as a
///   degraded-mode signal, never a crash.
/// - `Configuration` is fatal at startup, before the control loop runs.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// Optimistic-concurrency conflict: the stored state no longer matches
    /// what the caller observed.
    #[error("stale state for agent '{agent_id}': expected {expected}, found {actual}")]
    StaleState {
        agent_id: String,
        expected: AgentState,
        actual: AgentState,
    },

    /// Unknown agent id. Surfaced to the caller, not retried.
    #[error("agent '{0}' is not registered")]
    NotFound(String),

    /// The requested transition is not in the state machine's graph.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: AgentState, to: AgentState },

    /// Database timeout or connection loss. Retried with backoff; a sustained
    /// run of these marks the persistence layer itself unhealthy.
    #[error("transient store failure: {0}")]
    TransientStore(String),

    /// The agent's recovery endpoint declined or failed the action; the
    /// optimization engine advances to the next escalation tier.
    #[error("recovery action '{action}' failed for agent '{agent_id}'")]
    RecoveryActionFailed { agent_id: String, action: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("event publish error: {0}")]
    Event(#[from] crate::events::publisher::PublishError),
}

impl From<sqlx::Error> for CoordinatorError {
    fn from(err: sqlx::Error) -> Self {
        CoordinatorError::TransientStore(err.to_string())
    }
}

impl From<serde_json::Error> for CoordinatorError {
    fn from(err: serde_json::Error) -> Self {
        CoordinatorError::TransientStore(format!("payload serialization: {err}"))
    }
}

impl CoordinatorError {
    /// Transient failures are the only class the control loop retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoordinatorError::TransientStore(_))
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
