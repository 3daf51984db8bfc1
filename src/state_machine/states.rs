use serde::{Deserialize, Serialize};
use std::fmt;

/// Agent lifecycle states.
///
/// `Active`, `Busy`, and `Idle` are the operational band an agent cycles
/// through while healthy. `Error`/`Recovering` is the recovery loop driven by
/// the heartbeat monitor and optimization engine. `Shutdown` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Registered but not yet started
    Inactive,
    /// Bootstrapping; first heartbeat pending
    Starting,
    /// Operational and accepting work
    Active,
    /// Operational, currently processing work
    Busy,
    /// Operational with no work queued
    Idle,
    /// Temporarily out of rotation for planned maintenance
    Maintenance,
    /// Unhealthy; recovery actions eligible
    Error,
    /// A recovery action is in flight
    Recovering,
    /// Full reset requested after failed recovery
    Resetting,
    /// Graceful stop in progress
    Stopping,
    /// Deregistered; retained for audit only
    Shutdown,
}

impl AgentState {
    /// Terminal states permit no further transitions except re-registration.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Shutdown)
    }

    /// Operational band: the agent is healthy and in rotation.
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Active | Self::Busy | Self::Idle)
    }

    /// Error band: the recovery loop owns agents in these states.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error | Self::Recovering | Self::Resetting)
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::Inactive
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "inactive"),
            Self::Starting => write!(f, "starting"),
            Self::Active => write!(f, "active"),
            Self::Busy => write!(f, "busy"),
            Self::Idle => write!(f, "idle"),
            Self::Maintenance => write!(f, "maintenance"),
            Self::Error => write!(f, "error"),
            Self::Recovering => write!(f, "recovering"),
            Self::Resetting => write!(f, "resetting"),
            Self::Stopping => write!(f, "stopping"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

impl std::str::FromStr for AgentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inactive" => Ok(Self::Inactive),
            "starting" => Ok(Self::Starting),
            "active" => Ok(Self::Active),
            "busy" => Ok(Self::Busy),
            "idle" => Ok(Self::Idle),
            "maintenance" => Ok(Self::Maintenance),
            "error" => Ok(Self::Error),
            "recovering" => Ok(Self::Recovering),
            "resetting" => Ok(Self::Resetting),
            "stopping" => Ok(Self::Stopping),
            "shutdown" => Ok(Self::Shutdown),
            _ => Err(format!("Invalid agent state: {s}")),
        }
    }
}
