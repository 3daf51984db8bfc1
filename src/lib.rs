#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Overseer Core
//!
//! Rust core for agent coordination and health monitoring: registers
//! independent worker processes, tracks their liveness via heartbeats,
//! computes windowed health and performance statistics, flags statistical
//! anomalies against rolling baselines, and drives an automated
//! optimization/recovery loop - all backed by a durable PostgreSQL store.
//!
//! ## Architecture
//!
//! One coordinator process runs a set of independent periodic tasks over a
//! shared registry:
//!
//! - [`registry`] - authoritative agent state with compare-and-swap
//!   transitions; full parallelism across agents, serialized per agent
//! - [`monitoring`] - heartbeat liveness evaluation and z-score anomaly
//!   detection, feeding the optimization engine over explicit channels
//! - [`metrics`] - streaming Welford windows (1h/24h/7d tiers) with
//!   copy-on-read snapshots; raw samples stay queryable in the store
//! - [`optimization`] - deterministic action selection with per-agent
//!   cooldowns and the soft_recovery -> hard_restart -> escalate_alert
//!   escalation ladder
//! - [`database`] - the `CoordinationStore` contract, its PostgreSQL
//!   implementation, and the embedded schema migrations
//! - [`orchestration`] - the [`Coordinator`](orchestration::Coordinator)
//!   facade composing all of the above
//!
//! ## Module Organization
//!
//! - [`models`] - persisted data layer (agents, heartbeats, metrics, events,
//!   actions, dashboard projections)
//! - [`state_machine`] - agent lifecycle states and the transition table
//! - [`events`] - in-process event bus plus the durable event recorder
//! - [`resilience`] - bounded retry with backoff and store health tracking
//! - [`config`] - the recognized configuration surface with fail-fast
//!   validation
//! - [`error`] - structured error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use overseer_core::config::CoordinatorConfig;
//! use overseer_core::models::NewAgent;
//! use overseer_core::optimization::actions::RecoveryDelegate;
//! use overseer_core::orchestration::Coordinator;
//! # use overseer_core::models::ActionType;
//! # use std::sync::Arc;
//!
//! # struct NoopDelegate;
//! # #[async_trait::async_trait]
//! # impl RecoveryDelegate for NoopDelegate {
//! #     async fn invoke_recovery(
//! #         &self,
//! #         _agent_id: &str,
//! #         _action_type: ActionType,
//! #     ) -> overseer_core::error::Result<bool> {
//! #         Ok(true)
//! #     }
//! # }
//! # async fn example() -> overseer_core::error::Result<()> {
//! let config = CoordinatorConfig::from_env()?;
//! let coordinator = Coordinator::bootstrap(config, Arc::new(NoopDelegate)).await?;
//! coordinator.start();
//!
//! let agent = coordinator
//!     .register(NewAgent::new("ingest-worker-1", "ingest"))
//!     .await?;
//! println!("registered {} in state {}", agent.agent_id, agent.state);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod monitoring;
pub mod optimization;
pub mod orchestration;
pub mod registry;
pub mod resilience;
pub mod state_machine;

pub use config::CoordinatorConfig;
pub use database::{CoordinationStore, PgStore};
pub use error::{CoordinatorError, Result};
pub use metrics::{MetricKey, MetricScope, MetricsAggregator, StatsWindow, WindowedStats};
pub use models::{
    ActionStatus, ActionType, Agent, AgentHeartbeat, EventSeverity, HeartbeatReport, MetricSample,
    NewAgent, NewSystemEvent, OptimizationAction, SystemEvent,
};
pub use monitoring::{Anomaly, AnomalyDetector, HeartbeatMonitor};
pub use optimization::{OptimizationEngine, OptimizationTrigger, RecoveryDelegate, TriggerReason};
pub use orchestration::Coordinator;
pub use registry::AgentRegistry;
pub use state_machine::AgentState;
