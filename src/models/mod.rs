//! # Data Layer
//!
//! Persisted models for the coordination engine. Each model owns its SQL:
//! structs map to tables with `FromRow` derives and expose inherent async
//! methods over a `PgPool`. The `insights` models are read-only projections
//! of the dashboard views and never support writes.

pub mod core;
pub mod insights;

pub use self::core::agent::{Agent, NewAgent};
pub use self::core::agent_health_history::HealthSnapshotRecord;
pub use self::core::agent_heartbeat::{AgentHeartbeat, HeartbeatReport};
pub use self::core::optimization_action::{ActionStatus, ActionType, OptimizationAction};
pub use self::core::performance_metric::{MetricSample, PerformanceMetric};
pub use self::core::system_event::{EventSeverity, NewSystemEvent, SystemEvent};
pub use insights::agent_status_dashboard::AgentStatusRow;
pub use insights::performance_summary::PerformanceSummaryRow;
pub use insights::system_health_overview::SystemHealthOverview;
