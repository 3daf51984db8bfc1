pub mod agent;
pub mod agent_health_history;
pub mod agent_heartbeat;
pub mod optimization_action;
pub mod performance_metric;
pub mod system_event;

pub use agent::{Agent, NewAgent};
pub use agent_health_history::HealthSnapshotRecord;
pub use agent_heartbeat::{AgentHeartbeat, HeartbeatReport};
pub use optimization_action::{ActionStatus, ActionType, OptimizationAction};
pub use performance_metric::{MetricSample, PerformanceMetric};
pub use system_event::{EventSeverity, NewSystemEvent, SystemEvent};
