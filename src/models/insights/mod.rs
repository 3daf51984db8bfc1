//! # Insights Models
//!
//! Read-only projections of the dashboard views. These models are **computed
//! views** - none of them support create, update, or delete operations, and
//! the control loop never reads them (it works from the in-process windowed
//! statistics instead). Display consumers only.
//!
//! - `AgentStatusRow`: per-agent liveness and latest resource samples
//! - `PerformanceSummaryRow`: per-metric aggregates over a display window
//! - `SystemHealthOverview`: fleet-wide counts for the health banner

pub mod agent_status_dashboard;
pub mod performance_summary;
pub mod system_health_overview;

pub use agent_status_dashboard::AgentStatusRow;
pub use performance_summary::PerformanceSummaryRow;
pub use system_health_overview::SystemHealthOverview;
