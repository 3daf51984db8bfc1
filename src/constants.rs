//! # System Constants
//!
//! Event type names, built-in metric names, and string groups that define the
//! operational vocabulary of the coordination engine. Every durable row that
//! carries an event type or metric name draws it from here so dashboards and
//! the control loop agree on spelling.

/// Event types written to the `system_events` log.
pub mod event_types {
    // Agent lifecycle
    pub const AGENT_REGISTERED: &str = "agent.registered";
    pub const AGENT_DEREGISTERED: &str = "agent.deregistered";
    pub const STATE_TRANSITION: &str = "agent.state_transition";

    // Liveness
    pub const HEARTBEAT_OVERDUE: &str = "heartbeat.overdue";
    pub const HEARTBEAT_TIMEOUT: &str = "heartbeat.timeout";
    pub const HEARTBEAT_RECOVERED: &str = "heartbeat.recovered";

    // Analysis
    pub const ANOMALY_DETECTED: &str = "anomaly.detected";

    // Recovery
    pub const ACTION_APPLIED: &str = "optimization.action_applied";
    pub const ACTION_FAILED: &str = "optimization.action_failed";
    pub const ACTION_SKIPPED_COOLDOWN: &str = "optimization.action_skipped_cooldown";
    pub const RECOVERY_SUCCEEDED: &str = "optimization.recovery_succeeded";
    pub const RECOVERY_ESCALATED: &str = "optimization.recovery_escalated";

    // Engine self-health
    pub const PERSISTENCE_DEGRADED: &str = "store.persistence_degraded";
    pub const RETENTION_SWEEP: &str = "store.retention_sweep";
}

/// Metric names the coordinator itself derives from heartbeat reports, fed
/// through the aggregator alongside agent-reported metrics.
pub mod builtin_metrics {
    pub const HEALTH_SCORE: &str = "health_score";
    pub const CPU_PERCENT: &str = "cpu_percent";
    pub const MEMORY_PERCENT: &str = "memory_percent";
    pub const WORK_ITEMS_PROCESSED: &str = "work_items_processed";
    pub const ERROR_COUNT: &str = "error_count";

    /// Resource metrics whose CRITICAL anomalies map to `resource_tune`.
    pub const RESOURCE_METRICS: &[&str] = &[CPU_PERCENT, MEMORY_PERCENT];
}

/// Well-known trigger reasons recorded on optimization actions.
pub mod trigger_reasons {
    pub const HEARTBEAT_TIMEOUT: &str = "heartbeat_timeout";
    pub const ANOMALY: &str = "anomaly";
    pub const ESCALATION: &str = "escalation";
}

/// System-wide scope marker used where an `agent_id` column is NULL.
pub const SYSTEM_SCOPE: &str = "system";
