//! # Monitoring
//!
//! The two periodic analysis passes of the control loop: liveness evaluation
//! from heartbeat ages (with staged WARNING/ERROR escalation) and statistical
//! anomaly detection against rolling baselines. Both emit SystemEvents and
//! feed the optimization engine over its trigger channel rather than calling
//! into it directly.

pub mod anomaly_detector;
pub mod heartbeat_monitor;

pub use anomaly_detector::{Anomaly, AnomalyDetector};
pub use heartbeat_monitor::{HeartbeatMonitor, MonitorTickSummary};
