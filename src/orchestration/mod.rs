//! # Orchestration
//!
//! The coordinator facade: composes the registry, heartbeat monitor, metrics
//! aggregator, anomaly detector, and optimization engine into one control
//! loop and exposes the external interface consumed by agents, dashboards,
//! and operators.
//!
//! ## Architecture
//!
//! - **Ingress** (agents): `register`, `heartbeat`, `report_metric`
//! - **Egress** (recovery): the `RecoveryDelegate` the optimization engine
//!   invokes on the external agent process
//! - **Dashboards** (read-only): aggregate views served straight from the
//!   persistence layer, never consulted by the control loop
//! - **Periodic tasks**: heartbeat tick, anomaly evaluation, trigger
//!   processing, verification sweep, and retention sweep, each an
//!   independently scheduled task watching a cooperative shutdown signal

pub mod coordinator;

pub use coordinator::Coordinator;
