//! # Database Operations
//!
//! Persistence layer for the coordination engine: connection management with
//! pooling, the embedded migration runner, and the `CoordinationStore`
//! contract every control-loop component writes through.
//!
//! ## Key Components
//!
//! - [`connection`] - Database connection management and pooling
//! - [`migrations`] - Embedded schema migrations with advisory locking
//! - [`store`] - The durable-store contract and its Postgres implementation
//!
//! All store calls are bounded by a configurable timeout; timeouts and
//! connection loss surface as `TransientStore` so the control loop can retry
//! and degrade instead of crashing.

pub mod connection;
pub mod migrations;
pub mod store;

pub use connection::DatabaseConnection;
pub use migrations::DatabaseMigrations;
pub use store::{CoordinationStore, PgStore};
