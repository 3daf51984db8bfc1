//! # Resilience Module
//!
//! Fault tolerance for the persistence boundary: bounded retry with
//! exponential backoff for transient store failures, and a consecutive-
//! failure tracker that marks the persistence layer itself unhealthy once the
//! configured threshold is crossed.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use overseer_core::resilience::{with_retry, RetryPolicy, StoreHealth};
//!
//! # async fn example() -> Result<(), overseer_core::error::CoordinatorError> {
//! let policy = RetryPolicy::default();
//! let value = with_retry(&policy, "load_agents", || async {
//!     Ok::<u32, overseer_core::error::CoordinatorError>(42)
//! })
//! .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

pub mod retry;

pub use retry::{with_retry, RetryPolicy, StoreHealth};
