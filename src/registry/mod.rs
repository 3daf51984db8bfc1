//! # Registry Infrastructure
//!
//! The agent registry: the authoritative in-process mapping of agent identity
//! to lifecycle state, with a compare-and-swap transition API.
//!
//! ## Overview
//!
//! Every component that needs an agent's state reads it here, and every state
//! mutation goes through `transition()` - the heartbeat monitor and
//! optimization engine never write state directly. Per-agent entries are
//! independently locked, so distinct agents transition in parallel while any
//! single agent's transitions serialize.

pub mod agent_registry;

pub use agent_registry::AgentRegistry;
