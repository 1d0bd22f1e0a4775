//! Agent lifecycle and health supervision.
//!
//! [`registry::AgentRegistry`] holds the task -> agent mapping,
//! [`lifecycle::LifecycleController`] drives status changes and talks to the
//! collaborators, [`health::HealthEvaluator`] decides liveness and
//! [`supervisor::SupervisionLoop`] restarts agents that fail it.

pub mod analyzer;
pub mod health;
pub mod lifecycle;
pub mod registry;
pub mod session;
pub mod state_machine;
pub mod supervisor;
