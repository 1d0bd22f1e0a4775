//! Shared data model and collaborator contracts for agent-orchestrator.
//!
//! - [`types`]: tasks (open issues) and the agents supervising them
//! - [`collaborators`]: traits for the issue tracker and session backend
//! - [`state_store`]: durable registry snapshots
//! - [`config`]: TOML configuration
//! - [`testing`]: in-memory collaborator fakes shared by every crate's tests

pub mod collaborators;
pub mod config;
pub mod state_store;
pub mod testing;
pub mod types;
