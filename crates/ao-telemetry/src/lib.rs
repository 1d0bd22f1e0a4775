//! Logging setup and span helpers for agent-orchestrator.
//!
//! Everything writes to stderr so that command output on stdout stays
//! clean for scripting.

pub mod logging;
pub mod spans;
