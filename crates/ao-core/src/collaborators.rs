//! Contracts for the external systems the lifecycle core talks to.
//!
//! Every call through these traits is I/O and may fail with
//! [`CollaboratorError`]. Callers decide how a failure is absorbed: task
//! listings degrade to "no tasks", notifications are dropped, and session
//! status failures count against the agent's health.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Task, TaskId};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// The declared failure type of every collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    /// The backend is not configured or cannot be reached at all.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    /// The backend was reached but the request failed.
    #[error("collaborator request failed: {0}")]
    Request(String),

    #[error("not found: {0}")]
    NotFound(String),
}

// ---------------------------------------------------------------------------
// TaskSource / Notifier
// ---------------------------------------------------------------------------

/// Supplies the current list of open tasks.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn list_open_tasks(&self) -> Result<Vec<Task>, CollaboratorError>;
}

/// Posts human-readable updates onto a task.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post_comment(&self, task_id: TaskId, text: &str) -> Result<(), CollaboratorError>;
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Inactive,
    NotFound,
    Error,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Active => "active",
            SessionStatus::Inactive => "inactive",
            SessionStatus::NotFound => "not_found",
            SessionStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// Auxiliary execution sessions that may back an agent's real work.
#[async_trait]
pub trait SessionManager: Send + Sync {
    async fn create_session(&self, task: &Task, agent_id: &str) -> Result<(), CollaboratorError>;

    async fn check_status(&self, agent_id: &str) -> Result<SessionStatus, CollaboratorError>;

    /// Succeeds when the session is already gone.
    async fn terminate_session(&self, agent_id: &str) -> Result<(), CollaboratorError>;
}

/// Session backend used when sessions are disabled in config.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSessions;

#[async_trait]
impl SessionManager for NoSessions {
    async fn create_session(&self, _task: &Task, _agent_id: &str) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::Unavailable("sessions are disabled".into()))
    }

    async fn check_status(&self, _agent_id: &str) -> Result<SessionStatus, CollaboratorError> {
        Ok(SessionStatus::NotFound)
    }

    async fn terminate_session(&self, _agent_id: &str) -> Result<(), CollaboratorError> {
        Ok(())
    }
}
