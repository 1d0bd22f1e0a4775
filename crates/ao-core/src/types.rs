use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Issue number in the tracked repository.
pub type TaskId = u64;

/// Error threshold applied to newly created agents.
pub const DEFAULT_MAX_ERRORS: u32 = 3;

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Immutable snapshot of an open issue, as reported by a task source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub assignee: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: String,
    pub url: String,
}

impl Task {
    /// Title cut to `max` characters, with an ellipsis when shortened.
    pub fn short_title(&self, max: usize) -> String {
        if self.title.chars().count() > max {
            let cut: String = self.title.chars().take(max).collect();
            format!("{cut}...")
        } else {
            self.title.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// AgentStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Working,
    Error,
    Completed,
    Stopped,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Working => "working",
            AgentStatus::Error => "error",
            AgentStatus::Completed => "completed",
            AgentStatus::Stopped => "stopped",
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "*",
            AgentStatus::Working => "@",
            AgentStatus::Error => "!",
            AgentStatus::Completed => "+",
            AgentStatus::Stopped => "x",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// A supervised worker bound to exactly one task.
///
/// `id` and `task_id` are fixed at creation. Everything else is mutated by
/// the lifecycle controller while the agent sits in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub task_id: TaskId,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub error_count: u32,
    pub max_errors: u32,
    pub squad_session_active: bool,
}

impl Agent {
    /// Create an idle agent for `task_id`, with an id derived from the task
    /// and the creation instant.
    pub fn new(task_id: TaskId, now: DateTime<Utc>) -> Self {
        Self {
            id: Self::derive_id(task_id, now),
            task_id,
            status: AgentStatus::Idle,
            created_at: now,
            last_heartbeat: now,
            error_count: 0,
            max_errors: DEFAULT_MAX_ERRORS,
            squad_session_active: false,
        }
    }

    pub fn with_max_errors(mut self, max_errors: u32) -> Self {
        self.max_errors = max_errors;
        self
    }

    /// `agent_{task}_{unix micros}`.
    pub fn derive_id(task_id: TaskId, now: DateTime<Utc>) -> String {
        format!("agent_{}_{}", task_id, now.timestamp_micros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn agent_id_embeds_task_and_instant() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let agent = Agent::new(42, now);
        assert_eq!(agent.id, format!("agent_42_{}", now.timestamp_micros()));
        assert_eq!(agent.status, AgentStatus::Idle);
        assert_eq!(agent.error_count, 0);
        assert_eq!(agent.max_errors, DEFAULT_MAX_ERRORS);
        assert_eq!(agent.last_heartbeat, now);
        assert!(!agent.squad_session_active);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&AgentStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
        let back: AgentStatus = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(back, AgentStatus::Error);
        assert_eq!(AgentStatus::Working.to_string(), "working");
    }

    #[test]
    fn short_title_truncates_on_char_boundary() {
        let now = Utc::now();
        let task = Task {
            id: 1,
            title: "Исправить падение при запуске".to_string(),
            body: String::new(),
            labels: vec![],
            assignee: None,
            created_at: now,
            updated_at: now,
            state: "open".to_string(),
            url: String::new(),
        };
        assert_eq!(task.short_title(9), "Исправить...");
        assert_eq!(task.short_title(100), task.title);
    }
}
