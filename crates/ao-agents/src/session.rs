//! Squad sessions: interactive coding sessions an operator drives through
//! the `cs` command-line tool.
//!
//! The tool is interactive, so sessions here are logical records. Each one
//! carries the prompt the operator pastes into `cs` to start work on the
//! task. Availability of the tool is probed once at construction.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use ao_core::collaborators::{CollaboratorError, SessionManager, SessionStatus};
use ao_core::types::Task;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquadSession {
    pub agent_id: String,
    pub session_name: String,
    pub task_id: u64,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub prompt: String,
}

pub struct SquadSessionManager {
    command: String,
    available: bool,
    version: Option<String>,
    sessions: Mutex<BTreeMap<String, SquadSession>>,
}

impl SquadSessionManager {
    /// Probe `command version` and build a manager.
    pub async fn new(command: impl Into<String>) -> Self {
        let command = command.into();
        let version = probe(&command).await;
        match &version {
            Some(v) => info!(command = %command, version = %v, "session CLI available"),
            None => warn!(command = %command, "session CLI not available; sessions disabled"),
        }
        Self {
            available: version.is_some(),
            version,
            command,
            sessions: Mutex::new(BTreeMap::new()),
        }
    }

    /// Build without probing.
    pub fn with_availability(command: impl Into<String>, available: bool) -> Self {
        Self {
            command: command.into(),
            available,
            version: None,
            sessions: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub async fn session_prompt(&self, agent_id: &str) -> Option<String> {
        self.sessions
            .lock()
            .await
            .get(agent_id)
            .map(|s| s.prompt.clone())
    }

    pub async fn list_sessions(&self) -> Vec<SquadSession> {
        self.sessions.lock().await.values().cloned().collect()
    }

    pub async fn restart_session(&self, task: &Task, agent_id: &str) -> Result<(), CollaboratorError> {
        self.terminate_session(agent_id).await?;
        self.create_session(task, agent_id).await
    }
}

#[async_trait]
impl SessionManager for SquadSessionManager {
    async fn create_session(&self, task: &Task, agent_id: &str) -> Result<(), CollaboratorError> {
        if !self.available {
            return Err(CollaboratorError::Unavailable(format!(
                "`{}` is not installed",
                self.command
            )));
        }

        let session = SquadSession {
            agent_id: agent_id.to_string(),
            session_name: session_name(task.id),
            task_id: task.id,
            created_at: Utc::now(),
            status: SessionStatus::Active,
            prompt: build_prompt(task, agent_id),
        };
        info!(
            agent_id,
            session = %session.session_name,
            "session prepared; start it interactively with `{}`",
            self.command
        );
        self.sessions
            .lock()
            .await
            .insert(agent_id.to_string(), session);
        Ok(())
    }

    async fn check_status(&self, agent_id: &str) -> Result<SessionStatus, CollaboratorError> {
        let sessions = self.sessions.lock().await;
        Ok(match sessions.get(agent_id) {
            None => SessionStatus::NotFound,
            Some(s) if s.status == SessionStatus::Active => SessionStatus::Active,
            Some(_) => SessionStatus::Inactive,
        })
    }

    async fn terminate_session(&self, agent_id: &str) -> Result<(), CollaboratorError> {
        if let Some(session) = self.sessions.lock().await.remove(agent_id) {
            debug!(agent_id, session = %session.session_name, "session terminated");
        }
        Ok(())
    }
}

pub fn session_name(task_id: u64) -> String {
    format!("github-task-{task_id}")
}

/// Instructions handed to the interactive session for `task`.
pub fn build_prompt(task: &Task, agent_id: &str) -> String {
    format!(
        "You are a GitHub development agent (ID: {agent_id}).\n\n\
         TASK: {title}\n\n\
         DESCRIPTION:\n{body}\n\n\
         LABELS: {labels}\n\
         URL: {url}\n\n\
         YOUR ROLE:\n\
         1. Analyze the task requirements\n\
         2. Write a detailed implementation plan\n\
         3. Make the necessary code changes\n\
         4. Test the solution\n\
         5. Open a pull request\n\
         6. Keep the issue updated with comments\n\n\
         RULES:\n\
         - Work autonomously but systematically\n\
         - Follow the existing code patterns and style\n\
         - Always test changes before committing\n\
         - Document non-obvious decisions\n\
         - Report blockers and problems\n\n\
         REPORTING:\n\
         - Comment progress on the GitHub issue\n\
         - Mark status with: 🔄 in progress, ✅ done, ❌ problem\n\
         - Post an update every 30 minutes of work\n\n\
         Start by analyzing the task and drafting a plan.",
        title = task.title,
        body = task.body,
        labels = task.labels.join(", "),
        url = task.url,
    )
}

/// First line of `command version`, or `None` when the tool is missing,
/// fails, or hangs.
async fn probe(command: &str) -> Option<String> {
    let output = Command::new(command).arg("version").kill_on_drop(true).output();
    match tokio::time::timeout(PROBE_TIMEOUT, output).await {
        Ok(Ok(out)) if out.status.success() => {
            let text = String::from_utf8_lossy(&out.stdout);
            Some(text.lines().next().unwrap_or("").trim().to_string())
        }
        Ok(Ok(out)) => {
            debug!(command, status = %out.status, "session CLI probe exited unsuccessfully");
            None
        }
        Ok(Err(e)) => {
            debug!(command, error = %e, "session CLI probe failed to start");
            None
        }
        Err(_) => {
            debug!(command, "session CLI probe timed out");
            None
        }
    }
}
