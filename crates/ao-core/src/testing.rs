//! In-memory collaborator fakes.
//!
//! Deterministic stand-ins for the issue tracker, session backend and
//! snapshot store, used by unit and integration tests across the workspace.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::collaborators::{CollaboratorError, Notifier, SessionManager, SessionStatus, TaskSource};
use crate::state_store::{RegistrySnapshot, StateStore, StoreError};
use crate::types::{Task, TaskId};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An open task with predictable fields.
pub fn sample_task(id: TaskId) -> Task {
    let created = Utc
        .with_ymd_and_hms(2025, 3, 1, 9, 30, 0)
        .single()
        .unwrap_or_else(Utc::now);
    Task {
        id,
        title: format!("Task {id}"),
        body: format!("Body of task {id}"),
        labels: vec!["bug".to_string()],
        assignee: None,
        created_at: created,
        updated_at: created,
        state: "open".to_string(),
        url: format!("https://github.com/octo/widgets/issues/{id}"),
    }
}

// ---------------------------------------------------------------------------
// StaticTaskSource
// ---------------------------------------------------------------------------

/// Task source backed by a mutable list.
#[derive(Default)]
pub struct StaticTaskSource {
    tasks: Mutex<Vec<Task>>,
    failing: Mutex<bool>,
    calls: Mutex<usize>,
}

impl StaticTaskSource {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
            ..Self::default()
        }
    }

    pub fn with_ids(ids: &[TaskId]) -> Self {
        Self::new(ids.iter().copied().map(sample_task).collect())
    }

    pub fn set_tasks(&self, tasks: Vec<Task>) {
        *lock(&self.tasks) = tasks;
    }

    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    pub fn calls(&self) -> usize {
        *lock(&self.calls)
    }
}

#[async_trait]
impl TaskSource for StaticTaskSource {
    async fn list_open_tasks(&self) -> Result<Vec<Task>, CollaboratorError> {
        *lock(&self.calls) += 1;
        if *lock(&self.failing) {
            return Err(CollaboratorError::Request("task source offline".into()));
        }
        Ok(lock(&self.tasks).clone())
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Notifier that records every comment it is asked to post.
#[derive(Default)]
pub struct RecordingNotifier {
    comments: Mutex<Vec<(TaskId, String)>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails, but is still recorded as attempted.
    pub fn failing() -> Self {
        let notifier = Self::default();
        *lock(&notifier.failing) = true;
        notifier
    }

    pub fn comments(&self) -> Vec<(TaskId, String)> {
        lock(&self.comments).clone()
    }

    pub fn comments_for(&self, task_id: TaskId) -> Vec<String> {
        lock(&self.comments)
            .iter()
            .filter(|(id, _)| *id == task_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn post_comment(&self, task_id: TaskId, text: &str) -> Result<(), CollaboratorError> {
        lock(&self.comments).push((task_id, text.to_string()));
        if *lock(&self.failing) {
            return Err(CollaboratorError::Request("comment rejected".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedSessions
// ---------------------------------------------------------------------------

/// Session backend whose per-agent status is set by the test.
#[derive(Default)]
pub struct ScriptedSessions {
    sessions: Mutex<HashMap<String, SessionStatus>>,
    failing_checks: Mutex<Vec<String>>,
    refuse_create: Mutex<bool>,
    terminated: Mutex<Vec<String>>,
}

impl ScriptedSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// `create_session` fails with `Unavailable`.
    pub fn refusing() -> Self {
        let sessions = Self::default();
        *lock(&sessions.refuse_create) = true;
        sessions
    }

    pub fn set_status(&self, agent_id: &str, status: SessionStatus) {
        lock(&self.sessions).insert(agent_id.to_string(), status);
    }

    /// `check_status` for `agent_id` returns an error.
    pub fn fail_checks_for(&self, agent_id: &str) {
        lock(&self.failing_checks).push(agent_id.to_string());
    }

    pub fn status_of(&self, agent_id: &str) -> Option<SessionStatus> {
        lock(&self.sessions).get(agent_id).copied()
    }

    pub fn has_session(&self, agent_id: &str) -> bool {
        lock(&self.sessions).contains_key(agent_id)
    }

    pub fn terminated(&self) -> Vec<String> {
        lock(&self.terminated).clone()
    }
}

#[async_trait]
impl SessionManager for ScriptedSessions {
    async fn create_session(&self, _task: &Task, agent_id: &str) -> Result<(), CollaboratorError> {
        if *lock(&self.refuse_create) {
            return Err(CollaboratorError::Unavailable("session CLI not installed".into()));
        }
        lock(&self.sessions).insert(agent_id.to_string(), SessionStatus::Active);
        Ok(())
    }

    async fn check_status(&self, agent_id: &str) -> Result<SessionStatus, CollaboratorError> {
        if lock(&self.failing_checks).iter().any(|id| id == agent_id) {
            return Err(CollaboratorError::Request(format!("status query for {agent_id} failed")));
        }
        Ok(lock(&self.sessions)
            .get(agent_id)
            .copied()
            .unwrap_or(SessionStatus::NotFound))
    }

    async fn terminate_session(&self, agent_id: &str) -> Result<(), CollaboratorError> {
        lock(&self.sessions).remove(agent_id);
        lock(&self.terminated).push(agent_id.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Snapshot store that keeps every saved snapshot in memory.
#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Vec<RegistrySnapshot>>,
    initial: Mutex<Option<RegistrySnapshot>>,
    failing: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose `load` returns `snapshot` until something is saved.
    pub fn seeded(snapshot: RegistrySnapshot) -> Self {
        let store = Self::default();
        *lock(&store.initial) = Some(snapshot);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    pub fn save_count(&self) -> usize {
        lock(&self.saved).len()
    }

    pub fn last_saved(&self) -> Option<RegistrySnapshot> {
        lock(&self.saved).last().cloned()
    }
}

impl StateStore for MemoryStore {
    fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), StoreError> {
        if *lock(&self.failing) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only store",
            )));
        }
        lock(&self.saved).push(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<RegistrySnapshot>, StoreError> {
        if let Some(last) = self.last_saved() {
            return Ok(Some(last));
        }
        Ok(lock(&self.initial).clone())
    }
}
