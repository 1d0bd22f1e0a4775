use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn, Instrument};

use ao_core::collaborators::{NoSessions, Notifier, SessionManager, TaskSource};
use ao_core::types::{Agent, Task, TaskId, DEFAULT_MAX_ERRORS};
use ao_telemetry::spans::agent_span;

use crate::analyzer::{StepOutcome, StepStatus, TaskAnalysis, TaskAnalyzer};
use crate::registry::{AgentRegistry, RegistryError};
use crate::state_machine::{next_status, StatusEvent, TransitionError};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("task #{task_id} already has agent `{agent_id}`")]
    DuplicateAssignment { task_id: TaskId, agent_id: String },

    #[error("task #{0} is not among the open tasks")]
    TaskNotFound(TaskId),

    #[error("no agent assigned to task #{0}")]
    NoAgentAssigned(TaskId),

    #[error("agent not found: `{0}`")]
    AgentNotFound(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("registry rejected the change: {0}")]
    Registry(RegistryError),
}

impl From<RegistryError> for LifecycleError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(task_id) => LifecycleError::NoAgentAssigned(task_id),
            RegistryError::AgentNotFound(agent_id) => LifecycleError::AgentNotFound(agent_id),
            other => LifecycleError::Registry(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

// ---------------------------------------------------------------------------
// Notification texts
// ---------------------------------------------------------------------------

pub fn assignment_comment(agent_id: &str) -> String {
    format!("🤖 Agent {agent_id} assigned to this issue and started work")
}

pub fn removal_comment(agent_id: &str) -> String {
    format!("🛑 Agent {agent_id} was removed from this issue by operator request")
}

pub fn restart_comment(agent_id: &str) -> String {
    format!("🔄 Agent {agent_id} was restarted automatically after failing a health check")
}

// ---------------------------------------------------------------------------
// LifecycleController
// ---------------------------------------------------------------------------

/// Drives agents through their lifecycle and keeps the registry, the task
/// tracker and the session backend in step.
///
/// Cheap to clone; clones share the same registry. Collaborator calls are
/// made without holding the registry lock, and every registry mutation is a
/// short critical section that also writes the snapshot.
#[derive(Clone)]
pub struct LifecycleController {
    registry: Arc<Mutex<AgentRegistry>>,
    tasks: Arc<dyn TaskSource>,
    notifier: Arc<dyn Notifier>,
    sessions: Arc<dyn SessionManager>,
    analyzer: Option<Arc<dyn TaskAnalyzer>>,
    max_errors: u32,
}

impl LifecycleController {
    pub fn new(
        registry: AgentRegistry,
        tasks: Arc<dyn TaskSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            registry: Arc::new(Mutex::new(registry)),
            tasks,
            notifier,
            sessions: Arc::new(NoSessions),
            analyzer: None,
            max_errors: DEFAULT_MAX_ERRORS,
        }
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionManager>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn TaskAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Error budget for agents created from now on.
    pub fn with_max_errors(mut self, max_errors: u32) -> Self {
        self.max_errors = max_errors.max(1);
        self
    }

    pub fn sessions(&self) -> Arc<dyn SessionManager> {
        Arc::clone(&self.sessions)
    }

    // -----------------------------------------------------------------------
    // Assignment
    // -----------------------------------------------------------------------

    /// Create an agent for `task_id`.
    ///
    /// Session creation, analysis and the notification are best-effort and
    /// never fail the assignment.
    pub async fn assign_agent_to_task(&self, task_id: TaskId) -> Result<Agent> {
        if let Some(existing) = self.registry.lock().await.agent_for_task(task_id) {
            return Err(LifecycleError::DuplicateAssignment {
                task_id,
                agent_id: existing.id.clone(),
            });
        }

        let task = self
            .find_task(task_id)
            .await
            .ok_or(LifecycleError::TaskNotFound(task_id))?;

        let agent = Agent::new(task_id, Utc::now()).with_max_errors(self.max_errors);
        let agent_id = agent.id.clone();
        {
            let mut registry = self.registry.lock().await;
            match registry.assign(task_id, agent.clone()) {
                Ok(()) => {}
                // Lost a race with a concurrent assignment while the task
                // list was being fetched.
                Err(RegistryError::AlreadyAssigned(_)) => {
                    let winner = registry
                        .agent_for_task(task_id)
                        .map(|a| a.id.clone())
                        .unwrap_or_default();
                    return Err(LifecycleError::DuplicateAssignment {
                        task_id,
                        agent_id: winner,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        async {
            info!("agent created");
            self.attach_session(&task, &agent_id).await;
            if let Some(analyzer) = &self.analyzer {
                self.run_analysis(analyzer.as_ref(), &task, &agent_id).await;
            }
            self.notify(task_id, &assignment_comment(&agent_id)).await;
        }
        .instrument(agent_span("assign", &agent_id, task_id))
        .await;

        Ok(self.get_agent(&agent_id).await.unwrap_or(agent))
    }

    /// Delete the agent bound to `task_id`.
    pub async fn remove_agent_from_task(&self, task_id: TaskId) -> Result<Agent> {
        let agent_id = self
            .assignment_for(task_id)
            .await
            .ok_or(LifecycleError::NoAgentAssigned(task_id))?;

        self.notify(task_id, &removal_comment(&agent_id)).await;

        let removed = {
            let mut registry = self.registry.lock().await;
            // The task may have been removed, or removed and reassigned,
            // while the comment was being posted.
            if registry.assignments().get(&task_id) != Some(&agent_id) {
                return Err(LifecycleError::NoAgentAssigned(task_id));
            }
            registry.remove(task_id)?
        };
        if removed.squad_session_active {
            if let Err(e) = self.sessions.terminate_session(&removed.id).await {
                warn!(agent_id = %removed.id, error = %e, "failed to terminate session");
            }
        }
        info!(agent_id = %removed.id, task_id, "agent removed");
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Status changes
    // -----------------------------------------------------------------------

    /// Reset an agent to `Idle` with a fresh heartbeat and no errors.
    /// Accepted from any status. A session that backed the agent is
    /// recreated best-effort.
    pub async fn restart_agent(&self, agent_id: &str) -> Result<Agent> {
        let restarted = self
            .update(agent_id, |agent| {
                agent.status = next_status(agent.status, StatusEvent::Restart)?;
                agent.error_count = 0;
                agent.last_heartbeat = Utc::now();
                Ok(())
            })
            .await?;
        info!(agent_id, task_id = restarted.task_id, "agent restarted");

        if restarted.squad_session_active {
            self.recreate_session(&restarted).await;
            return Ok(self.get_agent(agent_id).await.unwrap_or(restarted));
        }
        Ok(restarted)
    }

    /// Count a failed unit of work and move the agent to `Error`.
    pub async fn record_error(&self, agent_id: &str, error: &str) -> Result<Agent> {
        let agent = self
            .update(agent_id, |agent| {
                agent.status = next_status(agent.status, StatusEvent::Fail)?;
                agent.error_count = agent.error_count.saturating_add(1);
                Ok(())
            })
            .await?;
        warn!(
            agent_id,
            error,
            error_count = agent.error_count,
            max_errors = agent.max_errors,
            "agent error recorded"
        );
        Ok(agent)
    }

    /// Refresh the heartbeat without touching the status.
    pub async fn record_heartbeat(&self, agent_id: &str) -> Result<Agent> {
        self.update(agent_id, |agent| {
            let now = Utc::now();
            if now > agent.last_heartbeat {
                agent.last_heartbeat = now;
            }
            Ok(())
        })
        .await
    }

    /// A successful unit of work: `Working` plus a heartbeat.
    pub async fn record_progress(&self, agent_id: &str) -> Result<Agent> {
        self.update(agent_id, |agent| {
            agent.status = next_status(agent.status, StatusEvent::Work)?;
            let now = Utc::now();
            if now > agent.last_heartbeat {
                agent.last_heartbeat = now;
            }
            Ok(())
        })
        .await
    }

    pub async fn mark_completed(&self, agent_id: &str) -> Result<Agent> {
        let agent = self
            .update(agent_id, |agent| {
                agent.status = next_status(agent.status, StatusEvent::Finish)?;
                agent.last_heartbeat = agent.last_heartbeat.max(Utc::now());
                Ok(())
            })
            .await?;
        info!(agent_id, task_id = agent.task_id, "agent completed its task");
        Ok(agent)
    }

    /// Stop an agent but keep its record. Its session is terminated.
    pub async fn stop_agent(&self, agent_id: &str) -> Result<Agent> {
        let agent = self
            .update(agent_id, |agent| {
                agent.status = next_status(agent.status, StatusEvent::Stop)?;
                Ok(())
            })
            .await?;
        if agent.squad_session_active {
            if let Err(e) = self.sessions.terminate_session(agent_id).await {
                warn!(agent_id, error = %e, "failed to terminate session");
            }
            return self
                .update(agent_id, |agent| {
                    agent.squad_session_active = false;
                    Ok(())
                })
                .await;
        }
        Ok(agent)
    }

    // -----------------------------------------------------------------------
    // Work
    // -----------------------------------------------------------------------

    /// Run one plan step for the agent and apply the outcome: a finished
    /// task completes the agent, a failed step counts as an error, anything
    /// else is progress. Without an analyzer the step is recorded as basic
    /// progress.
    pub async fn execute_step(
        &self,
        agent_id: &str,
        step: &str,
        context: &serde_json::Value,
    ) -> Result<StepOutcome> {
        let agent = self.get_agent(agent_id).await?;
        let task = self
            .find_task(agent.task_id)
            .await
            .ok_or(LifecycleError::TaskNotFound(agent.task_id))?;

        let Some(analyzer) = &self.analyzer else {
            warn!(agent_id, "no language model configured; recording basic progress");
            self.record_progress(agent_id).await?;
            return Ok(StepOutcome::offline(&task, step));
        };

        let outcome = match analyzer.execute_step(&task, step, context).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.record_error(agent_id, &e.to_string()).await?;
                return Ok(StepOutcome {
                    status: StepStatus::Failed,
                    result: e.to_string(),
                    next_actions: Vec::new(),
                    issues: vec![e.to_string()],
                    completion_percentage: 0,
                    raw_response: None,
                });
            }
        };

        match outcome.status {
            StepStatus::Failed => {
                let reason = outcome
                    .issues
                    .first()
                    .cloned()
                    .unwrap_or_else(|| format!("step '{step}' failed"));
                self.record_error(agent_id, &reason).await?;
            }
            _ if outcome.finishes_task() => {
                self.record_progress(agent_id).await?;
                self.mark_completed(agent_id).await?;
            }
            _ => {
                self.record_progress(agent_id).await?;
            }
        }
        info!(
            agent_id,
            step,
            status = %outcome.status,
            completion = outcome.completion_percentage,
            "step executed"
        );
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn list_agents(&self) -> Vec<Agent> {
        self.registry.lock().await.list()
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<Agent> {
        Ok(self.registry.lock().await.get(agent_id)?.clone())
    }

    pub async fn assignment_for(&self, task_id: TaskId) -> Option<String> {
        self.registry.lock().await.assignments().get(&task_id).cloned()
    }

    pub async fn assignments(&self) -> BTreeMap<TaskId, String> {
        self.registry.lock().await.assignments().clone()
    }

    /// Open tasks; a task-source failure yields an empty list.
    pub async fn list_tasks(&self) -> Vec<Task> {
        match self.tasks.list_open_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "failed to list open tasks; treating as none");
                Vec::new()
            }
        }
    }

    /// Post `text` on the task; failures are logged and dropped.
    pub async fn notify(&self, task_id: TaskId, text: &str) {
        if let Err(e) = self.notifier.post_comment(task_id, text).await {
            warn!(task_id, error = %e, "failed to post notification");
        }
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    async fn find_task(&self, task_id: TaskId) -> Option<Task> {
        self.list_tasks().await.into_iter().find(|t| t.id == task_id)
    }

    /// Apply `change` to a copy of the agent and store it. Nothing is
    /// written when `change` fails.
    async fn update<F>(&self, agent_id: &str, change: F) -> Result<Agent>
    where
        F: FnOnce(&mut Agent) -> std::result::Result<(), TransitionError>,
    {
        let mut registry = self.registry.lock().await;
        let mut agent = registry.get(agent_id)?.clone();
        change(&mut agent)?;
        registry.replace(agent.clone())?;
        Ok(agent)
    }

    async fn set_session_flag(&self, agent_id: &str, active: bool) {
        let result = self
            .update(agent_id, |agent| {
                agent.squad_session_active = active;
                Ok(())
            })
            .await;
        if let Err(e) = result {
            debug!(agent_id, error = %e, "agent gone before session flag update");
        }
    }

    async fn attach_session(&self, task: &Task, agent_id: &str) {
        match self.sessions.create_session(task, agent_id).await {
            Ok(()) => self.set_session_flag(agent_id, true).await,
            Err(e) => debug!(agent_id, error = %e, "no session for agent"),
        }
    }

    async fn recreate_session(&self, agent: &Agent) {
        if let Err(e) = self.sessions.terminate_session(&agent.id).await {
            warn!(agent_id = %agent.id, error = %e, "failed to terminate session before restart");
        }
        let Some(task) = self.find_task(agent.task_id).await else {
            warn!(agent_id = %agent.id, task_id = agent.task_id, "task not open; session not recreated");
            self.set_session_flag(&agent.id, false).await;
            return;
        };
        match self.sessions.create_session(&task, &agent.id).await {
            Ok(()) => debug!(agent_id = %agent.id, "session recreated"),
            Err(e) => {
                warn!(agent_id = %agent.id, error = %e, "failed to recreate session");
                self.set_session_flag(&agent.id, false).await;
            }
        }
    }

    async fn run_analysis(&self, analyzer: &dyn TaskAnalyzer, task: &Task, agent_id: &str) {
        match analyzer.analyze(task).await {
            Ok(analysis) => {
                log_analysis(&analysis);
                if let Err(e) = self.record_progress(agent_id).await {
                    debug!(error = %e, "agent changed before analysis result was applied");
                }
            }
            Err(e) => {
                if let Err(e) = self.record_error(agent_id, &e.to_string()).await {
                    debug!(error = %e, "agent changed before analysis failure was applied");
                }
            }
        }
    }
}

fn log_analysis(analysis: &TaskAnalysis) {
    info!(
        task_type = %analysis.task_type,
        priority = %analysis.priority,
        estimated_time = %analysis.estimated_time,
        steps = analysis.plan.len(),
        "task analyzed"
    );
}
