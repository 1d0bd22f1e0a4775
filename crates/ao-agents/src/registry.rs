use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use ao_core::state_store::{AgentRecord, RegistrySnapshot, StateStore, StoreError};
use ao_core::types::{Agent, TaskId};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("task #{0} already has an agent")]
    AlreadyAssigned(TaskId),
    #[error("no agent assigned to task #{0}")]
    NotFound(TaskId),
    #[error("agent not found: `{0}`")]
    AgentNotFound(String),
    #[error("agent id already in use: `{0}`")]
    AgentIdInUse(String),
    #[error("agent `{agent_id}` belongs to task #{agent_task}, not #{task_id}")]
    TaskMismatch {
        task_id: TaskId,
        agent_id: String,
        agent_task: TaskId,
    },
}

pub type Result<T> = std::result::Result<T, RegistryError>;

// ---------------------------------------------------------------------------
// AgentRegistry
// ---------------------------------------------------------------------------

/// Authoritative task -> agent mapping plus the agent records themselves.
///
/// Holds at most one agent per task. Every successful mutation writes a
/// snapshot to the attached [`StateStore`]; a failed write is logged and the
/// in-memory state stays as mutated.
///
/// The registry itself is not synchronized. Callers share it behind a single
/// lock so that a mutation and its snapshot are never interleaved with
/// another mutation.
#[derive(Default)]
pub struct AgentRegistry {
    assignments: BTreeMap<TaskId, String>,
    agents: HashMap<String, Agent>,
    store: Option<Arc<dyn StateStore>>,
}

impl AgentRegistry {
    /// Empty registry with no persistence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry that snapshots into `store`.
    pub fn with_store(store: Arc<dyn StateStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::default()
        }
    }

    /// Load the last snapshot from `store` (if any) and keep writing to it.
    ///
    /// Snapshots that break the one-agent-per-task invariant are repaired:
    /// dangling or mismatched mappings are dropped, orphaned agents are
    /// re-linked to their task when it is free and dropped otherwise.
    pub fn restore(store: Arc<dyn StateStore>) -> std::result::Result<Self, StoreError> {
        let snapshot = store.load()?;
        let mut registry = Self::with_store(store);
        if let Some(snapshot) = snapshot {
            registry.load_snapshot(snapshot);
            debug!(
                agents = registry.agents.len(),
                assignments = registry.assignments.len(),
                "registry restored"
            );
        }
        Ok(registry)
    }

    fn load_snapshot(&mut self, snapshot: RegistrySnapshot) {
        let mut agents: HashMap<String, Agent> = HashMap::new();
        for (key, record) in snapshot.agents {
            if key != record.id {
                warn!(key = %key, agent_id = %record.id, "snapshot key differs from agent id; using agent id");
            }
            if agents.contains_key(&record.id) {
                warn!(agent_id = %record.id, "duplicate agent id in snapshot; dropping later record");
                continue;
            }
            agents.insert(record.id.clone(), Agent::from(record));
        }

        let mut assignments = BTreeMap::new();
        for (task_id, agent_id) in snapshot.task_assignments {
            match agents.get(&agent_id) {
                Some(agent) if agent.task_id == task_id => {
                    assignments.insert(task_id, agent_id);
                }
                Some(agent) => warn!(
                    task_id,
                    agent_id = %agent_id,
                    agent_task = agent.task_id,
                    "dropping mapping to an agent of another task"
                ),
                None => warn!(task_id, agent_id = %agent_id, "dropping mapping to a missing agent"),
            }
        }

        let mut orphans: Vec<&Agent> = agents
            .values()
            .filter(|a| assignments.get(&a.task_id) != Some(&a.id))
            .collect();
        orphans.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

        let mut dropped = Vec::new();
        for agent in orphans {
            if assignments.contains_key(&agent.task_id) {
                warn!(agent_id = %agent.id, task_id = agent.task_id, "dropping orphan agent; task already has one");
                dropped.push(agent.id.clone());
            } else {
                warn!(agent_id = %agent.id, task_id = agent.task_id, "re-linking orphan agent to its task");
                assignments.insert(agent.task_id, agent.id.clone());
            }
        }
        for id in dropped {
            agents.remove(&id);
        }

        self.assignments = assignments;
        self.agents = agents;
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Bind `agent` to `task_id`. Mapping and record are inserted together
    /// or not at all.
    pub fn assign(&mut self, task_id: TaskId, agent: Agent) -> Result<()> {
        if self.assignments.contains_key(&task_id) {
            return Err(RegistryError::AlreadyAssigned(task_id));
        }
        if agent.task_id != task_id {
            return Err(RegistryError::TaskMismatch {
                task_id,
                agent_id: agent.id,
                agent_task: agent.task_id,
            });
        }
        if self.agents.contains_key(&agent.id) {
            return Err(RegistryError::AgentIdInUse(agent.id));
        }

        self.assignments.insert(task_id, agent.id.clone());
        self.agents.insert(agent.id.clone(), agent);
        self.persist();
        Ok(())
    }

    /// Unbind and delete the agent for `task_id`, returning its last state.
    pub fn remove(&mut self, task_id: TaskId) -> Result<Agent> {
        let agent_id = self
            .assignments
            .remove(&task_id)
            .ok_or(RegistryError::NotFound(task_id))?;
        let agent = self
            .agents
            .remove(&agent_id)
            .ok_or(RegistryError::AgentNotFound(agent_id))?;
        self.persist();
        Ok(agent)
    }

    /// Overwrite the stored record for `agent.id`. The agent must already be
    /// registered and stay bound to the same task.
    pub fn replace(&mut self, agent: Agent) -> Result<()> {
        let current = self
            .agents
            .get_mut(&agent.id)
            .ok_or_else(|| RegistryError::AgentNotFound(agent.id.clone()))?;
        if current.task_id != agent.task_id {
            return Err(RegistryError::TaskMismatch {
                task_id: current.task_id,
                agent_id: agent.id,
                agent_task: agent.task_id,
            });
        }
        *current = agent;
        self.persist();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get(&self, agent_id: &str) -> Result<&Agent> {
        self.agents
            .get(agent_id)
            .ok_or_else(|| RegistryError::AgentNotFound(agent_id.to_string()))
    }

    pub fn agent_for_task(&self, task_id: TaskId) -> Option<&Agent> {
        self.assignments
            .get(&task_id)
            .and_then(|id| self.agents.get(id))
    }

    /// All agents, oldest first.
    pub fn list(&self) -> Vec<Agent> {
        let mut agents: Vec<Agent> = self.agents.values().cloned().collect();
        agents.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        agents
    }

    pub fn assignments(&self) -> &BTreeMap<TaskId, String> {
        &self.assignments
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            task_assignments: self.assignments.clone(),
            agents: self
                .agents
                .iter()
                .map(|(id, agent)| (id.clone(), AgentRecord::from(agent)))
                .collect(),
            timestamp: Utc::now(),
        }
    }

    /// Blocking write on the calling task. Callers hold the registry lock,
    /// so two snapshots never interleave; a snapshot is a few KB of JSON.
    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(&self.snapshot()) {
            warn!(error = %e, "failed to write registry snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ao_core::testing::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn mismatched_task_is_rejected() {
        let mut reg = AgentRegistry::new();
        let err = reg.assign(7, Agent::new(8, at(0))).unwrap_err();
        assert!(matches!(err, RegistryError::TaskMismatch { task_id: 7, .. }));
        assert!(reg.is_empty());
        assert!(reg.assignments().is_empty());
    }

    #[test]
    fn reused_agent_id_is_rejected() {
        let mut reg = AgentRegistry::new();
        let agent = Agent::new(1, at(0));
        reg.assign(1, agent.clone()).unwrap();
        let mut twin = agent.clone();
        twin.task_id = 2;
        assert_eq!(
            reg.assign(2, twin),
            Err(RegistryError::AgentIdInUse(agent.id.clone()))
        );
        assert!(reg.agent_for_task(2).is_none());
    }

    #[test]
    fn restore_repairs_broken_snapshot() {
        let good = Agent::new(1, at(0));
        let other_task = Agent::new(2, at(1));
        let orphan = Agent::new(3, at(2));
        let loser = Agent::new(1, at(3));

        let mut snapshot = RegistrySnapshot::empty(at(10));
        for agent in [&good, &other_task, &orphan, &loser] {
            snapshot
                .agents
                .insert(agent.id.clone(), AgentRecord::from(agent));
        }
        snapshot.task_assignments.insert(1, good.id.clone());
        // Points at an agent of another task.
        snapshot.task_assignments.insert(5, other_task.id.clone());
        // Points nowhere.
        snapshot.task_assignments.insert(9, "agent_9_0".into());

        let store = Arc::new(MemoryStore::seeded(snapshot));
        let reg = AgentRegistry::restore(store).unwrap();

        assert_eq!(reg.agent_for_task(1).unwrap().id, good.id);
        assert_eq!(reg.agent_for_task(2).unwrap().id, other_task.id);
        assert_eq!(reg.agent_for_task(3).unwrap().id, orphan.id);
        assert!(reg.agent_for_task(5).is_none());
        assert!(reg.agent_for_task(9).is_none());
        assert!(reg.get(&loser.id).is_err());
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.assignments().len(), 3);
    }

    #[test]
    fn replace_cannot_move_agent_to_another_task() {
        let mut reg = AgentRegistry::new();
        let agent = Agent::new(4, at(0));
        reg.assign(4, agent.clone()).unwrap();

        let mut moved = agent.clone();
        moved.task_id = 5;
        assert!(matches!(
            reg.replace(moved),
            Err(RegistryError::TaskMismatch { .. })
        ));
        assert_eq!(reg.get(&agent.id).unwrap().task_id, 4);
    }
}
