#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use ao_agents::lifecycle::LifecycleController;
use ao_agents::registry::AgentRegistry;
use ao_core::testing::{MemoryStore, RecordingNotifier, ScriptedSessions, StaticTaskSource};
use ao_core::types::{Agent, TaskId};

pub struct Harness {
    pub tasks: Arc<StaticTaskSource>,
    pub notifier: Arc<RecordingNotifier>,
    pub sessions: Arc<ScriptedSessions>,
    pub store: Arc<MemoryStore>,
    pub controller: LifecycleController,
}

/// Controller over open tasks `ids`, pre-populated with `agents`.
pub fn harness_with(ids: &[TaskId], agents: Vec<Agent>) -> Harness {
    let tasks = Arc::new(StaticTaskSource::with_ids(ids));
    let notifier = Arc::new(RecordingNotifier::new());
    let sessions = Arc::new(ScriptedSessions::new());
    let store = Arc::new(MemoryStore::new());

    let mut registry = AgentRegistry::with_store(store.clone());
    for agent in agents {
        registry.assign(agent.task_id, agent).unwrap();
    }

    let controller = LifecycleController::new(registry, tasks.clone(), notifier.clone())
        .with_sessions(sessions.clone());

    Harness {
        tasks,
        notifier,
        sessions,
        store,
        controller,
    }
}

pub fn harness(ids: &[TaskId]) -> Harness {
    harness_with(ids, Vec::new())
}

pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    Utc::now() - Duration::minutes(minutes)
}

/// Idle agent for `task_id` whose heartbeat is `age_minutes` old.
pub fn agent_aged(task_id: TaskId, age_minutes: i64) -> Agent {
    Agent::new(task_id, minutes_ago(age_minutes))
}
