use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::types::{Agent, AgentStatus, TaskId, DEFAULT_MAX_ERRORS};

// ---------------------------------------------------------------------------
// Snapshot format
// ---------------------------------------------------------------------------

/// Persisted form of one agent. Session state is process-local and is not
/// part of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub task_id: TaskId,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default)]
    pub error_count: u32,
    #[serde(default = "default_max_errors")]
    pub max_errors: u32,
}

fn default_max_errors() -> u32 {
    DEFAULT_MAX_ERRORS
}

impl From<&Agent> for AgentRecord {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id.clone(),
            task_id: agent.task_id,
            status: agent.status,
            created_at: agent.created_at,
            last_heartbeat: agent.last_heartbeat,
            error_count: agent.error_count,
            max_errors: agent.max_errors,
        }
    }
}

impl From<AgentRecord> for Agent {
    fn from(record: AgentRecord) -> Self {
        Self {
            id: record.id,
            task_id: record.task_id,
            status: record.status,
            created_at: record.created_at,
            last_heartbeat: record.last_heartbeat,
            error_count: record.error_count,
            max_errors: record.max_errors,
            squad_session_active: false,
        }
    }
}

/// Serialized copy of the agent registry.
///
/// ```json
/// {
///   "task_assignments": { "42": "agent_42_1740830400000000" },
///   "agents": { "agent_42_1740830400000000": { "id": "...", "task_id": 42, ... } },
///   "timestamp": "2025-03-01T12:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default)]
    pub task_assignments: BTreeMap<TaskId, String>,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentRecord>,
    pub timestamp: DateTime<Utc>,
}

impl RegistrySnapshot {
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            task_assignments: BTreeMap::new(),
            agents: BTreeMap::new(),
            timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// Durable home for registry snapshots.
pub trait StateStore: Send + Sync {
    fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), StoreError>;

    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<RegistrySnapshot>, StoreError>;
}

/// Snapshot persisted as a single pretty-printed JSON file.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStore for JsonFileStore {
    fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.temp_path();
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<RegistrySnapshot>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        let snapshot: RegistrySnapshot = serde_json::from_str(&data)?;
        Ok(Some(snapshot))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_snapshot() -> RegistrySnapshot {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut agent = Agent::new(42, created);
        agent.status = AgentStatus::Error;
        agent.error_count = 2;
        agent.last_heartbeat = created + chrono::Duration::milliseconds(1500);

        let mut snapshot = RegistrySnapshot::empty(created);
        snapshot.task_assignments.insert(42, agent.id.clone());
        snapshot.agents.insert(agent.id.clone(), AgentRecord::from(&agent));
        snapshot
    }

    #[test]
    fn load_missing_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("agent_state.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_reproduces_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state").join("agent_state.json"));
        let snapshot = sample_snapshot();

        store.save(&snapshot).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn task_ids_are_written_as_string_keys() {
        let json = serde_json::to_value(sample_snapshot()).unwrap();
        assert!(json["task_assignments"]["42"].is_string());
        let agent = json["agents"].as_object().unwrap().values().next().unwrap();
        assert_eq!(agent["status"], "error");
        assert_eq!(agent["error_count"], 2);
    }

    #[test]
    fn missing_counters_use_defaults() {
        let json = r#"{
            "task_assignments": {"7": "agent_7_1"},
            "agents": {
                "agent_7_1": {
                    "id": "agent_7_1",
                    "task_id": 7,
                    "status": "idle",
                    "created_at": "2025-03-01T12:00:00+00:00",
                    "last_heartbeat": "2025-03-01T12:05:00+00:00"
                }
            },
            "timestamp": "2025-03-01T12:05:00+00:00"
        }"#;
        let snapshot: RegistrySnapshot = serde_json::from_str(json).unwrap();
        let record = &snapshot.agents["agent_7_1"];
        assert_eq!(record.error_count, 0);
        assert_eq!(record.max_errors, DEFAULT_MAX_ERRORS);

        let agent = Agent::from(record.clone());
        assert!(!agent.squad_session_active);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent_state.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = JsonFileStore::new(path);
        assert!(matches!(store.load(), Err(StoreError::Serde(_))));
    }
}
