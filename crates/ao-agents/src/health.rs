use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ao_core::collaborators::{SessionManager, SessionStatus};
use ao_core::types::{Agent, AgentStatus};

/// An agent whose last heartbeat is older than this is considered stuck.
pub const HEARTBEAT_STALENESS: Duration = Duration::from_secs(10 * 60);

// ---------------------------------------------------------------------------
// UnhealthyReason
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum UnhealthyReason {
    TooManyErrors { count: u32, max: u32 },
    StaleHeartbeat { age_secs: u64 },
    ErrorStatus,
    SessionInactive { status: SessionStatus },
    SessionCheckFailed { error: String },
}

impl fmt::Display for UnhealthyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnhealthyReason::TooManyErrors { count, max } => {
                write!(f, "error count {count} reached limit {max}")
            }
            UnhealthyReason::StaleHeartbeat { age_secs } => {
                write!(f, "no heartbeat for {age_secs}s")
            }
            UnhealthyReason::ErrorStatus => write!(f, "agent is in error status"),
            UnhealthyReason::SessionInactive { status } => write!(f, "session is {status}"),
            UnhealthyReason::SessionCheckFailed { error } => {
                write!(f, "session status unknown: {error}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// HealthEvaluator
// ---------------------------------------------------------------------------

/// Liveness policy for agents. Checks run in a fixed order and the first
/// failing one is reported.
#[derive(Debug, Clone, Copy)]
pub struct HealthEvaluator {
    staleness: Duration,
}

impl Default for HealthEvaluator {
    fn default() -> Self {
        Self::new(HEARTBEAT_STALENESS)
    }
}

impl HealthEvaluator {
    pub fn new(staleness: Duration) -> Self {
        Self { staleness }
    }

    pub fn staleness(&self) -> Duration {
        self.staleness
    }

    /// Checks that need only the record: error budget, heartbeat age and
    /// status. A heartbeat in the future counts as fresh.
    pub fn assess(&self, agent: &Agent, now: DateTime<Utc>) -> Option<UnhealthyReason> {
        if agent.error_count >= agent.max_errors {
            return Some(UnhealthyReason::TooManyErrors {
                count: agent.error_count,
                max: agent.max_errors,
            });
        }
        if let Ok(age) = (now - agent.last_heartbeat).to_std() {
            if age > self.staleness {
                return Some(UnhealthyReason::StaleHeartbeat {
                    age_secs: age.as_secs(),
                });
            }
        }
        if agent.status == AgentStatus::Error {
            return Some(UnhealthyReason::ErrorStatus);
        }
        None
    }

    /// Full check. Agents backed by a session also need that session to
    /// report `active`; a failed status query counts as unhealthy.
    pub async fn check(
        &self,
        agent: &Agent,
        now: DateTime<Utc>,
        sessions: &dyn SessionManager,
    ) -> Option<UnhealthyReason> {
        if let Some(reason) = self.assess(agent, now) {
            return Some(reason);
        }
        if !agent.squad_session_active {
            return None;
        }
        match sessions.check_status(&agent.id).await {
            Ok(SessionStatus::Active) => None,
            Ok(status) => Some(UnhealthyReason::SessionInactive { status }),
            Err(e) => Some(UnhealthyReason::SessionCheckFailed {
                error: e.to_string(),
            }),
        }
    }

    pub async fn is_healthy(
        &self,
        agent: &Agent,
        now: DateTime<Utc>,
        sessions: &dyn SessionManager,
    ) -> bool {
        self.check(agent, now, sessions).await.is_none()
    }

    /// Unhealthy agents with their reasons, in input order.
    pub async fn get_unhealthy_agents(
        &self,
        agents: &[Agent],
        now: DateTime<Utc>,
        sessions: &dyn SessionManager,
    ) -> Vec<(Agent, UnhealthyReason)> {
        let mut unhealthy = Vec::new();
        for agent in agents {
            if let Some(reason) = self.check(agent, now, sessions).await {
                unhealthy.push((agent.clone(), reason));
            }
        }
        unhealthy
    }
}
