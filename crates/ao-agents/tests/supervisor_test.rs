mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use ao_agents::health::UnhealthyReason;
use ao_agents::lifecycle::{restart_comment, LifecycleController};
use ao_agents::registry::AgentRegistry;
use ao_agents::supervisor::{
    SupervisionLoop, SupervisorError, SupervisorIntervals, FAILURE_BACKOFF, SUPERVISION_INTERVAL,
};
use ao_core::collaborators::{CollaboratorError, SessionManager, SessionStatus};
use ao_core::testing::{RecordingNotifier, StaticTaskSource};
use ao_core::types::{Agent, AgentStatus, Task};

use common::{agent_aged, harness_with};

fn quick(check_ms: u64) -> SupervisorIntervals {
    SupervisorIntervals {
        check: Duration::from_millis(check_ms),
        backoff: Duration::from_millis(10),
    }
}

async fn wait_until<F, Fut>(mut cond: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

#[test]
fn default_intervals() {
    let intervals = SupervisorIntervals::default();
    assert_eq!(intervals.check, SUPERVISION_INTERVAL);
    assert_eq!(intervals.backoff, FAILURE_BACKOFF);
    assert_eq!(SUPERVISION_INTERVAL, Duration::from_secs(300));
    assert_eq!(FAILURE_BACKOFF, Duration::from_secs(30));
}

// ===========================================================================
// Sweep
// ===========================================================================

#[tokio::test]
async fn sweep_restarts_only_the_unhealthy_agent() {
    let healthy_a = agent_aged(1, 1);
    let mut failing = agent_aged(2, 1);
    failing.error_count = 3;
    failing.status = AgentStatus::Error;
    let healthy_b = agent_aged(3, 2);

    let h = harness_with(
        &[1, 2, 3],
        vec![healthy_a.clone(), failing.clone(), healthy_b.clone()],
    );
    let supervisor = SupervisionLoop::new(h.controller.clone());

    let report = supervisor.sweep().await.unwrap();
    assert_eq!(report.checked, 3);
    assert_eq!(report.restarted, vec![failing.id.clone()]);
    assert!(matches!(
        report.unhealthy.as_slice(),
        [(id, UnhealthyReason::TooManyErrors { count: 3, max: 3 })] if *id == failing.id
    ));

    let after = h.controller.get_agent(&failing.id).await.unwrap();
    assert_eq!(after.error_count, 0);
    assert_eq!(after.status, AgentStatus::Idle);
    assert!(after.last_heartbeat > failing.last_heartbeat);

    // Untouched.
    assert_eq!(h.controller.get_agent(&healthy_a.id).await.unwrap(), healthy_a);
    assert_eq!(h.controller.get_agent(&healthy_b.id).await.unwrap(), healthy_b);

    assert_eq!(h.notifier.comments(), vec![(2, restart_comment(&failing.id))]);
}

#[tokio::test]
async fn sweep_restarts_stale_agents() {
    let stale = agent_aged(4, 15);
    let h = harness_with(&[4], vec![stale.clone()]);
    let supervisor = SupervisionLoop::new(h.controller.clone());

    let report = supervisor.sweep().await.unwrap();
    assert_eq!(report.restarted, vec![stale.id.clone()]);
    let after = h.controller.get_agent(&stale.id).await.unwrap();
    assert!(after.last_heartbeat > stale.last_heartbeat);

    // A second sweep finds nothing to do.
    let report = supervisor.sweep().await.unwrap();
    assert!(report.restarted.is_empty());
}

#[tokio::test]
async fn sweep_on_empty_registry() {
    let h = harness_with(&[], Vec::new());
    let report = SupervisionLoop::new(h.controller.clone()).sweep().await.unwrap();
    assert_eq!(report.checked, 0);
    assert!(report.unhealthy.is_empty());
}

// ===========================================================================
// Start / stop
// ===========================================================================

#[tokio::test]
async fn start_twice_is_an_error() {
    let h = harness_with(&[], Vec::new());
    let supervisor = SupervisionLoop::new(h.controller.clone()).with_intervals(quick(3_600_000));

    assert!(!supervisor.is_running().await);
    supervisor.start().await.unwrap();
    assert!(supervisor.is_running().await);
    assert!(matches!(
        supervisor.start().await,
        Err(SupervisorError::AlreadyRunning)
    ));

    supervisor.stop().await.unwrap();
    assert!(!supervisor.is_running().await);
    assert!(matches!(supervisor.stop().await, Err(SupervisorError::NotRunning)));

    // Can be started again after a clean stop.
    supervisor.start().await.unwrap();
    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn stop_interrupts_a_long_wait() {
    let h = harness_with(&[], Vec::new());
    let supervisor = SupervisionLoop::new(h.controller.clone()).with_intervals(quick(3_600_000));
    supervisor.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let stopped = tokio::time::timeout(Duration::from_secs(2), supervisor.stop()).await;
    assert!(matches!(stopped, Ok(Ok(()))));
}

#[tokio::test]
async fn running_loop_repairs_agents() {
    let stale = agent_aged(5, 20);
    let h = harness_with(&[5], vec![stale.clone()]);
    let supervisor = SupervisionLoop::new(h.controller.clone()).with_intervals(quick(20));
    supervisor.start().await.unwrap();

    let controller = h.controller.clone();
    let id = stale.id.clone();
    let before = stale.last_heartbeat;
    let repaired = wait_until(|| {
        let controller = controller.clone();
        let id = id.clone();
        async move {
            controller
                .get_agent(&id)
                .await
                .map(|a| a.last_heartbeat > before)
                .unwrap_or(false)
        }
    })
    .await;
    assert!(repaired);

    supervisor.stop().await.unwrap();
    assert_eq!(h.notifier.comments_for(5), vec![restart_comment(&stale.id)]);
}

// ===========================================================================
// Failure handling
// ===========================================================================

/// Session backend whose status query panics.
struct PanickingSessions;

#[async_trait]
impl SessionManager for PanickingSessions {
    async fn create_session(&self, _task: &Task, _agent_id: &str) -> Result<(), CollaboratorError> {
        Ok(())
    }

    async fn check_status(&self, _agent_id: &str) -> Result<SessionStatus, CollaboratorError> {
        panic!("session backend exploded");
    }

    async fn terminate_session(&self, _agent_id: &str) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

#[tokio::test]
async fn panicking_sweep_does_not_kill_the_loop() {
    let mut agent = Agent::new(6, Utc::now());
    agent.squad_session_active = true;
    let mut registry = AgentRegistry::new();
    registry.assign(6, agent).unwrap();

    let controller = LifecycleController::new(
        registry,
        Arc::new(StaticTaskSource::with_ids(&[6])),
        Arc::new(RecordingNotifier::new()),
    )
    .with_sessions(Arc::new(PanickingSessions));
    let supervisor = SupervisionLoop::new(controller).with_intervals(quick(20));

    supervisor.start().await.unwrap();
    // Several sweeps panic and back off in this window.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(supervisor.is_running().await);
    supervisor.stop().await.unwrap();
}

/// Session backend whose status query is slow and reports the session gone.
struct SlowSessions {
    delay: Duration,
    checking: Arc<Notify>,
}

#[async_trait]
impl SessionManager for SlowSessions {
    async fn create_session(&self, _task: &Task, _agent_id: &str) -> Result<(), CollaboratorError> {
        Ok(())
    }

    async fn check_status(&self, _agent_id: &str) -> Result<SessionStatus, CollaboratorError> {
        self.checking.notify_one();
        tokio::time::sleep(self.delay).await;
        Ok(SessionStatus::Inactive)
    }

    async fn terminate_session(&self, _agent_id: &str) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

#[tokio::test]
async fn stop_during_sweep_lets_the_restart_finish() {
    let mut agent = agent_aged(7, 2);
    agent.error_count = 1;
    agent.squad_session_active = true;
    let mut registry = AgentRegistry::new();
    registry.assign(7, agent.clone()).unwrap();

    let checking = Arc::new(Notify::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let controller = LifecycleController::new(
        registry,
        Arc::new(StaticTaskSource::with_ids(&[7])),
        notifier.clone(),
    )
    .with_sessions(Arc::new(SlowSessions {
        delay: Duration::from_millis(200),
        checking: checking.clone(),
    }));
    let supervisor = SupervisionLoop::new(controller.clone()).with_intervals(quick(3_600_000));

    supervisor.start().await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), checking.notified())
        .await
        .unwrap();
    // The sweep is now inside the session query.
    supervisor.stop().await.unwrap();

    let after = controller.get_agent(&agent.id).await.unwrap();
    assert_eq!(after.status, AgentStatus::Idle);
    assert_eq!(after.error_count, 0);
    assert!(after.last_heartbeat > agent.last_heartbeat);
    assert_eq!(notifier.comments(), vec![(7, restart_comment(&agent.id))]);
}
