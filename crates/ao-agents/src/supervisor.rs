use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument};

use ao_telemetry::spans::sweep_span;

use crate::health::{HealthEvaluator, UnhealthyReason};
use crate::lifecycle::{restart_comment, LifecycleController, LifecycleError};

/// Pause between two health sweeps.
pub const SUPERVISION_INTERVAL: Duration = Duration::from_secs(300);

/// Pause after a sweep that failed.
pub const FAILURE_BACKOFF: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("supervision loop is already running")]
    AlreadyRunning,

    #[error("supervision loop is not running")]
    NotRunning,

    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("supervision task panicked: {0}")]
    Panicked(String),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

// ---------------------------------------------------------------------------
// Intervals / report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct SupervisorIntervals {
    pub check: Duration,
    pub backoff: Duration,
}

impl Default for SupervisorIntervals {
    fn default() -> Self {
        Self {
            check: SUPERVISION_INTERVAL,
            backoff: FAILURE_BACKOFF,
        }
    }
}

/// Result of one health sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub unhealthy: Vec<(String, UnhealthyReason)>,
    pub restarted: Vec<String>,
}

// ---------------------------------------------------------------------------
// SupervisionLoop
// ---------------------------------------------------------------------------

struct RunningLoop {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Background task that restarts unhealthy agents.
///
/// Each iteration sweeps first and then waits. A stop request is observed
/// only while waiting, so a sweep in progress always runs to the end.
pub struct SupervisionLoop {
    controller: LifecycleController,
    evaluator: HealthEvaluator,
    intervals: SupervisorIntervals,
    running: Mutex<Option<RunningLoop>>,
}

impl SupervisionLoop {
    pub fn new(controller: LifecycleController) -> Self {
        Self {
            controller,
            evaluator: HealthEvaluator::default(),
            intervals: SupervisorIntervals::default(),
            running: Mutex::new(None),
        }
    }

    pub fn with_evaluator(mut self, evaluator: HealthEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_intervals(mut self, intervals: SupervisorIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    pub fn intervals(&self) -> SupervisorIntervals {
        self.intervals
    }

    /// Run one sweep now, on the caller's task.
    pub async fn sweep(&self) -> Result<SweepReport> {
        sweep(&self.controller, &self.evaluator).await
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Spawn the loop on the current runtime.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Err(SupervisorError::AlreadyRunning);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run(
            self.controller.clone(),
            self.evaluator,
            self.intervals,
            stop_rx,
        ));
        *running = Some(RunningLoop { stop_tx, handle });
        info!(
            interval_secs = self.intervals.check.as_secs(),
            "supervision loop started"
        );
        Ok(())
    }

    /// Signal the loop and wait for it to exit.
    pub async fn stop(&self) -> Result<()> {
        let Some(RunningLoop { stop_tx, handle }) = self.running.lock().await.take() else {
            return Err(SupervisorError::NotRunning);
        };
        let _ = stop_tx.send(true);
        match handle.await {
            Ok(()) => {
                info!("supervision loop stopped");
                Ok(())
            }
            Err(e) if e.is_panic() => Err(SupervisorError::Panicked(panic_message(e.into_panic()))),
            Err(e) => Err(SupervisorError::Panicked(e.to_string())),
        }
    }
}

async fn run(
    controller: LifecycleController,
    evaluator: HealthEvaluator,
    intervals: SupervisorIntervals,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut iteration: u64 = 0;
    loop {
        if *stop_rx.borrow() {
            break;
        }
        iteration += 1;

        let outcome = AssertUnwindSafe(sweep(&controller, &evaluator).instrument(sweep_span(iteration)))
            .catch_unwind()
            .await;
        let wait = match outcome {
            Ok(Ok(report)) => {
                info!(
                    iteration,
                    checked = report.checked,
                    restarted = report.restarted.len(),
                    "health sweep finished"
                );
                intervals.check
            }
            Ok(Err(e)) => {
                error!(iteration, error = %e, "health sweep failed; backing off");
                intervals.backoff
            }
            Err(panic) => {
                error!(iteration, panic = %panic_message(panic), "health sweep panicked; backing off");
                intervals.backoff
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = stop_rx.changed() => {
                // A dropped sender means the owner is gone.
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }
}

async fn sweep(controller: &LifecycleController, evaluator: &HealthEvaluator) -> Result<SweepReport> {
    let agents = controller.list_agents().await;
    let sessions = controller.sessions();
    let unhealthy = evaluator
        .get_unhealthy_agents(&agents, Utc::now(), sessions.as_ref())
        .await;

    let mut report = SweepReport {
        checked: agents.len(),
        ..SweepReport::default()
    };

    for (agent, reason) in unhealthy {
        warn!(agent_id = %agent.id, task_id = agent.task_id, reason = %reason, "unhealthy agent");
        report.unhealthy.push((agent.id.clone(), reason));

        match controller.restart_agent(&agent.id).await {
            Ok(_) => {
                controller
                    .notify(agent.task_id, &restart_comment(&agent.id))
                    .await;
                report.restarted.push(agent.id);
            }
            Err(LifecycleError::AgentNotFound(_)) => {
                warn!(agent_id = %agent.id, "agent removed before it could be restarted");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(report)
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
