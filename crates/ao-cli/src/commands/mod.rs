pub mod agents;
pub mod interactive;
pub mod lifecycle;
pub mod monitor;
pub mod sessions;
pub mod status;
pub mod tasks;

use chrono::{DateTime, Utc};

use ao_agents::health::UnhealthyReason;
use ao_core::types::{Agent, Task};

const TITLE_WIDTH: usize = 50;
const MAX_LABELS: usize = 3;

pub(crate) fn task_header() -> String {
    format!(
        "{:<6} {:<53} {:<30} {:<28} {}",
        "ISSUE", "TITLE", "LABELS", "AGENT", "CREATED"
    )
}

pub(crate) fn task_row(task: &Task, agent_id: Option<&str>) -> String {
    let labels = task
        .labels
        .iter()
        .take(MAX_LABELS)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "#{:<5} {:<53} {:<30} {:<28} {}",
        task.id,
        task.short_title(TITLE_WIDTH),
        labels,
        agent_id.unwrap_or("-"),
        task.created_at.format("%Y-%m-%d")
    )
}

pub(crate) fn agent_header() -> String {
    format!(
        "{:<28} {:<7} {:<10} {:<7} {:<20} {}",
        "AGENT", "ISSUE", "STATUS", "ERRORS", "LAST HEARTBEAT", "HEALTH"
    )
}

pub(crate) fn agent_row(agent: &Agent, verdict: Option<&UnhealthyReason>) -> String {
    let health = match verdict {
        None => "healthy".to_string(),
        Some(reason) => format!("unhealthy ({reason})"),
    };
    format!(
        "{:<28} #{:<6} {} {:<8} {:<7} {:<20} {}",
        agent.id,
        agent.task_id,
        agent.status.glyph(),
        agent.status.as_str(),
        format!("{}/{}", agent.error_count, agent.max_errors),
        ago(agent.last_heartbeat, Utc::now()),
        health
    )
}

/// Coarse age such as `42s ago` or `3m ago`.
pub(crate) fn ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}
