use tracing::Span;

/// Span wrapping one lifecycle operation on an agent.
pub fn agent_span(operation: &'static str, agent_id: &str, task_id: u64) -> Span {
    tracing::info_span!("agent", op = operation, agent_id = %agent_id, task_id)
}

/// Span wrapping one supervision sweep.
pub fn sweep_span(iteration: u64) -> Span {
    tracing::info_span!("sweep", iteration)
}
