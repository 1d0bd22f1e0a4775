use crate::app::App;

pub async fn assign(app: &App, task_id: u64) -> anyhow::Result<()> {
    let agent = app.controller.assign_agent_to_task(task_id).await?;
    println!(
        "assigned {} to issue #{} (status {})",
        agent.id, task_id, agent.status
    );
    Ok(())
}

pub async fn remove(app: &App, task_id: u64) -> anyhow::Result<()> {
    let agent = app.controller.remove_agent_from_task(task_id).await?;
    println!("removed {} from issue #{}", agent.id, task_id);
    Ok(())
}

pub async fn restart(app: &App, agent_id: &str) -> anyhow::Result<()> {
    let agent = app.controller.restart_agent(agent_id).await?;
    println!("restarted {} (issue #{})", agent.id, agent.task_id);
    Ok(())
}
