use anyhow::Context;

use ao_agents::supervisor::SupervisionLoop;

use crate::app::App;

/// Run the supervision loop until Ctrl-C, then stop it.
pub async fn run(app: &App) -> anyhow::Result<()> {
    let supervisor = SupervisionLoop::new(app.controller.clone());
    supervisor.start().await?;
    println!(
        "monitoring {} agents every {}s (state in {}); press Ctrl-C to stop",
        app.controller.list_agents().await.len(),
        supervisor.intervals().check.as_secs(),
        app.config.state.path.display()
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;

    stop_monitoring(&supervisor).await?;
    println!("monitoring stopped");
    Ok(())
}

/// Stop the loop if it is running. Agent records are left untouched.
/// Returns whether a running loop was stopped.
pub(crate) async fn stop_monitoring(supervisor: &SupervisionLoop) -> anyhow::Result<bool> {
    if !supervisor.is_running().await {
        return Ok(false);
    }
    supervisor.stop().await?;
    Ok(true)
}
