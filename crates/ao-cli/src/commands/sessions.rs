use crate::app::App;

/// Sessions live in this process only, so this is mostly useful from the
/// interactive menu.
pub async fn list(app: &App) -> anyhow::Result<()> {
    let Some(manager) = &app.sessions else {
        println!("squad sessions are disabled");
        return Ok(());
    };
    let sessions = manager.list_sessions().await;
    if sessions.is_empty() {
        println!("no squad sessions");
        return Ok(());
    }
    for s in sessions {
        println!(
            "{:<24} {:<28} #{:<6} {:<9} {}",
            s.session_name,
            s.agent_id,
            s.task_id,
            s.status.to_string(),
            s.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

pub async fn prompt(app: &App, agent_id: &str) -> anyhow::Result<()> {
    let Some(manager) = &app.sessions else {
        anyhow::bail!("squad sessions are disabled");
    };
    match manager.session_prompt(agent_id).await {
        Some(prompt) => {
            println!("{prompt}");
            Ok(())
        }
        None => anyhow::bail!("no squad session for agent `{agent_id}`"),
    }
}
