use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use ao_agents::supervisor::SupervisionLoop;

use super::{agents, lifecycle, monitor, sessions, tasks};
use crate::app::App;

const MENU: &str = "\
1) List open issues
2) List agents
3) Assign agent to issue
4) Remove agent from issue
5) Restart agent
6) Start/stop monitoring
7) Show squad sessions
0) Quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Choice {
    ListTasks,
    ListAgents,
    Assign,
    Remove,
    Restart,
    ToggleMonitoring,
    Sessions,
    Quit,
}

impl Choice {
    pub(crate) fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(Choice::ListTasks),
            "2" => Some(Choice::ListAgents),
            "3" => Some(Choice::Assign),
            "4" => Some(Choice::Remove),
            "5" => Some(Choice::Restart),
            "6" => Some(Choice::ToggleMonitoring),
            "7" => Some(Choice::Sessions),
            "0" | "q" | "quit" | "exit" => Some(Choice::Quit),
            _ => None,
        }
    }
}

/// Parse an issue number, tolerating a leading `#`.
pub(crate) fn parse_task_id(input: &str) -> Option<u64> {
    input.trim().trim_start_matches('#').parse().ok()
}

/// Menu loop. Operation errors are printed and the menu continues; only
/// quit or end of input leaves.
pub async fn run(app: &App) -> anyhow::Result<()> {
    let supervisor = SupervisionLoop::new(app.controller.clone());
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        println!("\n{MENU}");
        let Some(line) = ask(&mut input, "> ").await? else {
            break;
        };
        let Some(choice) = Choice::parse(&line) else {
            println!("unknown choice `{}`", line.trim());
            continue;
        };

        let outcome = match choice {
            Choice::Quit => break,
            Choice::ListTasks => tasks::run(app, false).await,
            Choice::ListAgents => {
                let sessions = app.controller.sessions();
                agents::print(&app.controller.list_agents().await, sessions.as_ref()).await;
                Ok(())
            }
            Choice::Assign | Choice::Remove => {
                let Some(raw) = ask(&mut input, "issue number: ").await? else {
                    break;
                };
                match parse_task_id(&raw) {
                    Some(id) if choice == Choice::Assign => lifecycle::assign(app, id).await,
                    Some(id) => lifecycle::remove(app, id).await,
                    None => Err(anyhow::anyhow!("`{}` is not an issue number", raw.trim())),
                }
            }
            Choice::Restart => {
                let Some(raw) = ask(&mut input, "agent id: ").await? else {
                    break;
                };
                lifecycle::restart(app, raw.trim()).await
            }
            Choice::ToggleMonitoring => toggle(&supervisor).await,
            Choice::Sessions => sessions::list(app).await,
        };
        if let Err(e) = outcome {
            eprintln!("error: {e:#}");
        }
    }

    if monitor::stop_monitoring(&supervisor).await? {
        println!("monitoring stopped");
    }
    println!("bye");
    Ok(())
}

async fn toggle(supervisor: &SupervisionLoop) -> anyhow::Result<()> {
    if monitor::stop_monitoring(supervisor).await? {
        println!("monitoring stopped");
    } else {
        supervisor.start().await?;
        println!(
            "monitoring started (every {}s)",
            supervisor.intervals().check.as_secs()
        );
    }
    Ok(())
}

/// Prompt and read one line. `None` at end of input.
async fn ask(input: &mut Lines<BufReader<Stdin>>, prompt: &str) -> anyhow::Result<Option<String>> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    Ok(input.next_line().await?)
}
