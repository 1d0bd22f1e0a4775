use chrono::Utc;

use ao_agents::health::HealthEvaluator;
use ao_core::collaborators::{NoSessions, SessionManager};
use ao_core::config::Config;
use ao_core::types::Agent;

use super::{agent_header, agent_row};
use crate::app::open_registry;

/// Run the `list-agents` subcommand straight from the state file.
pub async fn run(config: &Config) -> anyhow::Result<()> {
    let registry = open_registry(config)?;
    print(&registry.list(), &NoSessions).await;
    Ok(())
}

/// Print `agents` with their current health verdict.
pub async fn print(agents: &[Agent], sessions: &dyn SessionManager) {
    if agents.is_empty() {
        println!("no agents");
        return;
    }
    let evaluator = HealthEvaluator::default();
    let now = Utc::now();
    println!("{}", agent_header());
    for agent in agents {
        let verdict = evaluator.check(agent, now, sessions).await;
        println!("{}", agent_row(agent, verdict.as_ref()));
    }
}
