mod app;
mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;

use ao_telemetry::logging::{self, LogFormat};

use app::App;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// agent-orchestrator -- supervise one agent per open GitHub issue.
#[derive(Parser)]
#[command(name = "ao", version, about)]
struct Cli {
    /// Config file (default: ~/.agent-orchestrator/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the registry state file.
    #[arg(long, global = true)]
    state_file: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List open issues and the agent working on each.
    ListTasks {
        /// Only show issues without an agent.
        #[arg(long)]
        unassigned: bool,
    },

    /// List agents with their health verdict.
    ListAgents,

    /// Create an agent for an issue.
    Assign {
        /// Issue number.
        task_id: u64,
    },

    /// Remove the agent working on an issue.
    Remove {
        /// Issue number.
        task_id: u64,
    },

    /// Reset an agent to idle with a clean error count.
    Restart {
        /// Agent id, e.g. `agent_42_1740830400000000`.
        agent_id: String,
    },

    /// Run the supervision loop until Ctrl-C.
    Monitor,

    /// Numbered menu over all operations (default when no subcommand is given).
    Interactive,

    /// Configuration readiness check.
    Status,

    /// List squad sessions held by this process.
    Sessions,

    /// Print the session prompt prepared for an agent.
    Prompt {
        agent_id: String,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = app::load_config(cli.config.as_deref(), cli.state_file.as_deref())?;
    logging::init(
        LogFormat::from_flag(cli.json_logs),
        "agent-orchestrator",
        &config.general.log_level,
    );

    let command = cli.command.unwrap_or(Commands::Interactive);
    match command {
        Commands::Status => commands::status::run(&config).await,
        Commands::ListAgents => commands::agents::run(&config).await,
        Commands::ListTasks { unassigned } => {
            commands::tasks::run(&App::build(config).await?, unassigned).await
        }
        Commands::Assign { task_id } => {
            commands::lifecycle::assign(&App::build(config).await?, task_id).await
        }
        Commands::Remove { task_id } => {
            commands::lifecycle::remove(&App::build(config).await?, task_id).await
        }
        Commands::Restart { agent_id } => {
            commands::lifecycle::restart(&App::build(config).await?, &agent_id).await
        }
        Commands::Monitor => commands::monitor::run(&App::build(config).await?).await,
        Commands::Interactive => commands::interactive::run(&App::build(config).await?).await,
        Commands::Sessions => commands::sessions::list(&App::build(config).await?).await,
        Commands::Prompt { agent_id } => {
            commands::sessions::prompt(&App::build(config).await?, &agent_id).await
        }
    }
}
