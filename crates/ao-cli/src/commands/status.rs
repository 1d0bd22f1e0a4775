use std::path::PathBuf;

use ao_agents::session::SquadSessionManager;
use ao_core::config::{Config, CredentialProvider};

use crate::app::open_registry;

/// Session CLI state as seen by `status`.
pub(crate) enum SessionCheck {
    Disabled,
    Missing(String),
    Available { command: String, version: Option<String> },
}

/// Readiness of every external piece the orchestrator depends on.
pub(crate) struct Readiness {
    pub token_env: String,
    pub token_set: bool,
    pub repo: Option<String>,
    pub llm_env: String,
    pub llm_key_set: bool,
    pub sessions: SessionCheck,
    pub state_path: PathBuf,
    /// `(agents, assignments)` or the load error.
    pub state: Result<(usize, usize), String>,
}

impl Readiness {
    pub(crate) fn render(&self) -> Vec<String> {
        let token = if self.token_set {
            "set".to_string()
        } else {
            format!("missing (export {})", self.token_env)
        };
        let repo = self.repo.clone().unwrap_or_else(|| "not set (GITHUB_REPO=owner/repo)".into());
        let llm = if self.llm_key_set {
            "set".to_string()
        } else {
            format!("missing ({}); task analysis disabled", self.llm_env)
        };
        let sessions = match &self.sessions {
            SessionCheck::Disabled => "disabled".to_string(),
            SessionCheck::Missing(command) => format!("`{command}` not available"),
            SessionCheck::Available { command, version } => match version {
                Some(v) => format!("`{command}` {v}"),
                None => format!("`{command}` available"),
            },
        };
        let state = match &self.state {
            Ok((agents, assignments)) => format!(
                "{} ({agents} agents, {assignments} assignments)",
                self.state_path.display()
            ),
            Err(e) => format!("{} (unreadable: {e})", self.state_path.display()),
        };

        vec![
            format!("agent-orchestrator status  (v{})", env!("CARGO_PKG_VERSION")),
            "-".repeat(40),
            format!("GitHub token:   {token}"),
            format!("Repository:     {repo}"),
            format!("LLM API key:    {llm}"),
            format!("Session CLI:    {sessions}"),
            format!("State file:     {state}"),
        ]
    }

    /// Ready to manage agents: token and repository are both present.
    pub(crate) fn is_ready(&self) -> bool {
        self.token_set && self.repo.is_some() && self.state.is_ok()
    }
}

/// Run the `status` subcommand: report what is configured without touching
/// GitHub.
pub async fn run(config: &Config) -> anyhow::Result<()> {
    let sessions = if config.sessions.enabled {
        let manager = SquadSessionManager::new(config.sessions.command.clone()).await;
        if manager.is_available() {
            SessionCheck::Available {
                command: manager.command().to_string(),
                version: manager.version().map(str::to_string),
            }
        } else {
            SessionCheck::Missing(manager.command().to_string())
        }
    } else {
        SessionCheck::Disabled
    };

    let readiness = Readiness {
        token_env: config.github.token_env.clone(),
        token_set: CredentialProvider::github_token(config).is_some(),
        repo: config.github.full_name(),
        llm_env: config.llm.api_key_env.clone(),
        llm_key_set: CredentialProvider::llm_api_key(config).is_some(),
        sessions,
        state_path: config.state.path.clone(),
        state: open_registry(config)
            .map(|r| (r.len(), r.assignments().len()))
            .map_err(|e| format!("{e:#}")),
    };

    for line in readiness.render() {
        println!("{line}");
    }
    if readiness.is_ready() {
        println!("ready");
    } else {
        println!("not ready: set the missing values above");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readiness() -> Readiness {
        Readiness {
            token_env: "GITHUB_TOKEN".into(),
            token_set: true,
            repo: Some("octo/widgets".into()),
            llm_env: "ANTHROPIC_API_KEY".into(),
            llm_key_set: false,
            sessions: SessionCheck::Disabled,
            state_path: PathBuf::from("agent_state.json"),
            state: Ok((2, 2)),
        }
    }

    #[test]
    fn renders_every_check() {
        let lines = readiness().render();
        assert_eq!(lines.len(), 7);
        assert!(lines[2].ends_with("set"));
        assert!(lines[3].contains("octo/widgets"));
        assert!(lines[4].contains("analysis disabled"));
        assert!(lines[5].ends_with("disabled"));
        assert!(lines[6].contains("2 agents, 2 assignments"));
    }

    #[test]
    fn missing_token_is_not_ready() {
        let mut r = readiness();
        assert!(r.is_ready());
        r.token_set = false;
        assert!(!r.is_ready());
        assert!(r.render()[2].contains("export GITHUB_TOKEN"));
    }

    #[test]
    fn session_cli_version_is_shown() {
        let mut r = readiness();
        r.sessions = SessionCheck::Available {
            command: "cs".into(),
            version: Some("cs 0.9.1".into()),
        };
        assert_eq!(r.render()[5], "Session CLI:    `cs` cs 0.9.1");
    }

    #[test]
    fn unreadable_state_is_reported() {
        let mut r = readiness();
        r.state = Err("expected value at line 1".into());
        r.sessions = SessionCheck::Missing("cs".into());
        let lines = r.render();
        assert!(lines[5].contains("`cs` not available"));
        assert!(lines[6].contains("unreadable"));
        assert!(!r.is_ready());
    }
}
