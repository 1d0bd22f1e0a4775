use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info};

use ao_agents::analyzer::{LlmTaskAnalyzer, STEP_MAX_TOKENS};
use ao_agents::lifecycle::LifecycleController;
use ao_agents::registry::AgentRegistry;
use ao_agents::session::SquadSessionManager;
use ao_core::config::{Config, CredentialProvider};
use ao_core::state_store::JsonFileStore;
use ao_intelligence::llm::AnthropicProvider;
use ao_integrations::github::client::GitHubClient;

/// Load the config file (or defaults), then apply env and CLI overrides.
pub fn load_config(path: Option<&Path>, state_file: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(p) => Config::load_from(p).with_context(|| format!("loading {}", p.display()))?,
        None => Config::load().context("loading default config")?,
    };
    config.apply_env().context("applying environment overrides")?;
    if let Some(state_file) = state_file {
        config.state.path = state_file.to_path_buf();
    }
    Ok(config)
}

/// Registry restored from the configured state file.
pub fn open_registry(config: &Config) -> anyhow::Result<AgentRegistry> {
    let store = Arc::new(JsonFileStore::new(&config.state.path));
    AgentRegistry::restore(store)
        .with_context(|| format!("restoring agents from {}", config.state.path.display()))
}

/// Everything a command needs, wired from config.
pub struct App {
    pub config: Config,
    pub github: Arc<GitHubClient>,
    pub sessions: Option<Arc<SquadSessionManager>>,
    pub controller: LifecycleController,
}

impl App {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let registry = open_registry(&config)?;
        let github = Arc::new(GitHubClient::from_config(&config).context("creating GitHub client")?);
        info!(repo = %github.full_name(), agents = registry.len(), "orchestrator ready");

        let mut controller = LifecycleController::new(registry, github.clone(), github.clone())
            .with_max_errors(config.agents.max_errors);

        let sessions = if config.sessions.enabled {
            let manager = Arc::new(SquadSessionManager::new(config.sessions.command.clone()).await);
            controller = controller.with_sessions(manager.clone());
            Some(manager)
        } else {
            debug!("squad sessions disabled");
            None
        };

        match CredentialProvider::llm_api_key(&config) {
            Some(key) => {
                let mut provider = AnthropicProvider::new(key);
                if let Some(base_url) = &config.llm.base_url {
                    provider = provider.with_base_url(base_url.clone());
                }
                let analyzer = LlmTaskAnalyzer::new(Arc::new(provider), config.llm.model.clone())
                    .with_max_tokens(config.llm.max_tokens, STEP_MAX_TOKENS);
                controller = controller.with_analyzer(Arc::new(analyzer));
            }
            None => debug!(env = %config.llm.api_key_env, "no LLM key; task analysis disabled"),
        }

        Ok(Self {
            config,
            github,
            sessions,
            controller,
        })
    }
}
