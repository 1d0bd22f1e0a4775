use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::DEFAULT_MAX_ERRORS;

/// Top-level configuration loaded from `~/.agent-orchestrator/config.toml`.
///
/// **Security**: this struct never stores tokens or API keys. Sections only
/// name the environment variable to read; see [`CredentialProvider`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub github: GitHubSection,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

impl Config {
    /// Load config from the default path, falling back to defaults when the
    /// file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `GITHUB_REPO` (`owner/repo` or bare `repo`) and `GITHUB_OWNER`
    /// from the environment on top of the file values.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(owner) = std::env::var("GITHUB_OWNER") {
            if !owner.is_empty() {
                self.github.owner = Some(owner);
            }
        }
        if let Ok(repo) = std::env::var("GITHUB_REPO") {
            if !repo.is_empty() {
                self.github.set_repo_spec(&repo)?;
            }
        }
        self.validate()
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agents.max_errors == 0 {
            return Err(ConfigError::Validation(
                "agents.max_errors must be at least 1".into(),
            ));
        }
        if let Some(repo) = &self.github.repo {
            if repo.is_empty() || repo.contains('/') {
                return Err(ConfigError::Validation(format!(
                    "github.repo must be a bare repository name, got `{repo}`"
                )));
            }
        }
        if self.state.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation("state.path must not be empty".into()));
        }
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".agent-orchestrator")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubSection {
    /// Repository owner (org or user).
    #[serde(default)]
    pub owner: Option<String>,
    /// Repository name.
    #[serde(default)]
    pub repo: Option<String>,
    /// Env var holding the personal access token.
    #[serde(default = "default_github_env")]
    pub token_env: String,
}

impl GitHubSection {
    /// Accept either `owner/repo` or a bare repository name.
    pub fn set_repo_spec(&mut self, spec: &str) -> Result<(), ConfigError> {
        match spec.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                self.owner = Some(owner.to_string());
                self.repo = Some(repo.to_string());
                Ok(())
            }
            Some(_) => Err(ConfigError::Validation(format!(
                "expected `owner/repo`, got `{spec}`"
            ))),
            None => {
                self.repo = Some(spec.to_string());
                Ok(())
            }
        }
    }

    /// `owner/repo` when both halves are configured.
    pub fn full_name(&self) -> Option<String> {
        match (&self.owner, &self.repo) {
            (Some(owner), Some(repo)) => Some(format!("{owner}/{repo}")),
            _ => None,
        }
    }
}

impl Default for GitHubSection {
    fn default() -> Self {
        Self {
            owner: None,
            repo: None,
            token_env: default_github_env(),
        }
    }
}

fn default_github_env() -> String {
    "GITHUB_TOKEN".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Snapshot file; relative paths resolve against the working directory.
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from("agent_state.json")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Error threshold given to newly assigned agents.
    #[serde(default = "default_max_errors")]
    pub max_errors: u32,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            max_errors: default_max_errors(),
        }
    }
}

fn default_max_errors() -> u32 {
    DEFAULT_MAX_ERRORS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    /// Env var holding the provider API key. Analysis is skipped when unset.
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            max_tokens: default_llm_max_tokens(),
            api_key_env: default_llm_key_env(),
            base_url: None,
        }
    }
}

fn default_llm_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_llm_max_tokens() -> u32 {
    2000
}
fn default_llm_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Session CLI executable.
    #[serde(default = "default_session_command")]
    pub command: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: default_session_command(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_session_command() -> String {
    "cs".into()
}

// ---------------------------------------------------------------------------
// CredentialProvider
// ---------------------------------------------------------------------------

/// Resolves secrets from the environment on demand.
pub struct CredentialProvider;

impl CredentialProvider {
    /// Value of the env var `name`, treating an empty value as unset.
    pub fn from_env(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }

    pub fn github_token(cfg: &Config) -> Option<String> {
        Self::from_env(&cfg.github.token_env)
    }

    pub fn llm_api_key(cfg: &Config) -> Option<String> {
        Self::from_env(&cfg.llm.api_key_env)
    }
}
