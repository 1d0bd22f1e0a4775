use octocrab::Octocrab;
use thiserror::Error;

use ao_core::collaborators::CollaboratorError;
use ao_core::config::{Config, CredentialProvider};

use crate::types::GitHubConfig;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API error: {0}")]
    Api(#[from] octocrab::Error),

    #[error("missing GitHub token, set GITHUB_TOKEN or pass it in GitHubConfig")]
    MissingToken,

    #[error("repository not configured, set GITHUB_REPO=owner/repo")]
    MissingRepository,
}

pub type Result<T> = std::result::Result<T, GitHubError>;

impl From<GitHubError> for CollaboratorError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::MissingToken | GitHubError::MissingRepository => {
                CollaboratorError::Unavailable(err.to_string())
            }
            GitHubError::Api(octocrab::Error::GitHub { ref source, .. })
                if source.status_code.as_u16() == 404 =>
            {
                CollaboratorError::NotFound(source.message.clone())
            }
            GitHubError::Api(_) => CollaboratorError::Request(err.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    pub(crate) octocrab: Octocrab,
    pub(crate) owner: String,
    pub(crate) repo: String,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let token = config.token.ok_or(GitHubError::MissingToken)?;
        if config.owner.is_empty() || config.repo.is_empty() {
            return Err(GitHubError::MissingRepository);
        }

        let octocrab = Octocrab::builder().personal_token(token).build()?;

        Ok(Self {
            octocrab,
            owner: config.owner,
            repo: config.repo,
        })
    }

    /// Build from the loaded config; the token comes from the env var the
    /// config names.
    pub fn from_config(config: &Config) -> Result<Self> {
        let token = CredentialProvider::github_token(config).ok_or(GitHubError::MissingToken)?;
        let (owner, repo) = match (&config.github.owner, &config.github.repo) {
            (Some(owner), Some(repo)) => (owner.clone(), repo.clone()),
            _ => return Err(GitHubError::MissingRepository),
        };
        Self::new(GitHubConfig {
            token: Some(token),
            owner,
            repo,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}
