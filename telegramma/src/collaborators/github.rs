//! Source hosting API.

use async_trait::async_trait;
use octocrab::models::Repository;
use octocrab::Octocrab;
use serde_json::json;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// HTTP status GitHub answers with when a repository already exists.
const ALREADY_EXISTS: u16 = 422;

/// Credentials and target organization for pushing device trees.
#[derive(Clone, PartialEq, Eq)]
pub struct GithubCredentials {
    /// Account used for git over HTTPS.
    pub username: String,
    /// Personal access token, used for both the API and git.
    pub token: String,
    /// Organization that owns the device tree repositories.
    pub org: String,
}

impl fmt::Debug for GithubCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubCredentials")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .field("org", &self.org)
            .finish()
    }
}

/// A repository on the source host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepository {
    /// Owning account or organization.
    pub owner: String,
    /// Repository name.
    pub name: String,
    /// Browser URL, without a trailing slash.
    pub html_url: String,
    /// HTTPS clone URL.
    pub clone_url: String,
}

impl RemoteRepository {
    /// Describes a repository by its owner and name only.
    #[must_use]
    pub fn on_github(owner: impl Into<String>, name: impl Into<String>) -> Self {
        let owner = owner.into();
        let name = name.into();
        let html_url = format!("https://github.com/{owner}/{name}");
        Self {
            clone_url: format!("{html_url}.git"),
            html_url,
            owner,
            name,
        }
    }

    /// URL of `branch` in the browser.
    #[must_use]
    pub fn tree_url(&self, branch: &str) -> String {
        format!("{}/tree/{branch}", self.html_url)
    }

    fn from_model(owner: &str, repo: Repository) -> Self {
        let fallback = Self::on_github(owner, repo.name.clone());
        Self {
            owner: repo.owner.map_or(fallback.owner, |author| author.login),
            html_url: repo
                .html_url
                .map_or(fallback.html_url, |url| url.as_str().trim_end_matches('/').to_string()),
            clone_url: repo
                .clone_url
                .map_or(fallback.clone_url, |url| url.to_string()),
            name: repo.name,
        }
    }
}

/// A failed source host call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}", self.describe())]
pub struct HostError {
    /// HTTP status, when the host answered.
    pub status: Option<u16>,
    /// Error description from the host or the client.
    pub message: String,
}

impl HostError {
    /// Creates an error with an HTTP status.
    #[must_use]
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Creates an error that never reached the host.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// Returns true for the "repository already exists" answer.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        self.status == Some(ALREADY_EXISTS)
    }

    fn describe(&self) -> String {
        match self.status {
            Some(status) => format!("{status} {}", self.message),
            None => self.message.clone(),
        }
    }
}

impl From<octocrab::Error> for HostError {
    fn from(err: octocrab::Error) -> Self {
        match err {
            octocrab::Error::GitHub { source, .. } => {
                Self::with_status(source.status_code.as_u16(), source.message)
            }
            other => Self::transport(other.to_string()),
        }
    }
}

/// Repository hosting operations used by the device tree workflow.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Looks up an organization, returning its login.
    async fn organization(&self, org: &str) -> Result<String, HostError>;

    /// Creates a public repository without an initial commit.
    async fn create_repository(&self, org: &str, name: &str)
        -> Result<RemoteRepository, HostError>;

    /// Fetches an existing repository.
    async fn repository(&self, org: &str, name: &str) -> Result<RemoteRepository, HostError>;

    /// Changes the default branch of a repository.
    async fn set_default_branch(
        &self,
        repository: &RemoteRepository,
        branch: &str,
    ) -> Result<(), HostError>;
}

/// GitHub REST API through `octocrab`.
#[derive(Debug, Clone)]
pub struct GithubHost {
    client: Octocrab,
}

impl GithubHost {
    /// Creates a client authenticated with a personal access token.
    pub fn new(token: &str) -> Result<Self, HostError> {
        let client = Octocrab::builder()
            .personal_token(token.to_string())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceHost for GithubHost {
    async fn organization(&self, org: &str) -> Result<String, HostError> {
        let organization = self.client.orgs(org).get().await?;
        Ok(organization.login)
    }

    async fn create_repository(
        &self,
        org: &str,
        name: &str,
    ) -> Result<RemoteRepository, HostError> {
        let body = json!({
            "name": name,
            "private": false,
            "auto_init": false,
        });
        let repo: Repository = self
            .client
            .post(format!("/orgs/{org}/repos"), Some(&body))
            .await?;
        debug!(org, name, "Repository created");
        Ok(RemoteRepository::from_model(org, repo))
    }

    async fn repository(&self, org: &str, name: &str) -> Result<RemoteRepository, HostError> {
        let repo = self.client.repos(org, name).get().await?;
        Ok(RemoteRepository::from_model(org, repo))
    }

    async fn set_default_branch(
        &self,
        repository: &RemoteRepository,
        branch: &str,
    ) -> Result<(), HostError> {
        let body = json!({ "default_branch": branch });
        let _: Repository = self
            .client
            .patch(
                format!("/repos/{}/{}", repository.owner, repository.name),
                Some(&body),
            )
            .await?;
        Ok(())
    }
}
