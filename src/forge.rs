//! Code-forge collaborator interface
//!
//! The pipeline only talks to the forge through [`Forge`]; the GitHub REST
//! implementation lives in [`crate::github`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::token::AccessToken;
use crate::webhook::PullRequestTarget;

pub const USER_AGENT: &str = "github-cla-bot";

#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} responded with {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Unexpected response body: {0}")]
    Decode(String),

    #[error("Credential error: {0}")]
    Credential(String),
}

/// Where the repository's policy file can be downloaded from
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConfigLocation {
    pub download_url: String,
}

/// Partial policy supplied by the repository
pub type RepoConfig = Map<String, Value>;

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitAuthor {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitCommit {
    pub author: Option<GitAuthor>,
}

/// One entry of a pull request's commit list
#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    /// Forge account the commit is attributed to; absent when the commit email
    /// is not linked to any account
    pub author: Option<Account>,
    pub commit: GitCommit,
}

impl Commit {
    /// Commit attributed to a forge account
    pub fn by(login: impl Into<String>) -> Self {
        Self {
            author: Some(Account {
                login: login.into(),
            }),
            commit: GitCommit { author: None },
        }
    }

    /// The account login, falling back to the raw git author name
    pub fn author_identifier(&self) -> Option<&str> {
        self.author
            .as_ref()
            .map(|a| a.login.as_str())
            .or_else(|| self.commit.author.as_ref().map(|a| a.name.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Success,
    Failure,
}

/// Credential used for a single forge call
#[derive(Debug, Clone, Copy)]
pub enum Credential<'a> {
    Installation(&'a AccessToken),
    /// The service-wide token configured for the bot
    Default,
}

#[async_trait]
pub trait Forge: Send + Sync {
    async fn fetch_config_location(
        &self,
        target: &PullRequestTarget<'_>,
    ) -> Result<ConfigLocation, ForgeError>;

    async fn fetch_config_contents(
        &self,
        location: &ConfigLocation,
    ) -> Result<RepoConfig, ForgeError>;

    async fn fetch_commits(
        &self,
        target: &PullRequestTarget<'_>,
        token: &AccessToken,
    ) -> Result<Vec<Commit>, ForgeError>;

    async fn add_label(
        &self,
        target: &PullRequestTarget<'_>,
        label: &str,
        credential: Credential<'_>,
    ) -> Result<(), ForgeError>;

    async fn set_status(
        &self,
        target: &PullRequestTarget<'_>,
        state: CommitState,
        credential: Credential<'_>,
    ) -> Result<(), ForgeError>;

    async fn add_comment(
        &self,
        target: &PullRequestTarget<'_>,
        body: &str,
        credential: Credential<'_>,
    ) -> Result<(), ForgeError>;
}

/// Turns a non-2xx response into [`ForgeError::Status`]
pub(crate) async fn ensure_success(
    url: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ForgeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ForgeError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}
