//! GitHub REST implementation of [`Forge`]

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::forge::{
    Commit, CommitState, ConfigLocation, Credential, Forge, ForgeError, RepoConfig, USER_AGENT,
    ensure_success,
};
use crate::token::AccessToken;
use crate::webhook::PullRequestTarget;

/// Policy file read from the root of the target repository
pub const CONFIG_FILE: &str = ".clabot";
/// Commit status context reported on the head commit
pub const STATUS_CONTEXT: &str = "verification/cla-signed";
const COMMITS_PER_PAGE: u32 = 100;
const NO_QUERY: &[(&str, &str)] = &[];

/// Drops the query string, which may carry a download token
fn without_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

pub struct GitHubClient {
    client: Client,
    default_token: Option<String>,
}

impl GitHubClient {
    pub fn new(client: Client, default_token: Option<String>) -> Self {
        Self {
            client,
            default_token,
        }
    }

    /// Common headers; `token` is `None` for unauthenticated reads
    fn request(&self, builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        let builder = builder
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn resolve<'a>(&'a self, credential: Credential<'a>) -> Result<&'a str, ForgeError> {
        match credential {
            Credential::Installation(token) => Ok(token.secret()),
            Credential::Default => self
                .default_token
                .as_deref()
                .ok_or_else(|| ForgeError::Credential("no default token configured".to_string())),
        }
    }

    async fn get_json<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        url: &str,
        query: &Q,
        token: Option<&str>,
    ) -> Result<T, ForgeError> {
        let shown = without_query(url);
        debug!("GET {}", shown);
        let response = self
            .request(self.client.get(url).query(query), token)
            .send()
            .await
            .map_err(|e| ForgeError::Http(e.without_url()))?;
        ensure_success(shown, response)
            .await?
            .json()
            .await
            .map_err(|e| ForgeError::Decode(format!("{}: {}", shown, e)))
    }

    async fn post_json(&self, url: &str, body: &Value, token: &str) -> Result<(), ForgeError> {
        debug!("POST {}", without_query(url));
        let response = self
            .request(self.client.post(url), Some(token))
            .json(body)
            .send()
            .await?;
        ensure_success(url, response).await?;
        Ok(())
    }
}

#[async_trait]
impl Forge for GitHubClient {
    async fn fetch_config_location(
        &self,
        target: &PullRequestTarget<'_>,
    ) -> Result<ConfigLocation, ForgeError> {
        let url = format!("{}/contents/{}", target.repository.url, CONFIG_FILE);
        let query = [("ref", target.repository.default_branch.as_str())];
        self.get_json(&url, &query, self.default_token.as_deref())
            .await
    }

    async fn fetch_config_contents(
        &self,
        location: &ConfigLocation,
    ) -> Result<RepoConfig, ForgeError> {
        let value: Value = self
            .get_json(&location.download_url, NO_QUERY, self.default_token.as_deref())
            .await?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(ForgeError::Decode(format!(
                "{} must contain a JSON object, found {}",
                CONFIG_FILE, other
            ))),
        }
    }

    async fn fetch_commits(
        &self,
        target: &PullRequestTarget<'_>,
        token: &AccessToken,
    ) -> Result<Vec<Commit>, ForgeError> {
        let url = format!("{}/commits", target.pull_request.url);
        let mut commits = Vec::new();
        // A short page is the last one
        for page in 1.. {
            let query = [("per_page", COMMITS_PER_PAGE), ("page", page)];
            let batch: Vec<Commit> = self.get_json(&url, &query, Some(token.secret())).await?;
            let last = batch.len() < COMMITS_PER_PAGE as usize;
            commits.extend(batch);
            if last {
                break;
            }
        }
        debug!("Fetched {} commits from {}", commits.len(), url);
        Ok(commits)
    }

    async fn add_label(
        &self,
        target: &PullRequestTarget<'_>,
        label: &str,
        credential: Credential<'_>,
    ) -> Result<(), ForgeError> {
        let url = format!("{}/labels", target.pull_request.issue_url);
        self.post_json(&url, &json!({ "labels": [label] }), self.resolve(credential)?)
            .await
    }

    async fn set_status(
        &self,
        target: &PullRequestTarget<'_>,
        state: CommitState,
        credential: Credential<'_>,
    ) -> Result<(), ForgeError> {
        let url = format!(
            "{}/statuses/{}",
            target.repository.url, target.pull_request.head.sha
        );
        let description = match state {
            CommitState::Success => "All contributors have signed the CLA",
            CommitState::Failure => "Some contributors have not signed the CLA",
        };
        let body = json!({
            "state": state,
            "context": STATUS_CONTEXT,
            "description": description,
        });
        self.post_json(&url, &body, self.resolve(credential)?).await
    }

    async fn add_comment(
        &self,
        target: &PullRequestTarget<'_>,
        body: &str,
        credential: Credential<'_>,
    ) -> Result<(), ForgeError> {
        let url = format!("{}/comments", target.pull_request.issue_url);
        self.post_json(&url, &json!({ "body": body }), self.resolve(credential)?)
            .await
    }
}
