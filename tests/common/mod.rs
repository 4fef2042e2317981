#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cla_bot::config::ActionCredentials;
use cla_bot::forge::{
    Commit, CommitState, ConfigLocation, Credential, Forge, ForgeError, RepoConfig,
};
use cla_bot::pipeline::ClaBot;
use cla_bot::policy::PolicyDefaults;
use cla_bot::token::{AccessToken, TokenMinter};
use cla_bot::webhook::{PullRequestTarget, WebhookEvent};
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;

pub const INSTALLATION_ID: u64 = 42;
pub const INSTALLATION_TOKEN: &str = "ghs_installation";
pub const PR_URL: &str = "https://api.github.com/repos/acme/widgets/pulls/7";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Used {
    Installation(String),
    Default,
}

impl From<Credential<'_>> for Used {
    fn from(credential: Credential<'_>) -> Self {
        match credential {
            Credential::Installation(token) => Used::Installation(token.secret().to_string()),
            Credential::Default => Used::Default,
        }
    }
}

/// Every collaborator call made during a run, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ConfigLocation,
    ConfigContents(String),
    MintToken(u64),
    Commits(String),
    Label(String, Used),
    Status(CommitState, Used),
    Comment(String, Used),
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

/// Which collaborator call should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    ConfigLocation,
    Token,
    Commits,
    Label,
    Status,
    Comment,
}

fn not_found(what: &str) -> ForgeError {
    ForgeError::Status {
        url: format!("https://api.github.com/{}", what),
        status: 404,
        body: "{\"message\":\"Not Found\"}".to_string(),
    }
}

#[derive(Clone)]
pub struct FakeForge {
    log: CallLog,
    repo_config: Value,
    authors: Vec<String>,
    failure: Option<Failure>,
}

#[async_trait]
impl Forge for FakeForge {
    async fn fetch_config_location(
        &self,
        _target: &PullRequestTarget<'_>,
    ) -> Result<ConfigLocation, ForgeError> {
        self.log.lock().unwrap().push(Call::ConfigLocation);
        if self.failure == Some(Failure::ConfigLocation) {
            return Err(not_found("contents/.clabot"));
        }
        Ok(ConfigLocation {
            download_url: "https://raw.example.com/acme/widgets/main/.clabot".to_string(),
        })
    }

    async fn fetch_config_contents(
        &self,
        location: &ConfigLocation,
    ) -> Result<RepoConfig, ForgeError> {
        self.log
            .lock()
            .unwrap()
            .push(Call::ConfigContents(location.download_url.clone()));
        match &self.repo_config {
            Value::Object(map) => Ok(map.clone()),
            _ => Err(ForgeError::Decode("not an object".to_string())),
        }
    }

    async fn fetch_commits(
        &self,
        _target: &PullRequestTarget<'_>,
        token: &AccessToken,
    ) -> Result<Vec<Commit>, ForgeError> {
        self.log
            .lock()
            .unwrap()
            .push(Call::Commits(token.secret().to_string()));
        if self.failure == Some(Failure::Commits) {
            return Err(not_found("pulls/7/commits"));
        }
        Ok(self.authors.iter().map(|a| Commit::by(a.as_str())).collect())
    }

    async fn add_label(
        &self,
        _target: &PullRequestTarget<'_>,
        label: &str,
        credential: Credential<'_>,
    ) -> Result<(), ForgeError> {
        self.log
            .lock()
            .unwrap()
            .push(Call::Label(label.to_string(), credential.into()));
        if self.failure == Some(Failure::Label) {
            return Err(not_found("issues/7/labels"));
        }
        Ok(())
    }

    async fn set_status(
        &self,
        _target: &PullRequestTarget<'_>,
        state: CommitState,
        credential: Credential<'_>,
    ) -> Result<(), ForgeError> {
        self.log
            .lock()
            .unwrap()
            .push(Call::Status(state, credential.into()));
        if self.failure == Some(Failure::Status) {
            return Err(not_found("statuses/abc123"));
        }
        Ok(())
    }

    async fn add_comment(
        &self,
        _target: &PullRequestTarget<'_>,
        body: &str,
        credential: Credential<'_>,
    ) -> Result<(), ForgeError> {
        self.log
            .lock()
            .unwrap()
            .push(Call::Comment(body.to_string(), credential.into()));
        if self.failure == Some(Failure::Comment) {
            return Err(not_found("issues/7/comments"));
        }
        Ok(())
    }
}

pub struct FakeMinter {
    log: CallLog,
    fail: bool,
}

#[async_trait]
impl TokenMinter for FakeMinter {
    async fn mint_installation_token(
        &self,
        installation_id: u64,
    ) -> Result<AccessToken, ForgeError> {
        self.log
            .lock()
            .unwrap()
            .push(Call::MintToken(installation_id));
        if self.fail {
            return Err(ForgeError::Credential("app JWT rejected".to_string()));
        }
        Ok(AccessToken::new(INSTALLATION_TOKEN))
    }
}

/// Builds a bot over fakes; the returned log records every collaborator call
pub struct Scenario {
    pub repo_config: Value,
    pub authors: Vec<String>,
    pub failure: Option<Failure>,
    pub credentials: ActionCredentials,
}

impl Scenario {
    pub fn new(repo_config: Value, authors: &[&str]) -> Self {
        Self {
            repo_config,
            authors: authors.iter().map(|a| a.to_string()).collect(),
            failure: None,
            credentials: ActionCredentials::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: ActionCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn failing(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn build(self) -> (ClaBot, CallLog) {
        let log = CallLog::default();
        let forge = FakeForge {
            log: log.clone(),
            repo_config: self.repo_config,
            authors: self.authors,
            failure: self.failure,
        };
        let minter = FakeMinter {
            log: log.clone(),
            fail: self.failure == Some(Failure::Token),
        };
        let bot = ClaBot::new(
            forge,
            minter,
            PolicyDefaults::builtin().unwrap(),
            reqwest::Client::new(),
        )
        .with_credentials(self.credentials);
        (bot, log)
    }
}

pub fn calls(log: &CallLog) -> Vec<Call> {
    log.lock().unwrap().clone()
}

pub fn event_json(action: &str) -> Value {
    json!({
        "action": action,
        "number": 7,
        "pull_request": {
            "url": PR_URL,
            "issue_url": "https://api.github.com/repos/acme/widgets/issues/7",
            "number": 7,
            "head": { "sha": "abc123" }
        },
        "repository": {
            "url": "https://api.github.com/repos/acme/widgets",
            "full_name": "acme/widgets",
            "default_branch": "main"
        },
        "installation": { "id": INSTALLATION_ID }
    })
}

pub fn event(action: &str) -> WebhookEvent {
    serde_json::from_value(event_json(action)).unwrap()
}

/// `X-Hub-Signature-256` value for `payload`
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
