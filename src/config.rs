//! Service configuration loaded from TOML at startup

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ClaError, PrAction, Result};

const DEFAULT_API_URL: &str = "https://api.github.com";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RUNS: usize = 50;
const DEFAULT_MAX_LOG_FILES: usize = 5;

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    /// JSON default policy; the embedded `default.json` is used when unset
    pub default_config: Option<PathBuf>,
    pub webhook_secret: Option<String>,
    #[serde(default = "default_max_runs")]
    pub max_runs: usize,
    pub github: GitHubConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub app_id: u64,
    pub private_key_path: PathBuf,
    /// Service-wide token used for actions whose credential policy is `default`
    pub default_token: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub credentials: ActionCredentials,
}

/// Which credential each pull request action is performed with
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ActionCredentials {
    pub label: CredentialPolicy,
    pub status: CredentialPolicy,
    pub comment: CredentialPolicy,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CredentialPolicy {
    /// The installation token minted for the current run
    #[default]
    Installation,
    /// The service-wide `default_token`
    Default,
}

impl ActionCredentials {
    pub fn policy_for(&self, action: PrAction) -> CredentialPolicy {
        match action {
            PrAction::AddLabel => self.label,
            PrAction::SetStatus => self.status,
            PrAction::AddComment => self.comment,
        }
    }

    fn needs_default_token(&self) -> bool {
        [self.label, self.status, self.comment].contains(&CredentialPolicy::Default)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Enables daily rolling log files in this directory
    pub directory: Option<PathBuf>,
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            max_files: DEFAULT_MAX_LOG_FILES,
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_max_runs() -> usize {
    DEFAULT_MAX_RUNS
}

fn default_max_log_files() -> usize {
    DEFAULT_MAX_LOG_FILES
}

impl ServiceConfig {
    pub fn parse(raw: &str) -> Result<Self> {
        let config: ServiceConfig = toml::from_str(raw)?;
        Ok(config)
    }

    /// Returns true if webhook signature validation should be enforced
    pub fn needs_webhook_secret(&self) -> bool {
        self.webhook_secret.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if self
            .webhook_secret
            .as_ref()
            .is_some_and(|s| s.trim().is_empty())
        {
            return Err(ClaError::ConfigurationInvalid(
                "webhook_secret is set but empty".to_string(),
            ));
        }
        if self.github.credentials.needs_default_token() && self.github.default_token.is_none() {
            return Err(ClaError::ConfigurationInvalid(
                "a 'default' credential policy requires github.default_token or GITHUB_ACCESS_TOKEN"
                    .to_string(),
            ));
        }
        if self.max_runs == 0 {
            return Err(ClaError::ConfigurationInvalid(
                "max_runs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load and parse the configuration file
pub fn load_config(path: impl AsRef<Path>) -> Result<ServiceConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|e| {
        ClaError::ConfigurationInvalid(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    ServiceConfig::parse(&raw).map_err(|e| {
        ClaError::ConfigurationInvalid(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}
