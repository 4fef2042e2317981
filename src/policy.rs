//! CLA policy: built-in defaults merged with the repository's `.clabot` file

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{ClaError, Result};
use crate::forge::RepoConfig;

/// Default policy compiled into the binary
pub const BUILTIN_DEFAULTS: &str = include_str!("../default.json");

pub const LABEL_KEY: &str = "label";
pub const MESSAGE_KEY: &str = "message";
pub const CONTRIBUTORS_KEY: &str = "contributors";
pub const CONTRIBUTOR_WEBHOOK_KEY: &str = "contributorWebhook";

/// Placeholder in the comment template replaced by the unsigned users
pub const USERS_PLACEHOLDER: &str = "{{usersWithoutCLA}}";

const REQUIRED_KEYS: [&str; 3] = [LABEL_KEY, MESSAGE_KEY, CONTRIBUTORS_KEY];

/// Process-wide default policy, loaded once at startup and shared by every run
#[derive(Debug, Clone)]
pub struct PolicyDefaults(Arc<Map<String, Value>>);

impl PolicyDefaults {
    pub fn builtin() -> Result<Self> {
        Self::parse(BUILTIN_DEFAULTS, "built-in defaults")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            ClaError::ConfigurationInvalid(format!(
                "Failed to read default policy '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&raw, &path.display().to_string())
    }

    fn parse(raw: &str, origin: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw).map_err(|e| {
            ClaError::ConfigurationInvalid(format!(
                "Failed to parse default policy '{}': {}",
                origin, e
            ))
        })?;
        let Value::Object(map) = value else {
            return Err(ClaError::ConfigurationInvalid(format!(
                "Default policy '{}' must be a JSON object",
                origin
            )));
        };
        Self::from_map(map)
    }

    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        if let Some(missing) = REQUIRED_KEYS.iter().find(|k| !map.contains_key(**k)) {
            return Err(ClaError::ConfigurationInvalid(format!(
                "Default policy is missing required key '{}'",
                missing
            )));
        }
        Ok(Self(Arc::new(map)))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Shallow, field-wise override of `defaults` by `repo`.
///
/// Nested values are replaced wholesale. An absent repository config yields
/// the defaults unchanged.
pub fn merge(defaults: &Map<String, Value>, repo: Option<&RepoConfig>) -> Map<String, Value> {
    let mut merged = defaults.clone();
    if let Some(repo) = repo {
        for (key, value) in repo {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// The policy in force for one pull request
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig(Map<String, Value>);

impl EffectiveConfig {
    pub fn resolve(defaults: &PolicyDefaults, repo: Option<&RepoConfig>) -> Self {
        Self(merge(defaults.as_map(), repo))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn label(&self) -> Result<&str> {
        self.string(LABEL_KEY)
    }

    /// Comment body telling `users` they still need to sign
    pub fn message_for(&self, users: &[String]) -> Result<String> {
        let mentions = users
            .iter()
            .map(|u| format!("@{}", u))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(self.string(MESSAGE_KEY)?.replace(USERS_PLACEHOLDER, &mentions))
    }

    fn string(&self, key: &str) -> Result<&str> {
        match self.0.get(key) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(ClaError::ConfigurationInvalid(format!(
                "'{}' must be a string, found {}",
                key, other
            ))),
            None => Err(ClaError::ConfigurationInvalid(format!(
                "'{}' is not configured",
                key
            ))),
        }
    }
}
