//! Contribution verification against a CLA signatory source

use std::collections::HashSet;

use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::forge::USER_AGENT;
use crate::policy::{CONTRIBUTOR_WEBHOOK_KEY, CONTRIBUTORS_KEY, EffectiveConfig};

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("Signatory source unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid signatory source: {0}")]
    InvalidSource(String),
}

/// Where the set of CLA signatories comes from
#[derive(Debug, Clone, PartialEq)]
pub enum SignatorySource {
    /// Logins listed inline in the policy
    List(Vec<String>),
    /// URL serving a JSON array of logins
    ListUrl(Url),
    /// URL answering `?checkContributor=<login>` with `{"isContributor": bool}`
    Webhook(Url),
}

impl SignatorySource {
    /// `contributorWebhook` wins over `contributors` when both are set
    pub fn from_config(config: &EffectiveConfig) -> Result<Self, VerifyError> {
        match config.get(CONTRIBUTOR_WEBHOOK_KEY) {
            None | Some(Value::Null) => {}
            Some(Value::String(url)) => return Ok(Self::Webhook(parse_url(url)?)),
            Some(other) => {
                return Err(VerifyError::InvalidSource(format!(
                    "'{}' must be a URL string, found {}",
                    CONTRIBUTOR_WEBHOOK_KEY, other
                )));
            }
        }

        match config.get(CONTRIBUTORS_KEY) {
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|entry| match entry {
                    Value::String(login) => Ok(login.clone()),
                    other => Err(VerifyError::InvalidSource(format!(
                        "'{}' entries must be strings, found {}",
                        CONTRIBUTORS_KEY, other
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List),
            Some(Value::String(url)) => Ok(Self::ListUrl(parse_url(url)?)),
            Some(other) => Err(VerifyError::InvalidSource(format!(
                "'{}' must be a list of logins or a URL, found {}",
                CONTRIBUTORS_KEY, other
            ))),
            None => Err(VerifyError::InvalidSource(
                "no signatory source has been configured".to_string(),
            )),
        }
    }
}

fn parse_url(raw: &str) -> Result<Url, VerifyError> {
    let url = Url::parse(raw)
        .map_err(|e| VerifyError::InvalidSource(format!("'{}' is not a valid URL: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(VerifyError::InvalidSource(format!(
            "unsupported URL scheme '{}' in '{}'",
            scheme, raw
        ))),
    }
}

/// Logins compare ASCII case-insensitively, as they do on the forge
fn normalize(login: &str) -> String {
    login.to_ascii_lowercase()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContributorCheck {
    is_contributor: bool,
}

pub struct Verifier {
    source: SignatorySource,
    http: Client,
}

/// Builds the verifier for a policy; fails on a malformed signatory source
pub fn make_verifier(config: &EffectiveConfig, http: &Client) -> Result<Verifier, VerifyError> {
    Ok(Verifier {
        source: SignatorySource::from_config(config)?,
        http: http.clone(),
    })
}

impl Verifier {
    pub fn source(&self) -> &SignatorySource {
        &self.source
    }

    /// Returns the committers who have not signed, deduplicated in first-seen
    /// order. Identifiers compare case-insensitively, so `["Bob", "bob"]`
    /// reports `Bob`: the spelling of the first occurrence is kept. An empty
    /// input never touches the signatory source.
    pub async fn verify(&self, committers: &[String]) -> Result<Vec<String>, VerifyError> {
        let mut seen = HashSet::new();
        let unique: Vec<&String> = committers
            .iter()
            .filter(|c| seen.insert(normalize(c)))
            .collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        match &self.source {
            SignatorySource::List(signatories) => Ok(Self::missing_from(signatories, &unique)),
            SignatorySource::ListUrl(url) => {
                let signatories = self.fetch_list(url).await?;
                Ok(Self::missing_from(&signatories, &unique))
            }
            SignatorySource::Webhook(url) => {
                let mut missing = Vec::new();
                for committer in unique {
                    if !self.check_contributor(url, committer).await? {
                        missing.push(committer.clone());
                    }
                }
                Ok(missing)
            }
        }
    }

    fn missing_from(signatories: &[String], committers: &[&String]) -> Vec<String> {
        let signed: HashSet<String> = signatories.iter().map(|s| normalize(s)).collect();
        committers
            .iter()
            .filter(|c| !signed.contains(&normalize(c)))
            .map(|c| c.to_string())
            .collect()
    }

    async fn fetch_list(&self, url: &Url) -> Result<Vec<String>, VerifyError> {
        debug!("Fetching signatory list from {}", url);
        let response = self
            .http
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| VerifyError::Unavailable(format!("{}: {}", url, e)))?;
        response
            .json()
            .await
            .map_err(|e| VerifyError::Unavailable(format!("{} returned an invalid list: {}", url, e)))
    }

    async fn check_contributor(&self, url: &Url, login: &str) -> Result<bool, VerifyError> {
        debug!("Checking contributor {} against {}", login, url);
        let response = self
            .http
            .get(url.clone())
            .query(&[("checkContributor", login)])
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| VerifyError::Unavailable(format!("{}: {}", url, e)))?;
        let check: ContributorCheck = response.json().await.map_err(|e| {
            VerifyError::Unavailable(format!("{} returned an invalid answer: {}", url, e))
        })?;
        Ok(check.is_contributor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyDefaults;
    use serde_json::{Map, json};

    fn config(repo: Value) -> EffectiveConfig {
        let defaults = PolicyDefaults::builtin().unwrap();
        let repo: Map<String, Value> = match repo {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        };
        EffectiveConfig::resolve(&defaults, Some(&repo))
    }

    fn verifier(repo: Value) -> Verifier {
        make_verifier(&config(repo), &Client::new()).unwrap()
    }

    fn logins(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn empty_committers_yield_empty_result() {
        // An unreachable source proves no lookup happens
        let v = verifier(json!({ "contributors": "http://127.0.0.1:9/list.json" }));
        assert!(v.verify(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn all_signatories_yield_empty_result() {
        let v = verifier(json!({ "contributors": ["alice", "bob"] }));
        let result = v.verify(&logins(&["bob", "alice", "bob"])).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn duplicates_are_reported_once_in_first_seen_order() {
        let v = verifier(json!({ "contributors": ["alice"] }));
        let result = v
            .verify(&logins(&["carol", "alice", "bob", "carol", "bob"]))
            .await
            .unwrap();
        assert_eq!(result, logins(&["carol", "bob"]));
    }

    #[tokio::test]
    async fn logins_compare_case_insensitively() {
        let v = verifier(json!({ "contributors": ["Alice"] }));
        let result = v.verify(&logins(&["alice", "BOB", "bob"])).await.unwrap();
        assert_eq!(result, logins(&["BOB"]));
    }

    #[tokio::test]
    async fn unreachable_list_is_unavailable() {
        let v = verifier(json!({ "contributors": "http://127.0.0.1:9/list.json" }));
        let err = v.verify(&logins(&["alice"])).await.unwrap_err();
        assert!(matches!(err, VerifyError::Unavailable(_)));
    }

    #[test]
    fn webhook_takes_precedence_over_contributors() {
        let v = verifier(json!({
            "contributors": ["alice"],
            "contributorWebhook": "https://cla.example.com/check"
        }));
        assert!(matches!(v.source(), SignatorySource::Webhook(_)));
    }

    #[test]
    fn null_webhook_falls_back_to_contributors() {
        let v = verifier(json!({ "contributorWebhook": null, "contributors": ["alice"] }));
        assert_eq!(v.source(), &SignatorySource::List(logins(&["alice"])));
    }

    #[test]
    fn malformed_sources_are_rejected() {
        for repo in [
            json!({ "contributors": 42 }),
            json!({ "contributors": ["alice", 7] }),
            json!({ "contributors": "not a url" }),
            json!({ "contributors": "ftp://example.com/list" }),
            json!({ "contributorWebhook": true }),
        ] {
            let result = make_verifier(&config(repo.clone()), &Client::new());
            assert!(
                matches!(result, Err(VerifyError::InvalidSource(_))),
                "{} was accepted",
                repo
            );
        }
    }

    #[test]
    fn null_contributors_are_rejected() {
        let result = SignatorySource::from_config(&config(json!({ "contributors": null })));
        assert!(matches!(result, Err(VerifyError::InvalidSource(_))));
    }
}
