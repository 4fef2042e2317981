//! Pull request webhook payload

use serde::Deserialize;

use crate::error::{ClaError, Result};

/// The only pull request action the bot acts upon
pub const OPENED_ACTION: &str = "opened";

/// A `pull_request` webhook delivery.
///
/// Everything apart from `action` is optional at parse time so that events the
/// bot ignores never fail to deserialize. Use [`WebhookEvent::target`] once the
/// action has been accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub action: String,
    pub pull_request: Option<PullRequest>,
    pub repository: Option<Repository>,
    pub installation: Option<Installation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub url: String,
    pub issue_url: String,
    pub number: u64,
    pub head: Head,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Head {
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub url: String,
    pub full_name: String,
    pub default_branch: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Installation {
    pub id: u64,
}

/// Borrowed view of the fields the pipeline needs after the action filter
#[derive(Debug, Clone, Copy)]
pub struct PullRequestTarget<'a> {
    pub pull_request: &'a PullRequest,
    pub repository: &'a Repository,
    pub installation_id: u64,
}

impl WebhookEvent {
    pub fn is_opened(&self) -> bool {
        self.action == OPENED_ACTION
    }

    /// Pull request url for correlation in logs, if present
    pub fn pull_request_url(&self) -> Option<&str> {
        self.pull_request.as_ref().map(|pr| pr.url.as_str())
    }

    pub fn target(&self) -> Result<PullRequestTarget<'_>> {
        let pull_request = self
            .pull_request
            .as_ref()
            .ok_or_else(|| ClaError::MalformedEvent("missing pull_request".to_string()))?;
        let repository = self
            .repository
            .as_ref()
            .ok_or_else(|| ClaError::MalformedEvent("missing repository".to_string()))?;
        let installation = self
            .installation
            .as_ref()
            .ok_or_else(|| ClaError::MalformedEvent("missing installation".to_string()))?;

        Ok(PullRequestTarget {
            pull_request,
            repository,
            installation_id: installation.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn parses_opened_event() {
        let event: WebhookEvent = serde_json::from_value(json!({
            "action": "opened",
            "number": 7,
            "pull_request": {
                "url": "https://api.github.com/repos/acme/widgets/pulls/7",
                "issue_url": "https://api.github.com/repos/acme/widgets/issues/7",
                "number": 7,
                "head": { "sha": "abc123", "ref": "feature" }
            },
            "repository": {
                "url": "https://api.github.com/repos/acme/widgets",
                "full_name": "acme/widgets",
                "default_branch": "main"
            },
            "installation": { "id": 42 },
            "sender": { "login": "alice" }
        }))
        .unwrap();

        assert!(event.is_opened());
        let target = event.target().unwrap();
        assert_eq!(target.installation_id, 42);
        assert_eq!(target.pull_request.head.sha, "abc123");
        assert_eq!(target.repository.default_branch, "main");
    }

    #[test]
    fn ignored_events_parse_without_pull_request_fields() {
        let event: WebhookEvent = serde_json::from_value(json!({ "action": "closed" })).unwrap();
        assert!(!event.is_opened());
        assert_eq!(event.pull_request_url(), None);
    }

    #[test]
    fn missing_installation_is_malformed() {
        let event: WebhookEvent = serde_json::from_value(json!({
            "action": "opened",
            "pull_request": {
                "url": "u", "issue_url": "i", "number": 1, "head": { "sha": "s" }
            },
            "repository": { "url": "r", "full_name": "a/b", "default_branch": "main" }
        }))
        .unwrap();

        let err = event.target().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedEvent);
    }
}
