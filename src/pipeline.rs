//! The CLA decision pipeline
//!
//! A run is a fixed sequence of stages. Each stage consumes the data gathered
//! so far and yields the next stage; the first error aborts the run and is
//! returned as-is. Nothing is retried or rolled back.

use std::sync::Arc;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{ActionCredentials, CredentialPolicy};
use crate::error::{ClaError, PrAction, Result};
use crate::forge::{CommitState, Credential, Forge, RepoConfig};
use crate::policy::{EffectiveConfig, PolicyDefaults};
use crate::token::{AccessToken, TokenMinter};
use crate::verifier::make_verifier;
use crate::webhook::{PullRequestTarget, WebhookEvent};

/// What the pipeline decided for a pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Ignored,
    Compliant { label: String },
    NonCompliant { non_contributors: Vec<String> },
}

/// Terminal result of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub message: String,
    #[serde(flatten)]
    pub decision: Decision,
}

impl Outcome {
    pub fn ignored(action: &str) -> Self {
        Self {
            message: format!("ignored action of type {}", action),
            decision: Decision::Ignored,
        }
    }
}

/// Data owned by one run once the installation token is known
struct RunContext<'e> {
    target: PullRequestTarget<'e>,
    config: EffectiveConfig,
    token: AccessToken,
}

enum Stage<'e> {
    Received,
    ActionFiltered(PullRequestTarget<'e>),
    ConfigFetched(PullRequestTarget<'e>, RepoConfig),
    ConfigMerged(PullRequestTarget<'e>, EffectiveConfig),
    TokenAcquired(RunContext<'e>),
    CommitsFetched(RunContext<'e>, Vec<String>),
    Verified(RunContext<'e>, Vec<String>),
    Compliant(RunContext<'e>),
    NonCompliant(RunContext<'e>, Vec<String>),
    Reported(Outcome),
}

impl Stage<'_> {
    fn name(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::ActionFiltered(..) => "action_filtered",
            Stage::ConfigFetched(..) => "config_fetched",
            Stage::ConfigMerged(..) => "config_merged",
            Stage::TokenAcquired(..) => "token_acquired",
            Stage::CommitsFetched(..) => "commits_fetched",
            Stage::Verified(..) => "verified",
            Stage::Compliant(..) => "compliant",
            Stage::NonCompliant(..) => "non_compliant",
            Stage::Reported(..) => "reported",
        }
    }
}

/// Checks pull requests for CLA signatures and records the result on them
pub struct ClaBot {
    forge: Arc<dyn Forge>,
    tokens: Arc<dyn TokenMinter>,
    defaults: PolicyDefaults,
    credentials: ActionCredentials,
    http: Client,
}

impl ClaBot {
    pub fn new(
        forge: impl Forge + 'static,
        tokens: impl TokenMinter + 'static,
        defaults: PolicyDefaults,
        http: Client,
    ) -> Self {
        Self {
            forge: Arc::new(forge),
            tokens: Arc::new(tokens),
            defaults,
            credentials: ActionCredentials::default(),
            http,
        }
    }

    pub fn with_credentials(mut self, credentials: ActionCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Runs the pipeline for one webhook delivery
    pub async fn handle(&self, event: &WebhookEvent) -> Result<Outcome> {
        let pr = event.pull_request_url().unwrap_or("<unknown>").to_string();
        let mut stage = Stage::Received;
        loop {
            debug!(stage = stage.name(), pr = %pr, "advancing CLA pipeline");
            stage = match self.advance(event, stage).await {
                Ok(Stage::Reported(outcome)) => {
                    info!("{}", outcome.message);
                    return Ok(outcome);
                }
                Ok(next) => next,
                Err(e) => {
                    error!("CLA check for {} failed: {}", pr, e);
                    return Err(e);
                }
            };
        }
    }

    async fn advance<'e>(&self, event: &'e WebhookEvent, stage: Stage<'e>) -> Result<Stage<'e>> {
        let next = match stage {
            Stage::Received => {
                if event.is_opened() {
                    Stage::ActionFiltered(event.target()?)
                } else {
                    Stage::Reported(Outcome::ignored(&event.action))
                }
            }
            Stage::ActionFiltered(target) => {
                info!("Checking CLAs for PR {}", target.pull_request.url);
                let location = self
                    .forge
                    .fetch_config_location(&target)
                    .await
                    .map_err(ClaError::ConfigFetchFailed)?;
                let repo_config = self
                    .forge
                    .fetch_config_contents(&location)
                    .await
                    .map_err(ClaError::ConfigFetchFailed)?;
                Stage::ConfigFetched(target, repo_config)
            }
            Stage::ConfigFetched(target, repo_config) => {
                let config = EffectiveConfig::resolve(&self.defaults, Some(&repo_config));
                Stage::ConfigMerged(target, config)
            }
            Stage::ConfigMerged(target, config) => {
                let token = self
                    .tokens
                    .mint_installation_token(target.installation_id)
                    .await
                    .map_err(ClaError::TokenAcquisitionFailed)?;
                Stage::TokenAcquired(RunContext {
                    target,
                    config,
                    token,
                })
            }
            Stage::TokenAcquired(ctx) => {
                let commits = self
                    .forge
                    .fetch_commits(&ctx.target, &ctx.token)
                    .await
                    .map_err(ClaError::CommitsFetchFailed)?;
                let committers = commits
                    .iter()
                    .filter_map(|commit| {
                        let author = commit.author_identifier();
                        if author.is_none() {
                            warn!(
                                "Commit on {} has no author, skipping",
                                ctx.target.pull_request.url
                            );
                        }
                        author.map(str::to_string)
                    })
                    .collect();
                Stage::CommitsFetched(ctx, committers)
            }
            Stage::CommitsFetched(ctx, committers) => {
                let verifier = make_verifier(&ctx.config, &self.http)?;
                let non_contributors = verifier.verify(&committers).await?;
                Stage::Verified(ctx, non_contributors)
            }
            Stage::Verified(ctx, non_contributors) => {
                if non_contributors.is_empty() {
                    Stage::Compliant(ctx)
                } else {
                    Stage::NonCompliant(ctx, non_contributors)
                }
            }
            Stage::Compliant(ctx) => {
                let label = ctx.config.label()?;
                self.forge
                    .add_label(
                        &ctx.target,
                        label,
                        self.credential(PrAction::AddLabel, &ctx.token),
                    )
                    .await
                    .map_err(|source| ClaError::ActionApplyFailed {
                        action: PrAction::AddLabel,
                        source,
                    })?;
                self.set_status(&ctx, CommitState::Success).await?;
                Stage::Reported(Outcome {
                    message: format!("added label {} to {}", label, ctx.target.pull_request.url),
                    decision: Decision::Compliant {
                        label: label.to_string(),
                    },
                })
            }
            Stage::NonCompliant(ctx, non_contributors) => {
                let body = ctx.config.message_for(&non_contributors)?;
                self.forge
                    .add_comment(
                        &ctx.target,
                        &body,
                        self.credential(PrAction::AddComment, &ctx.token),
                    )
                    .await
                    .map_err(|source| ClaError::ActionApplyFailed {
                        action: PrAction::AddComment,
                        source,
                    })?;
                self.set_status(&ctx, CommitState::Failure).await?;
                Stage::Reported(Outcome {
                    message: format!(
                        "CLA has not been signed by users [{}], added a comment to {}",
                        non_contributors.join(", "),
                        ctx.target.pull_request.url
                    ),
                    decision: Decision::NonCompliant { non_contributors },
                })
            }
            reported @ Stage::Reported(_) => reported,
        };
        Ok(next)
    }

    async fn set_status(&self, ctx: &RunContext<'_>, state: CommitState) -> Result<()> {
        self.forge
            .set_status(
                &ctx.target,
                state,
                self.credential(PrAction::SetStatus, &ctx.token),
            )
            .await
            .map_err(|source| ClaError::ActionApplyFailed {
                action: PrAction::SetStatus,
                source,
            })
    }

    fn credential<'a>(&self, action: PrAction, token: &'a AccessToken) -> Credential<'a> {
        match self.credentials.policy_for(action) {
            CredentialPolicy::Installation => Credential::Installation(token),
            CredentialPolicy::Default => Credential::Default,
        }
    }
}
