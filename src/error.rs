use std::io;

use serde::Serialize;

use crate::forge::ForgeError;
use crate::verifier::VerifyError;

/// Pull request actions applied once verification has completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrAction {
    AddLabel,
    SetStatus,
    AddComment,
}

impl std::fmt::Display for PrAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PrAction::AddLabel => "add label",
            PrAction::SetStatus => "set status",
            PrAction::AddComment => "add comment",
        };
        f.write_str(name)
    }
}

/// Custom error type for cla_bot operations
#[derive(Debug, thiserror::Error)]
pub enum ClaError {
    #[error("Malformed webhook event: {0}")]
    MalformedEvent(String),

    #[error("Failed to fetch repository configuration: {0}")]
    ConfigFetchFailed(#[source] ForgeError),

    #[error("Failed to acquire installation token: {0}")]
    TokenAcquisitionFailed(#[source] ForgeError),

    #[error("Failed to fetch pull request commits: {0}")]
    CommitsFetchFailed(#[source] ForgeError),

    #[error("Contributor verification failed: {0}")]
    VerificationFailed(#[source] VerifyError),

    #[error("Failed to {action} on pull request: {source}")]
    ActionApplyFailed {
        action: PrAction,
        #[source]
        source: ForgeError,
    },

    #[error("Configuration error: {0}")]
    ConfigurationInvalid(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),
}

/// Stable, serializable error kind reported at the HTTP boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedEvent,
    ConfigFetchFailed,
    TokenAcquisitionFailed,
    CommitsFetchFailed,
    VerificationFailed,
    ActionApplyFailed,
    ConfigurationInvalid,
    Internal,
}

impl ClaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClaError::MalformedEvent(_) => ErrorKind::MalformedEvent,
            ClaError::ConfigFetchFailed(_) => ErrorKind::ConfigFetchFailed,
            ClaError::TokenAcquisitionFailed(_) => ErrorKind::TokenAcquisitionFailed,
            ClaError::CommitsFetchFailed(_) => ErrorKind::CommitsFetchFailed,
            ClaError::VerificationFailed(_) => ErrorKind::VerificationFailed,
            ClaError::ActionApplyFailed { .. } => ErrorKind::ActionApplyFailed,
            ClaError::ConfigurationInvalid(_) => ErrorKind::ConfigurationInvalid,
            ClaError::IoError(_) | ClaError::TomlParseError(_) => ErrorKind::Internal,
        }
    }
}

impl From<VerifyError> for ClaError {
    /// A malformed signatory source is a configuration problem, everything
    /// else means the source could not be consulted.
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::InvalidSource(msg) => ClaError::ConfigurationInvalid(msg),
            other => ClaError::VerificationFailed(other),
        }
    }
}

/// Helper type for Results that use ClaError
pub type Result<T> = std::result::Result<T, ClaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_source_surfaces_as_configuration_error() {
        let err: ClaError = VerifyError::InvalidSource("contributors must be a list".into()).into();
        assert_eq!(err.kind(), ErrorKind::ConfigurationInvalid);
        assert!(err.to_string().contains("contributors must be a list"));
    }

    #[test]
    fn unavailable_source_surfaces_as_verification_failure() {
        let err: ClaError = VerifyError::Unavailable("connection refused".into()).into();
        assert_eq!(err.kind(), ErrorKind::VerificationFailed);
    }

    #[test]
    fn action_failures_name_the_action() {
        let err = ClaError::ActionApplyFailed {
            action: PrAction::SetStatus,
            source: ForgeError::Decode("bad body".into()),
        };
        assert_eq!(err.kind(), ErrorKind::ActionApplyFailed);
        assert!(err.to_string().starts_with("Failed to set status"));
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::TokenAcquisitionFailed).unwrap();
        assert_eq!(json, "\"token_acquisition_failed\"");
    }
}
