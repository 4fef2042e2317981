//! Installation access tokens for the forge app

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::forge::{ForgeError, USER_AGENT, ensure_success};

/// Short-lived credential scoped to one installation. Never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Exchanges an installation id for an access token
#[async_trait]
pub trait TokenMinter: Send + Sync {
    async fn mint_installation_token(
        &self,
        installation_id: u64,
    ) -> Result<AccessToken, ForgeError>;
}

/// JWT claims identifying the GitHub App itself
#[derive(Debug, Serialize)]
struct AppClaims {
    iat: u64,
    exp: u64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct InstallationTokenResponse {
    token: String,
}

/// Backdated to tolerate clock drift between us and the forge
const JWT_BACKDATE_SECS: u64 = 60;
/// GitHub rejects app JWTs valid for longer than ten minutes
const JWT_LIFETIME_SECS: u64 = 9 * 60;

/// Mints installation tokens for a GitHub App by signing an RS256 JWT with the
/// app's private key and exchanging it at the installations endpoint.
pub struct AppTokenMinter {
    client: Client,
    api_url: String,
    app_id: u64,
    key: EncodingKey,
}

impl AppTokenMinter {
    pub fn new(
        client: Client,
        api_url: impl Into<String>,
        app_id: u64,
        private_key_pem: &[u8],
    ) -> Result<Self, ForgeError> {
        let key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| ForgeError::Credential(format!("Invalid app private key: {}", e)))?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            app_id,
            key,
        })
    }

    fn app_jwt(&self) -> Result<String, ForgeError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ForgeError::Credential(format!("System clock error: {}", e)))?
            .as_secs();
        let claims = AppClaims {
            iat: now.saturating_sub(JWT_BACKDATE_SECS),
            exp: now + JWT_LIFETIME_SECS,
            iss: self.app_id.to_string(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| ForgeError::Credential(format!("Failed to sign app JWT: {}", e)))
    }
}

#[async_trait]
impl TokenMinter for AppTokenMinter {
    async fn mint_installation_token(
        &self,
        installation_id: u64,
    ) -> Result<AccessToken, ForgeError> {
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_url, installation_id
        );
        debug!("Requesting installation token for installation {}", installation_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.app_jwt()?)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;
        let body: InstallationTokenResponse = ensure_success(&url, response)
            .await?
            .json()
            .await
            .map_err(|e| ForgeError::Decode(format!("installation token response: {}", e)))?;

        Ok(AccessToken::new(body.token))
    }
}
