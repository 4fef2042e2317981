use std::fs;
use std::sync::Arc;
use std::time::Duration;

use cla_bot::config::{ServiceConfig, load_config};
use cla_bot::error::{ClaError, Result};
use cla_bot::github::GitHubClient;
use cla_bot::logging::setup_logging;
use cla_bot::pipeline::ClaBot;
use cla_bot::policy::PolicyDefaults;
use cla_bot::token::AppTokenMinter;
use cla_bot::{AppState, app};
use tracing::{self, info};

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8888";
const DEFAULT_CONFIG_PATH: &str = "cla_bot.toml";

/// Wires the forge client, token minter and default policy into a bot
fn build_bot(config: &ServiceConfig) -> Result<ClaBot> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.github.request_timeout_secs))
        .build()
        .map_err(|e| ClaError::ConfigurationInvalid(format!("Failed to build HTTP client: {}", e)))?;

    let defaults = match &config.default_config {
        Some(path) => PolicyDefaults::load(path)?,
        None => PolicyDefaults::builtin()?,
    };

    let private_key = fs::read(&config.github.private_key_path).map_err(|e| {
        ClaError::ConfigurationInvalid(format!(
            "Failed to read app private key '{}': {}",
            config.github.private_key_path.display(),
            e
        ))
    })?;
    let tokens = AppTokenMinter::new(
        http.clone(),
        &config.github.api_url,
        config.github.app_id,
        &private_key,
    )
    .map_err(|e| ClaError::ConfigurationInvalid(e.to_string()))?;
    let forge = GitHubClient::new(http.clone(), config.github.default_token.clone());

    Ok(ClaBot::new(forge, tokens, defaults, http).with_credentials(config.github.credentials))
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let bind_address =
        std::env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string());
    let config_path =
        std::env::var("CLA_BOT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let mut config = match load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if config.github.default_token.is_none() {
        config.github.default_token = std::env::var("GITHUB_ACCESS_TOKEN").ok();
    }
    if let Err(e) = config.validate() {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    let _log_guard = match setup_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to set up logging: {}", e);
            std::process::exit(1);
        }
    };

    let bot = match build_bot(&config) {
        Ok(bot) => bot,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState::new(
        bot,
        config.webhook_secret.clone(),
        config.max_runs,
    ));

    info!("Listening on {}", bind_address);
    info!("Using config at {:?}", config_path);
    let listener = tokio::net::TcpListener::bind(&bind_address).await.unwrap();
    axum::serve(listener, app(state)).await.unwrap();
}
