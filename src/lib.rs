pub mod config;
pub mod error;
pub mod forge;
pub mod github;
pub mod handlers;
pub mod logging;
pub mod pipeline;
pub mod policy;
pub mod run;
pub mod token;
pub mod utils;
pub mod verifier;
pub mod webhook;

use std::sync::Arc;
use std::time::Instant;

use axum::{Router, routing};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::pipeline::ClaBot;
use crate::run::RunStore;

pub struct AppState {
    pub bot: ClaBot,
    pub webhook_secret: Option<String>,
    pub runs: Mutex<RunStore>,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(bot: ClaBot, webhook_secret: Option<String>, max_runs: usize) -> Self {
        Self {
            bot,
            webhook_secret,
            runs: Mutex::new(RunStore::new(max_runs)),
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;

pub fn app(state: SharedState) -> Router {
    Router::new()
        .route("/", routing::get(handlers::root))
        .route("/webhook", routing::post(handlers::handle_webhook))
        .route("/status", routing::get(handlers::status))
        .route("/runs", routing::get(handlers::get_runs))
        .route("/runs/{id}", routing::get(handlers::get_run))
        .with_state(state)
}
