use std::collections::HashMap;

use axum::{
    Json,
    body::Bytes,
    extract::State as AxumState,
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::SharedState;
use crate::error::{ClaError, ErrorKind};
use crate::run::{RunRecord, RunStatus};
use crate::utils::verify_github_signature;
use crate::webhook::WebhookEvent;

const PULL_REQUEST_EVENT: &str = "pull_request";
const DEFAULT_RUN_LIMIT: usize = 20;

pub async fn root() -> &'static str {
    "cla_bot is running"
}

/// Returns the current server status with run counts
pub async fn status(AxumState(state): AxumState<SharedState>) -> impl IntoResponse {
    let runs = state.runs.lock().await;

    Json(json!({
        "server": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": state.started_at,
            "uptime_seconds": state.start_time.elapsed().as_secs(),
        },
        "runs": {
            "recorded": runs.len(),
            "counts": runs.counts(),
        }
    }))
}

/// Returns recent runs, newest first
/// Supports query parameters: ?status=failed&limit=10
pub async fn get_runs(
    AxumState(state): AxumState<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let limit = params
        .get("limit")
        .and_then(|l| l.parse().ok())
        .unwrap_or(DEFAULT_RUN_LIMIT);
    let runs = state.runs.lock().await;

    let filtered = match params.get("status") {
        Some(raw) => match RunStatus::parse(raw) {
            Some(status) => runs.get_runs_by_status(status, limit),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": format!("unknown run status '{}'", raw) })),
                )
                    .into_response();
            }
        },
        None => runs.get_recent_runs(limit),
    };

    Json(filtered).into_response()
}

/// Returns a specific run by ID
pub async fn get_run(AxumState(state): AxumState<SharedState>, Path(id): Path<String>) -> Response {
    let runs = state.runs.lock().await;
    match runs.get_run(&id) {
        Some(run) => Json(run).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Run not found"})),
        )
            .into_response(),
    }
}

/// Handles the GitHub webhook POST request and runs the CLA check inline.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = &state.webhook_secret {
        let Some(signature) = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok())
        else {
            warn!("Webhook secret configured, but no signature header supplied.");
            return StatusCode::UNAUTHORIZED.into_response();
        };
        if !verify_github_signature(secret, &body, signature) {
            warn!("Webhook signature verification failed!");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    // Only handle "pull_request" events.
    let event_name = headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("<none>");
    if event_name != PULL_REQUEST_EVENT {
        info!("Not pull_request event; Received {:?} event", event_name);
        return Json(json!({ "message": format!("ignored event of type {}", event_name) }))
            .into_response();
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            info!("Could not parse webhook body: {:?}", e);
            return error_response(&ClaError::MalformedEvent(e.to_string()));
        }
    };

    let run = RunRecord::new(
        event.pull_request_url().map(str::to_string),
        event.action.clone(),
    );
    let run_id = run.id.clone();
    state.runs.lock().await.add_run(run);
    debug!("Run {} started for action {:?}", run_id, event.action);

    let result = state.bot.handle(&event).await;

    let mut runs = state.runs.lock().await;
    let (recorded, response) = match result {
        Ok(outcome) => (
            runs.update_run(&run_id, |r| r.mark_succeeded(&outcome)),
            Json(outcome).into_response(),
        ),
        Err(e) => (
            runs.update_run(&run_id, |r| r.mark_failed(&e)),
            error_response(&e),
        ),
    };
    if !recorded {
        warn!("Run {} was evicted before it finished; outcome not recorded", run_id);
    }
    response
}

/// Maps an error to its HTTP status, keeping the error kind in the body
pub fn error_response(err: &ClaError) -> Response {
    let status = match err.kind() {
        ErrorKind::MalformedEvent => StatusCode::BAD_REQUEST,
        ErrorKind::ConfigurationInvalid => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::ConfigFetchFailed
        | ErrorKind::TokenAcquisitionFailed
        | ErrorKind::CommitsFetchFailed
        | ErrorKind::VerificationFailed
        | ErrorKind::ActionApplyFailed => StatusCode::BAD_GATEWAY,
    };

    (
        status,
        Json(json!({
            "error": err.kind(),
            "message": err.to_string(),
        })),
    )
        .into_response()
}
