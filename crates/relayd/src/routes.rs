//! API routes for relayd

use crate::server::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use relay_common::{
    ActionRequest, ActivityResponse, AggregateResponse, BackendOutcome, ErrorBody,
    HealthResponse, PromptRequest,
};
use std::sync::Arc;
use tracing::{error, info};

type AppStateArc = Arc<AppState>;

fn client_error(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Unwrap a JSON body, turning malformed input into a 400 with a JSON error
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|rejection| client_error(format!("invalid request body: {}", rejection.body_text())))
}

// ============================================================================
// Dispatch Routes
// ============================================================================

pub fn dispatch_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/prompt", post(submit_prompt))
        .route("/promptOpenAI", post(submit_prompt))
        .route("/v1/activities", post(submit_for_activities))
        .route("/v1/backends/:name/execute", post(execute_action))
}

async fn submit_prompt(
    State(state): State<AppStateArc>,
    payload: Result<Json<PromptRequest>, JsonRejection>,
) -> Result<Json<AggregateResponse>, Response> {
    // Missing and blank prompts are both rejected by the dispatcher
    let prompt = body(payload)?.prompt.unwrap_or_default();
    info!("[P]  Processing prompt ({} chars)", prompt.len());

    let aggregate = state
        .dispatcher
        .dispatch(&prompt)
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(Json(aggregate))
}

async fn submit_for_activities(
    State(state): State<AppStateArc>,
    payload: Result<Json<PromptRequest>, JsonRejection>,
) -> Result<Json<ActivityResponse>, Response> {
    let prompt = body(payload)?.prompt.unwrap_or_default();

    let aggregate = state
        .dispatcher
        .dispatch(&prompt)
        .await
        .map_err(IntoResponse::into_response)?;

    let activities = state.formatter.format(&aggregate).await.map_err(|e| {
        error!("  Activity formatting failed: {}", e);
        (
            StatusCode::BAD_GATEWAY,
            Json(ErrorBody {
                error: e.to_string(),
            }),
        )
            .into_response()
    })?;

    Ok(Json(ActivityResponse::new(activities, aggregate.outcomes)))
}

async fn execute_action(
    State(state): State<AppStateArc>,
    Path(name): Path<String>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> Result<Json<BackendOutcome>, Response> {
    let action = body(payload)?;
    info!("[A]  Direct action {} on {}", action.action, name);

    let outcome = state
        .dispatcher
        .execute_action(&name, action.into())
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(Json(outcome))
}

// ============================================================================
// Health Routes
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/health", get(health_check))
        .route("/test", get(server_check))
}

async fn health_check(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        backends: state.dispatcher.registry().names(),
    })
}

async fn server_check() -> &'static str {
    "Server check verified"
}

// ============================================================================
// Metrics Routes
// ============================================================================

pub fn metrics_routes() -> Router<AppStateArc> {
    Router::new().route("/metrics", get(export_metrics))
}

async fn export_metrics(State(state): State<AppStateArc>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export(),
    )
}
