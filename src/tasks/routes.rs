//! REST endpoints for the task registry.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::query::{QueryService, TaskOperation, failure_body};
use crate::error::TaskError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<QueryService>,
}

/// Build the Axum router for the task API.
pub fn task_routes(service: Arc<QueryService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tasks", get(list_tasks))
        .route("/api/tasks/operations", post(run_operation))
        .route("/api/tasks/{id}", get(get_task).delete(mark_done))
        .layer(CorsLayer::permissive())
        .with_state(AppState { service })
}

fn status_code(err: &TaskError) -> StatusCode {
    match err {
        TaskError::Validation(_) => StatusCode::BAD_REQUEST,
        TaskError::NotFound { .. } => StatusCode::NOT_FOUND,
        TaskError::InvalidState { .. } | TaskError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        TaskError::CapacityExceeded { .. } | TaskError::ShuttingDown => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn respond(state: &AppState, operation: TaskOperation) -> (StatusCode, Json<Value>) {
    match state.service.execute(operation).await {
        Ok(body) => (StatusCode::OK, Json(body)),
        Err(e) => (status_code(&e), Json(failure_body(&e))),
    }
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let counts = state.service.store().counts().await;
    Json(serde_json::json!({
        "status": "ok",
        "service": "agent-tasks",
        "tasks": counts,
    }))
}

// ── REST Endpoints ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListParams {
    status_filter: Option<String>,
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let status_filter = match params
        .status_filter
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .transpose()
    {
        Ok(filter) => filter,
        Err(e) => return (status_code(&e), Json(failure_body(&e))),
    };
    respond(&state, TaskOperation::ListTasks { status_filter }).await
}

async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    respond(&state, TaskOperation::GetTask { task_id: id }).await
}

#[derive(Debug, Deserialize)]
struct MarkDoneParams {
    #[serde(default)]
    force: bool,
}

async fn mark_done(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<MarkDoneParams>,
) -> impl IntoResponse {
    info!(task_id = %id, force = params.force, "mark_done via REST");
    respond(
        &state,
        TaskOperation::MarkDone {
            task_id: id,
            force: params.force,
        },
    )
    .await
}

/// Tool-contract passthrough: the body is the same JSON the `task_manager` tool takes.
async fn run_operation(State(state): State<AppState>, Json(body): Json<Value>) -> impl IntoResponse {
    match TaskOperation::from_params(&body) {
        Ok(operation) => respond(&state, operation).await,
        Err(e) => (status_code(&e), Json(failure_body(&e))),
    }
}
