//! HTTP handlers for code execution, completion and health.

use axum::extract::State;
use axum::Json;
use codeshare_core::execution::{ExecutionRequest, ExecutionStatus};
use serde::{Deserialize, Serialize};

use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub output: String,
    pub status: ExecutionStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct AutocompleteRequest {
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AutocompleteResponse {
    pub suggestion: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub sessions: usize,
    pub connections: usize,
}

/// `POST /execute`. Always 200; the outcome is carried in `status`.
pub async fn execute_handler(
    State(state): State<AppState>,
    Json(request): Json<ExecutionRequest>,
) -> Json<ExecuteResponse> {
    let result = state.executor.execute(&request.code).await;
    tracing::debug!(status = ?result.status(), "execute request finished");
    Json(ExecuteResponse {
        output: result.output_text(),
        status: result.status(),
    })
}

/// `POST /autocomplete`. An unavailable upstream yields an empty suggestion.
pub async fn autocomplete_handler(
    State(state): State<AppState>,
    Json(request): Json<AutocompleteRequest>,
) -> Json<AutocompleteResponse> {
    let suggestion = state.gateway.suggest(&request.code).await;
    Json(AutocompleteResponse { suggestion })
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        sessions: state.registry.session_count(),
        connections: state.registry.connection_count(),
    })
}
