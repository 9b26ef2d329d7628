//! Worker pool handler.

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};

use crate::state::AppState;

/// Pool snapshot as JSON.
pub async fn list_workers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.runner.pool_stats())
}
