//! HTTP server for the gateway.
//!
//! Provides endpoints for:
//! - Model generation (`/api/v1/model/generate`)
//! - Artifact download (`/api/v1/model/download/{task_id}`)
//! - Worker pool snapshot (`/v1/workers`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod handlers;
pub mod responses;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // API routes
        .route("/api/v1/model/generate", post(handlers::generate_model))
        .route(
            "/api/v1/model/download/:task_id",
            get(handlers::download_model),
        )
        .route("/v1/workers", get(handlers::list_workers))
        // Observability routes
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
