//! Gateway errors and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shaperun_core::{ErrorKind, TaskError};
use shaperun_pool::PoolError;
use thiserror::Error;
use tracing::error;

use crate::http::responses::ErrorResponse;

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The task ran and failed.
    #[error("{0}")]
    Task(TaskError),

    /// Rejected request body.
    #[error("{0}")]
    BadRequest(String),

    /// No artifact for the requested task.
    #[error("File not found")]
    NotFound,

    /// Task succeeded but left no artifact behind.
    #[error("Script finished without producing an output file")]
    MissingArtifact,

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP status for a task failure kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Busy => StatusCode::SERVICE_UNAVAILABLE,
        kind if kind.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Task(err) => status_for(err.kind),
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::MissingArtifact | GatewayError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::Pool(err) => status_for(err.kind()),
        }
    }

    /// Body text. Client-side failures carry the script error prefix.
    pub fn message(&self) -> String {
        match self {
            GatewayError::Task(err) if err.kind.is_client_error() => {
                format!("Script error:\n{}", err.detail)
            }
            GatewayError::Task(err) => err.detail.clone(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = %status, error = %self, "Request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response()
    }
}
