//! Model generation and download handlers.

use std::io;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use shaperun_core::{Parameters, TaskId};
use shaperun_pool::{PoolError, ARTIFACT_EXTENSION};
use tracing::{debug, info};

use crate::error::GatewayError;
use crate::http::responses::{GenerateRequest, MATERIAL_HEADER, TASK_ID_HEADER};
use crate::state::AppState;

/// Run a script and answer with its artifact.
pub async fn generate_model(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let Json(request) = payload.map_err(|e| GatewayError::BadRequest(e.body_text()))?;
    let parameters = Parameters::from_json(&Value::Object(request.args))
        .map_err(|e| GatewayError::BadRequest(e.to_string()))?;

    let report = state.runner.submit(request.code, parameters).await;
    let task_id = report.task.id.clone();
    if let Some(err) = report.task.error {
        return Err(GatewayError::Task(err));
    }
    let path = report.artifact.ok_or(GatewayError::MissingArtifact)?;
    let bytes = tokio::fs::read(&path).await?;

    info!(task_id = %task_id, bytes = bytes.len(), "Returning generated model");
    Ok(artifact_response(&task_id, report.task.material.as_deref(), bytes))
}

/// Fetch the artifact of an earlier task.
pub async fn download_model(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Response, GatewayError> {
    let task_id = TaskId::new(task_id);
    let path = match state.runner.artifact(&task_id) {
        Ok(Some(path)) => path,
        Ok(None) | Err(PoolError::InvalidTaskId(_)) => return Err(GatewayError::NotFound),
        Err(e) => return Err(e.into()),
    };

    // The retention sweep may have won the race.
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(GatewayError::NotFound),
        Err(e) => return Err(e.into()),
    };

    debug!(task_id = %task_id, bytes = bytes.len(), "Serving artifact");
    Ok(artifact_response(&task_id, None, bytes))
}

fn artifact_response(task_id: &TaskId, material: Option<&str>, bytes: Vec<u8>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    let disposition = format!(
        "attachment; filename=\"{}.{}\"",
        task_id, ARTIFACT_EXTENSION
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Ok(value) = HeaderValue::from_str(task_id.as_str()) {
        headers.insert(TASK_ID_HEADER, value);
    }
    if let Some(value) = material.and_then(|m| HeaderValue::from_str(m).ok()) {
        headers.insert(MATERIAL_HEADER, value);
    }
    (headers, bytes).into_response()
}
