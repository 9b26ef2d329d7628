//! HTTP request and response types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Header carrying the generated task id.
pub const TASK_ID_HEADER: &str = "x-task-id";

/// Header carrying the material tag, when the script set one.
pub const MATERIAL_HEADER: &str = "x-material";

/// Request body for the generate endpoint.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// Script body.
    pub code: String,

    /// Named parameters bound into the script's scope.
    #[serde(default, alias = "parameters")]
    pub args: Map<String, Value>,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
