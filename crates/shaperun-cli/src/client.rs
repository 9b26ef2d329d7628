//! HTTP client for the gateway.

use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::ClientError;

const TASK_ID_HEADER: &str = "x-task-id";
const MATERIAL_HEADER: &str = "x-material";

/// A generated artifact and its metadata.
#[derive(Debug, Clone)]
pub struct GeneratedModel {
    pub task_id: String,
    pub material: Option<String>,
    pub bytes: Vec<u8>,
}

/// `/v1/workers` response.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolSnapshot {
    pub lifecycle: String,
    pub capacity: usize,
    pub live: usize,
    pub idle: usize,
    pub busy: usize,
    pub restarts: u64,
    pub workers: Vec<WorkerSnapshot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSnapshot {
    pub id: String,
    pub state: String,
    pub pid: Option<u32>,
    pub tasks_served: u64,
    pub started_at: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client for the gateway API.
pub struct GatewayClient {
    inner: reqwest::Client,
    base_url: String,
}

impl GatewayClient {
    /// Create a new client.
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Check if the gateway is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let url = format!("{}/health", self.base_url);
        debug!(url = %url, "Checking health");

        let response = self.inner.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    /// Run a script and fetch its artifact.
    pub async fn generate(
        &self,
        code: &str,
        args: Map<String, Value>,
    ) -> Result<GeneratedModel, ClientError> {
        let url = format!("{}/api/v1/model/generate", self.base_url);
        debug!(url = %url, params = args.len(), "Submitting script");

        let response = self
            .inner
            .post(&url)
            .json(&json!({ "code": code, "args": args }))
            .send()
            .await?;
        let response = check(response).await?;

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let task_id = header(TASK_ID_HEADER).unwrap_or_default();
        let material = header(MATERIAL_HEADER);
        let bytes = response.bytes().await?.to_vec();

        Ok(GeneratedModel {
            task_id,
            material,
            bytes,
        })
    }

    /// Fetch the artifact of an earlier task.
    pub async fn download(&self, task_id: &str) -> Result<Vec<u8>, ClientError> {
        let url = format!("{}/api/v1/model/download/{}", self.base_url, task_id);
        debug!(url = %url, "Downloading artifact");

        let response = self.inner.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(format!("artifact for task {}", task_id)));
        }
        let response = check(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Snapshot of the worker pool.
    pub async fn workers(&self) -> Result<PoolSnapshot, ClientError> {
        let url = format!("{}/v1/workers", self.base_url);
        debug!(url = %url, "GET request");

        let response = check(self.inner.get(&url).send().await?).await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::Serialization(e.to_string()))
    }
}

/// Pass successful responses through; turn the rest into `Rejected`.
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(ClientError::Rejected {
        status: status.as_u16(),
        message,
    })
}
