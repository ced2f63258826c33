use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::AnalysisTask;

/// One entry of the compute worker's `/batch-analyze` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeRequestItem {
    pub image_id: Uuid,
    pub task_name: AnalysisTask,
    pub job_item_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchAnalyzeRequest {
    pub requests: Vec<AnalyzeRequestItem>,
}

/// The external executor of analysis tasks.
#[async_trait]
pub trait ComputeWorker: Send + Sync {
    async fn submit_batch(&self, batch: &BatchAnalyzeRequest) -> Result<(), DispatchError>;
}

/// HTTP client for the compute worker service.
pub struct ComputeWorkerClient {
    http: Client,
    base_url: String,
}

impl ComputeWorkerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DispatchError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DispatchError::Http)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn batch_url(&self) -> String {
        format!("{}/batch-analyze", self.base_url)
    }
}

#[async_trait]
impl ComputeWorker for ComputeWorkerClient {
    /// POST a batch. The response body is not consumed; only the status code
    /// decides whether the handoff counts as delivered.
    async fn submit_batch(&self, batch: &BatchAnalyzeRequest) -> Result<(), DispatchError> {
        let response = self
            .http
            .post(self.batch_url())
            .json(batch)
            .send()
            .await
            .map_err(DispatchError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("HTTP request to compute worker failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Compute worker responded with status {0}")]
    Rejected(u16),

    #[error("Dispatch queue is full")]
    QueueFull,

    #[error("Dispatch queue is closed")]
    QueueClosed,
}

impl DispatchError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            DispatchError::Http(_) => "http",
            DispatchError::Rejected(_) => "rejected",
            DispatchError::QueueFull => "queue_full",
            DispatchError::QueueClosed => "queue_closed",
        }
    }
}
