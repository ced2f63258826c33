use std::time::Duration;

use garde::Validate;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] garde::Report),
}

#[derive(Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    #[garde(length(min = 1))]
    pub bind_addr: String,

    /// PostgreSQL connection string
    #[garde(length(min = 1))]
    pub database_url: String,

    /// Base URL of the compute worker service
    #[serde(default = "default_compute_worker_url")]
    #[garde(length(min = 1))]
    pub compute_worker_url: String,

    /// HS256 secret for user bearer tokens
    #[garde(length(min = 16))]
    pub jwt_secret: String,

    /// Shared secret the compute worker sends in `x-worker-token`
    #[garde(length(min = 16))]
    pub worker_token: String,

    /// Item rows per insert statement
    #[serde(default = "default_item_insert_chunk_size")]
    #[garde(range(min = 1, max = 1000))]
    pub item_insert_chunk_size: usize,

    /// Items per compute worker request
    #[serde(default = "default_dispatch_chunk_size")]
    #[garde(range(min = 1, max = 10000))]
    pub dispatch_chunk_size: usize,

    /// Batches buffered before dispatch starts dropping
    #[serde(default = "default_dispatch_queue_capacity")]
    #[garde(range(min = 1, max = 65536))]
    pub dispatch_queue_capacity: usize,

    #[serde(default = "default_dispatch_timeout_secs")]
    #[garde(range(min = 1, max = 600))]
    pub dispatch_timeout_secs: u64,

    /// Idle time after which an unfinished job is failed. 0 disables.
    #[serde(default = "default_stale_job_timeout_secs")]
    #[garde(range(min = 0, max = 31_536_000))]
    pub stale_job_timeout_secs: i64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_compute_worker_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_item_insert_chunk_size() -> usize {
    100
}

fn default_dispatch_chunk_size() -> usize {
    500
}

fn default_dispatch_queue_capacity() -> usize {
    256
}

fn default_dispatch_timeout_secs() -> u64 {
    30
}

fn default_stale_job_timeout_secs() -> i64 {
    86_400
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: AppConfig = envy::from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    pub fn stale_after(&self) -> Option<chrono::Duration> {
        (self.stale_job_timeout_secs > 0)
            .then(|| chrono::Duration::seconds(self.stale_job_timeout_secs))
    }
}
