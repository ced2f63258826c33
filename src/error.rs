use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use uuid::Uuid;

use crate::models::job::JobStatus;

/// Errors raised by job orchestration and outcome recording.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Missing or invalid credentials")]
    Unauthenticated,

    #[error("Not authorized to access this resource")]
    NotAuthorized,

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Unrecognized job type: {0}")]
    InvalidJobType(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Job cannot move from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Inserted {inserted} of {expected} job items")]
    ShortInsert { expected: usize, inserted: usize },

    #[error("Compute worker unavailable: {0}")]
    DispatchUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type JobResult<T> = Result<T, JobError>;

impl JobError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        JobError::NotFound { entity, id }
    }
}

impl From<garde::Report> for JobError {
    fn from(report: garde::Report) -> Self {
        JobError::Validation(report.to_string())
    }
}

impl IntoResponse for JobError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            JobError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", self.to_string())
            }
            JobError::NotAuthorized => (StatusCode::FORBIDDEN, "NOT_AUTHORIZED", self.to_string()),
            JobError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            JobError::InvalidJobType(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_JOB_TYPE",
                self.to_string(),
            ),
            JobError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", self.to_string())
            }
            JobError::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, "INVALID_TRANSITION", self.to_string())
            }
            JobError::ShortInsert { .. } => {
                tracing::error!(error = %self, "Job item insert came up short");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SHORT_INSERT",
                    self.to_string(),
                )
            }
            JobError::DispatchUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "DISPATCH_UNAVAILABLE",
                self.to_string(),
            ),
            JobError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, axum::Json(json!({ "error": message, "code": code }))).into_response()
    }
}
