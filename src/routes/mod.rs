use axum::routing::{get, patch, post, put};
use axum::Router;

use crate::app_state::AppState;

pub mod auth;
pub mod health;
pub mod items;
pub mod jobs;
pub mod metrics;
pub mod selections;

/// Health check plus the versioned API, with state applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/v1/projects/{project_id}/analyze",
            post(jobs::submit_analysis),
        )
        .route(
            "/api/v1/projects/{project_id}/uploads/analyze",
            post(jobs::submit_upload_analysis),
        )
        .route(
            "/api/v1/projects/{project_id}/thumbnails/repair",
            post(jobs::repair_thumbnails),
        )
        .route(
            "/api/v1/projects/{project_id}/analysis/status",
            get(jobs::project_status),
        )
        .route(
            "/api/v1/jobs/{job_id}",
            get(jobs::job_status).delete(jobs::delete_job),
        )
        .route("/api/v1/jobs/{job_id}/cancel", post(jobs::cancel_job))
        .route("/api/v1/job-items/{item_id}", patch(items::update_item))
        .route(
            "/api/v1/images/{image_id}/selection",
            put(selections::put_selection).get(selections::get_selection),
        )
        .route(
            "/api/v1/images/{image_id}/reject",
            post(selections::reject_image),
        )
        .route("/api/v1/images/batch-reject", post(selections::batch_reject))
        .with_state(state)
}
