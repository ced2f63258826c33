use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::JobResult;
use crate::models::api::{AnalyzeRequest, UploadAnalyzeRequest};
use crate::models::job::JobProfile;
use crate::routes::auth::AuthUser;
use crate::services::aggregator::JobStatusReport;
use crate::services::orchestrator::JobSubmission;

/// POST /api/v1/projects/{project_id}/analyze: start an analysis job.
pub async fn submit_analysis(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<Uuid>,
    body: Option<Json<AnalyzeRequest>>,
) -> JobResult<(StatusCode, Json<JobSubmission>)> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    req.validate()?;
    let profile = req.profile()?;

    let submission = state
        .orchestrator
        .submit(user.user_id, project_id, profile, &[])
        .await?;
    Ok((StatusCode::ACCEPTED, Json(submission)))
}

/// POST /api/v1/projects/{project_id}/uploads/analyze: thumbnails and EXIF
/// for freshly uploaded images.
pub async fn submit_upload_analysis(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<Uuid>,
    Json(req): Json<UploadAnalyzeRequest>,
) -> JobResult<(StatusCode, Json<JobSubmission>)> {
    req.validate()?;

    let submission = state
        .orchestrator
        .submit(user.user_id, project_id, JobProfile::Upload, &req.image_ids)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(submission)))
}

/// POST /api/v1/projects/{project_id}/thumbnails/repair
pub async fn repair_thumbnails(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<Uuid>,
) -> JobResult<(StatusCode, Json<JobSubmission>)> {
    let submission = state
        .orchestrator
        .submit(user.user_id, project_id, JobProfile::ThumbnailRepair, &[])
        .await?;
    Ok((StatusCode::ACCEPTED, Json(submission)))
}

/// GET /api/v1/projects/{project_id}/analysis/status: newest job's status.
pub async fn project_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<Uuid>,
) -> JobResult<Json<JobStatusReport>> {
    let report = state
        .orchestrator
        .latest_status(user.user_id, project_id)
        .await?;
    Ok(Json(report))
}

/// GET /api/v1/jobs/{job_id}
pub async fn job_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<Uuid>,
) -> JobResult<Json<JobStatusReport>> {
    let report = state.orchestrator.status_by_id(user.user_id, job_id).await?;
    Ok(Json(report))
}

/// POST /api/v1/jobs/{job_id}/cancel
pub async fn cancel_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<Uuid>,
) -> JobResult<Json<JobStatusReport>> {
    let report = state.orchestrator.cancel(user.user_id, job_id).await?;
    Ok(Json(report))
}

/// DELETE /api/v1/jobs/{job_id}
pub async fn delete_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<Uuid>,
) -> JobResult<StatusCode> {
    state.orchestrator.delete(user.user_id, job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
