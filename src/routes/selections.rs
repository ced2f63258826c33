use axum::extract::{Path, State};
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::JobResult;
use crate::models::api::{BatchRejectRequest, RejectRequest, SelectionRequest};
use crate::models::selection::{BatchRejectOutcome, Rejection, SelectionRecord};
use crate::routes::auth::AuthUser;
use crate::services::recorder::SelectionView;

/// PUT /api/v1/images/{image_id}/selection: pick and/or rate an image.
pub async fn put_selection(
    State(state): State<AppState>,
    user: AuthUser,
    Path(image_id): Path<Uuid>,
    Json(req): Json<SelectionRequest>,
) -> JobResult<Json<SelectionRecord>> {
    req.validate()?;
    let record = state
        .recorder
        .record_selection(image_id, user.user_id, req.into())
        .await?;
    Ok(Json(record))
}

/// POST /api/v1/images/{image_id}/reject
pub async fn reject_image(
    State(state): State<AppState>,
    user: AuthUser,
    Path(image_id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> JobResult<Json<SelectionRecord>> {
    req.validate()?;
    let record = state
        .recorder
        .record_rejection(image_id, user.user_id, req.into_rejection())
        .await?;
    Ok(Json(record))
}

/// GET /api/v1/images/{image_id}/selection
pub async fn get_selection(
    State(state): State<AppState>,
    user: AuthUser,
    Path(image_id): Path<Uuid>,
) -> JobResult<Json<SelectionView>> {
    let view = state
        .recorder
        .selection_view(image_id, user.user_id)
        .await?;
    Ok(Json(view))
}

/// POST /api/v1/images/batch-reject: always 200; per-image failures are in
/// the body.
pub async fn batch_reject(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<BatchRejectRequest>,
) -> JobResult<Json<BatchRejectOutcome>> {
    req.validate()?;
    let rejection = Rejection::from_request(req.reason_code, req.reason_text);
    let outcome = state
        .recorder
        .batch_reject(user.user_id, &req.image_ids, rejection)
        .await?;
    Ok(Json(outcome))
}
