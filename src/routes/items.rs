use axum::extract::{Path, State};
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::JobResult;
use crate::models::api::ItemCallbackRequest;
use crate::routes::auth::WorkerAuth;
use crate::services::orchestrator::ItemCallbackOutcome;

/// PATCH /api/v1/job-items/{item_id}: compute worker reports an item outcome.
///
/// Updates to finished items are acknowledged with `applied: false`.
pub async fn update_item(
    State(state): State<AppState>,
    _worker: WorkerAuth,
    Path(item_id): Path<Uuid>,
    Json(req): Json<ItemCallbackRequest>,
) -> JobResult<Json<ItemCallbackOutcome>> {
    req.validate()?;
    let outcome = state
        .orchestrator
        .record_item_outcome(item_id, req.into())
        .await?;
    Ok(Json(outcome))
}
