use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::db::repository::{ProjectCatalog, SelectionStore};
use crate::error::{JobError, JobResult};
use crate::models::selection::{
    BatchFailure, BatchFailureReason, BatchRejectOutcome, Rejection, RejectionRecord,
    SelectionPatch, SelectionRecord,
};

pub const MAX_RATING: i16 = 5;

/// A user's current selection state for an image plus every rejection
/// reason they have recorded for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionView {
    pub image_id: Uuid,
    pub selection: Option<SelectionRecord>,
    pub rejections: Vec<RejectionRecord>,
}

/// Records pick/rating/rejection actions without creating duplicate rows.
#[derive(Clone)]
pub struct OutcomeRecorder {
    selections: Arc<dyn SelectionStore>,
    catalog: Arc<dyn ProjectCatalog>,
}

impl OutcomeRecorder {
    pub fn new(selections: Arc<dyn SelectionStore>, catalog: Arc<dyn ProjectCatalog>) -> Self {
        Self {
            selections,
            catalog,
        }
    }

    /// Unknown images are reported as not authorized so callers cannot test
    /// for ids they do not own.
    async fn authorize(&self, user_id: Uuid, image_id: Uuid) -> JobResult<()> {
        let allowed = self.catalog.authorized_images(user_id, &[image_id]).await?;
        if allowed.contains(&image_id) {
            Ok(())
        } else {
            tracing::warn!(user_id = %user_id, image_id = %image_id, "Selection denied");
            Err(JobError::NotAuthorized)
        }
    }

    pub async fn record_selection(
        &self,
        image_id: Uuid,
        user_id: Uuid,
        patch: SelectionPatch,
    ) -> JobResult<SelectionRecord> {
        if patch.is_empty() {
            return Err(JobError::Validation(
                "at least one of is_picked or rating is required".into(),
            ));
        }
        if let Some(rating) = patch.rating {
            if !(0..=MAX_RATING).contains(&rating) {
                return Err(JobError::Validation(format!(
                    "rating must be between 0 and {MAX_RATING}"
                )));
            }
        }
        self.authorize(user_id, image_id).await?;

        let record = self
            .selections
            .upsert_selection(image_id, user_id, &patch)
            .await?;

        tracing::info!(
            image_id = %image_id,
            user_id = %user_id,
            is_picked = record.is_picked,
            rating = ?record.rating,
            "Selection recorded"
        );
        Ok(record)
    }

    pub async fn record_rejection(
        &self,
        image_id: Uuid,
        user_id: Uuid,
        rejection: Rejection,
    ) -> JobResult<SelectionRecord> {
        self.authorize(user_id, image_id).await?;

        let record = self.selections.reject(image_id, user_id, &rejection).await?;

        metrics::counter!("image_rejections_total").increment(1);
        tracing::info!(
            image_id = %image_id,
            user_id = %user_id,
            reason = %rejection.code,
            "Image rejected"
        );
        Ok(record)
    }

    /// Reject many images at once. Never fails as a whole: ids the user may
    /// not touch come back in `failed`, and so does every id the call could
    /// not settle because the authorization lookup or the bulk write faulted.
    pub async fn batch_reject(
        &self,
        user_id: Uuid,
        image_ids: &[Uuid],
        rejection: Rejection,
    ) -> JobResult<BatchRejectOutcome> {
        let mut seen = HashSet::new();
        let requested: Vec<Uuid> = image_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let allowed: HashSet<Uuid> = match self
            .catalog
            .authorized_images(user_id, &requested)
            .await
        {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                tracing::error!(
                    user_id = %user_id,
                    images = requested.len(),
                    error = %e,
                    "Authorization lookup for bulk rejection failed"
                );
                return Ok(BatchRejectOutcome {
                    succeeded: Vec::new(),
                    failed: requested
                        .into_iter()
                        .map(|image_id| BatchFailure {
                            image_id,
                            error: BatchFailureReason::InternalError,
                        })
                        .collect(),
                });
            }
        };

        let (authorized, unauthorized): (Vec<Uuid>, Vec<Uuid>) =
            requested.into_iter().partition(|id| allowed.contains(id));

        let mut outcome = BatchRejectOutcome {
            succeeded: Vec::new(),
            failed: unauthorized
                .into_iter()
                .map(|image_id| BatchFailure {
                    image_id,
                    error: BatchFailureReason::Unauthorized,
                })
                .collect(),
        };

        if authorized.is_empty() {
            return Ok(outcome);
        }

        match self
            .selections
            .reject_many(&authorized, user_id, &rejection)
            .await
        {
            Ok(()) => {
                metrics::counter!("image_rejections_total").increment(authorized.len() as u64);
                outcome.succeeded = authorized;
            }
            Err(e) => {
                tracing::error!(
                    user_id = %user_id,
                    images = authorized.len(),
                    error = %e,
                    "Bulk rejection failed"
                );
                outcome
                    .failed
                    .extend(authorized.into_iter().map(|image_id| BatchFailure {
                        image_id,
                        error: BatchFailureReason::InternalError,
                    }));
            }
        }

        tracing::info!(
            user_id = %user_id,
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "Batch rejection recorded"
        );
        Ok(outcome)
    }

    pub async fn selection_view(&self, image_id: Uuid, user_id: Uuid) -> JobResult<SelectionView> {
        self.authorize(user_id, image_id).await?;

        let selection = self.selections.get_selection(image_id, user_id).await?;
        let rejections = self.selections.rejection_history(image_id, user_id).await?;

        Ok(SelectionView {
            image_id,
            selection,
            rejections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::models::selection::{RejectionCode, RejectionReasonCode};

    struct Fixture {
        store: Arc<MemoryStore>,
        recorder: OutcomeRecorder,
        owner: Uuid,
        image: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::default());
        let (owner, project, image) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.insert_project(project, owner).await;
        store.insert_image(image, project, None, None).await;
        let recorder = OutcomeRecorder::new(store.clone(), store.clone());
        Fixture {
            store,
            recorder,
            owner,
            image,
        }
    }

    #[tokio::test]
    async fn test_repeated_selection_merges_into_one_row() {
        let f = fixture().await;

        f.recorder
            .record_selection(
                f.image,
                f.owner,
                SelectionPatch {
                    is_picked: Some(true),
                    rating: None,
                },
            )
            .await
            .unwrap();
        let record = f
            .recorder
            .record_selection(
                f.image,
                f.owner,
                SelectionPatch {
                    is_picked: None,
                    rating: Some(4),
                },
            )
            .await
            .unwrap();

        assert!(record.is_picked);
        assert_eq!(record.rating, Some(4));
        assert_eq!(f.store.selection_count().await, 1);
    }

    #[tokio::test]
    async fn test_selection_rejects_out_of_range_rating_before_writing() {
        let f = fixture().await;
        let err = f
            .recorder
            .record_selection(
                f.image,
                f.owner,
                SelectionPatch {
                    is_picked: None,
                    rating: Some(9),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Validation(_)));
        assert_eq!(f.store.selection_count().await, 0);
    }

    #[tokio::test]
    async fn test_stranger_cannot_select() {
        let f = fixture().await;
        let err = f
            .recorder
            .record_selection(
                f.image,
                Uuid::new_v4(),
                SelectionPatch {
                    is_picked: Some(true),
                    rating: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::NotAuthorized));
    }

    #[tokio::test]
    async fn test_rejections_append_history_but_keep_one_selection() {
        let f = fixture().await;

        f.recorder
            .record_rejection(
                f.image,
                f.owner,
                Rejection::from_request(RejectionReasonCode::Blurry, None),
            )
            .await
            .unwrap();
        let record = f
            .recorder
            .record_rejection(
                f.image,
                f.owner,
                Rejection::from_request(RejectionReasonCode::ClosedEyes, None),
            )
            .await
            .unwrap();
        assert!(record.is_rejected);

        let view = f.recorder.selection_view(f.image, f.owner).await.unwrap();
        assert_eq!(view.rejections.len(), 2);
        assert_eq!(view.rejections[0].reason_code, RejectionCode::OutOfFocus);
        assert_eq!(view.rejections[1].reason_code, RejectionCode::Other);
        assert_eq!(f.store.selection_count().await, 1);
    }

    #[tokio::test]
    async fn test_batch_reject_dedupes_and_reports_every_id() {
        let f = fixture().await;
        let foreign = Uuid::new_v4();

        let outcome = f
            .recorder
            .batch_reject(
                f.owner,
                &[f.image, foreign, f.image],
                Rejection::from_request(RejectionReasonCode::Duplicate, None),
            )
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, vec![f.image]);
        assert_eq!(
            outcome.failed,
            vec![BatchFailure {
                image_id: foreign,
                error: BatchFailureReason::Unauthorized,
            }]
        );
    }
}
