use garde::Validate;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{JobError, JobResult};
use crate::models::job::{ItemStatus, ItemUpdate, JobProfile};
use crate::models::selection::{Rejection, RejectionReasonCode, SelectionPatch};

/// Body of `POST /projects/{id}/analyze`. Missing `jobType` means a full scan.
/// Unknown fields are rejected so a misspelled type never falls back to a
/// full scan.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AnalyzeRequest {
    #[serde(default, alias = "job_type")]
    #[garde(length(min = 1, max = 64))]
    pub job_type: Option<String>,
}

impl AnalyzeRequest {
    pub fn profile(&self) -> JobResult<JobProfile> {
        match self.job_type.as_deref().map(str::trim) {
            None => Ok(JobProfile::FullScan),
            Some(raw) => raw
                .parse()
                .map_err(|_| JobError::InvalidJobType(raw.to_string())),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UploadAnalyzeRequest {
    #[serde(alias = "image_ids")]
    #[garde(length(min = 1, max = 500))]
    pub image_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SelectionRequest {
    #[serde(default, alias = "is_picked")]
    #[garde(skip)]
    pub is_picked: Option<bool>,

    #[serde(default)]
    #[garde(range(min = 0, max = 5))]
    pub rating: Option<i16>,
}

impl From<SelectionRequest> for SelectionPatch {
    fn from(req: SelectionRequest) -> Self {
        SelectionPatch {
            is_picked: req.is_picked,
            rating: req.rating,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequest {
    #[serde(alias = "reason_code")]
    #[garde(skip)]
    pub reason_code: RejectionReasonCode,

    #[serde(default, alias = "reason_text")]
    #[garde(length(max = 1000))]
    pub reason_text: Option<String>,
}

impl RejectRequest {
    pub fn into_rejection(self) -> Rejection {
        Rejection::from_request(self.reason_code, self.reason_text)
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BatchRejectRequest {
    #[serde(alias = "image_ids")]
    #[garde(length(min = 1, max = 500))]
    pub image_ids: Vec<Uuid>,

    #[serde(alias = "reason_code")]
    #[garde(skip)]
    pub reason_code: RejectionReasonCode,

    #[serde(default, alias = "reason_text")]
    #[garde(length(max = 1000))]
    pub reason_text: Option<String>,
}

/// Compute worker report for one job item. The worker speaks snake_case
/// on its batch endpoint, so both spellings are accepted here.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ItemCallbackRequest {
    #[garde(skip)]
    pub status: ItemStatus,

    #[serde(default, alias = "error_message")]
    #[garde(length(max = 2000))]
    pub error_message: Option<String>,

    #[serde(default, alias = "processing_time_ms")]
    #[garde(range(min = 0))]
    pub processing_time_ms: Option<i32>,
}

impl From<ItemCallbackRequest> for ItemUpdate {
    fn from(req: ItemCallbackRequest) -> Self {
        ItemUpdate {
            status: req.status,
            error_message: req.error_message,
            processing_time_ms: req.processing_time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_job_type_defaults_to_full_scan() {
        let req = AnalyzeRequest::default();
        assert_eq!(req.profile().unwrap(), JobProfile::FullScan);
    }

    #[test]
    fn test_unknown_job_type_is_rejected() {
        let req = AnalyzeRequest {
            job_type: Some("DEEP_DREAM".into()),
        };
        assert!(matches!(req.profile(), Err(JobError::InvalidJobType(t)) if t == "DEEP_DREAM"));
    }

    #[test]
    fn test_rating_out_of_range_fails_validation() {
        let req: SelectionRequest = serde_json::from_str(r#"{"rating": 6}"#).unwrap();
        assert!(req.validate().is_err());

        let req: SelectionRequest = serde_json::from_str(r#"{"rating": 5}"#).unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_batch_reject_needs_ids() {
        let req: BatchRejectRequest =
            serde_json::from_str(r#"{"imageIds": [], "reasonCode": "BLURRY"}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_callback_body_parses_worker_statuses() {
        let req: ItemCallbackRequest = serde_json::from_str(
            r#"{"status": "failed", "error_message": "decode error", "processing_time_ms": 31}"#,
        )
        .unwrap();
        assert!(req.validate().is_ok());
        let update = ItemUpdate::from(req);
        assert_eq!(update.status, ItemStatus::Failed);
        assert_eq!(update.processing_time_ms, Some(31));
    }

    #[test]
    fn test_analyze_body_reads_job_type_in_both_spellings() {
        let req: AnalyzeRequest = serde_json::from_str(r#"{"jobType": "SCORING_ONLY"}"#).unwrap();
        assert_eq!(req.profile().unwrap(), JobProfile::ScoringOnly);

        let req: AnalyzeRequest =
            serde_json::from_str(r#"{"job_type": "object_detection"}"#).unwrap();
        assert_eq!(req.profile().unwrap(), JobProfile::ObjectDetectionOnly);

        let req: AnalyzeRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.profile().unwrap(), JobProfile::FullScan);
    }

    #[test]
    fn test_analyze_body_rejects_unknown_fields() {
        let parsed = serde_json::from_str::<AnalyzeRequest>(r#"{"type": "SCORING_ONLY"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_selection_body_is_camel_case() {
        let req: SelectionRequest =
            serde_json::from_str(r#"{"isPicked": true, "rating": 2}"#).unwrap();
        let patch = SelectionPatch::from(req);
        assert_eq!(patch.is_picked, Some(true));
        assert_eq!(patch.rating, Some(2));

        assert!(serde_json::from_str::<SelectionRequest>(r#"{"picked": true}"#).is_err());
    }
}
