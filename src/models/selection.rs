use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Current pick/reject/rating state of one image for one user.
///
/// At most one record exists per (image, user).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRecord {
    pub id: Uuid,
    pub image_id: Uuid,
    pub user_id: Uuid,
    pub is_picked: bool,
    pub is_rejected: bool,
    pub rating: Option<i16>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by a selection action. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionPatch {
    pub is_picked: Option<bool>,
    pub rating: Option<i16>,
}

impl SelectionPatch {
    pub fn is_empty(&self) -> bool {
        self.is_picked.is_none() && self.rating.is_none()
    }
}

/// Stored rejection reason codes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RejectionCode {
    OutOfFocus,
    PoorExposure,
    PoorComposition,
    Duplicate,
    UnwantedSubject,
    Other,
}

/// Reason codes accepted from clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReasonCode {
    Blurry,
    BadComposition,
    ClosedEyes,
    Duplicate,
    PoorExposure,
    UnwantedSubject,
    Other,
}

/// A normalized rejection ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub code: RejectionCode,
    pub text: Option<String>,
}

impl Rejection {
    /// Map a client reason onto the stored vocabulary. Closed eyes has no
    /// stored code of its own and is folded into `other` with a text prefix.
    pub fn from_request(code: RejectionReasonCode, text: Option<String>) -> Self {
        let text = text.filter(|t| !t.trim().is_empty());
        match code {
            RejectionReasonCode::Blurry => Self {
                code: RejectionCode::OutOfFocus,
                text,
            },
            RejectionReasonCode::BadComposition => Self {
                code: RejectionCode::PoorComposition,
                text,
            },
            RejectionReasonCode::Duplicate => Self {
                code: RejectionCode::Duplicate,
                text,
            },
            RejectionReasonCode::PoorExposure => Self {
                code: RejectionCode::PoorExposure,
                text,
            },
            RejectionReasonCode::UnwantedSubject => Self {
                code: RejectionCode::UnwantedSubject,
                text,
            },
            RejectionReasonCode::Other => Self {
                code: RejectionCode::Other,
                text,
            },
            RejectionReasonCode::ClosedEyes => Self {
                code: RejectionCode::Other,
                text: Some(match text {
                    Some(t) => format!("Closed eyes: {t}"),
                    None => "Closed eyes".to_string(),
                }),
            },
        }
    }
}

/// Append-only rejection history entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RejectionRecord {
    pub id: Uuid,
    pub image_id: Uuid,
    pub user_id: Uuid,
    pub reason_code: RejectionCode,
    pub reason_text: Option<String>,
    pub rejected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchFailureReason {
    Unauthorized,
    InternalError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub image_id: Uuid,
    pub error: BatchFailureReason,
}

/// Result of a bulk rejection. Every requested id lands in exactly one list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRejectOutcome {
    pub succeeded: Vec<Uuid>,
    pub failed: Vec<BatchFailure>,
}

impl BatchRejectOutcome {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}
