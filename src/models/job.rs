use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Kind of analysis recorded on a job row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobType {
    QualityAnalysis,
    ObjectDetection,
    SimilarityGrouping,
    BestShotRecommendation,
    ExifAnalysis,
    ImageCaptioning,
    GpsGrouping,
    ThumbnailGeneration,
}

/// Aggregate status of an analysis job.
///
/// Moves forward only: `pending -> processing -> completed | failed | cancelled`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        match self {
            JobStatus::Pending | JobStatus::Processing => false,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => true,
        }
    }

    /// Whether `self -> next` is a forward transition.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        match self {
            JobStatus::Pending => next != JobStatus::Pending,
            JobStatus::Processing => next.is_terminal(),
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => false,
        }
    }
}

/// Status of a single (image, task) item, written by the compute worker.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        match self {
            ItemStatus::Pending | ItemStatus::Processing => false,
            ItemStatus::Completed | ItemStatus::Failed | ItemStatus::Skipped => true,
        }
    }
}

/// Task names understood by the compute worker's task registry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnalysisTask {
    QualityAssessment,
    ObjectDetection,
    ImageCaptioning,
    ExifAnalysis,
    SimilarityGrouping,
    GpsGrouping,
    ThumbnailGeneration,
}

const FULL_SCAN_TASKS: &[AnalysisTask] = &[
    AnalysisTask::QualityAssessment,
    AnalysisTask::ObjectDetection,
    AnalysisTask::ImageCaptioning,
    AnalysisTask::ExifAnalysis,
    AnalysisTask::SimilarityGrouping,
    AnalysisTask::GpsGrouping,
];

/// Which images of a project a profile targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSelection {
    AllImages,
    MissingThumbnail,
    Uploaded,
}

/// Request-level job kind. Decides the stored job type, the task set and
/// which images get items.
///
/// Parsing is case-insensitive and also accepts the plain job type names.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum JobProfile {
    #[serde(rename = "FULL_SCAN")]
    #[strum(to_string = "FULL_SCAN")]
    FullScan,
    #[serde(rename = "OBJECT_DETECTION_ONLY")]
    #[strum(to_string = "OBJECT_DETECTION_ONLY", serialize = "object_detection")]
    ObjectDetectionOnly,
    #[serde(rename = "SCORING_ONLY")]
    #[strum(to_string = "SCORING_ONLY", serialize = "quality_analysis")]
    ScoringOnly,
    #[serde(rename = "UPLOAD")]
    #[strum(to_string = "UPLOAD")]
    Upload,
    #[serde(rename = "THUMBNAIL_REPAIR")]
    #[strum(to_string = "THUMBNAIL_REPAIR", serialize = "thumbnail_generation")]
    ThumbnailRepair,
    #[serde(rename = "IMAGE_CAPTIONING")]
    #[strum(to_string = "IMAGE_CAPTIONING")]
    ImageCaptioning,
    #[serde(rename = "EXIF_ANALYSIS")]
    #[strum(to_string = "EXIF_ANALYSIS")]
    ExifAnalysis,
    #[serde(rename = "SIMILARITY_GROUPING")]
    #[strum(to_string = "SIMILARITY_GROUPING")]
    SimilarityGrouping,
    #[serde(rename = "GPS_GROUPING")]
    #[strum(to_string = "GPS_GROUPING")]
    GpsGrouping,
    #[serde(rename = "BEST_SHOT_RECOMMENDATION")]
    #[strum(to_string = "BEST_SHOT_RECOMMENDATION")]
    BestShotRecommendation,
}

impl JobProfile {
    pub fn job_type(self) -> JobType {
        match self {
            JobProfile::FullScan | JobProfile::ScoringOnly => JobType::QualityAnalysis,
            JobProfile::ObjectDetectionOnly => JobType::ObjectDetection,
            JobProfile::Upload | JobProfile::ExifAnalysis => JobType::ExifAnalysis,
            JobProfile::ThumbnailRepair => JobType::ThumbnailGeneration,
            JobProfile::ImageCaptioning => JobType::ImageCaptioning,
            JobProfile::SimilarityGrouping => JobType::SimilarityGrouping,
            JobProfile::GpsGrouping => JobType::GpsGrouping,
            JobProfile::BestShotRecommendation => JobType::BestShotRecommendation,
        }
    }

    pub fn tasks(self) -> &'static [AnalysisTask] {
        match self {
            JobProfile::FullScan => FULL_SCAN_TASKS,
            JobProfile::ObjectDetectionOnly => &[AnalysisTask::ObjectDetection],
            JobProfile::ScoringOnly => &[AnalysisTask::QualityAssessment],
            JobProfile::Upload => &[AnalysisTask::ThumbnailGeneration, AnalysisTask::ExifAnalysis],
            JobProfile::ThumbnailRepair => &[AnalysisTask::ThumbnailGeneration],
            JobProfile::ImageCaptioning => &[AnalysisTask::ImageCaptioning],
            JobProfile::ExifAnalysis => &[AnalysisTask::ExifAnalysis],
            JobProfile::SimilarityGrouping => &[AnalysisTask::SimilarityGrouping],
            JobProfile::GpsGrouping => &[AnalysisTask::GpsGrouping],
            JobProfile::BestShotRecommendation => &[
                AnalysisTask::QualityAssessment,
                AnalysisTask::SimilarityGrouping,
            ],
        }
    }

    pub fn selection(self) -> ImageSelection {
        match self {
            JobProfile::Upload => ImageSelection::Uploaded,
            JobProfile::ThumbnailRepair => ImageSelection::MissingThumbnail,
            JobProfile::FullScan
            | JobProfile::ObjectDetectionOnly
            | JobProfile::ScoringOnly
            | JobProfile::ImageCaptioning
            | JobProfile::ExifAnalysis
            | JobProfile::SimilarityGrouping
            | JobProfile::GpsGrouping
            | JobProfile::BestShotRecommendation => ImageSelection::AllImages,
        }
    }
}

/// An analysis job over one project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJob {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub job_type: JobType,
    pub profile: JobProfile,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisJob {
    /// Apply a transition in memory, mirroring the store's conditional update.
    pub fn apply(&mut self, transition: &JobTransition, now: DateTime<Utc>) {
        self.status = transition.to;
        if transition.started_at.is_some() {
            self.started_at = self.started_at.or(transition.started_at);
        }
        if transition.completed_at.is_some() {
            self.completed_at = transition.completed_at;
        }
        if transition.error_message.is_some() {
            self.error_message = transition.error_message.clone();
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub profile: JobProfile,
}

/// A forward status change plus the timestamps/message it stamps.
#[derive(Debug, Clone, PartialEq)]
pub struct JobTransition {
    pub to: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl JobTransition {
    pub fn to(status: JobStatus) -> Self {
        Self {
            to: status,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }
}

/// One unit of analysis work: a single task on a single image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobItem {
    pub id: Uuid,
    pub job_id: Uuid,
    pub image_id: Uuid,
    pub task: AnalysisTask,
    pub status: ItemStatus,
    pub error_message: Option<String>,
    pub processing_time_ms: Option<i32>,
    pub retry_count: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl JobItem {
    /// Apply a worker-reported update. Returns `false` (and leaves the item
    /// untouched) when the item is already terminal.
    pub fn apply_update(&mut self, update: &ItemUpdate, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        if update.status == ItemStatus::Pending && self.status == ItemStatus::Processing {
            self.retry_count += 1;
        }
        if update.status != ItemStatus::Pending && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if update.status.is_terminal() {
            self.completed_at = Some(now);
        }
        if update.error_message.is_some() {
            self.error_message = update.error_message.clone();
        }
        if update.processing_time_ms.is_some() {
            self.processing_time_ms = update.processing_time_ms;
        }
        self.status = update.status;
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewJobItem {
    pub image_id: Uuid,
    pub task: AnalysisTask,
}

/// Outcome reported by the compute worker for one item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemUpdate {
    pub status: ItemStatus,
    pub error_message: Option<String>,
    pub processing_time_ms: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemUpdateOutcome {
    Applied(JobItem),
    AlreadyTerminal(JobItem),
}
