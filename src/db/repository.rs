//! Storage seams for the orchestration core.
//!
//! Postgres implementations live in [`crate::db::jobs`], [`crate::db::catalog`]
//! and [`crate::db::selections`]; [`crate::db::memory`] provides an in-process
//! backend that performs ownership sweeps explicitly.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::JobResult;
use crate::models::job::{
    AnalysisJob, ItemUpdate, ItemUpdateOutcome, JobItem, JobStatus, JobTransition, NewJob,
    NewJobItem,
};
use crate::models::selection::{Rejection, RejectionRecord, SelectionPatch, SelectionRecord};

/// Default number of item rows written per insert statement.
pub const DEFAULT_ITEM_CHUNK_SIZE: usize = 100;

/// An image as seen by the orchestration core.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRef {
    pub id: Uuid,
    pub project_id: Uuid,
    pub thumbnail_path: Option<String>,
}

/// Durable record of jobs and their items. No business rules beyond the
/// forward-only and terminal-item guards.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, new_job: NewJob) -> JobResult<AnalysisJob>;

    /// Bulk insert, chunked so no statement carries more than the store's
    /// chunk size. Each chunk commits on its own; a failing chunk surfaces as
    /// [`crate::error::JobError::ShortInsert`].
    async fn create_items(&self, job_id: Uuid, items: &[NewJobItem]) -> JobResult<Vec<JobItem>>;

    async fn get_job(&self, job_id: Uuid) -> JobResult<Option<AnalysisJob>>;

    async fn latest_job_for_project(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> JobResult<Option<AnalysisJob>>;

    async fn items_for_job(&self, job_id: Uuid) -> JobResult<Vec<JobItem>>;

    /// Compare-and-set: applies only while the job is still in `expected`.
    async fn advance_job_status(
        &self,
        job_id: Uuid,
        expected: JobStatus,
        transition: &JobTransition,
    ) -> JobResult<bool>;

    async fn get_item(&self, item_id: Uuid) -> JobResult<Option<JobItem>>;

    /// Worker callback write path. `None` if the item does not exist.
    async fn record_item_outcome(
        &self,
        item_id: Uuid,
        update: &ItemUpdate,
    ) -> JobResult<Option<ItemUpdateOutcome>>;

    /// Delete a job together with every item it owns.
    async fn delete_job(&self, job_id: Uuid) -> JobResult<bool>;

    async fn health_check(&self) -> JobResult<()>;
}

/// Project/image collaborator: ownership and image listings.
#[async_trait]
pub trait ProjectCatalog: Send + Sync {
    async fn project_owner(&self, project_id: Uuid) -> JobResult<Option<Uuid>>;

    async fn list_images(&self, project_id: Uuid) -> JobResult<Vec<ImageRef>>;

    async fn list_images_missing_thumbnail(&self, project_id: Uuid) -> JobResult<Vec<ImageRef>>;

    /// Subset of `image_ids` the user owns directly or through the project.
    async fn authorized_images(&self, user_id: Uuid, image_ids: &[Uuid]) -> JobResult<Vec<Uuid>>;
}

/// Per-(image, user) selection state plus rejection history.
#[async_trait]
pub trait SelectionStore: Send + Sync {
    /// Atomic insert-or-merge keyed on (image, user).
    async fn upsert_selection(
        &self,
        image_id: Uuid,
        user_id: Uuid,
        patch: &SelectionPatch,
    ) -> JobResult<SelectionRecord>;

    /// Append a reason row and set `is_rejected` in one transaction.
    async fn reject(
        &self,
        image_id: Uuid,
        user_id: Uuid,
        rejection: &Rejection,
    ) -> JobResult<SelectionRecord>;

    /// Bulk form of [`SelectionStore::reject`]: all-or-nothing for `image_ids`.
    async fn reject_many(
        &self,
        image_ids: &[Uuid],
        user_id: Uuid,
        rejection: &Rejection,
    ) -> JobResult<()>;

    async fn get_selection(
        &self,
        image_id: Uuid,
        user_id: Uuid,
    ) -> JobResult<Option<SelectionRecord>>;

    async fn rejection_history(
        &self,
        image_id: Uuid,
        user_id: Uuid,
    ) -> JobResult<Vec<RejectionRecord>>;
}
