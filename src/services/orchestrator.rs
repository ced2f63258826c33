//! Control flow tying the store, expander, dispatcher and aggregator together.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db::repository::{JobStore, ProjectCatalog};
use crate::error::{JobError, JobResult};
use crate::models::job::{
    AnalysisJob, ItemUpdate, ItemUpdateOutcome, JobItem, JobProfile, JobStatus, JobTransition,
    JobType, NewJob,
};
use crate::services::aggregator::{derive_status, JobProgress, JobStatusReport};
use crate::services::dispatcher::{BatchDispatcher, DispatchReceipt};
use crate::services::expander;

/// Compare-and-set attempts before a status read settles for what it saw.
const MAX_STATUS_ATTEMPTS: usize = 3;

/// Returned by [`JobOrchestrator::submit`] once the job and its items exist.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmission {
    pub job_id: Uuid,
    pub project_id: Uuid,
    pub job_type: JobType,
    pub profile: JobProfile,
    pub status: JobStatus,
    pub total_items: usize,
    pub dispatch: DispatchReceipt,
}

/// Result of a compute worker callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCallbackOutcome {
    pub applied: bool,
    pub item: JobItem,
}

#[derive(Clone)]
pub struct JobOrchestrator {
    jobs: Arc<dyn JobStore>,
    catalog: Arc<dyn ProjectCatalog>,
    dispatcher: BatchDispatcher,
    stale_after: Option<Duration>,
}

impl JobOrchestrator {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        catalog: Arc<dyn ProjectCatalog>,
        dispatcher: BatchDispatcher,
    ) -> Self {
        Self {
            jobs,
            catalog,
            dispatcher,
            stale_after: None,
        }
    }

    /// Fail unfinished jobs that have shown no activity for `stale_after`.
    pub fn with_stale_after(mut self, stale_after: Option<Duration>) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn dispatcher(&self) -> &BatchDispatcher {
        &self.dispatcher
    }

    pub async fn health_check(&self) -> JobResult<()> {
        self.jobs.health_check().await
    }

    async fn authorize_project(&self, user_id: Uuid, project_id: Uuid) -> JobResult<()> {
        match self.catalog.project_owner(project_id).await? {
            None => Err(JobError::not_found("project", project_id)),
            Some(owner) if owner == user_id => Ok(()),
            Some(_) => {
                tracing::warn!(user_id = %user_id, project_id = %project_id, "Project access denied");
                Err(JobError::NotAuthorized)
            }
        }
    }

    async fn owned_job(&self, user_id: Uuid, job_id: Uuid) -> JobResult<AnalysisJob> {
        let job = self
            .jobs
            .get_job(job_id)
            .await?
            .ok_or(JobError::not_found("job", job_id))?;
        if job.user_id != user_id {
            tracing::warn!(user_id = %user_id, job_id = %job_id, "Job access denied");
            return Err(JobError::NotAuthorized);
        }
        Ok(job)
    }

    /// Create a job for `project_id`, expand it into items and hand them to
    /// the dispatcher. Returns as soon as the rows exist; compute worker
    /// availability never affects the result.
    pub async fn submit(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        profile: JobProfile,
        uploaded: &[Uuid],
    ) -> JobResult<JobSubmission> {
        self.authorize_project(user_id, project_id).await?;
        if profile == JobProfile::Upload && uploaded.is_empty() {
            return Err(JobError::Validation(
                "upload analysis needs at least one image id".into(),
            ));
        }

        let images =
            expander::select_images(self.catalog.as_ref(), project_id, profile, uploaded).await?;
        let new_items = expander::expand(profile, &images);

        let mut job = self
            .jobs
            .create_job(NewJob {
                project_id,
                user_id,
                profile,
            })
            .await?;
        metrics::counter!("analysis_jobs_submitted_total", "profile" => profile.to_string())
            .increment(1);

        tracing::info!(
            job_id = %job.id,
            project_id = %project_id,
            profile = %profile,
            images = images.len(),
            items = new_items.len(),
            "Analysis job created"
        );

        if new_items.is_empty() {
            let now = Utc::now();
            let transition = JobTransition {
                started_at: Some(now),
                completed_at: Some(now),
                ..JobTransition::to(JobStatus::Completed)
            };
            if self
                .jobs
                .advance_job_status(job.id, JobStatus::Pending, &transition)
                .await?
            {
                record_transition(&job, &transition);
                job.apply(&transition, now);
            }
            tracing::info!(job_id = %job.id, "No matching images, job completed without dispatch");
            return Ok(submission(&job, 0, DispatchReceipt::default()));
        }

        let items = match self.jobs.create_items(job.id, &new_items).await {
            Ok(items) => items,
            Err(e) => {
                self.fail_job(&job, &e).await;
                return Err(e);
            }
        };
        metrics::counter!("analysis_job_items_created_total").increment(items.len() as u64);

        let receipt = self.dispatcher.dispatch(job.id, &items);
        if receipt.batches_dropped > 0 {
            tracing::warn!(
                job_id = %job.id,
                dropped = receipt.batches_dropped,
                "Job accepted with undispatched items"
            );
        }

        Ok(submission(&job, items.len(), receipt))
    }

    /// Best effort: a job whose items could not all be written is marked
    /// failed so it never reports completion over a partial item set.
    async fn fail_job(&self, job: &AnalysisJob, cause: &JobError) {
        let transition = JobTransition {
            error_message: Some(cause.to_string()),
            completed_at: Some(Utc::now()),
            ..JobTransition::to(JobStatus::Failed)
        };
        match self
            .jobs
            .advance_job_status(job.id, job.status, &transition)
            .await
        {
            Ok(true) => record_transition(job, &transition),
            Ok(false) => {}
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to mark job as failed");
            }
        }
    }

    /// Status of the caller's newest job on a project.
    pub async fn latest_status(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> JobResult<JobStatusReport> {
        self.authorize_project(user_id, project_id).await?;
        let job = self
            .jobs
            .latest_job_for_project(project_id, user_id)
            .await?
            .ok_or(JobError::not_found("job for project", project_id))?;
        self.refresh(job).await
    }

    pub async fn status_by_id(&self, user_id: Uuid, job_id: Uuid) -> JobResult<JobStatusReport> {
        let job = self.owned_job(user_id, job_id).await?;
        self.refresh(job).await
    }

    /// Derive status from items and persist the forward transition, if any.
    /// A lost compare-and-set means someone else moved the job; re-read and
    /// derive again.
    async fn refresh(&self, mut job: AnalysisJob) -> JobResult<JobStatusReport> {
        let mut progress = JobProgress::default();

        for _ in 0..MAX_STATUS_ATTEMPTS {
            let items = self.jobs.items_for_job(job.id).await?;
            let now = Utc::now();
            let derived = derive_status(&job, &items, now, self.stale_after);
            progress = derived.progress;

            let Some(transition) = derived.transition else {
                return Ok(JobStatusReport::new(&job, &progress));
            };

            if self
                .jobs
                .advance_job_status(job.id, job.status, &transition)
                .await?
            {
                record_transition(&job, &transition);
                job.apply(&transition, now);
                return Ok(JobStatusReport::new(&job, &progress));
            }

            tracing::debug!(job_id = %job.id, "Job status changed underneath, re-reading");
            job = self
                .jobs
                .get_job(job.id)
                .await?
                .ok_or(JobError::not_found("job", job.id))?;
        }

        Ok(JobStatusReport::new(&job, &progress))
    }

    /// Owner-initiated cancellation. Items already handed to the compute
    /// worker are not recalled.
    pub async fn cancel(&self, user_id: Uuid, job_id: Uuid) -> JobResult<JobStatusReport> {
        let mut job = self.owned_job(user_id, job_id).await?;

        for _ in 0..MAX_STATUS_ATTEMPTS {
            if job.status.is_terminal() {
                return Err(JobError::InvalidTransition {
                    from: job.status,
                    to: JobStatus::Cancelled,
                });
            }

            let now = Utc::now();
            let transition = JobTransition {
                completed_at: Some(now),
                ..JobTransition::to(JobStatus::Cancelled)
            };
            if self
                .jobs
                .advance_job_status(job.id, job.status, &transition)
                .await?
            {
                record_transition(&job, &transition);
                job.apply(&transition, now);
                let items = self.jobs.items_for_job(job.id).await?;
                return Ok(JobStatusReport::new(&job, &JobProgress::from_items(&items)));
            }

            job = self.owned_job(user_id, job_id).await?;
        }

        Err(JobError::InvalidTransition {
            from: job.status,
            to: JobStatus::Cancelled,
        })
    }

    /// Delete a job and every item it owns.
    pub async fn delete(&self, user_id: Uuid, job_id: Uuid) -> JobResult<()> {
        let job = self.owned_job(user_id, job_id).await?;
        if !self.jobs.delete_job(job.id).await? {
            return Err(JobError::not_found("job", job_id));
        }
        tracing::info!(job_id = %job_id, project_id = %job.project_id, "Analysis job deleted");
        Ok(())
    }

    /// Compute worker callback for one item.
    pub async fn record_item_outcome(
        &self,
        item_id: Uuid,
        update: ItemUpdate,
    ) -> JobResult<ItemCallbackOutcome> {
        let outcome = self
            .jobs
            .record_item_outcome(item_id, &update)
            .await?
            .ok_or(JobError::not_found("job item", item_id))?;

        Ok(match outcome {
            ItemUpdateOutcome::Applied(item) => {
                tracing::debug!(
                    item_id = %item_id,
                    job_id = %item.job_id,
                    status = %item.status,
                    retry_count = item.retry_count,
                    "Item outcome recorded"
                );
                ItemCallbackOutcome {
                    applied: true,
                    item,
                }
            }
            ItemUpdateOutcome::AlreadyTerminal(item) => {
                tracing::info!(
                    item_id = %item_id,
                    status = %item.status,
                    reported = %update.status,
                    "Ignoring update for finished item"
                );
                ItemCallbackOutcome {
                    applied: false,
                    item,
                }
            }
        })
    }
}

fn submission(job: &AnalysisJob, total_items: usize, dispatch: DispatchReceipt) -> JobSubmission {
    JobSubmission {
        job_id: job.id,
        project_id: job.project_id,
        job_type: job.job_type,
        profile: job.profile,
        status: job.status,
        total_items,
        dispatch,
    }
}

fn record_transition(job: &AnalysisJob, transition: &JobTransition) {
    metrics::counter!("job_status_transitions_total", "to" => transition.to.to_string())
        .increment(1);
    tracing::info!(
        job_id = %job.id,
        from = %job.status,
        to = %transition.to,
        "Job status advanced"
    );
}
