//! In-process backend.
//!
//! Without foreign keys, job ownership is explicit here: deleting a job sweeps
//! its items, deleting a project sweeps its images, jobs, items and the
//! selection state attached to those images.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::repository::{
    ImageRef, JobStore, ProjectCatalog, SelectionStore, DEFAULT_ITEM_CHUNK_SIZE,
};
use crate::error::{JobError, JobResult};
use crate::models::job::{
    AnalysisJob, ItemStatus, ItemUpdate, ItemUpdateOutcome, JobItem, JobStatus, JobTransition,
    NewJob, NewJobItem,
};
use crate::models::selection::{Rejection, RejectionRecord, SelectionPatch, SelectionRecord};

#[derive(Debug, Clone)]
struct StoredImage {
    image: ImageRef,
    owner: Option<Uuid>,
}

#[derive(Default)]
struct State {
    projects: HashMap<Uuid, Uuid>,
    images: Vec<StoredImage>,
    jobs: Vec<AnalysisJob>,
    items: Vec<JobItem>,
    selections: HashMap<(Uuid, Uuid), SelectionRecord>,
    rejections: Vec<RejectionRecord>,
}

impl State {
    fn sweep_job(&mut self, job_id: Uuid) -> bool {
        let before = self.jobs.len();
        self.jobs.retain(|j| j.id != job_id);
        self.items.retain(|i| i.job_id != job_id);
        self.jobs.len() != before
    }

    fn mark_rejected(&mut self, image_id: Uuid, user_id: Uuid, rejection: &Rejection) {
        let now = Utc::now();
        self.rejections.push(RejectionRecord {
            id: Uuid::new_v4(),
            image_id,
            user_id,
            reason_code: rejection.code,
            reason_text: rejection.text.clone(),
            rejected_at: now,
        });

        let record = self
            .selections
            .entry((image_id, user_id))
            .or_insert_with(|| SelectionRecord {
                id: Uuid::new_v4(),
                image_id,
                user_id,
                is_picked: false,
                is_rejected: false,
                rating: None,
                created_at: now,
                updated_at: now,
            });
        record.is_rejected = true;
        record.updated_at = now;
    }
}

/// Memory-backed [`JobStore`], [`ProjectCatalog`] and [`SelectionStore`].
pub struct MemoryStore {
    state: Mutex<State>,
    item_chunk_size: usize,
    insert_statements: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_ITEM_CHUNK_SIZE)
    }
}

impl MemoryStore {
    pub fn new(item_chunk_size: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            item_chunk_size: item_chunk_size.max(1),
            insert_statements: AtomicUsize::new(0),
        }
    }

    /// Number of item insert statements issued so far.
    pub fn insert_statements(&self) -> usize {
        self.insert_statements.load(Ordering::SeqCst)
    }

    pub async fn insert_project(&self, project_id: Uuid, owner_id: Uuid) {
        self.state.lock().await.projects.insert(project_id, owner_id);
    }

    pub async fn insert_image(
        &self,
        image_id: Uuid,
        project_id: Uuid,
        owner: Option<Uuid>,
        thumbnail_path: Option<String>,
    ) {
        self.state.lock().await.images.push(StoredImage {
            image: ImageRef {
                id: image_id,
                project_id,
                thumbnail_path,
            },
            owner,
        });
    }

    /// Remove a project and everything that hangs off it.
    pub async fn delete_project(&self, project_id: Uuid) -> bool {
        let mut state = self.state.lock().await;
        if state.projects.remove(&project_id).is_none() {
            return false;
        }

        let job_ids: Vec<Uuid> = state
            .jobs
            .iter()
            .filter(|j| j.project_id == project_id)
            .map(|j| j.id)
            .collect();
        for job_id in job_ids {
            state.sweep_job(job_id);
        }

        let image_ids: Vec<Uuid> = state
            .images
            .iter()
            .filter(|i| i.image.project_id == project_id)
            .map(|i| i.image.id)
            .collect();
        state.images.retain(|i| i.image.project_id != project_id);
        state
            .selections
            .retain(|(image_id, _), _| !image_ids.contains(image_id));
        state
            .rejections
            .retain(|r| !image_ids.contains(&r.image_id));
        true
    }

    pub async fn item_count(&self) -> usize {
        self.state.lock().await.items.len()
    }

    pub async fn selection_count(&self) -> usize {
        self.state.lock().await.selections.len()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, new_job: NewJob) -> JobResult<AnalysisJob> {
        let now = Utc::now();
        let job = AnalysisJob {
            id: Uuid::new_v4(),
            project_id: new_job.project_id,
            user_id: new_job.user_id,
            job_type: new_job.profile.job_type(),
            profile: new_job.profile,
            status: JobStatus::Pending,
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.jobs.push(job.clone());
        Ok(job)
    }

    async fn create_items(&self, job_id: Uuid, items: &[NewJobItem]) -> JobResult<Vec<JobItem>> {
        let mut inserted = Vec::with_capacity(items.len());

        for chunk in items.chunks(self.item_chunk_size) {
            self.insert_statements.fetch_add(1, Ordering::SeqCst);
            let now = Utc::now();
            let rows: Vec<JobItem> = chunk
                .iter()
                .map(|item| JobItem {
                    id: Uuid::new_v4(),
                    job_id,
                    image_id: item.image_id,
                    task: item.task,
                    status: ItemStatus::Pending,
                    error_message: None,
                    processing_time_ms: None,
                    retry_count: 0,
                    started_at: None,
                    completed_at: None,
                    created_at: now,
                })
                .collect();

            let mut state = self.state.lock().await;
            if !state.jobs.iter().any(|j| j.id == job_id) {
                return Err(JobError::ShortInsert {
                    expected: items.len(),
                    inserted: inserted.len(),
                });
            }
            state.items.extend(rows.iter().cloned());
            inserted.extend(rows);
        }

        Ok(inserted)
    }

    async fn get_job(&self, job_id: Uuid) -> JobResult<Option<AnalysisJob>> {
        let state = self.state.lock().await;
        Ok(state.jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn latest_job_for_project(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> JobResult<Option<AnalysisJob>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .iter()
            .rev()
            .find(|j| j.project_id == project_id && j.user_id == user_id)
            .cloned())
    }

    async fn items_for_job(&self, job_id: Uuid) -> JobResult<Vec<JobItem>> {
        let state = self.state.lock().await;
        Ok(state
            .items
            .iter()
            .filter(|i| i.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn advance_job_status(
        &self,
        job_id: Uuid,
        expected: JobStatus,
        transition: &JobTransition,
    ) -> JobResult<bool> {
        if !expected.can_advance_to(transition.to) {
            return Err(JobError::InvalidTransition {
                from: expected,
                to: transition.to,
            });
        }

        let mut state = self.state.lock().await;
        match state
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.status == expected)
        {
            Some(job) => {
                job.apply(transition, Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_item(&self, item_id: Uuid) -> JobResult<Option<JobItem>> {
        let state = self.state.lock().await;
        Ok(state.items.iter().find(|i| i.id == item_id).cloned())
    }

    async fn record_item_outcome(
        &self,
        item_id: Uuid,
        update: &ItemUpdate,
    ) -> JobResult<Option<ItemUpdateOutcome>> {
        let mut state = self.state.lock().await;
        let Some(item) = state.items.iter_mut().find(|i| i.id == item_id) else {
            return Ok(None);
        };

        if item.apply_update(update, Utc::now()) {
            Ok(Some(ItemUpdateOutcome::Applied(item.clone())))
        } else {
            Ok(Some(ItemUpdateOutcome::AlreadyTerminal(item.clone())))
        }
    }

    async fn delete_job(&self, job_id: Uuid) -> JobResult<bool> {
        Ok(self.state.lock().await.sweep_job(job_id))
    }

    async fn health_check(&self) -> JobResult<()> {
        Ok(())
    }
}

#[async_trait]
impl ProjectCatalog for MemoryStore {
    async fn project_owner(&self, project_id: Uuid) -> JobResult<Option<Uuid>> {
        Ok(self.state.lock().await.projects.get(&project_id).copied())
    }

    async fn list_images(&self, project_id: Uuid) -> JobResult<Vec<ImageRef>> {
        let state = self.state.lock().await;
        Ok(state
            .images
            .iter()
            .filter(|i| i.image.project_id == project_id)
            .map(|i| i.image.clone())
            .collect())
    }

    async fn list_images_missing_thumbnail(&self, project_id: Uuid) -> JobResult<Vec<ImageRef>> {
        let state = self.state.lock().await;
        Ok(state
            .images
            .iter()
            .filter(|i| i.image.project_id == project_id)
            .filter(|i| {
                i.image
                    .thumbnail_path
                    .as_deref()
                    .map_or(true, |p| p.is_empty())
            })
            .map(|i| i.image.clone())
            .collect())
    }

    async fn authorized_images(&self, user_id: Uuid, image_ids: &[Uuid]) -> JobResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        Ok(state
            .images
            .iter()
            .filter(|i| image_ids.contains(&i.image.id))
            .filter(|i| {
                i.owner == Some(user_id)
                    || state.projects.get(&i.image.project_id) == Some(&user_id)
            })
            .map(|i| i.image.id)
            .collect())
    }
}

#[async_trait]
impl SelectionStore for MemoryStore {
    async fn upsert_selection(
        &self,
        image_id: Uuid,
        user_id: Uuid,
        patch: &SelectionPatch,
    ) -> JobResult<SelectionRecord> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let record = state
            .selections
            .entry((image_id, user_id))
            .or_insert_with(|| SelectionRecord {
                id: Uuid::new_v4(),
                image_id,
                user_id,
                is_picked: false,
                is_rejected: false,
                rating: None,
                created_at: now,
                updated_at: now,
            });

        if let Some(picked) = patch.is_picked {
            record.is_picked = picked;
        }
        if let Some(rating) = patch.rating {
            record.rating = Some(rating);
        }
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn reject(
        &self,
        image_id: Uuid,
        user_id: Uuid,
        rejection: &Rejection,
    ) -> JobResult<SelectionRecord> {
        let mut state = self.state.lock().await;
        state.mark_rejected(image_id, user_id, rejection);
        state
            .selections
            .get(&(image_id, user_id))
            .cloned()
            .ok_or(JobError::not_found("selection", image_id))
    }

    async fn reject_many(
        &self,
        image_ids: &[Uuid],
        user_id: Uuid,
        rejection: &Rejection,
    ) -> JobResult<()> {
        let mut state = self.state.lock().await;
        for &image_id in image_ids {
            state.mark_rejected(image_id, user_id, rejection);
        }
        Ok(())
    }

    async fn get_selection(
        &self,
        image_id: Uuid,
        user_id: Uuid,
    ) -> JobResult<Option<SelectionRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .selections
            .get(&(image_id, user_id))
            .cloned())
    }

    async fn rejection_history(
        &self,
        image_id: Uuid,
        user_id: Uuid,
    ) -> JobResult<Vec<RejectionRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .rejections
            .iter()
            .filter(|r| r.image_id == image_id && r.user_id == user_id)
            .cloned()
            .collect())
    }
}
