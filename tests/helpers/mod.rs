//! Test harness: in-memory app wiring, request helpers and a store wrapper
//! that can inject failures, race status writes and count writes.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use photo_analysis_jobs::app_state::AppState;
use photo_analysis_jobs::db::memory::MemoryStore;
use photo_analysis_jobs::db::repository::{ImageRef, JobStore, ProjectCatalog, SelectionStore};
use photo_analysis_jobs::error::{JobError, JobResult};
use photo_analysis_jobs::models::job::{
    AnalysisJob, ItemUpdate, ItemUpdateOutcome, JobItem, JobStatus, JobTransition, NewJob,
    NewJobItem,
};
use photo_analysis_jobs::models::selection::{
    Rejection, RejectionRecord, SelectionPatch, SelectionRecord,
};
use photo_analysis_jobs::routes::{self, auth::AuthConfig};
use photo_analysis_jobs::services::dispatcher::{BatchDispatcher, DispatchBatch};
use photo_analysis_jobs::services::orchestrator::JobOrchestrator;
use photo_analysis_jobs::services::recorder::OutcomeRecorder;

pub const JWT_SECRET: &str = "test-jwt-secret-0123456789";
pub const WORKER_TOKEN: &str = "test-worker-token-0123456789";

/// Wraps [`MemoryStore`], counting status writes and optionally failing
/// item inserts, image authorization lookups or bulk rejections.
pub struct SpyStore {
    pub inner: Arc<MemoryStore>,
    pub advance_calls: AtomicUsize,
    pub advance_applied: AtomicUsize,
    pub fail_item_insert: AtomicBool,
    pub fail_bulk_reject: AtomicBool,
    pub fail_authorization: AtomicBool,
    /// Applied straight to the inner store just before the next status
    /// write, as if another request got there first.
    competing_write: Mutex<Option<JobTransition>>,
}

impl SpyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            advance_calls: AtomicUsize::new(0),
            advance_applied: AtomicUsize::new(0),
            fail_item_insert: AtomicBool::new(false),
            fail_bulk_reject: AtomicBool::new(false),
            fail_authorization: AtomicBool::new(false),
            competing_write: Mutex::new(None),
        }
    }

    pub fn advance_calls(&self) -> usize {
        self.advance_calls.load(Ordering::SeqCst)
    }

    /// Status writes that actually moved a job.
    pub fn advance_applied(&self) -> usize {
        self.advance_applied.load(Ordering::SeqCst)
    }

    pub fn race_next_status_write(&self, transition: JobTransition) {
        *self.competing_write.lock().expect("competing write lock") = Some(transition);
    }
}

#[async_trait]
impl JobStore for SpyStore {
    async fn create_job(&self, new_job: NewJob) -> JobResult<AnalysisJob> {
        self.inner.create_job(new_job).await
    }

    async fn create_items(&self, job_id: Uuid, items: &[NewJobItem]) -> JobResult<Vec<JobItem>> {
        if self.fail_item_insert.load(Ordering::SeqCst) {
            // One item lands before the failure.
            let first = items.len().min(1);
            self.inner.create_items(job_id, &items[..first]).await?;
            return Err(JobError::ShortInsert {
                expected: items.len(),
                inserted: first,
            });
        }
        self.inner.create_items(job_id, items).await
    }

    async fn get_job(&self, job_id: Uuid) -> JobResult<Option<AnalysisJob>> {
        self.inner.get_job(job_id).await
    }

    async fn latest_job_for_project(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> JobResult<Option<AnalysisJob>> {
        self.inner.latest_job_for_project(project_id, user_id).await
    }

    async fn items_for_job(&self, job_id: Uuid) -> JobResult<Vec<JobItem>> {
        self.inner.items_for_job(job_id).await
    }

    async fn advance_job_status(
        &self,
        job_id: Uuid,
        expected: JobStatus,
        transition: &JobTransition,
    ) -> JobResult<bool> {
        self.advance_calls.fetch_add(1, Ordering::SeqCst);

        let competing = self
            .competing_write
            .lock()
            .expect("competing write lock")
            .take();
        if let Some(competing) = competing {
            if let Some(current) = self.inner.get_job(job_id).await? {
                self.inner
                    .advance_job_status(job_id, current.status, &competing)
                    .await?;
            }
        }

        let applied = self
            .inner
            .advance_job_status(job_id, expected, transition)
            .await?;
        if applied {
            self.advance_applied.fetch_add(1, Ordering::SeqCst);
        }
        Ok(applied)
    }

    async fn get_item(&self, item_id: Uuid) -> JobResult<Option<JobItem>> {
        self.inner.get_item(item_id).await
    }

    async fn record_item_outcome(
        &self,
        item_id: Uuid,
        update: &ItemUpdate,
    ) -> JobResult<Option<ItemUpdateOutcome>> {
        self.inner.record_item_outcome(item_id, update).await
    }

    async fn delete_job(&self, job_id: Uuid) -> JobResult<bool> {
        self.inner.delete_job(job_id).await
    }

    async fn health_check(&self) -> JobResult<()> {
        self.inner.health_check().await
    }
}

#[async_trait]
impl ProjectCatalog for SpyStore {
    async fn project_owner(&self, project_id: Uuid) -> JobResult<Option<Uuid>> {
        self.inner.project_owner(project_id).await
    }

    async fn list_images(&self, project_id: Uuid) -> JobResult<Vec<ImageRef>> {
        self.inner.list_images(project_id).await
    }

    async fn list_images_missing_thumbnail(&self, project_id: Uuid) -> JobResult<Vec<ImageRef>> {
        self.inner.list_images_missing_thumbnail(project_id).await
    }

    async fn authorized_images(&self, user_id: Uuid, image_ids: &[Uuid]) -> JobResult<Vec<Uuid>> {
        if self.fail_authorization.load(Ordering::SeqCst) {
            return Err(JobError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.authorized_images(user_id, image_ids).await
    }
}

#[async_trait]
impl SelectionStore for SpyStore {
    async fn upsert_selection(
        &self,
        image_id: Uuid,
        user_id: Uuid,
        patch: &SelectionPatch,
    ) -> JobResult<SelectionRecord> {
        self.inner.upsert_selection(image_id, user_id, patch).await
    }

    async fn reject(
        &self,
        image_id: Uuid,
        user_id: Uuid,
        rejection: &Rejection,
    ) -> JobResult<SelectionRecord> {
        self.inner.reject(image_id, user_id, rejection).await
    }

    async fn reject_many(
        &self,
        image_ids: &[Uuid],
        user_id: Uuid,
        rejection: &Rejection,
    ) -> JobResult<()> {
        if self.fail_bulk_reject.load(Ordering::SeqCst) {
            return Err(JobError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.reject_many(image_ids, user_id, rejection).await
    }

    async fn get_selection(
        &self,
        image_id: Uuid,
        user_id: Uuid,
    ) -> JobResult<Option<SelectionRecord>> {
        self.inner.get_selection(image_id, user_id).await
    }

    async fn rejection_history(
        &self,
        image_id: Uuid,
        user_id: Uuid,
    ) -> JobResult<Vec<RejectionRecord>> {
        self.inner.rejection_history(image_id, user_id).await
    }
}

/// Everything a test needs, wired over the in-memory backend.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub spy: Arc<SpyStore>,
    pub orchestrator: JobOrchestrator,
    pub recorder: OutcomeRecorder,
    pub dispatch_rx: mpsc::Receiver<DispatchBatch>,
    pub auth: AuthConfig,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_dispatch(64, 500)
    }

    pub fn with_dispatch(capacity: usize, chunk_size: usize) -> Self {
        let store = Arc::new(MemoryStore::default());
        let spy = Arc::new(SpyStore::new(store.clone()));
        let (dispatcher, dispatch_rx) = BatchDispatcher::channel(capacity, chunk_size);
        let orchestrator = JobOrchestrator::new(spy.clone(), store.clone(), dispatcher);
        let recorder = OutcomeRecorder::new(spy.clone(), spy.clone());

        Self {
            store,
            spy,
            orchestrator,
            recorder,
            dispatch_rx,
            auth: AuthConfig::new(JWT_SECRET, WORKER_TOKEN),
        }
    }

    pub fn router(&self) -> Router {
        routes::router(AppState::new(
            self.orchestrator.clone(),
            self.recorder.clone(),
            self.auth.clone(),
        ))
    }

    pub fn token(&self, user_id: Uuid) -> String {
        self.auth
            .issue_token(user_id, chrono::Duration::minutes(10))
            .expect("token")
    }

    /// Batches queued for the compute worker so far.
    pub fn drain_batches(&mut self) -> Vec<DispatchBatch> {
        let mut batches = Vec::new();
        while let Ok(batch) = self.dispatch_rx.try_recv() {
            batches.push(batch);
        }
        batches
    }
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).expect("json body")))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub fn worker_request(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::PATCH)
        .uri(uri)
        .header("x-worker-token", token)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).expect("json body")))
        .expect("request")
}

/// Run a request through the router and decode the JSON body (Null when
/// empty or not JSON).
pub async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.expect("router response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("response body")
        .to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}
