use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};
use uuid::Uuid;

use super::{decode_enum, PgStore};
use crate::db::repository::JobStore;
use crate::error::{JobError, JobResult};
use crate::models::job::{
    AnalysisJob, ItemUpdate, ItemUpdateOutcome, JobItem, JobStatus, JobTransition, NewJob,
    NewJobItem,
};

const JOB_COLUMNS: &str = "id, project_id, user_id, job_type, profile, job_status, error_message, \
     started_at, completed_at, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, job_id, image_id, task_name, item_status, error_message, \
     processing_time_ms, retry_count, started_at, completed_at, created_at";

fn job_from_row(row: &PgRow) -> Result<AnalysisJob, sqlx::Error> {
    let job_type: String = row.try_get("job_type")?;
    let profile: String = row.try_get("profile")?;
    let status: String = row.try_get("job_status")?;

    Ok(AnalysisJob {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        user_id: row.try_get("user_id")?,
        job_type: decode_enum(&job_type)?,
        profile: decode_enum(&profile)?,
        status: decode_enum(&status)?,
        error_message: row.try_get("error_message")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<JobItem, sqlx::Error> {
    let task: String = row.try_get("task_name")?;
    let status: String = row.try_get("item_status")?;

    Ok(JobItem {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        image_id: row.try_get("image_id")?,
        task: decode_enum(&task)?,
        status: decode_enum(&status)?,
        error_message: row.try_get("error_message")?,
        processing_time_ms: row.try_get("processing_time_ms")?,
        retry_count: row.try_get("retry_count")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        created_at: row.try_get("created_at")?,
    })
}

impl PgStore {
    /// Insert one chunk of items inside its own transaction.
    async fn insert_item_chunk(
        &self,
        job_id: Uuid,
        chunk: &[NewJobItem],
    ) -> Result<Vec<JobItem>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO analysis_job_items (job_id, image_id, task_name) ");
        builder.push_values(chunk, |mut row, item| {
            row.push_bind(job_id)
                .push_bind(item.image_id)
                .push_bind(item.task.as_ref());
        });
        builder.push(" RETURNING ");
        builder.push(ITEM_COLUMNS);

        let rows = builder.build().fetch_all(&mut *tx).await?;
        tx.commit().await?;

        rows.iter().map(item_from_row).collect()
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn create_job(&self, new_job: NewJob) -> JobResult<AnalysisJob> {
        let sql = format!(
            "INSERT INTO analysis_jobs (project_id, user_id, job_type, profile, job_status) \
             VALUES ($1, $2, $3, $4, 'pending') RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(new_job.project_id)
            .bind(new_job.user_id)
            .bind(new_job.profile.job_type().as_ref())
            .bind(new_job.profile.as_ref())
            .fetch_one(&self.pool)
            .await?;

        Ok(job_from_row(&row)?)
    }

    async fn create_items(&self, job_id: Uuid, items: &[NewJobItem]) -> JobResult<Vec<JobItem>> {
        let expected = items.len();
        let mut inserted = Vec::with_capacity(expected);

        for (index, chunk) in items.chunks(self.item_chunk_size).enumerate() {
            match self.insert_item_chunk(job_id, chunk).await {
                Ok(rows) if rows.len() == chunk.len() => inserted.extend(rows),
                Ok(rows) => {
                    tracing::error!(
                        job_id = %job_id,
                        chunk = index,
                        chunk_len = chunk.len(),
                        returned = rows.len(),
                        "Item chunk returned fewer rows than submitted"
                    );
                    inserted.extend(rows);
                    return Err(JobError::ShortInsert {
                        expected,
                        inserted: inserted.len(),
                    });
                }
                Err(e) => {
                    tracing::error!(
                        job_id = %job_id,
                        chunk = index,
                        error = %e,
                        "Item chunk insert failed"
                    );
                    return Err(JobError::ShortInsert {
                        expected,
                        inserted: inserted.len(),
                    });
                }
            }
        }

        Ok(inserted)
    }

    async fn get_job(&self, job_id: Uuid) -> JobResult<Option<AnalysisJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM analysis_jobs WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(job_from_row).transpose()?)
    }

    async fn latest_job_for_project(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> JobResult<Option<AnalysisJob>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM analysis_jobs \
             WHERE project_id = $1 AND user_id = $2 \
             ORDER BY created_at DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(project_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(job_from_row).transpose()?)
    }

    async fn items_for_job(&self, job_id: Uuid) -> JobResult<Vec<JobItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM analysis_job_items WHERE job_id = $1 ORDER BY created_at, id"
        );
        let rows = sqlx::query(&sql)
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(item_from_row).collect::<Result<_, _>>()?)
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

        let result = sqlx::query(
            r#"
            UPDATE analysis_jobs
            SET job_status = $3,
                started_at = COALESCE(started_at, $4),
                completed_at = COALESCE($5, completed_at),
                error_message = COALESCE($6, error_message),
                updated_at = NOW()
            WHERE id = $1 AND job_status = $2
            "#,
        )
        .bind(job_id)
        .bind(expected.as_ref())
        .bind(transition.to.as_ref())
        .bind(transition.started_at)
        .bind(transition.completed_at)
        .bind(transition.error_message.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_item(&self, item_id: Uuid) -> JobResult<Option<JobItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM analysis_job_items WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(item_from_row).transpose()?)
    }

    async fn record_item_outcome(
        &self,
        item_id: Uuid,
        update: &ItemUpdate,
    ) -> JobResult<Option<ItemUpdateOutcome>> {
        let sql = format!(
            r#"
            UPDATE analysis_job_items
            SET retry_count = retry_count
                    + CASE WHEN $2 = 'pending' AND item_status = 'processing' THEN 1 ELSE 0 END,
                started_at = CASE WHEN $2 <> 'pending' THEN COALESCE(started_at, NOW()) ELSE started_at END,
                completed_at = CASE WHEN $2 IN ('completed', 'failed', 'skipped') THEN NOW() ELSE completed_at END,
                error_message = COALESCE($3, error_message),
                processing_time_ms = COALESCE($4, processing_time_ms),
                item_status = $2
            WHERE id = $1 AND item_status NOT IN ('completed', 'failed', 'skipped')
            RETURNING {ITEM_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(item_id)
            .bind(update.status.as_ref())
            .bind(update.error_message.as_deref())
            .bind(update.processing_time_ms)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            return Ok(Some(ItemUpdateOutcome::Applied(item_from_row(&row)?)));
        }

        // Either missing or already terminal.
        Ok(self
            .get_item(item_id)
            .await?
            .map(ItemUpdateOutcome::AlreadyTerminal))
    }

    async fn delete_job(&self, job_id: Uuid) -> JobResult<bool> {
        // Items go with the job via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM analysis_jobs WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> JobResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
