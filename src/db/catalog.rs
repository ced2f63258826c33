use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use super::PgStore;
use crate::db::repository::{ImageRef, ProjectCatalog};
use crate::error::JobResult;

fn image_from_row(row: &sqlx::postgres::PgRow) -> Result<ImageRef, sqlx::Error> {
    Ok(ImageRef {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        thumbnail_path: row.try_get("thumbnail_path")?,
    })
}

#[async_trait]
impl ProjectCatalog for PgStore {
    async fn project_owner(&self, project_id: Uuid) -> JobResult<Option<Uuid>> {
        let row = sqlx::query("SELECT user_id FROM projects WHERE id = $1")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.try_get::<Uuid, _>("user_id")).transpose()?)
    }

    async fn list_images(&self, project_id: Uuid) -> JobResult<Vec<ImageRef>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, thumbnail_path
            FROM images
            WHERE project_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(image_from_row).collect::<Result<_, _>>()?)
    }

    async fn list_images_missing_thumbnail(&self, project_id: Uuid) -> JobResult<Vec<ImageRef>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, thumbnail_path
            FROM images
            WHERE project_id = $1
              AND (thumbnail_path IS NULL OR thumbnail_path = '')
            ORDER BY created_at, id
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(image_from_row).collect::<Result<_, _>>()?)
    }

    async fn authorized_images(&self, user_id: Uuid, image_ids: &[Uuid]) -> JobResult<Vec<Uuid>> {
        if image_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT i.id
            FROM images i
            LEFT JOIN projects p ON p.id = i.project_id
            WHERE i.id = ANY($1)
              AND (i.user_id = $2 OR p.user_id = $2)
            "#,
        )
        .bind(image_ids)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| r.try_get::<Uuid, _>("id"))
            .collect::<Result<_, sqlx::Error>>()?)
    }
}
