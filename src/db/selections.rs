use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use super::{decode_enum, PgStore};
use crate::db::repository::SelectionStore;
use crate::error::JobResult;
use crate::models::selection::{Rejection, RejectionRecord, SelectionPatch, SelectionRecord};

const SELECTION_COLUMNS: &str =
    "id, image_id, user_id, is_picked, is_rejected, rating, created_at, updated_at";

fn selection_from_row(row: &PgRow) -> Result<SelectionRecord, sqlx::Error> {
    Ok(SelectionRecord {
        id: row.try_get("id")?,
        image_id: row.try_get("image_id")?,
        user_id: row.try_get("user_id")?,
        is_picked: row.try_get("is_picked")?,
        is_rejected: row.try_get("is_rejected")?,
        rating: row.try_get("rating")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn rejection_from_row(row: &PgRow) -> Result<RejectionRecord, sqlx::Error> {
    let code: String = row.try_get("reason_code")?;
    Ok(RejectionRecord {
        id: row.try_get("id")?,
        image_id: row.try_get("image_id")?,
        user_id: row.try_get("user_id")?,
        reason_code: decode_enum(&code)?,
        reason_text: row.try_get("reason_text")?,
        rejected_at: row.try_get("rejected_at")?,
    })
}

/// Append rejection rows for every image, then flag each (image, user)
/// selection as rejected. Runs on the caller's transaction.
async fn insert_rejections(
    conn: &mut PgConnection,
    image_ids: &[Uuid],
    user_id: Uuid,
    rejection: &Rejection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO user_rejection_reasons (image_id, user_id, reason_code, reason_text)
        SELECT t.image_id, $2, $3, $4
        FROM UNNEST($1::uuid[]) AS t(image_id)
        "#,
    )
    .bind(image_ids)
    .bind(user_id)
    .bind(rejection.code.as_ref())
    .bind(rejection.text.as_deref())
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO image_selections (image_id, user_id, is_rejected)
        SELECT t.image_id, $2, TRUE
        FROM UNNEST($1::uuid[]) AS t(image_id)
        ON CONFLICT (image_id, user_id)
        DO UPDATE SET is_rejected = TRUE, updated_at = NOW()
        "#,
    )
    .bind(image_ids)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait]
impl SelectionStore for PgStore {
    async fn upsert_selection(
        &self,
        image_id: Uuid,
        user_id: Uuid,
        patch: &SelectionPatch,
    ) -> JobResult<SelectionRecord> {
        let sql = format!(
            r#"
            INSERT INTO image_selections (image_id, user_id, is_picked, rating)
            VALUES ($1, $2, COALESCE($3, FALSE), $4)
            ON CONFLICT (image_id, user_id) DO UPDATE
            SET is_picked = COALESCE($3, image_selections.is_picked),
                rating = COALESCE($4, image_selections.rating),
                updated_at = NOW()
            RETURNING {SELECTION_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(image_id)
            .bind(user_id)
            .bind(patch.is_picked)
            .bind(patch.rating)
            .fetch_one(&self.pool)
            .await?;

        Ok(selection_from_row(&row)?)
    }

    async fn reject(
        &self,
        image_id: Uuid,
        user_id: Uuid,
        rejection: &Rejection,
    ) -> JobResult<SelectionRecord> {
        let mut tx = self.pool.begin().await?;
        insert_rejections(&mut *tx, &[image_id], user_id, rejection).await?;

        let sql = format!(
            "SELECT {SELECTION_COLUMNS} FROM image_selections WHERE image_id = $1 AND user_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(image_id)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(selection_from_row(&row)?)
    }

    async fn reject_many(
        &self,
        image_ids: &[Uuid],
        user_id: Uuid,
        rejection: &Rejection,
    ) -> JobResult<()> {
        let mut tx = self.pool.begin().await?;
        insert_rejections(&mut *tx, image_ids, user_id, rejection).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_selection(
        &self,
        image_id: Uuid,
        user_id: Uuid,
    ) -> JobResult<Option<SelectionRecord>> {
        let sql = format!(
            "SELECT {SELECTION_COLUMNS} FROM image_selections WHERE image_id = $1 AND user_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(image_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(selection_from_row).transpose()?)
    }

    async fn rejection_history(
        &self,
        image_id: Uuid,
        user_id: Uuid,
    ) -> JobResult<Vec<RejectionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, image_id, user_id, reason_code, reason_text, rejected_at
            FROM user_rejection_reasons
            WHERE image_id = $1 AND user_id = $2
            ORDER BY rejected_at, id
            "#,
        )
        .bind(image_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(rejection_from_row).collect::<Result<_, _>>()?)
    }
}
