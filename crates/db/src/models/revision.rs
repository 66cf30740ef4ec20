use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// An immutable five-view snapshot of a product design.
///
/// Revisions are written whole or not at all; after creation only the
/// `is_active` flag and `deleted_at` ever change. At most one revision per
/// product is active at a time.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Revision {
    pub id: Uuid,
    pub product_id: Uuid,
    pub revision_number: i64,
    pub front_view_url: String,
    pub back_view_url: String,
    pub side_view_url: String,
    pub top_view_url: String,
    pub bottom_view_url: String,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// The complete view set a revision is assembled from.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct RevisionViews {
    pub front: String,
    pub back: String,
    pub side: String,
    pub top: String,
    pub bottom: String,
}

impl RevisionViews {
    /// True when every view URL is present and non-empty.
    pub fn is_complete(&self) -> bool {
        [&self.front, &self.back, &self.side, &self.top, &self.bottom]
            .iter()
            .all(|url| !url.trim().is_empty())
    }
}

const REVISION_COLUMNS: &str = "id, product_id, revision_number, front_view_url, back_view_url, \
     side_view_url, top_view_url, bottom_view_url, is_active, deleted_at, created_at";

impl Revision {
    /// Persist a complete view set as the product's new active revision.
    ///
    /// The previous active revision is deactivated in the same transaction,
    /// so readers never observe zero or two active revisions for a product
    /// that has any.
    pub async fn create_and_activate(
        pool: &SqlitePool,
        product_id: Uuid,
        views: &RevisionViews,
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("UPDATE revisions SET is_active = 0 WHERE product_id = $1 AND is_active = 1")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;

        let (next_number,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(revision_number), 0) + 1 FROM revisions WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await?;

        let revision = sqlx::query_as::<_, Revision>(&format!(
            r#"INSERT INTO revisions
                 (id, product_id, revision_number, front_view_url, back_view_url,
                  side_view_url, top_view_url, bottom_view_url, is_active)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1)
               RETURNING {REVISION_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(product_id)
        .bind(next_number)
        .bind(&views.front)
        .bind(&views.back)
        .bind(&views.side)
        .bind(&views.top)
        .bind(&views.bottom)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(revision)
    }

    pub async fn find_active(
        pool: &SqlitePool,
        product_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Revision>(&format!(
            r#"SELECT {REVISION_COLUMNS}
               FROM revisions
               WHERE product_id = $1 AND is_active = 1 AND deleted_at IS NULL"#
        ))
        .bind(product_id)
        .fetch_optional(pool)
        .await
    }

    /// Live (not soft-deleted) revisions, newest first.
    pub async fn find_live_by_product(
        pool: &SqlitePool,
        product_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Revision>(&format!(
            r#"SELECT {REVISION_COLUMNS}
               FROM revisions
               WHERE product_id = $1 AND deleted_at IS NULL
               ORDER BY revision_number DESC"#
        ))
        .bind(product_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_number(
        pool: &SqlitePool,
        product_id: Uuid,
        revision_number: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Revision>(&format!(
            r#"SELECT {REVISION_COLUMNS}
               FROM revisions
               WHERE product_id = $1 AND revision_number = $2 AND deleted_at IS NULL"#
        ))
        .bind(product_id)
        .bind(revision_number)
        .fetch_optional(pool)
        .await
    }

    pub async fn count_live(pool: &SqlitePool, product_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM revisions WHERE product_id = $1 AND deleted_at IS NULL",
        )
        .bind(product_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    /// Roll the product back to an earlier revision. The swap is one
    /// transaction; the target must exist and not be soft-deleted.
    pub async fn activate(
        pool: &SqlitePool,
        product_id: Uuid,
        revision_number: i64,
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("UPDATE revisions SET is_active = 0 WHERE product_id = $1 AND is_active = 1")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;

        let revision = sqlx::query_as::<_, Revision>(&format!(
            r#"UPDATE revisions
               SET is_active = 1
               WHERE product_id = $1 AND revision_number = $2 AND deleted_at IS NULL
               RETURNING {REVISION_COLUMNS}"#
        ))
        .bind(product_id)
        .bind(revision_number)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;

        tx.commit().await?;
        Ok(revision)
    }

    /// Soft-delete a revision. Deleting the active revision promotes the
    /// newest surviving revision (if any) inside the same transaction.
    pub async fn soft_delete(
        pool: &SqlitePool,
        product_id: Uuid,
        revision_number: i64,
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        let result = sqlx::query(
            r#"UPDATE revisions
               SET deleted_at = datetime('now', 'subsec'), is_active = 0
               WHERE product_id = $1 AND revision_number = $2 AND deleted_at IS NULL"#,
        )
        .bind(product_id)
        .bind(revision_number)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        if Self::active_count_tx(&mut tx, product_id).await? == 0 {
            sqlx::query(
                r#"UPDATE revisions
                   SET is_active = 1
                   WHERE id = (
                     SELECT id FROM revisions
                     WHERE product_id = $1 AND deleted_at IS NULL
                     ORDER BY revision_number DESC
                     LIMIT 1
                   )"#,
            )
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn active_count_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        product_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM revisions
             WHERE product_id = $1 AND is_active = 1 AND deleted_at IS NULL",
        )
        .bind(product_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(count)
    }
}
