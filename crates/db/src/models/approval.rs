use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Type, Serialize, Deserialize, PartialEq, TS, EnumString, Display, Default)]
#[sqlx(type_name = "approval_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// One iteration of front-view generation awaiting a decision.
///
/// Each (re)generation inserts a fresh row; prior rows for the product lose
/// their `awaiting` flag but stay in history. A row is terminal once
/// approved (it feeds revision creation) or rejected.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct FrontViewApproval {
    pub id: Uuid,
    pub product_id: Uuid,
    pub image_url: String,
    pub prompt: String,
    pub iteration_count: i64,
    pub status: ApprovalStatus,
    pub awaiting: bool,
    pub design_features: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const APPROVAL_COLUMNS: &str = "id, product_id, image_url, prompt, iteration_count, status, \
     awaiting, design_features, created_at, updated_at";

impl FrontViewApproval {
    /// AI-extracted design features, when the gateway returned any.
    pub fn parsed_design_features(&self) -> Option<serde_json::Value> {
        self.design_features
            .as_ref()
            .and_then(|json| serde_json::from_str(json).ok())
    }

    /// Insert a new pending approval, superseding every live approval for
    /// the product. `iteration_count` continues the product's chain.
    pub async fn create_superseding(
        pool: &SqlitePool,
        product_id: Uuid,
        image_url: &str,
        prompt: &str,
        design_features: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"UPDATE front_view_approvals
               SET awaiting = 0, updated_at = datetime('now', 'subsec')
               WHERE product_id = $1 AND awaiting = 1"#,
        )
        .bind(product_id)
        .execute(&mut *tx)
        .await?;

        let (next_iteration,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(iteration_count), 0) + 1
             FROM front_view_approvals WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await?;

        let approval = sqlx::query_as::<_, FrontViewApproval>(&format!(
            r#"INSERT INTO front_view_approvals
                 (id, product_id, image_url, prompt, iteration_count, design_features)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING {APPROVAL_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(product_id)
        .bind(image_url)
        .bind(prompt)
        .bind(next_iteration)
        .bind(design_features)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(approval)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, FrontViewApproval>(&format!(
            r#"SELECT {APPROVAL_COLUMNS}
               FROM front_view_approvals
               WHERE id = $1"#
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// The single live (awaiting, still pending) approval for a product.
    pub async fn find_live(
        pool: &SqlitePool,
        product_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, FrontViewApproval>(&format!(
            r#"SELECT {APPROVAL_COLUMNS}
               FROM front_view_approvals
               WHERE product_id = $1 AND awaiting = 1 AND status = 'pending'
               ORDER BY iteration_count DESC
               LIMIT 1"#
        ))
        .bind(product_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_product_id(
        pool: &SqlitePool,
        product_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, FrontViewApproval>(&format!(
            r#"SELECT {APPROVAL_COLUMNS}
               FROM front_view_approvals
               WHERE product_id = $1
               ORDER BY iteration_count ASC"#
        ))
        .bind(product_id)
        .fetch_all(pool)
        .await
    }

    pub async fn set_status(
        pool: &SqlitePool,
        id: Uuid,
        status: ApprovalStatus,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, FrontViewApproval>(&format!(
            r#"UPDATE front_view_approvals
               SET status = $2, awaiting = 0, updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING {APPROVAL_COLUMNS}"#
        ))
        .bind(id)
        .bind(status)
        .fetch_one(pool)
        .await
    }
}
