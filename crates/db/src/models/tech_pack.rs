use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, Hash, TS, EnumString, Display,
)]
#[sqlx(type_name = "tech_pack_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TechPackKind {
    BaseViews,
    CloseUps,
    Sketches,
    Components,
}

/// A generated set of factory-spec images for one tech pack section.
/// The newest row per (product, kind) is the live asset set.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct TechPackAsset {
    pub id: Uuid,
    pub product_id: Uuid,
    pub kind: TechPackKind,
    pub image_urls: String,
    pub created_at: DateTime<Utc>,
}

impl TechPackAsset {
    pub fn urls(&self) -> Vec<String> {
        serde_json::from_str(&self.image_urls).unwrap_or_default()
    }

    pub async fn create(
        pool: &SqlitePool,
        product_id: Uuid,
        kind: TechPackKind,
        urls: &[String],
    ) -> Result<Self, sqlx::Error> {
        let json = serde_json::to_string(urls).map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
        sqlx::query_as::<_, TechPackAsset>(
            r#"INSERT INTO tech_pack_assets (id, product_id, kind, image_urls)
               VALUES ($1, $2, $3, $4)
               RETURNING id, product_id, kind, image_urls, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(product_id)
        .bind(kind)
        .bind(json)
        .fetch_one(pool)
        .await
    }

    pub async fn find_latest_by_kind(
        pool: &SqlitePool,
        product_id: Uuid,
        kind: TechPackKind,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TechPackAsset>(
            r#"SELECT id, product_id, kind, image_urls, created_at
               FROM tech_pack_assets
               WHERE product_id = $1 AND kind = $2
               ORDER BY created_at DESC, rowid DESC
               LIMIT 1"#,
        )
        .bind(product_id)
        .bind(kind)
        .fetch_optional(pool)
        .await
    }

    /// Latest asset set per kind for a product.
    pub async fn find_latest_all(
        pool: &SqlitePool,
        product_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TechPackAsset>(
            r#"SELECT id, product_id, kind, image_urls, created_at
               FROM tech_pack_assets
               WHERE product_id = $1
                 AND rowid IN (
                   SELECT MAX(rowid) FROM tech_pack_assets
                   WHERE product_id = $1
                   GROUP BY kind
                 )
               ORDER BY kind ASC"#,
        )
        .bind(product_id)
        .fetch_all(pool)
        .await
    }

    pub async fn has_base_views(pool: &SqlitePool, product_id: Uuid) -> Result<bool, sqlx::Error> {
        Ok(Self::find_latest_by_kind(pool, product_id, TechPackKind::BaseViews)
            .await?
            .is_some())
    }
}
