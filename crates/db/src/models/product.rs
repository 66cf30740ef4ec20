use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Product {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateProduct {
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

impl Product {
    /// Name plus description, the way generation prompts reference the product.
    pub fn to_prompt(&self) -> String {
        if let Some(description) = self.description.as_ref().filter(|d| !d.trim().is_empty()) {
            format!("{}\n\n{}", &self.name, description)
        } else {
            self.name.clone()
        }
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Product>(
            r#"SELECT id, owner_id, name, description, created_at, updated_at
               FROM products
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Product>(
            r#"SELECT id, owner_id, name, description, created_at, updated_at
               FROM products
               ORDER BY created_at DESC"#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateProduct,
        product_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Product>(
            r#"INSERT INTO products (id, owner_id, name, description)
               VALUES ($1, $2, $3, $4)
               RETURNING id, owner_id, name, description, created_at, updated_at"#,
        )
        .bind(product_id)
        .bind(data.owner_id)
        .bind(&data.name)
        .bind(&data.description)
        .fetch_one(pool)
        .await
    }

    pub async fn update_details(
        pool: &SqlitePool,
        id: Uuid,
        name: String,
        description: Option<String>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Product>(
            r#"UPDATE products
               SET name = $2, description = $3, updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING id, owner_id, name, description, created_at, updated_at"#,
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .fetch_one(pool)
        .await
    }
}
