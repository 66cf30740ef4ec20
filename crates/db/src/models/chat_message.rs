use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Type, Serialize, Deserialize, PartialEq, TS, EnumString, Display)]
#[sqlx(type_name = "message_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageType {
    User,
    Ai,
    System,
    Processing,
    Success,
    Error,
    ImageReady,
}

/// Reconciliation state against the remote transcript mirror.
///
/// `Pending` rows have not been offered to the mirror yet, `Unsynced` rows
/// were refused at least once. Neither state hides the message locally.
#[derive(Debug, Clone, Type, Serialize, Deserialize, PartialEq, TS, EnumString, Display, Default)]
#[sqlx(type_name = "sync_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    Unsynced,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ChatMessage {
    pub id: Uuid,
    pub product_id: Uuid,
    pub message_type: MessageType,
    pub content: String,
    pub metadata: Option<String>,
    pub sync_status: SyncStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateChatMessage {
    pub product_id: Uuid,
    pub message_type: MessageType,
    pub content: String,
    pub metadata: Option<String>,
}

const MESSAGE_COLUMNS: &str =
    "id, product_id, message_type, content, metadata, sync_status, created_at";

impl ChatMessage {
    pub fn parsed_metadata(&self) -> Option<serde_json::Value> {
        self.metadata
            .as_ref()
            .and_then(|json| serde_json::from_str(json).ok())
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateChatMessage,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ChatMessage>(&format!(
            r#"INSERT INTO chat_messages (id, product_id, message_type, content, metadata)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING {MESSAGE_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(data.product_id)
        .bind(&data.message_type)
        .bind(&data.content)
        .bind(&data.metadata)
        .fetch_one(pool)
        .await
    }

    /// Full transcript for a product in insertion order.
    pub async fn find_by_product_id(
        pool: &SqlitePool,
        product_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ChatMessage>(&format!(
            r#"SELECT {MESSAGE_COLUMNS}
               FROM chat_messages
               WHERE product_id = $1
               ORDER BY created_at ASC, rowid ASC"#
        ))
        .bind(product_id)
        .fetch_all(pool)
        .await
    }

    /// The last `limit` messages, returned oldest-first.
    pub async fn recent_tail(
        pool: &SqlitePool,
        product_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut messages = sqlx::query_as::<_, ChatMessage>(&format!(
            r#"SELECT {MESSAGE_COLUMNS}
               FROM chat_messages
               WHERE product_id = $1
               ORDER BY created_at DESC, rowid DESC
               LIMIT $2"#
        ))
        .bind(product_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        messages.reverse();
        Ok(messages)
    }

    pub async fn count_for_product(
        pool: &SqlitePool,
        product_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM chat_messages WHERE product_id = $1")
                .bind(product_id)
                .fetch_one(pool)
                .await?;
        Ok(count)
    }

    pub async fn set_sync_status(
        pool: &SqlitePool,
        id: Uuid,
        sync_status: SyncStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE chat_messages SET sync_status = $2 WHERE id = $1")
            .bind(id)
            .bind(sync_status)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Rows still owed to the remote mirror, oldest first so replay
    /// preserves transcript order.
    pub async fn find_unreconciled(
        pool: &SqlitePool,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ChatMessage>(&format!(
            r#"SELECT {MESSAGE_COLUMNS}
               FROM chat_messages
               WHERE sync_status IN ('pending', 'unsynced')
               ORDER BY created_at ASC, rowid ASC
               LIMIT $1"#
        ))
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
