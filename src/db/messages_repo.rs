use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{classify_sqlx_error, PersistenceError};

use super::models::{Direction, Message, MessageRow, MessageStatus, MessageType, Pagination};

/// Fields accepted when persisting a Message derived from a `message` event.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub protocol_message_id: String,
    pub session_id: Uuid,
    pub chat_jid: String,
    pub from_jid: String,
    pub to_jid: Option<String>,
    pub message_type: MessageType,
    pub content: Option<String>,
    pub raw_message: serde_json::Value,
    pub direction: Direction,
    pub status: MessageStatus,
    pub is_from_me: bool,
    pub is_ephemeral: bool,
    pub timestamp: DateTime<Utc>,
}

/// Media-only filter for `GET /sessions/:id/media`.
#[derive(Debug, Clone, Default)]
pub struct MediaFilter {
    pub chat_jid: Option<String>,
}

/// `raw_message` is stored and returned verbatim — this layer never
/// reinterprets it.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, new: NewMessage) -> Result<Message, PersistenceError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Message, PersistenceError>;

    async fn list_by_session_and_chat(
        &self,
        session_id: Uuid,
        chat_jid: &str,
        pagination: Pagination,
    ) -> Result<Vec<Message>, PersistenceError>;

    /// Best-effort status update from a `receipt` event. Returns `Ok(false)`
    /// (not an error) when no row matches — receipts for messages the
    /// gateway never saw are dropped with a log, not surfaced as a failure.
    async fn update_status(
        &self,
        session_id: Uuid,
        protocol_message_id: &str,
        status: MessageStatus,
    ) -> Result<bool, PersistenceError>;

    async fn get_session_media_messages(
        &self,
        session_id: Uuid,
        filter: MediaFilter,
        pagination: Pagination,
    ) -> Result<Vec<Message>, PersistenceError>;

    /// Out of scope: the gateway
    /// has no MinIO references to clear. Kept as an interface seam so a
    /// future media-storage module has somewhere to plug in; always a no-op
    /// today.
    async fn clear_minio_references(&self, _path_prefix: &str) -> Result<u64, PersistenceError> {
        Ok(0)
    }
}

pub struct SqliteMessageRepository {
    pool: SqlitePool,
}

impl SqliteMessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const MEDIA_TYPES: &[&str] = &["image", "audio", "video", "document", "sticker"];

#[async_trait]
impl MessageRepository for SqliteMessageRepository {
    async fn create(&self, new: NewMessage) -> Result<Message, PersistenceError> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO messages
                (id, protocol_message_id, session_id, chat_jid, from_jid, to_jid, message_type,
                 content, raw_message, direction, status, is_from_me, is_ephemeral, timestamp,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
        )
        .bind(id.to_string())
        .bind(&new.protocol_message_id)
        .bind(new.session_id.to_string())
        .bind(&new.chat_jid)
        .bind(&new.from_jid)
        .bind(&new.to_jid)
        .bind(new.message_type.as_str())
        .bind(&new.content)
        .bind(new.raw_message.to_string())
        .bind(new.direction.as_str())
        .bind(new.status.as_str())
        .bind(new.is_from_me as i64)
        .bind(new.is_ephemeral as i64)
        .bind(new.timestamp.to_rfc3339())
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Message, PersistenceError> {
        let row: Option<MessageRow> = sqlx::query_as("SELECT * FROM messages WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;

        row.map(MessageRow::into_message)
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))
    }

    async fn list_by_session_and_chat(
        &self,
        session_id: Uuid,
        chat_jid: &str,
        pagination: Pagination,
    ) -> Result<Vec<Message>, PersistenceError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT * FROM messages WHERE session_id = ?1 AND chat_jid = ?2
             ORDER BY timestamp DESC LIMIT ?3 OFFSET ?4",
        )
        .bind(session_id.to_string())
        .bind(chat_jid)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        Ok(rows.into_iter().map(MessageRow::into_message).collect())
    }

    async fn update_status(
        &self,
        session_id: Uuid,
        protocol_message_id: &str,
        status: MessageStatus,
    ) -> Result<bool, PersistenceError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE messages SET status = ?1, updated_at = ?2
             WHERE session_id = ?3 AND protocol_message_id = ?4",
        )
        .bind(status.as_str())
        .bind(&now)
        .bind(session_id.to_string())
        .bind(protocol_message_id)
        .execute(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_session_media_messages(
        &self,
        session_id: Uuid,
        filter: MediaFilter,
        pagination: Pagination,
    ) -> Result<Vec<Message>, PersistenceError> {
        let placeholders: Vec<&str> = MEDIA_TYPES.to_vec();
        let in_clause = placeholders
            .iter()
            .map(|t| format!("'{t}'"))
            .collect::<Vec<_>>()
            .join(",");

        let sql = format!(
            "SELECT * FROM messages
             WHERE session_id = ?1 AND message_type IN ({in_clause})
             AND (?2 IS NULL OR chat_jid = ?2)
             ORDER BY timestamp DESC LIMIT ?3 OFFSET ?4"
        );

        let rows: Vec<MessageRow> = sqlx::query_as(&sql)
            .bind(session_id.to_string())
            .bind(filter.chat_jid)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;

        Ok(rows.into_iter().map(MessageRow::into_message).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;

    async fn setup() -> (SqliteMessageRepository, Uuid) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();

        let session_id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO sessions (id, name, api_key, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
        )
        .bind(session_id.to_string())
        .bind("message-owner")
        .bind("k".repeat(32))
        .bind(&now)
        .execute(&pool)
        .await
        .unwrap();

        (SqliteMessageRepository::new(pool), session_id)
    }

    fn new_message(session_id: Uuid, protocol_message_id: &str, message_type: MessageType) -> NewMessage {
        NewMessage {
            protocol_message_id: protocol_message_id.to_string(),
            session_id,
            chat_jid: "123@s.whatsapp.net".to_string(),
            from_jid: "123@s.whatsapp.net".to_string(),
            to_jid: None,
            message_type,
            content: Some("hello".to_string()),
            raw_message: serde_json::json!({"raw": "payload", "nested": {"a": 1}}),
            direction: Direction::Incoming,
            status: MessageStatus::Received,
            is_from_me: false,
            is_ephemeral: false,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_then_get_preserves_raw_message_byte_for_byte() {
        let (repo, session_id) = setup().await;
        let new = new_message(session_id, "proto-1", MessageType::Text);
        let expected_raw = new.raw_message.clone();
        let created = repo.create(new).await.unwrap();

        let fetched = repo.get_by_id(created.id).await.unwrap();
        assert_eq!(fetched.raw_message, expected_raw);
    }

    #[tokio::test]
    async fn update_status_on_missing_row_returns_false_not_error() {
        let (repo, session_id) = setup().await;
        let updated = repo
            .update_status(session_id, "never-seen", MessageStatus::Delivered)
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn update_status_on_existing_row_returns_true() {
        let (repo, session_id) = setup().await;
        repo.create(new_message(session_id, "proto-2", MessageType::Text)).await.unwrap();

        let updated = repo
            .update_status(session_id, "proto-2", MessageStatus::Delivered)
            .await
            .unwrap();
        assert!(updated);
    }

    #[tokio::test]
    async fn media_messages_excludes_text() {
        let (repo, session_id) = setup().await;
        repo.create(new_message(session_id, "text-1", MessageType::Text)).await.unwrap();
        repo.create(new_message(session_id, "image-1", MessageType::Image)).await.unwrap();

        let media = repo
            .get_session_media_messages(session_id, MediaFilter::default(), Pagination::default())
            .await
            .unwrap();

        assert_eq!(media.len(), 1);
        assert_eq!(media[0].message_type, MessageType::Image);
    }

    #[tokio::test]
    async fn clear_minio_references_is_a_documented_noop() {
        let (repo, _session_id) = setup().await;
        let cleared = repo.clear_minio_references("any/prefix").await.unwrap();
        assert_eq!(cleared, 0);
    }
}
