use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{classify_sqlx_error, PersistenceError};

use super::models::{Webhook, WebhookRow};

/// Fields accepted when creating or replacing a Session's Webhook
/// Subscription — at most one per Session.
#[derive(Debug, Clone)]
pub struct WebhookUpsert {
    pub url: String,
    pub events: Vec<String>,
    pub raw_mode: bool,
    pub active: bool,
}

/// The `webhooks` table is the single
/// source of truth for a session's subscription; `Upsert` enforces the
/// at-most-one-per-session invariant via `session_id UNIQUE`.
#[async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn get_by_session_id(&self, session_id: Uuid) -> Result<Webhook, PersistenceError>;

    async fn upsert(&self, session_id: Uuid, fields: WebhookUpsert) -> Result<Webhook, PersistenceError>;

    async fn delete(&self, session_id: Uuid) -> Result<(), PersistenceError>;

    async fn exists(&self, session_id: Uuid) -> Result<bool, PersistenceError>;
}

pub struct SqliteWebhookRepository {
    pool: SqlitePool,
}

impl SqliteWebhookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookRepository for SqliteWebhookRepository {
    async fn get_by_session_id(&self, session_id: Uuid) -> Result<Webhook, PersistenceError> {
        let row: Option<WebhookRow> = sqlx::query_as("SELECT * FROM webhooks WHERE session_id = ?1")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;

        row.map(WebhookRow::into_webhook)
            .ok_or_else(|| PersistenceError::NotFound(session_id.to_string()))
    }

    async fn upsert(&self, session_id: Uuid, fields: WebhookUpsert) -> Result<Webhook, PersistenceError> {
        let now = Utc::now().to_rfc3339();
        let events = serde_json::to_string(&fields.events).unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            "INSERT INTO webhooks (id, session_id, url, events, raw_mode, active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(session_id) DO UPDATE SET
                url = excluded.url,
                events = excluded.events,
                raw_mode = excluded.raw_mode,
                active = excluded.active,
                updated_at = excluded.updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(session_id.to_string())
        .bind(&fields.url)
        .bind(&events)
        .bind(fields.raw_mode as i64)
        .bind(fields.active as i64)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        self.get_by_session_id(session_id).await
    }

    async fn delete(&self, session_id: Uuid) -> Result<(), PersistenceError> {
        let result = sqlx::query("DELETE FROM webhooks WHERE session_id = ?1")
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(session_id.to_string()));
        }
        Ok(())
    }

    async fn exists(&self, session_id: Uuid) -> Result<bool, PersistenceError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webhooks WHERE session_id = ?1")
            .bind(session_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;

    async fn setup() -> (SqliteWebhookRepository, Uuid) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();

        let session_id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO sessions (id, name, api_key, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
        )
        .bind(session_id.to_string())
        .bind("webhook-owner")
        .bind("k".repeat(32))
        .bind(&now)
        .execute(&pool)
        .await
        .unwrap();

        (SqliteWebhookRepository::new(pool), session_id)
    }

    fn fields(url: &str) -> WebhookUpsert {
        WebhookUpsert {
            url: url.to_string(),
            events: vec!["message".to_string(), "receipt".to_string()],
            raw_mode: false,
            active: true,
        }
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let (repo, session_id) = setup().await;
        let webhook = repo.upsert(session_id, fields("https://example.com/hook")).await.unwrap();
        assert_eq!(webhook.session_id, session_id);
        assert_eq!(webhook.url, "https://example.com/hook");

        let fetched = repo.get_by_session_id(session_id).await.unwrap();
        assert_eq!(fetched.id, webhook.id);
    }

    #[tokio::test]
    async fn second_upsert_replaces_not_duplicates() {
        let (repo, session_id) = setup().await;
        let first = repo.upsert(session_id, fields("https://example.com/one")).await.unwrap();
        let second = repo.upsert(session_id, fields("https://example.com/two")).await.unwrap();

        assert_eq!(first.id, second.id, "upsert must reuse the same row, not insert a second");
        assert_eq!(second.url, "https://example.com/two");
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let (repo, session_id) = setup().await;
        repo.upsert(session_id, fields("https://example.com/hook")).await.unwrap();
        repo.delete(session_id).await.unwrap();

        let err = repo.get_by_session_id(session_id).await.unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound(_)));
    }
}
