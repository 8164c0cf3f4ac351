use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{classify_sqlx_error, PersistenceError};

use super::models::{Pagination, ProxyConfig, Session, SessionFilter, SessionRow, SessionStatus};

/// Fields accepted when creating a Session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: Uuid,
    pub name: String,
    pub api_key: String,
    pub proxy: Option<ProxyConfig>,
    pub auto_reconnect: bool,
    pub metadata: serde_json::Value,
}

/// Partial update to a Session row.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub proxy: Option<Option<ProxyConfig>>,
    pub auto_reconnect: Option<bool>,
    pub metadata: Option<serde_json::Value>,
}

/// Single point of SQL for the Sessions table. Every method surfaces
/// uniqueness violations as
/// [`PersistenceError::Conflict`], distinct from generic failures.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, new: NewSession) -> Result<Session, PersistenceError>;

    /// Accepts an id, a display name, or an API key — whichever matches.
    async fn get_by_identifier(&self, identifier: &str) -> Result<Session, PersistenceError>;

    async fn get_by_api_key(&self, api_key: &str) -> Result<Session, PersistenceError>;

    async fn list(
        &self,
        filter: SessionFilter,
        pagination: Pagination,
    ) -> Result<Vec<Session>, PersistenceError>;

    async fn update(&self, id: Uuid, update: SessionUpdate) -> Result<Session, PersistenceError>;

    async fn set_status(&self, id: Uuid, status: SessionStatus) -> Result<(), PersistenceError>;

    async fn set_jid(&self, id: Uuid, jid: Option<&str>) -> Result<(), PersistenceError>;

    async fn touch_last_connected(&self, id: Uuid) -> Result<(), PersistenceError>;

    async fn increment_reconnections(&self, id: Uuid) -> Result<(), PersistenceError>;

    async fn increment_message_counter(&self, id: Uuid, sent: bool) -> Result<(), PersistenceError>;

    async fn delete(&self, id: Uuid) -> Result<(), PersistenceError>;

    async fn exists(&self, id: Uuid) -> Result<bool, PersistenceError>;

    async fn count(&self, filter: SessionFilter) -> Result<i64, PersistenceError>;

    /// Sessions with status in {connected, authenticated}.
    async fn get_active_connections(&self) -> Result<Vec<Session>, PersistenceError>;

    /// All rows, used once at start-up for restart reconciliation (spec
    /// §4.3).
    async fn list_all(&self) -> Result<Vec<Session>, PersistenceError>;
}

pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn create(&self, new: NewSession) -> Result<Session, PersistenceError> {
        let now = Utc::now().to_rfc3339();
        let (proxy_type, proxy_host, proxy_port, proxy_username, proxy_password) =
            unpack_proxy(&new.proxy);

        sqlx::query(
            "INSERT INTO sessions
                (id, name, api_key, status, proxy_type, proxy_host, proxy_port, proxy_username,
                 proxy_password, auto_reconnect, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'disconnected', ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        )
        .bind(new.id.to_string())
        .bind(&new.name)
        .bind(&new.api_key)
        .bind(proxy_type)
        .bind(proxy_host)
        .bind(proxy_port)
        .bind(proxy_username)
        .bind(proxy_password)
        .bind(new.auto_reconnect as i64)
        .bind(new.metadata.to_string())
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        self.get_by_identifier(&new.id.to_string()).await
    }

    async fn get_by_identifier(&self, identifier: &str) -> Result<Session, PersistenceError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT * FROM sessions WHERE id = ?1 OR name = ?1 OR api_key = ?1",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        row.map(SessionRow::into_session)
            .ok_or_else(|| PersistenceError::NotFound(identifier.to_string()))
    }

    async fn get_by_api_key(&self, api_key: &str) -> Result<Session, PersistenceError> {
        let row: Option<SessionRow> = sqlx::query_as("SELECT * FROM sessions WHERE api_key = ?1")
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;

        row.map(SessionRow::into_session)
            .ok_or_else(|| PersistenceError::NotFound("api key not recognized".into()))
    }

    async fn list(
        &self,
        filter: SessionFilter,
        pagination: Pagination,
    ) -> Result<Vec<Session>, PersistenceError> {
        let status = filter.status.map(|s| s.as_str().to_string());
        let name = filter.name.map(|n| format!("%{n}%"));

        let rows: Vec<SessionRow> = sqlx::query_as(
            "SELECT * FROM sessions
             WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR name LIKE ?2)
             ORDER BY created_at DESC
             LIMIT ?3 OFFSET ?4",
        )
        .bind(status)
        .bind(name)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        Ok(rows.into_iter().map(SessionRow::into_session).collect())
    }

    async fn update(&self, id: Uuid, update: SessionUpdate) -> Result<Session, PersistenceError> {
        let now = Utc::now().to_rfc3339();

        if let Some(proxy) = &update.proxy {
            let (proxy_type, proxy_host, proxy_port, proxy_username, proxy_password) =
                unpack_proxy(proxy);
            sqlx::query(
                "UPDATE sessions SET proxy_type = ?1, proxy_host = ?2, proxy_port = ?3,
                 proxy_username = ?4, proxy_password = ?5, updated_at = ?6 WHERE id = ?7",
            )
            .bind(proxy_type)
            .bind(proxy_host)
            .bind(proxy_port)
            .bind(proxy_username)
            .bind(proxy_password)
            .bind(&now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        }

        if let Some(auto_reconnect) = update.auto_reconnect {
            sqlx::query("UPDATE sessions SET auto_reconnect = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(auto_reconnect as i64)
                .bind(&now)
                .bind(id.to_string())
                .execute(&self.pool)
                .await
                .map_err(classify_sqlx_error)?;
        }

        if let Some(metadata) = update.metadata {
            sqlx::query("UPDATE sessions SET metadata = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(metadata.to_string())
                .bind(&now)
                .bind(id.to_string())
                .execute(&self.pool)
                .await
                .map_err(classify_sqlx_error)?;
        }

        self.get_by_identifier(&id.to_string()).await
    }

    async fn set_status(&self, id: Uuid, status: SessionStatus) -> Result<(), PersistenceError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE sessions SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(status.as_str())
            .bind(&now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn set_jid(&self, id: Uuid, jid: Option<&str>) -> Result<(), PersistenceError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE sessions SET jid = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(jid)
            .bind(&now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn touch_last_connected(&self, id: Uuid) -> Result<(), PersistenceError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE sessions SET last_connected_at = ?1, updated_at = ?1 WHERE id = ?2")
            .bind(&now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn increment_reconnections(&self, id: Uuid) -> Result<(), PersistenceError> {
        sqlx::query("UPDATE sessions SET reconnections = reconnections + 1 WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn increment_message_counter(&self, id: Uuid, sent: bool) -> Result<(), PersistenceError> {
        let column = if sent { "messages_sent" } else { "messages_received" };
        let sql = format!("UPDATE sessions SET {column} = {column} + 1 WHERE id = ?1");
        sqlx::query(&sql)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), PersistenceError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn exists(&self, id: Uuid) -> Result<bool, PersistenceError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(count > 0)
    }

    async fn count(&self, filter: SessionFilter) -> Result<i64, PersistenceError> {
        let status = filter.status.map(|s| s.as_str().to_string());
        let name = filter.name.map(|n| format!("%{n}%"));
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sessions WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR name LIKE ?2)",
        )
        .bind(status)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;
        Ok(count)
    }

    async fn get_active_connections(&self) -> Result<Vec<Session>, PersistenceError> {
        let rows: Vec<SessionRow> =
            sqlx::query_as("SELECT * FROM sessions WHERE status IN ('connected','authenticated')")
                .fetch_all(&self.pool)
                .await
                .map_err(classify_sqlx_error)?;
        Ok(rows.into_iter().map(SessionRow::into_session).collect())
    }

    async fn list_all(&self) -> Result<Vec<Session>, PersistenceError> {
        let rows: Vec<SessionRow> = sqlx::query_as("SELECT * FROM sessions")
            .fetch_all(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(rows.into_iter().map(SessionRow::into_session).collect())
    }
}

type ProxyTuple = (Option<String>, Option<String>, Option<i64>, Option<String>, Option<String>);

fn unpack_proxy(proxy: &Option<ProxyConfig>) -> ProxyTuple {
    match proxy {
        None => (None, None, None, None, None),
        Some(p) => (
            Some(match p.kind {
                super::models::ProxyType::Http => "http".to_string(),
                super::models::ProxyType::Socks5 => "socks5".to_string(),
            }),
            Some(p.host.clone()),
            Some(p.port as i64),
            p.username.clone(),
            p.password.clone(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;

    async fn repo() -> SqliteSessionRepository {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();
        SqliteSessionRepository::new(pool)
    }

    fn new_session(name: &str) -> NewSession {
        NewSession {
            id: Uuid::new_v4(),
            name: name.to_string(),
            api_key: Uuid::new_v4().simple().to_string() + &Uuid::new_v4().simple().to_string(),
            proxy: None,
            auto_reconnect: false,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips_id() {
        let repo = repo().await;
        let new = new_session("s1");
        let created = repo.create(new.clone()).await.unwrap();
        assert_eq!(created.id, new.id);
        assert_eq!(created.status, SessionStatus::Disconnected);

        let fetched = repo.get_by_identifier(&created.id.to_string()).await.unwrap();
        assert_eq!(fetched.id, created.id);
    }

    #[tokio::test]
    async fn duplicate_name_is_conflict() {
        let repo = repo().await;
        repo.create(new_session("dup")).await.unwrap();

        let err = repo.create(new_session("dup")).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let repo = repo().await;
        let created = repo.create(new_session("to-delete")).await.unwrap();
        repo.delete(created.id).await.unwrap();

        let err = repo.get_by_identifier(&created.id.to_string()).await.unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound(_)));
    }

    #[tokio::test]
    async fn set_status_then_active_connections_includes_it() {
        let repo = repo().await;
        let created = repo.create(new_session("active-one")).await.unwrap();
        repo.set_status(created.id, SessionStatus::Authenticated).await.unwrap();

        let active = repo.get_active_connections().await.unwrap();
        assert!(active.iter().any(|s| s.id == created.id));
    }

    #[tokio::test]
    async fn get_by_api_key_finds_session() {
        let repo = repo().await;
        let new = new_session("by-key");
        let created = repo.create(new.clone()).await.unwrap();

        let fetched = repo.get_by_api_key(&new.api_key).await.unwrap();
        assert_eq!(fetched.id, created.id);
    }
}
