pub mod messages_repo;
pub mod models;
pub mod schema;
pub mod sessions_repo;
pub mod webhooks_repo;

pub use messages_repo::{MediaFilter, MessageRepository, NewMessage, SqliteMessageRepository};
pub use models::{
    Direction, Message, MessageStatus, MessageType, Pagination, ProxyConfig, ProxyType, Session,
    SessionFilter, SessionStatus, Webhook,
};
pub use sessions_repo::{NewSession, SessionRepository, SessionUpdate, SqliteSessionRepository};
pub use webhooks_repo::{SqliteWebhookRepository, WebhookRepository, WebhookUpsert};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Opens the pool and brings the schema up to date. Every start-up path
/// (normal boot, `doctor` subcommand, tests) goes through this one
/// function.
pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().max_connections(10).connect_with(options).await?;
    schema::init_schema(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_to_memory_db_initializes_schema() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'sessions'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
