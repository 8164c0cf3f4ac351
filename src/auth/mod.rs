//! Credential Resolver. Maps the one inbound credential
//! into an [`AuthContext`] and caches both positive and negative lookups
//! with a short TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::SessionRepository;
use crate::error::GatewayError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub api_key: String,
    pub is_global_key: bool,
    pub session_id: Option<Uuid>,
    pub has_global_access: bool,
}

#[derive(Clone)]
enum CacheEntry {
    Hit(AuthContext, Instant),
    Miss(Instant),
}

pub struct CredentialResolver {
    sessions_repo: Arc<dyn SessionRepository>,
    admin_api_key: String,
    positive_ttl: Duration,
    negative_ttl: Duration,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl CredentialResolver {
    pub fn new(
        sessions_repo: Arc<dyn SessionRepository>,
        admin_api_key: String,
        positive_ttl: Duration,
        negative_ttl: Duration,
    ) -> Self {
        Self {
            sessions_repo,
            admin_api_key,
            positive_ttl,
            negative_ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Extraction order: `apikey` → `X-API-Key` →
    /// `Authorization: Bearer <token>` → `Authorization: <token>`.
    pub fn extract_credential(headers: &axum::http::HeaderMap) -> Option<String> {
        let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);

        if let Some(value) = header_str("apikey").filter(|v| !v.is_empty()) {
            return Some(value.to_string());
        }
        if let Some(value) = header_str("x-api-key").filter(|v| !v.is_empty()) {
            return Some(value.to_string());
        }
        if let Some(value) = header_str("authorization").filter(|v| !v.is_empty()) {
            if let Some(token) = value.strip_prefix("Bearer ") {
                if !token.trim().is_empty() {
                    return Some(token.trim().to_string());
                }
            } else {
                return Some(value.to_string());
            }
        }
        None
    }

    pub async fn resolve(&self, credential: &str) -> Result<AuthContext, GatewayError> {
        if let Some(cached) = self.cached(credential).await {
            return cached;
        }

        let result = self.resolve_uncached(credential).await;
        self.cache_result(credential, &result).await;
        result
    }

    async fn cached(&self, credential: &str) -> Option<Result<AuthContext, GatewayError>> {
        let cache = self.cache.read().await;
        match cache.get(credential)? {
            CacheEntry::Hit(ctx, expires_at) if Instant::now() < *expires_at => Some(Ok(ctx.clone())),
            CacheEntry::Miss(expires_at) if Instant::now() < *expires_at => {
                Some(Err(GatewayError::Unauthorized("invalid api key".into())))
            }
            _ => None,
        }
    }

    async fn cache_result(&self, credential: &str, result: &Result<AuthContext, GatewayError>) {
        let entry = match result {
            Ok(ctx) => CacheEntry::Hit(ctx.clone(), Instant::now() + self.positive_ttl),
            Err(_) => CacheEntry::Miss(Instant::now() + self.negative_ttl),
        };
        self.cache.write().await.insert(credential.to_string(), entry);
    }

    async fn resolve_uncached(&self, credential: &str) -> Result<AuthContext, GatewayError> {
        if credential == self.admin_api_key {
            return Ok(AuthContext {
                api_key: credential.to_string(),
                is_global_key: true,
                session_id: None,
                has_global_access: true,
            });
        }

        match self.sessions_repo.get_by_api_key(credential).await {
            Ok(session) => Ok(AuthContext {
                api_key: credential.to_string(),
                is_global_key: false,
                session_id: Some(session.id),
                has_global_access: false,
            }),
            Err(_) => Err(GatewayError::Unauthorized("invalid api key".into())),
        }
    }

    /// Invalidates any cached entry for `api_key`, e.g. on session delete.
    pub async fn invalidate(&self, api_key: &str) {
        self.cache.write().await.remove(api_key);
    }
}

/// `RequireGlobalAPIKey` — admits only the global operator key.
pub fn require_global(ctx: &AuthContext) -> Result<(), GatewayError> {
    if ctx.has_global_access {
        Ok(())
    } else {
        Err(GatewayError::Forbidden("operator access required".into()))
    }
}

/// `RequireSessionAccess(path_session_id)` — admits global or the session
/// whose key matches the path id.
pub fn require_session_access(ctx: &AuthContext, path_session_id: Uuid) -> Result<(), GatewayError> {
    if ctx.has_global_access {
        return Ok(());
    }
    if ctx.session_id == Some(path_session_id) {
        Ok(())
    } else {
        Err(GatewayError::Forbidden("session does not match credential".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewSession, SqliteSessionRepository};
    use axum::http::HeaderMap;
    use sqlx::SqlitePool;

    async fn resolver_with_session() -> (CredentialResolver, Uuid, String) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::db::schema::init_schema(&pool).await.unwrap();
        let repo = Arc::new(SqliteSessionRepository::new(pool));
        let api_key = "s".repeat(32);
        let id = Uuid::new_v4();
        repo.create(NewSession {
            id,
            name: "owner".into(),
            api_key: api_key.clone(),
            proxy: None,
            auto_reconnect: false,
            metadata: serde_json::json!({}),
        })
        .await
        .unwrap();

        (
            CredentialResolver::new(repo, "admin-key-0123456789".into(), Duration::from_secs(60), Duration::from_secs(5)),
            id,
            api_key,
        )
    }

    #[test]
    fn extraction_order_prefers_apikey_header() {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", "from-apikey".parse().unwrap());
        headers.insert("x-api-key", "from-x-api-key".parse().unwrap());
        assert_eq!(CredentialResolver::extract_credential(&headers).as_deref(), Some("from-apikey"));
    }

    #[test]
    fn falls_back_to_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc123".parse().unwrap());
        assert_eq!(CredentialResolver::extract_credential(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn falls_back_to_raw_authorization() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "raw-token".parse().unwrap());
        assert_eq!(CredentialResolver::extract_credential(&headers).as_deref(), Some("raw-token"));
    }

    #[tokio::test]
    async fn global_key_resolves_with_full_access() {
        let (resolver, _id, _key) = resolver_with_session().await;
        let ctx = resolver.resolve("admin-key-0123456789").await.unwrap();
        assert!(ctx.has_global_access);
        assert!(ctx.is_global_key);
    }

    #[tokio::test]
    async fn session_key_resolves_to_its_own_session() {
        let (resolver, id, key) = resolver_with_session().await;
        let ctx = resolver.resolve(&key).await.unwrap();
        assert_eq!(ctx.session_id, Some(id));
        assert!(!ctx.has_global_access);
    }

    #[tokio::test]
    async fn unknown_key_is_unauthorized_and_cached_negative() {
        let (resolver, _id, _key) = resolver_with_session().await;
        let err = resolver.resolve("nonexistent").await.unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized(_)));

        // second call should hit the negative cache, not the database
        let err2 = resolver.resolve("nonexistent").await.unwrap_err();
        assert!(matches!(err2, GatewayError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn session_access_denied_for_foreign_session() {
        let (resolver, id, key) = resolver_with_session().await;
        let ctx = resolver.resolve(&key).await.unwrap();
        let other_id = Uuid::new_v4();
        assert!(require_session_access(&ctx, other_id).is_err());
        assert!(require_session_access(&ctx, id).is_ok());
    }

    #[tokio::test]
    async fn invalidate_clears_cached_entry() {
        let (resolver, _id, key) = resolver_with_session().await;
        resolver.resolve(&key).await.unwrap();
        resolver.invalidate(&key).await;
        assert!(resolver.cache.read().await.get(&key).is_none());
    }
}
