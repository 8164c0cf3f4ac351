//! Control API Surface — the axum `Router` wiring and handlers.
//! Session-scoped reads go straight through the repositories; lifecycle
//! writes go through the Session Registry; webhook writes go through the
//! webhook repository and invalidate the router's cache.

pub mod dto;
pub mod extract;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{require_global, require_session_access, CredentialResolver};
use crate::config::Config;
use crate::db::{
    Direction, MediaFilter, MessageRepository, MessageStatus, MessageType, NewMessage, Pagination,
    Session, SessionFilter, SessionRepository, SessionStatus, SessionUpdate, WebhookRepository,
    WebhookUpsert,
};
use crate::error::{GatewayError, Result};
use crate::metrics::Metrics;
use crate::protocol::EventName;
use crate::registry::{ConnectOutcome, NewSessionConfig, SessionRegistry};
use crate::router::EventRouter;

use self::extract::Authed;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<CredentialResolver>,
    pub registry: Arc<SessionRegistry>,
    pub sessions_repo: Arc<dyn SessionRepository>,
    pub webhooks_repo: Arc<dyn WebhookRepository>,
    pub messages_repo: Arc<dyn MessageRepository>,
    pub router: Arc<EventRouter>,
    pub metrics: Arc<Metrics>,
}

/// Builds the full HTTP surface with the body-limit/timeout middleware
/// stack.
pub fn build_router(state: AppState) -> Router {
    const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;
    const REQUEST_TIMEOUT_SECS: u64 = 30;

    Router::new()
        .route("/health", get(health))
        .route("/sessions/add", post(create_session))
        .route("/sessions", get(list_sessions))
        .route("/sessions/active", get(active_sessions))
        .route("/sessions/{id}", get(get_session).put(update_session).delete(delete_session))
        .route("/sessions/{id}/connect", post(connect_session))
        .route("/sessions/{id}/disconnect", post(disconnect_session))
        .route("/sessions/{id}/logout", post(logout_session))
        .route("/sessions/{id}/qr", get(get_qr))
        .route("/sessions/{id}/status", get(get_status))
        .route("/sessions/{id}/pairphone", post(pair_phone))
        .route("/sessions/{id}/send/text", post(send_text))
        .route("/sessions/{id}/send/media", post(send_media))
        .route("/sessions/{id}/send/location", post(send_location))
        .route("/sessions/{id}/send/contact", post(send_contact))
        .route("/sessions/{id}/webhooks/set", post(set_webhook))
        .route("/sessions/{id}/webhooks/find", get(find_webhook))
        .route("/sessions/{id}/messages", get(list_messages))
        .route("/sessions/{id}/media", get(list_media))
        .route("/webhooks/events", get(event_catalog))
        .with_state(state)
        .layer(tower_http::timeout::TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
        .layer(tower_http::limit::RequestBodyLimitLayer::new(MAX_BODY_SIZE))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let db_ok = state.sessions_repo.count(SessionFilter::default()).await.is_ok();
    Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "database": db_ok,
    }))
}

async fn resolve_session(state: &AppState, identifier: &str) -> Result<Session> {
    if identifier.trim().is_empty() {
        return Err(GatewayError::MissingSessionId);
    }
    Ok(state.sessions_repo.get_by_identifier(identifier).await?)
}

fn request_id() -> String {
    Uuid::new_v4().to_string()
}

async fn create_session(
    State(state): State<AppState>,
    Authed(ctx): Authed,
    Json(body): Json<dto::CreateSessionRequest>,
) -> Result<(StatusCode, Json<dto::SessionEnvelope>)> {
    require_global(&ctx)?;

    let webhook = body.webhook.clone();
    let session = state
        .registry
        .create_session(NewSessionConfig {
            name: body.name,
            session_id: body.session_id,
            api_key: body.api_key,
            proxy: body.proxy,
            auto_reconnect: body.auto_reconnect,
            metadata: body.metadata,
        })
        .await?;

    if let Some(webhook) = webhook {
        state
            .webhooks_repo
            .upsert(
                session.id,
                WebhookUpsert { url: webhook.webhook_url, events: webhook.events, raw_mode: webhook.raw_mode, active: true },
            )
            .await?;
    }

    Ok((StatusCode::CREATED, Json(dto::SessionEnvelope { session: session.into() })))
}

async fn list_sessions(
    State(state): State<AppState>,
    Authed(ctx): Authed,
    Query(query): Query<dto::ListSessionsQuery>,
) -> Result<Json<dto::SessionListResponse>> {
    require_global(&ctx)?;

    let status = query
        .status
        .as_deref()
        .map(|s| s.parse::<SessionStatus>().map_err(GatewayError::Validation))
        .transpose()?;
    let pagination = Pagination { page: query.page.unwrap_or(1), per_page: query.per_page.unwrap_or(20) };
    let filter = SessionFilter { status, name: query.name };

    let sessions = state.sessions_repo.list(filter, pagination).await?;
    Ok(Json(dto::SessionListResponse {
        sessions: sessions.into_iter().map(Into::into).collect(),
        page: pagination.page,
        per_page: pagination.per_page,
    }))
}

async fn active_sessions(
    State(state): State<AppState>,
    Authed(ctx): Authed,
) -> Result<Json<dto::SessionListResponse>> {
    require_global(&ctx)?;
    let sessions = state.sessions_repo.get_active_connections().await?;
    let count = u32::try_from(sessions.len()).unwrap_or(u32::MAX).max(1);
    Ok(Json(dto::SessionListResponse { sessions: sessions.into_iter().map(Into::into).collect(), page: 1, per_page: count }))
}

async fn delete_session(
    State(state): State<AppState>,
    Authed(ctx): Authed,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    require_global(&ctx)?;
    let session = resolve_session(&state, &id).await?;
    state.registry.delete_session(session.id).await?;
    state.auth.invalidate(&session.api_key).await;
    Ok(Json(json!({ "deleted": true })))
}

async fn get_session(
    State(state): State<AppState>,
    Authed(ctx): Authed,
    Path(id): Path<String>,
) -> Result<Json<dto::SessionEnvelope>> {
    let session = resolve_session(&state, &id).await?;
    require_session_access(&ctx, session.id)?;
    Ok(Json(dto::SessionEnvelope { session: session.into() }))
}

async fn update_session(
    State(state): State<AppState>,
    Authed(ctx): Authed,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateSessionRequest>,
) -> Result<Json<dto::SessionEnvelope>> {
    let session = resolve_session(&state, &id).await?;
    require_session_access(&ctx, session.id)?;

    let updated = state
        .sessions_repo
        .update(
            session.id,
            SessionUpdate { proxy: body.proxy, auto_reconnect: body.auto_reconnect, metadata: body.metadata },
        )
        .await?;
    Ok(Json(dto::SessionEnvelope { session: updated.into() }))
}

async fn connect_session(
    State(state): State<AppState>,
    Authed(ctx): Authed,
    Path(id): Path<String>,
) -> Result<Json<dto::ConnectResponse>> {
    let session = resolve_session(&state, &id).await?;
    require_session_access(&ctx, session.id)?;

    let outcome = state.registry.connect_session(session.id).await?;
    Ok(Json(match outcome {
        ConnectOutcome::QrCode { qr_code, timeout_secs } => {
            dto::ConnectResponse { qr_code: Some(qr_code), timeout: Some(timeout_secs), status: None }
        }
        ConnectOutcome::Authenticated => dto::ConnectResponse { qr_code: None, timeout: None, status: Some("authenticated") },
    }))
}

async fn disconnect_session(
    State(state): State<AppState>,
    Authed(ctx): Authed,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let session = resolve_session(&state, &id).await?;
    require_session_access(&ctx, session.id)?;
    state.registry.disconnect_session(session.id).await?;
    Ok(Json(json!({ "disconnected": true })))
}

async fn logout_session(
    State(state): State<AppState>,
    Authed(ctx): Authed,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let session = resolve_session(&state, &id).await?;
    require_session_access(&ctx, session.id)?;
    state.registry.logout_session(session.id).await?;
    Ok(Json(json!({ "logged_out": true })))
}

async fn get_qr(
    State(state): State<AppState>,
    Authed(ctx): Authed,
    Path(id): Path<String>,
) -> Result<Json<dto::QrResponse>> {
    let session = resolve_session(&state, &id).await?;
    require_session_access(&ctx, session.id)?;
    let qr_code = state.registry.get_qr_code(session.id).await?;
    Ok(Json(dto::QrResponse { qr_code, timeout: state.config.qr_timeout.as_secs() }))
}

async fn get_status(
    State(state): State<AppState>,
    Authed(ctx): Authed,
    Path(id): Path<String>,
) -> Result<Json<dto::StatusResponse>> {
    let session = resolve_session(&state, &id).await?;
    require_session_access(&ctx, session.id)?;
    Ok(Json(dto::StatusResponse { status: session.status }))
}

async fn pair_phone(
    State(state): State<AppState>,
    Authed(ctx): Authed,
    Path(id): Path<String>,
    Json(body): Json<dto::PairPhoneRequest>,
) -> Result<Json<dto::PairPhoneResponse>> {
    let session = resolve_session(&state, &id).await?;
    require_session_access(&ctx, session.id)?;

    let linking_code = state.registry.pair_phone(session.id, &body.phone).await?;
    Ok(Json(dto::PairPhoneResponse { linking_code, expires_at: chrono::Utc::now() + chrono::Duration::minutes(2) }))
}

async fn persist_outgoing(
    state: &AppState,
    session: &Session,
    chat_jid: &str,
    message_type: MessageType,
    content: Option<String>,
    raw_message: serde_json::Value,
    ack_id: &str,
    timestamp: chrono::DateTime<chrono::Utc>,
) {
    let new_message = NewMessage {
        protocol_message_id: ack_id.to_string(),
        session_id: session.id,
        chat_jid: chat_jid.to_string(),
        from_jid: session.jid.clone().unwrap_or_default(),
        to_jid: Some(chat_jid.to_string()),
        message_type,
        content,
        raw_message,
        direction: Direction::Outgoing,
        status: MessageStatus::Sent,
        is_from_me: true,
        is_ephemeral: false,
        timestamp,
    };
    if let Err(err) = state.messages_repo.create(new_message).await {
        tracing::warn!(session_id = %session.id, error = %err, "failed to persist outgoing message");
    }
    let _ = state.sessions_repo.increment_message_counter(session.id, true).await;
}

async fn send_text(
    State(state): State<AppState>,
    Authed(ctx): Authed,
    Path(id): Path<String>,
    Json(body): Json<dto::SendTextRequest>,
) -> Result<Json<dto::SendResponse>> {
    let session = resolve_session(&state, &id).await?;
    require_session_access(&ctx, session.id)?;

    let client = state.registry.get_client(session.id).await?;
    let rid = request_id();
    let payload = json!({ "conversation": body.text });
    let result = client
        .send_message(&body.chat_jid, payload.clone(), &rid)
        .await
        .map_err(|err| GatewayError::Protocol(err.to_string()))?;

    persist_outgoing(
        &state,
        &session,
        &body.chat_jid,
        MessageType::Text,
        Some(body.text),
        payload,
        &result.ack_id,
        result.server_timestamp,
    )
    .await;

    Ok(Json(dto::SendResponse { ack_id: result.ack_id, server_timestamp: result.server_timestamp }))
}

async fn send_media(
    State(state): State<AppState>,
    Authed(ctx): Authed,
    Path(id): Path<String>,
    Json(body): Json<dto::SendMediaRequest>,
) -> Result<Json<dto::SendResponse>> {
    let session = resolve_session(&state, &id).await?;
    require_session_access(&ctx, session.id)?;

    let message_type = match body.kind.as_str() {
        "image" => MessageType::Image,
        "audio" => MessageType::Audio,
        "video" => MessageType::Video,
        "document" => MessageType::Document,
        "sticker" => MessageType::Sticker,
        other => return Err(GatewayError::Validation(format!("unsupported media kind {other:?}"))),
    };

    let client = state.registry.get_client(session.id).await?;
    let rid = request_id();
    let payload = json!({
        "mediaUrl": body.media_url,
        "mimeType": body.mime_type,
        "caption": body.caption,
    });
    let result = client
        .send_message(&body.chat_jid, payload.clone(), &rid)
        .await
        .map_err(|err| GatewayError::Protocol(err.to_string()))?;

    persist_outgoing(
        &state,
        &session,
        &body.chat_jid,
        message_type,
        body.caption,
        payload,
        &result.ack_id,
        result.server_timestamp,
    )
    .await;

    Ok(Json(dto::SendResponse { ack_id: result.ack_id, server_timestamp: result.server_timestamp }))
}

async fn send_location(
    State(state): State<AppState>,
    Authed(ctx): Authed,
    Path(id): Path<String>,
    Json(body): Json<dto::SendLocationRequest>,
) -> Result<Json<dto::SendResponse>> {
    let session = resolve_session(&state, &id).await?;
    require_session_access(&ctx, session.id)?;

    let client = state.registry.get_client(session.id).await?;
    let rid = request_id();
    let payload = json!({
        "locationMessage": {
            "degreesLatitude": body.latitude,
            "degreesLongitude": body.longitude,
            "name": body.name,
        }
    });
    let result = client
        .send_message(&body.chat_jid, payload.clone(), &rid)
        .await
        .map_err(|err| GatewayError::Protocol(err.to_string()))?;

    persist_outgoing(
        &state,
        &session,
        &body.chat_jid,
        MessageType::Location,
        None,
        payload,
        &result.ack_id,
        result.server_timestamp,
    )
    .await;

    Ok(Json(dto::SendResponse { ack_id: result.ack_id, server_timestamp: result.server_timestamp }))
}

async fn send_contact(
    State(state): State<AppState>,
    Authed(ctx): Authed,
    Path(id): Path<String>,
    Json(body): Json<dto::SendContactRequest>,
) -> Result<Json<dto::SendResponse>> {
    let session = resolve_session(&state, &id).await?;
    require_session_access(&ctx, session.id)?;

    let client = state.registry.get_client(session.id).await?;
    let rid = request_id();
    let payload = json!({
        "contactMessage": {
            "displayName": body.contact_name,
            "phoneNumber": body.contact_phone,
        }
    });
    let result = client
        .send_message(&body.chat_jid, payload.clone(), &rid)
        .await
        .map_err(|err| GatewayError::Protocol(err.to_string()))?;

    persist_outgoing(
        &state,
        &session,
        &body.chat_jid,
        MessageType::Contact,
        Some(body.contact_name),
        payload,
        &result.ack_id,
        result.server_timestamp,
    )
    .await;

    Ok(Json(dto::SendResponse { ack_id: result.ack_id, server_timestamp: result.server_timestamp }))
}

async fn set_webhook(
    State(state): State<AppState>,
    Authed(ctx): Authed,
    Path(id): Path<String>,
    Json(body): Json<dto::WebhookSetRequest>,
) -> Result<Json<dto::WebhookView>> {
    let session = resolve_session(&state, &id).await?;
    require_session_access(&ctx, session.id)?;

    if body.events.is_empty() {
        return Err(GatewayError::Validation("events must not be empty".into()));
    }

    let webhook = state
        .webhooks_repo
        .upsert(
            session.id,
            WebhookUpsert { url: body.webhook_url, events: body.events, raw_mode: body.raw_mode, active: true },
        )
        .await?;
    state.router.invalidate(session.id).await;

    Ok(Json(webhook.into()))
}

async fn find_webhook(
    State(state): State<AppState>,
    Authed(ctx): Authed,
    Path(id): Path<String>,
) -> Result<Json<dto::WebhookView>> {
    let session = resolve_session(&state, &id).await?;
    require_session_access(&ctx, session.id)?;
    let webhook = state.webhooks_repo.get_by_session_id(session.id).await?;
    Ok(Json(webhook.into()))
}

async fn list_messages(
    State(state): State<AppState>,
    Authed(ctx): Authed,
    Path(id): Path<String>,
    Query(query): Query<dto::ChatMessagesQuery>,
) -> Result<Json<dto::MessageListResponse>> {
    let session = resolve_session(&state, &id).await?;
    require_session_access(&ctx, session.id)?;

    let pagination = Pagination { page: query.page.unwrap_or(1), per_page: query.per_page.unwrap_or(20) };
    let messages = state
        .messages_repo
        .list_by_session_and_chat(session.id, &query.chat_jid, pagination)
        .await?;
    Ok(Json(dto::MessageListResponse {
        messages: messages.into_iter().map(Into::into).collect(),
        page: pagination.page,
        per_page: pagination.per_page,
    }))
}

async fn list_media(
    State(state): State<AppState>,
    Authed(ctx): Authed,
    Path(id): Path<String>,
    Query(query): Query<dto::MediaQuery>,
) -> Result<Json<dto::MessageListResponse>> {
    let session = resolve_session(&state, &id).await?;
    require_session_access(&ctx, session.id)?;

    let pagination = Pagination { page: query.page.unwrap_or(1), per_page: query.per_page.unwrap_or(20) };
    let messages = state
        .messages_repo
        .get_session_media_messages(session.id, MediaFilter { chat_jid: query.chat_jid }, pagination)
        .await?;
    Ok(Json(dto::MessageListResponse {
        messages: messages.into_iter().map(Into::into).collect(),
        page: pagination.page,
        per_page: pagination.per_page,
    }))
}

async fn event_catalog(Authed(_ctx): Authed) -> Json<dto::EventCatalogResponse> {
    Json(dto::EventCatalogResponse {
        events: EventName::all().iter().map(|e| dto::EventCatalogEntry { name: e.as_str(), category: e.category() }).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{SqliteMessageRepository, SqliteSessionRepository, SqliteWebhookRepository};
    use crate::protocol::MockProtocolClient;
    use axum::extract::Query;
    use sqlx::SqlitePool;
    use tokio::sync::mpsc;

    async fn test_state() -> AppState {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::db::schema::init_schema(&pool).await.unwrap();

        let sessions_repo: Arc<dyn SessionRepository> = Arc::new(SqliteSessionRepository::new(pool.clone()));
        let webhooks_repo: Arc<dyn WebhookRepository> = Arc::new(SqliteWebhookRepository::new(pool.clone()));
        let messages_repo: Arc<dyn MessageRepository> = Arc::new(SqliteMessageRepository::new(pool));
        let metrics = Arc::new(Metrics::new());
        let (tx, _rx) = mpsc::channel(100);
        let router = Arc::new(EventRouter::new(
            webhooks_repo.clone(),
            sessions_repo.clone(),
            messages_repo.clone(),
            tx,
            metrics.clone(),
        ));
        let registry = Arc::new(SessionRegistry::new(
            sessions_repo.clone(),
            router.clone(),
            metrics.clone(),
            Arc::new(|existing_jid: Option<String>| -> Arc<dyn crate::protocol::ProtocolClient> {
                match existing_jid {
                    Some(jid) => Arc::new(MockProtocolClient::resuming(&jid)),
                    None => Arc::new(MockProtocolClient::new()),
                }
            }),
            Duration::from_millis(200),
            Duration::from_millis(500),
        ));
        let config = Arc::new(Config::for_test());
        let auth = Arc::new(CredentialResolver::new(
            sessions_repo.clone(),
            config.admin_api_key.clone(),
            config.credential_cache_positive_ttl,
            config.credential_cache_negative_ttl,
        ));

        AppState { config, auth, registry, sessions_repo, webhooks_repo, messages_repo, router, metrics }
    }

    fn admin_ctx(state: &AppState) -> Authed {
        Authed(crate::auth::AuthContext {
            api_key: state.config.admin_api_key.clone(),
            is_global_key: true,
            session_id: None,
            has_global_access: true,
        })
    }

    async fn create_test_session(state: &AppState, name: &str) -> dto::SessionEnvelope {
        let Json(envelope) = create_session(
            State(state.clone()),
            admin_ctx(state),
            Json(dto::CreateSessionRequest {
                name: name.to_string(),
                session_id: None,
                api_key: None,
                proxy: None,
                auto_reconnect: false,
                metadata: serde_json::json!({}),
                webhook: None,
            }),
        )
        .await
        .unwrap()
        .1;
        envelope
    }

    #[tokio::test]
    async fn health_reports_database_connectivity() {
        let state = test_state().await;
        let Json(body) = health(State(state)).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], true);
    }

    #[tokio::test]
    async fn create_session_requires_global_access() {
        let state = test_state().await;
        let non_admin = Authed(crate::auth::AuthContext {
            api_key: "whatever".into(),
            is_global_key: false,
            session_id: Some(Uuid::new_v4()),
            has_global_access: false,
        });
        let result = create_session(
            State(state.clone()),
            non_admin,
            Json(dto::CreateSessionRequest {
                name: "s1".into(),
                session_id: None,
                api_key: None,
                proxy: None,
                auto_reconnect: false,
                metadata: serde_json::json!({}),
                webhook: None,
            }),
        )
        .await;
        match result {
            Err(err) => assert_eq!(err.code(), "ACCESS_DENIED"),
            Ok(_) => panic!("expected forbidden"),
        }
    }

    #[tokio::test]
    async fn create_then_get_session_round_trips() {
        let state = test_state().await;
        let created = create_test_session(&state, "alice").await;

        let Json(fetched) = get_session(State(state.clone()), admin_ctx(&state), Path(created.session.id.to_string()))
            .await
            .unwrap();
        assert_eq!(fetched.session.name, "alice");
    }

    #[tokio::test]
    async fn connect_unpaired_session_returns_qr_code() {
        let state = test_state().await;
        let created = create_test_session(&state, "bob").await;

        let Json(response) =
            connect_session(State(state.clone()), admin_ctx(&state), Path(created.session.id.to_string()))
                .await
                .unwrap();
        assert!(response.qr_code.is_some());
        assert!(response.status.is_none());
    }

    #[tokio::test]
    async fn get_session_with_empty_identifier_is_missing_session_id() {
        let state = test_state().await;
        let result = get_session(State(state.clone()), admin_ctx(&state), Path(String::new())).await;
        match result {
            Err(err) => assert_eq!(err.code(), "MISSING_SESSION_ID"),
            Ok(_) => panic!("expected missing session id"),
        }
    }

    #[tokio::test]
    async fn set_webhook_then_find_webhook_round_trips() {
        let state = test_state().await;
        let created = create_test_session(&state, "carol").await;
        let id = created.session.id;

        let Json(webhook) = set_webhook(
            State(state.clone()),
            admin_ctx(&state),
            Path(id.to_string()),
            Json(dto::WebhookSetRequest {
                webhook_url: "https://example.com/hook".into(),
                events: vec!["message".into()],
                raw_mode: true,
            }),
        )
        .await
        .unwrap();
        assert_eq!(webhook.webhook_url, "https://example.com/hook");

        let Json(found) = find_webhook(State(state.clone()), admin_ctx(&state), Path(id.to_string())).await.unwrap();
        assert_eq!(found.events, vec!["message".to_string()]);
    }

    #[tokio::test]
    async fn set_webhook_rejects_empty_event_list() {
        let state = test_state().await;
        let created = create_test_session(&state, "dave").await;

        let result = set_webhook(
            State(state.clone()),
            admin_ctx(&state),
            Path(created.session.id.to_string()),
            Json(dto::WebhookSetRequest { webhook_url: "https://example.com/hook".into(), events: vec![], raw_mode: false }),
        )
        .await;
        match result {
            Err(err) => assert_eq!(err.code(), "VALIDATION_ERROR"),
            Ok(_) => panic!("expected validation error"),
        }
    }

    #[tokio::test]
    async fn send_text_before_connect_is_not_ready() {
        let state = test_state().await;
        let created = create_test_session(&state, "erin").await;

        let result = send_text(
            State(state.clone()),
            admin_ctx(&state),
            Path(created.session.id.to_string()),
            Json(dto::SendTextRequest { chat_jid: "1@s.whatsapp.net".into(), text: "hi".into() }),
        )
        .await;
        match result {
            Err(err) => assert_eq!(err.code(), "SESSION_NOT_READY"),
            Ok(_) => panic!("expected session not ready"),
        }
    }

    #[tokio::test]
    async fn list_messages_is_empty_for_fresh_session() {
        let state = test_state().await;
        let created = create_test_session(&state, "frank").await;

        let Json(page) = list_messages(
            State(state.clone()),
            admin_ctx(&state),
            Path(created.session.id.to_string()),
            Query(dto::ChatMessagesQuery { chat_jid: "1@s.whatsapp.net".into(), page: None, per_page: None }),
        )
        .await
        .unwrap();
        assert!(page.messages.is_empty());
    }

    #[tokio::test]
    async fn event_catalog_lists_every_known_event() {
        let state = test_state().await;
        let Json(catalog) = event_catalog(admin_ctx(&state)).await;
        assert_eq!(catalog.events.len(), EventName::all().len());
    }

    #[tokio::test]
    async fn build_router_accepts_the_shared_state() {
        let state = test_state().await;
        // Smoke test: the middleware stack and every route must type-check
        // against `AppState` and construct without panicking.
        let _router = build_router(state);
    }
}
