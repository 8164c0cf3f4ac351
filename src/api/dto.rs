//! Request/response shapes for the Control API surface. These are wire
//! DTOs only — domain structs live in [`crate::db::models`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{ProxyConfig, Session, SessionStatus};

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub name: String,
    pub session_id: Option<Uuid>,
    pub api_key: Option<String>,
    pub proxy: Option<ProxyConfig>,
    pub webhook: Option<WebhookSetRequest>,
    #[serde(default)]
    pub auto_reconnect: bool,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub name: String,
    pub api_key: String,
    pub jid: Option<String>,
    pub status: SessionStatus,
    pub proxy: Option<ProxyConfig>,
    pub auto_reconnect: bool,
    pub metadata: serde_json::Value,
    pub messages_received: i64,
    pub messages_sent: i64,
    pub reconnections: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub last_connected_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<Session> for SessionView {
    fn from(s: Session) -> Self {
        Self {
            id: s.id,
            name: s.name,
            api_key: s.api_key,
            jid: s.jid,
            status: s.status,
            proxy: s.proxy,
            auto_reconnect: s.auto_reconnect,
            metadata: s.metadata,
            messages_received: s.messages_received,
            messages_sent: s.messages_sent,
            reconnections: s.reconnections,
            created_at: s.created_at,
            updated_at: s.updated_at,
            last_connected_at: s.last_connected_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionEnvelope {
    pub session: SessionView,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionView>,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSessionRequest {
    pub proxy: Option<Option<ProxyConfig>>,
    pub auto_reconnect: Option<bool>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub qr_code: Option<String>,
    pub timeout: Option<u64>,
    pub status: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct QrResponse {
    pub qr_code: String,
    pub timeout: u64,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: SessionStatus,
}

#[derive(Debug, Deserialize)]
pub struct PairPhoneRequest {
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct PairPhoneResponse {
    pub linking_code: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SendTextRequest {
    pub chat_jid: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub ack_id: String,
    pub server_timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookSetRequest {
    pub webhook_url: String,
    pub events: Vec<String>,
    #[serde(default)]
    pub raw_mode: bool,
}

#[derive(Debug, Serialize)]
pub struct WebhookView {
    pub id: Uuid,
    pub session_id: Uuid,
    pub webhook_url: String,
    pub events: Vec<String>,
    pub raw_mode: bool,
    pub active: bool,
}

impl From<crate::db::Webhook> for WebhookView {
    fn from(w: crate::db::Webhook) -> Self {
        Self {
            id: w.id,
            session_id: w.session_id,
            webhook_url: w.url,
            events: w.events,
            raw_mode: w.raw_mode,
            active: w.active,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventCatalogEntry {
    pub name: &'static str,
    pub category: &'static str,
}

#[derive(Debug, Serialize)]
pub struct EventCatalogResponse {
    pub events: Vec<EventCatalogEntry>,
}

pub use crate::error::ErrorResponse;

#[derive(Debug, Deserialize)]
pub struct SendMediaRequest {
    pub chat_jid: String,
    pub kind: String,
    pub media_url: String,
    pub mime_type: String,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendLocationRequest {
    pub chat_jid: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendContactRequest {
    pub chat_jid: String,
    pub contact_name: String,
    pub contact_phone: String,
}

#[derive(Debug, Deserialize)]
pub struct MediaQuery {
    pub chat_jid: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessagesQuery {
    pub chat_jid: String,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub id: Uuid,
    pub session_id: Uuid,
    pub chat_jid: String,
    pub from_jid: String,
    pub to_jid: Option<String>,
    pub message_type: crate::db::MessageType,
    pub direction: crate::db::Direction,
    pub status: crate::db::MessageStatus,
    pub content: Option<String>,
    pub protocol_message_id: String,
    pub raw_message: serde_json::Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<crate::db::Message> for MessageView {
    fn from(m: crate::db::Message) -> Self {
        Self {
            id: m.id,
            session_id: m.session_id,
            chat_jid: m.chat_jid,
            from_jid: m.from_jid,
            to_jid: m.to_jid,
            message_type: m.message_type,
            direction: m.direction,
            status: m.status,
            content: m.content,
            protocol_message_id: m.protocol_message_id,
            raw_message: m.raw_message,
            timestamp: m.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub messages: Vec<MessageView>,
    pub page: u32,
    pub per_page: u32,
}
