use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
    Authenticated,
    Error,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
            SessionStatus::Authenticated => "authenticated",
            SessionStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disconnected" => Ok(Self::Disconnected),
            "connecting" => Ok(Self::Connecting),
            "connected" => Ok(Self::Connected),
            "authenticated" => Ok(Self::Authenticated),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyType {
    Http,
    Socks5,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(rename = "type")]
    pub kind: ProxyType,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Durable view of a Session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_connected_at: Option<DateTime<Utc>>,
}

/// Raw row shape as `sqlx` sees it — one flat table, proxy fields unpacked.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: String,
    pub name: String,
    pub api_key: String,
    pub jid: Option<String>,
    pub status: String,
    pub proxy_type: Option<String>,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<i64>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
    pub auto_reconnect: i64,
    pub metadata: String,
    pub messages_received: i64,
    pub messages_sent: i64,
    pub reconnections: i64,
    pub created_at: String,
    pub updated_at: String,
    pub last_connected_at: Option<String>,
}

impl SessionRow {
    pub fn into_session(self) -> Session {
        let proxy = self.proxy_type.map(|kind| ProxyConfig {
            kind: if kind == "socks5" { ProxyType::Socks5 } else { ProxyType::Http },
            host: self.proxy_host.unwrap_or_default(),
            port: self.proxy_port.unwrap_or(0) as u16,
            username: self.proxy_username,
            password: self.proxy_password,
        });

        Session {
            id: Uuid::parse_str(&self.id).unwrap_or_default(),
            name: self.name,
            api_key: self.api_key,
            jid: self.jid,
            status: self.status.parse().unwrap_or(SessionStatus::Error),
            proxy,
            auto_reconnect: self.auto_reconnect != 0,
            metadata: serde_json::from_str(&self.metadata).unwrap_or_else(|_| serde_json::json!({})),
            messages_received: self.messages_received,
            messages_sent: self.messages_sent,
            reconnections: self.reconnections,
            created_at: parse_rfc3339(&self.created_at),
            updated_at: parse_rfc3339(&self.updated_at),
            last_connected_at: self.last_connected_at.as_deref().map(parse_rfc3339),
        }
    }
}

pub(crate) fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Webhook Subscription row, at most one
/// per Session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: Uuid,
    pub session_id: Uuid,
    pub url: String,
    pub events: Vec<String>,
    pub raw_mode: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WebhookRow {
    pub id: String,
    pub session_id: String,
    pub url: String,
    pub events: String,
    pub raw_mode: i64,
    pub active: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl WebhookRow {
    pub fn into_webhook(self) -> Webhook {
        Webhook {
            id: Uuid::parse_str(&self.id).unwrap_or_default(),
            session_id: Uuid::parse_str(&self.session_id).unwrap_or_default(),
            url: self.url,
            events: serde_json::from_str(&self.events).unwrap_or_default(),
            raw_mode: self.raw_mode != 0,
            active: self.active != 0,
            created_at: parse_rfc3339(&self.created_at),
            updated_at: parse_rfc3339(&self.updated_at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    Audio,
    Video,
    Document,
    Sticker,
    Location,
    Contact,
    Poll,
    Reaction,
    System,
    Call,
    Unknown,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Audio => "audio",
            MessageType::Video => "video",
            MessageType::Document => "document",
            MessageType::Sticker => "sticker",
            MessageType::Location => "location",
            MessageType::Contact => "contact",
            MessageType::Poll => "poll",
            MessageType::Reaction => "reaction",
            MessageType::System => "system",
            MessageType::Call => "call",
            MessageType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Received,
    Sent,
    Delivered,
    Read,
    Failed,
    Pending,
    ServerAck,
    Retry,
    Undecryptable,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Received => "received",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
            MessageStatus::Failed => "failed",
            MessageStatus::Pending => "pending",
            MessageStatus::ServerAck => "server_ack",
            MessageStatus::Retry => "retry",
            MessageStatus::Undecryptable => "undecryptable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "received" => Self::Received,
            "sent" => Self::Sent,
            "delivered" => Self::Delivered,
            "read" => Self::Read,
            "failed" => Self::Failed,
            "pending" => Self::Pending,
            "server_ack" => Self::ServerAck,
            "retry" => Self::Retry,
            "undecryptable" => Self::Undecryptable,
            _ => return None,
        })
    }
}

/// Durable Message row. `raw_message` is always the verbatim protocol
/// payload; type-specific fields are derived from it on read, never
/// columnized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: String,
    pub protocol_message_id: String,
    pub session_id: String,
    pub chat_jid: String,
    pub from_jid: String,
    pub to_jid: Option<String>,
    pub message_type: String,
    pub content: Option<String>,
    pub raw_message: String,
    pub direction: String,
    pub status: String,
    pub is_from_me: i64,
    pub is_ephemeral: i64,
    pub timestamp: String,
    pub created_at: String,
    pub updated_at: String,
}

impl MessageRow {
    pub fn into_message(self) -> Message {
        Message {
            id: Uuid::parse_str(&self.id).unwrap_or_default(),
            protocol_message_id: self.protocol_message_id,
            session_id: Uuid::parse_str(&self.session_id).unwrap_or_default(),
            chat_jid: self.chat_jid,
            from_jid: self.from_jid,
            to_jid: self.to_jid,
            message_type: parse_message_type(&self.message_type),
            content: self.content,
            raw_message: serde_json::from_str(&self.raw_message).unwrap_or(serde_json::Value::Null),
            direction: if self.direction == "outgoing" { Direction::Outgoing } else { Direction::Incoming },
            status: MessageStatus::parse(&self.status).unwrap_or(MessageStatus::Received),
            is_from_me: self.is_from_me != 0,
            is_ephemeral: self.is_ephemeral != 0,
            timestamp: parse_rfc3339(&self.timestamp),
            created_at: parse_rfc3339(&self.created_at),
            updated_at: parse_rfc3339(&self.updated_at),
        }
    }
}

fn parse_message_type(s: &str) -> MessageType {
    match s {
        "text" => MessageType::Text,
        "image" => MessageType::Image,
        "audio" => MessageType::Audio,
        "video" => MessageType::Video,
        "document" => MessageType::Document,
        "sticker" => MessageType::Sticker,
        "location" => MessageType::Location,
        "contact" => MessageType::Contact,
        "poll" => MessageType::Poll,
        "reaction" => MessageType::Reaction,
        "system" => MessageType::System,
        "call" => MessageType::Call,
        _ => MessageType::Unknown,
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, per_page: 20 }
    }
}

impl Pagination {
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}
