//! Converts inbound protocol events into durable Message rows.
//! `raw_message` is always the verbatim event payload; every other field is
//! derived from it once, here, and never reinterpreted downstream.

use uuid::Uuid;

use crate::db::{Direction, MessageRepository, MessageStatus, MessageType, NewMessage};
use crate::protocol::ProtocolEvent;

/// Fields pulled out of a raw `message` event. Only the fields the
/// repository schema columnizes — media URLs, location coordinates, vCards
/// and poll options stay in `raw_message` and are extracted on read, not
/// here.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageFields {
    pub protocol_message_id: String,
    pub chat_jid: String,
    pub from_jid: String,
    pub to_jid: Option<String>,
    pub message_type: MessageType,
    pub content: Option<String>,
    pub is_from_me: bool,
    pub is_ephemeral: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Pure extraction over a raw `message` event's JSON body. Returns `None`
/// when the event is missing the minimum addressing fields a Message row
/// requires — callers log and drop in that case, they never fabricate data.
pub fn extract_message_fields(raw: &serde_json::Value) -> Option<MessageFields> {
    let info = raw.get("Info")?;
    let protocol_message_id = info.get("ID")?.as_str()?.to_string();
    let chat_jid = info.get("Chat")?.as_str()?.to_string();
    let from_jid = info.get("Sender")?.as_str().unwrap_or(&chat_jid).to_string();
    let to_jid = info.get("Recipient").and_then(|v| v.as_str()).map(str::to_string);
    let is_from_me = info.get("IsFromMe").and_then(|v| v.as_bool()).unwrap_or(false);
    let is_ephemeral = info.get("IsEphemeral").and_then(|v| v.as_bool()).unwrap_or(false);
    let timestamp = info
        .get("Timestamp")
        .and_then(|v| v.as_str())
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(chrono::Utc::now);

    let message = raw.get("Message");
    let (message_type, content) = classify_message_body(message);

    Some(MessageFields {
        protocol_message_id,
        chat_jid,
        from_jid,
        to_jid,
        message_type,
        content,
        is_from_me,
        is_ephemeral,
        timestamp,
    })
}

fn classify_message_body(message: Option<&serde_json::Value>) -> (MessageType, Option<String>) {
    let Some(message) = message else {
        return (MessageType::Unknown, None);
    };

    if let Some(text) = message.get("conversation").and_then(|v| v.as_str()) {
        return (MessageType::Text, Some(text.to_string()));
    }
    if let Some(obj) = message.get("extendedTextMessage") {
        let text = obj.get("text").and_then(|v| v.as_str()).map(str::to_string);
        return (MessageType::Text, text);
    }
    if message.get("imageMessage").is_some() {
        return (MessageType::Image, None);
    }
    if message.get("audioMessage").is_some() {
        return (MessageType::Audio, None);
    }
    if message.get("videoMessage").is_some() {
        return (MessageType::Video, None);
    }
    if message.get("documentMessage").is_some() {
        return (MessageType::Document, None);
    }
    if message.get("stickerMessage").is_some() {
        return (MessageType::Sticker, None);
    }
    if message.get("locationMessage").is_some() {
        return (MessageType::Location, None);
    }
    if message.get("contactMessage").is_some() {
        return (MessageType::Contact, None);
    }
    if message.get("pollCreationMessage").is_some() {
        return (MessageType::Poll, None);
    }
    if message.get("reactionMessage").is_some() {
        return (MessageType::Reaction, None);
    }
    (MessageType::Unknown, None)
}

/// Persists one `message` event. Logged and counted on failure, never
/// propagated to the protocol adapter.
pub async fn persist_message_event(
    messages_repo: &dyn MessageRepository,
    session_id: Uuid,
    event: &ProtocolEvent,
) {
    let Some(fields) = extract_message_fields(&event.data) else {
        tracing::warn!(%session_id, "message event missing addressing fields, dropping");
        return;
    };

    let new_message = NewMessage {
        protocol_message_id: fields.protocol_message_id,
        session_id,
        chat_jid: fields.chat_jid,
        from_jid: fields.from_jid,
        to_jid: fields.to_jid,
        message_type: fields.message_type,
        content: fields.content,
        raw_message: event.data.clone(),
        direction: if fields.is_from_me { Direction::Outgoing } else { Direction::Incoming },
        status: MessageStatus::Received,
        is_from_me: fields.is_from_me,
        is_ephemeral: fields.is_ephemeral,
        timestamp: fields.timestamp,
    };

    if let Err(err) = messages_repo.create(new_message).await {
        tracing::error!(%session_id, error = %err, "failed to persist message event");
    }
}

/// Applies a `receipt` event's status to the matching Message row.
/// Best-effort: a receipt for a row the gateway never saw is dropped with a
/// log, not an error — see DESIGN.md for the reasoning.
pub async fn apply_receipt_event(
    messages_repo: &dyn MessageRepository,
    session_id: Uuid,
    event: &ProtocolEvent,
) {
    let Some(protocol_message_id) = event.data.get("id").and_then(|v| v.as_str()) else {
        tracing::debug!(%session_id, "receipt event missing message id, dropping");
        return;
    };
    let Some(status) = event
        .data
        .get("type")
        .and_then(|v| v.as_str())
        .and_then(MessageStatus::parse)
    else {
        tracing::debug!(%session_id, "receipt event has unrecognized status, dropping");
        return;
    };

    match messages_repo.update_status(session_id, protocol_message_id, status).await {
        Ok(true) => {}
        Ok(false) => tracing::debug!(%session_id, protocol_message_id, "receipt preceded its message row, dropping"),
        Err(err) => tracing::error!(%session_id, error = %err, "failed to apply receipt"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> serde_json::Value {
        serde_json::json!({
            "Info": {
                "ID": "m1",
                "Chat": "c@s.whatsapp.net",
                "Sender": "u@s.whatsapp.net",
                "Timestamp": "2024-01-01T00:00:00Z",
                "IsFromMe": false
            },
            "Message": { "conversation": "hello" }
        })
    }

    #[test]
    fn extracts_text_message_fields() {
        let fields = extract_message_fields(&sample_event()).unwrap();
        assert_eq!(fields.protocol_message_id, "m1");
        assert_eq!(fields.chat_jid, "c@s.whatsapp.net");
        assert_eq!(fields.message_type, MessageType::Text);
        assert_eq!(fields.content.as_deref(), Some("hello"));
        assert!(!fields.is_from_me);
    }

    #[test]
    fn missing_info_yields_none() {
        assert_eq!(extract_message_fields(&serde_json::json!({"Message": {}})), None);
    }

    #[test]
    fn image_message_has_no_content_but_classifies() {
        let raw = serde_json::json!({
            "Info": {"ID": "m2", "Chat": "c@s.whatsapp.net", "Sender": "u@s.whatsapp.net", "Timestamp": "2024-01-01T00:00:00Z"},
            "Message": {"imageMessage": {"url": "https://example.com/img.jpg"}}
        });
        let fields = extract_message_fields(&raw).unwrap();
        assert_eq!(fields.message_type, MessageType::Image);
        assert_eq!(fields.content, None);
    }
}
