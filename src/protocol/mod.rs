pub mod events;
pub mod mock;

pub use events::{EventName, ProtocolEvent};
pub use mock::MockProtocolClient;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("timed out waiting for pairing")]
    PairingTimeout,
    #[error("pairing failed: {0}")]
    PairError(String),
}

#[derive(Debug, Clone)]
pub struct SendResult {
    pub server_timestamp: chrono::DateTime<chrono::Utc>,
    pub ack_id: String,
}

#[derive(Debug, Clone)]
pub struct MediaDescriptor {
    pub url: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// A callback that receives every protocol event, installed by the Event
/// Router. The adapter owns no reference back to the router — this trait
/// object is the only thing it depends on, to keep the adapter/router
/// object graph acyclic.
pub trait EventSink: Send + Sync {
    fn handle(&self, event: ProtocolEvent);
}

/// Thin facade around the WhatsApp wire protocol. The real
/// protocol library is explicitly out of scope; this trait is the seam a
/// `whatsmeow`-equivalent crate would implement. [`MockProtocolClient`] is
/// the in-process stand-in used everywhere in this crate today.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Initiates or resumes pairing. For an unpaired identity this opens
    /// the QR channel; callers read it via [`ProtocolClient::qr_codes`].
    async fn connect(&self) -> Result<(), ProtocolError>;

    /// Graceful go-offline; does not invalidate the identity.
    async fn disconnect(&self) -> Result<(), ProtocolError>;

    /// Identity-invalidating logout.
    async fn logout(&self) -> Result<(), ProtocolError>;

    async fn send_message(
        &self,
        chat_jid: &str,
        payload: serde_json::Value,
        request_id: &str,
    ) -> Result<SendResult, ProtocolError>;

    async fn is_connected(&self) -> bool;

    async fn is_logged_in(&self) -> bool;

    /// A lazy, finite stream of QR strings. Terminates on pair-success,
    /// pair-error, or the configured timeout.
    async fn qr_codes(&self) -> tokio::sync::mpsc::Receiver<String>;

    /// Registers the sink that receives every subsequent event. The
    /// adapter MUST NOT rewrite or compress events before forwarding.
    fn register_sink(&self, sink: std::sync::Arc<dyn EventSink>);

    async fn pair_phone(&self, e164: &str) -> Result<String, ProtocolError>;

    async fn upload_media(&self, bytes: Vec<u8>, kind: &str) -> Result<MediaDescriptor, ProtocolError>;
}
