use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{EventName, EventSink, MediaDescriptor, ProtocolClient, ProtocolError, ProtocolEvent, SendResult};

/// Deterministic, in-process stand-in for a real WhatsApp protocol client.
/// Used by the Session Registry's tests and as the default
/// backend until a real `whatsmeow`-equivalent crate is wired behind
/// [`ProtocolClient`].
pub struct MockProtocolClient {
    connected: AtomicBool,
    logged_in: AtomicBool,
    /// Whether this adapter instance stands in for an identity that already
    /// completed pairing in a previous process — restart reconciliation
    /// resumes without a new QR flow.
    already_paired: bool,
    sink: Mutex<Option<Arc<dyn EventSink>>>,
}

impl MockProtocolClient {
    /// A fresh, unpaired identity: `connect()` opens the QR channel and
    /// waits for [`MockProtocolClient::simulate_scan`].
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            logged_in: AtomicBool::new(false),
            already_paired: false,
            sink: Mutex::new(None),
        }
    }

    /// Stands in for an identity with a JID already on file: `connect()`
    /// resumes straight to authenticated, the way a real protocol client
    /// skips pairing when it already holds valid session keys.
    pub fn resuming(_jid: &str) -> Self {
        Self {
            connected: AtomicBool::new(false),
            logged_in: AtomicBool::new(false),
            already_paired: true,
            sink: Mutex::new(None),
        }
    }

    /// Stands in for an operator scanning the QR code shown by an unpaired
    /// `connect()`. Not part of [`ProtocolClient`] — this is a test/demo hook
    /// a real protocol library wouldn't expose.
    pub fn simulate_scan(&self, jid: &str) {
        self.logged_in.store(true, Ordering::SeqCst);
        self.emit(EventName::PairSuccess, serde_json::json!({ "jid": jid }));
    }

    fn emit(&self, name: EventName, data: serde_json::Value) {
        let sink = self.sink.lock().unwrap().clone();
        if let Some(sink) = sink {
            sink.handle(ProtocolEvent {
                name,
                event_type_tag: format!("*events.{name:?}"),
                data,
            });
        }
    }
}

impl Default for MockProtocolClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolClient for MockProtocolClient {
    async fn connect(&self) -> Result<(), ProtocolError> {
        self.connected.store(true, Ordering::SeqCst);
        if self.already_paired {
            self.logged_in.store(true, Ordering::SeqCst);
            self.emit(EventName::Connected, serde_json::json!({}));
        } else {
            self.emit(EventName::Qr, serde_json::json!({}));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ProtocolError> {
        self.connected.store(false, Ordering::SeqCst);
        self.emit(EventName::Disconnected, serde_json::json!({}));
        Ok(())
    }

    async fn logout(&self) -> Result<(), ProtocolError> {
        self.connected.store(false, Ordering::SeqCst);
        self.logged_in.store(false, Ordering::SeqCst);
        self.emit(EventName::LoggedOut, serde_json::json!({}));
        Ok(())
    }

    async fn send_message(
        &self,
        _chat_jid: &str,
        _payload: serde_json::Value,
        request_id: &str,
    ) -> Result<SendResult, ProtocolError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ProtocolError::Send("not connected".into()));
        }
        Ok(SendResult {
            server_timestamp: Utc::now(),
            ack_id: format!("mock-ack-{request_id}"),
        })
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    async fn qr_codes(&self) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(4);
        let _ = tx.send(format!("MOCK-QR-{}", Uuid::new_v4().simple())).await;
        rx
    }

    fn register_sink(&self, sink: Arc<dyn EventSink>) {
        *self.sink.lock().unwrap() = Some(sink);
    }

    async fn pair_phone(&self, e164: &str) -> Result<String, ProtocolError> {
        if e164.trim().is_empty() {
            return Err(ProtocolError::PairError("empty phone number".into()));
        }
        Ok(format!("{:06}", (e164.len() as u32 * 7919) % 1_000_000))
    }

    async fn upload_media(&self, bytes: Vec<u8>, kind: &str) -> Result<MediaDescriptor, ProtocolError> {
        Ok(MediaDescriptor {
            url: format!("mock://media/{}", Uuid::new_v4()),
            mime_type: kind.to_string(),
            size_bytes: bytes.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingSink {
        events: StdMutex<Vec<EventName>>,
    }

    impl EventSink for RecordingSink {
        fn handle(&self, event: ProtocolEvent) {
            self.events.lock().unwrap().push(event.name);
        }
    }

    #[tokio::test]
    async fn unpaired_connect_emits_qr_and_does_not_authenticate() {
        let client = MockProtocolClient::new();
        let sink = Arc::new(RecordingSink { events: StdMutex::new(Vec::new()) });
        client.register_sink(sink.clone());

        client.connect().await.unwrap();

        assert!(client.is_connected().await);
        assert!(!client.is_logged_in().await);
        assert_eq!(sink.events.lock().unwrap().as_slice(), &[EventName::Qr]);
    }

    #[tokio::test]
    async fn simulate_scan_completes_pairing() {
        let client = MockProtocolClient::new();
        let sink = Arc::new(RecordingSink { events: StdMutex::new(Vec::new()) });
        client.register_sink(sink.clone());

        client.connect().await.unwrap();
        client.simulate_scan("1234@s.whatsapp.net");

        assert!(client.is_logged_in().await);
        assert_eq!(sink.events.lock().unwrap().as_slice(), &[EventName::Qr, EventName::PairSuccess]);
    }

    #[tokio::test]
    async fn resuming_connect_authenticates_without_a_qr_code() {
        let client = MockProtocolClient::resuming("1234@s.whatsapp.net");
        let sink = Arc::new(RecordingSink { events: StdMutex::new(Vec::new()) });
        client.register_sink(sink.clone());

        client.connect().await.unwrap();

        assert!(client.is_connected().await);
        assert!(client.is_logged_in().await);
        assert_eq!(sink.events.lock().unwrap().as_slice(), &[EventName::Connected]);
    }

    #[tokio::test]
    async fn qr_codes_stream_yields_a_nonempty_code() {
        let client = MockProtocolClient::new();
        let mut rx = client.qr_codes().await;
        let code = rx.recv().await.unwrap();
        assert!(!code.is_empty());
    }

    #[tokio::test]
    async fn send_message_before_connect_fails() {
        let client = MockProtocolClient::new();
        let err = client.send_message("123@s.whatsapp.net", serde_json::json!({}), "r1").await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn logout_clears_both_connected_and_logged_in() {
        let client = MockProtocolClient::new();
        client.connect().await.unwrap();
        client.logout().await.unwrap();
        assert!(!client.is_connected().await);
        assert!(!client.is_logged_in().await);
    }
}
