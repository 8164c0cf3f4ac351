//! Event Router. Every `ProtocolClient` sink installed by
//! the Session Registry funnels here. The router stamps identity, forwards
//! persistable events to Message Persistence, and enqueues a `DeliveryItem`
//! for any session with a matching Webhook Subscription. It holds no locks
//! across I/O.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::db::{MessageRepository, SessionRepository, WebhookRepository};
use crate::messages::{apply_receipt_event, persist_message_event};
use crate::metrics::Metrics;
use crate::protocol::{EventName, EventSink, ProtocolEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadMode {
    NativeRaw,
    Processed,
}

impl PayloadMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PayloadMode::NativeRaw => "native_raw",
            PayloadMode::Processed => "processed",
        }
    }
}

/// One unit handed off from the router to the Webhook Delivery Engine.
/// Carries everything the engine needs to serialize the wire payload
/// without querying anything else.
#[derive(Debug, Clone)]
pub struct DeliveryItem {
    pub session_id: Uuid,
    pub event_name: EventName,
    pub event_type_tag: String,
    pub raw_event_data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub payload_mode: PayloadMode,
    pub session_jid: Option<String>,
    pub session_name: String,
}

#[derive(Debug, Clone)]
struct CachedSubscription {
    url: String,
    events: HashSet<String>,
    raw_mode: bool,
    session_jid: Option<String>,
    session_name: String,
}

pub struct EventRouter {
    webhooks_repo: Arc<dyn WebhookRepository>,
    sessions_repo: Arc<dyn SessionRepository>,
    messages_repo: Arc<dyn MessageRepository>,
    delivery_tx: mpsc::Sender<DeliveryItem>,
    metrics: Arc<Metrics>,
    cache: RwLock<HashMap<Uuid, Option<CachedSubscription>>>,
}

impl EventRouter {
    pub fn new(
        webhooks_repo: Arc<dyn WebhookRepository>,
        sessions_repo: Arc<dyn SessionRepository>,
        messages_repo: Arc<dyn MessageRepository>,
        delivery_tx: mpsc::Sender<DeliveryItem>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            webhooks_repo,
            sessions_repo,
            messages_repo,
            delivery_tx,
            metrics,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Called by webhook upsert/delete handlers so the router never serves
    /// a stale subscription.
    pub async fn invalidate(&self, session_id: Uuid) {
        self.cache.write().await.remove(&session_id);
    }

    pub async fn route(&self, session_id: Uuid, event: ProtocolEvent) {
        let timestamp = Utc::now();

        if event.name.persists_to_messages() {
            match event.name {
                EventName::Message => {
                    persist_message_event(self.messages_repo.as_ref(), session_id, &event).await
                }
                EventName::Receipt => {
                    apply_receipt_event(self.messages_repo.as_ref(), session_id, &event).await
                }
                _ => {}
            }
        }

        let Some(subscription) = self.get_or_load_subscription(session_id).await else {
            return;
        };
        if !subscription.events.contains(event.name.as_str()) {
            return;
        }

        let item = DeliveryItem {
            session_id,
            event_name: event.name,
            event_type_tag: event.event_type_tag,
            raw_event_data: event.data,
            timestamp,
            url: subscription.url,
            payload_mode: if subscription.raw_mode { PayloadMode::NativeRaw } else { PayloadMode::Processed },
            session_jid: subscription.session_jid,
            session_name: subscription.session_name,
        };

        if self.delivery_tx.try_send(item).is_err() {
            self.metrics.incr_dropped_events();
            tracing::warn!(%session_id, event = event.name.as_str(), "delivery queue full, dropping event");
        }
    }

    async fn get_or_load_subscription(&self, session_id: Uuid) -> Option<CachedSubscription> {
        if let Some(cached) = self.cache.read().await.get(&session_id) {
            return cached.clone();
        }

        let webhook = match self.webhooks_repo.get_by_session_id(session_id).await {
            Ok(webhook) if webhook.active => Some(webhook),
            Ok(_) => None,
            Err(_) => None,
        };

        let cached = match webhook {
            Some(webhook) => {
                let session = self.sessions_repo.get_by_identifier(&session_id.to_string()).await.ok();
                Some(CachedSubscription {
                    url: webhook.url,
                    events: webhook.events.into_iter().collect(),
                    raw_mode: webhook.raw_mode,
                    session_jid: session.as_ref().and_then(|s| s.jid.clone()),
                    session_name: session.map(|s| s.name).unwrap_or_default(),
                })
            }
            None => None,
        };

        self.cache.write().await.insert(session_id, cached.clone());
        cached
    }
}

/// Binds a live adapter's generic [`EventSink`] callback to one session's
/// identity before handing the event to the router — the adapter itself
/// knows nothing about sessions, keeping the adapter→sink dependency
/// acyclic.
pub struct SessionSink {
    pub session_id: Uuid,
    pub router: Arc<EventRouter>,
}

impl EventSink for SessionSink {
    fn handle(&self, event: ProtocolEvent) {
        let router = self.router.clone();
        let session_id = self.session_id;
        tokio::spawn(async move {
            router.route(session_id, event).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        NewSession, Pagination, SqliteMessageRepository, SqliteSessionRepository,
        SqliteWebhookRepository, WebhookUpsert,
    };
    use sqlx::SqlitePool;

    async fn pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::db::schema::init_schema(&pool).await.unwrap();
        pool
    }

    async fn seed_session(sessions_repo: &SqliteSessionRepository, name: &str) -> Uuid {
        let new = NewSession {
            id: Uuid::new_v4(),
            name: name.to_string(),
            api_key: "k".repeat(32),
            proxy: None,
            auto_reconnect: false,
            metadata: serde_json::json!({}),
        };
        sessions_repo.create(new.clone()).await.unwrap();
        new.id
    }

    fn message_event(id: &str) -> ProtocolEvent {
        ProtocolEvent {
            name: EventName::Message,
            event_type_tag: "*events.Message".into(),
            data: serde_json::json!({
                "Info": {"ID": id, "Chat": "c@s.whatsapp.net", "Sender": "u@s.whatsapp.net", "Timestamp": "2024-01-01T00:00:00Z", "IsFromMe": false},
                "Message": {"conversation": "hello"}
            }),
        }
    }

    #[tokio::test]
    async fn event_with_no_subscription_is_not_enqueued() {
        let pool = pool().await;
        let sessions_repo = Arc::new(SqliteSessionRepository::new(pool.clone()));
        let webhooks_repo = Arc::new(SqliteWebhookRepository::new(pool.clone()));
        let messages_repo = Arc::new(SqliteMessageRepository::new(pool.clone()));
        let session_id = seed_session(&sessions_repo, "s1").await;

        let (tx, mut rx) = mpsc::channel(10);
        let router = EventRouter::new(webhooks_repo, sessions_repo, messages_repo, tx, Arc::new(Metrics::new()));

        router.route(session_id, message_event("m1")).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn subscribed_event_is_enqueued_with_native_raw_fidelity() {
        let pool = pool().await;
        let sessions_repo = Arc::new(SqliteSessionRepository::new(pool.clone()));
        let webhooks_repo = Arc::new(SqliteWebhookRepository::new(pool.clone()));
        let messages_repo = Arc::new(SqliteMessageRepository::new(pool.clone()));
        let session_id = seed_session(&sessions_repo, "s2").await;

        webhooks_repo
            .upsert(
                session_id,
                WebhookUpsert {
                    url: "https://example.com/hook".into(),
                    events: vec!["message".into()],
                    raw_mode: true,
                    active: true,
                },
            )
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(10);
        let router = EventRouter::new(webhooks_repo, sessions_repo, messages_repo, tx, Arc::new(Metrics::new()));

        let event = message_event("m1");
        let expected_raw = event.data.clone();
        router.route(session_id, event).await;

        let item = rx.try_recv().unwrap();
        assert_eq!(item.payload_mode, PayloadMode::NativeRaw);
        assert_eq!(item.raw_event_data, expected_raw);
        assert_eq!(item.url, "https://example.com/hook");
    }

    #[tokio::test]
    async fn message_event_persists_regardless_of_subscription() {
        let pool = pool().await;
        let sessions_repo = Arc::new(SqliteSessionRepository::new(pool.clone()));
        let webhooks_repo = Arc::new(SqliteWebhookRepository::new(pool.clone()));
        let messages_repo = Arc::new(SqliteMessageRepository::new(pool.clone()));
        let session_id = seed_session(&sessions_repo, "s3").await;

        let (tx, _rx) = mpsc::channel(10);
        let router = EventRouter::new(webhooks_repo, sessions_repo, messages_repo.clone(), tx, Arc::new(Metrics::new()));

        router.route(session_id, message_event("persist-me")).await;

        let messages = messages_repo
            .list_by_session_and_chat(session_id, "c@s.whatsapp.net", Pagination::default())
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn full_queue_drops_and_counts() {
        let pool = pool().await;
        let sessions_repo = Arc::new(SqliteSessionRepository::new(pool.clone()));
        let webhooks_repo = Arc::new(SqliteWebhookRepository::new(pool.clone()));
        let messages_repo = Arc::new(SqliteMessageRepository::new(pool.clone()));
        let session_id = seed_session(&sessions_repo, "s4").await;

        webhooks_repo
            .upsert(
                session_id,
                WebhookUpsert { url: "https://example.com/hook".into(), events: vec!["message".into()], raw_mode: true, active: true },
            )
            .await
            .unwrap();

        let (tx, _rx) = mpsc::channel(1);
        tx.try_send(DeliveryItem {
            session_id,
            event_name: EventName::Message,
            event_type_tag: "*events.Message".into(),
            raw_event_data: serde_json::json!({}),
            timestamp: Utc::now(),
            url: "https://example.com/hook".into(),
            payload_mode: PayloadMode::NativeRaw,
            session_jid: None,
            session_name: "s4".into(),
        })
        .unwrap();

        let metrics = Arc::new(Metrics::new());
        let router = EventRouter::new(webhooks_repo, sessions_repo, messages_repo, tx, metrics.clone());

        router.route(session_id, message_event("overflow")).await;
        assert_eq!(metrics.snapshot().dropped_events, 1);
    }
}
