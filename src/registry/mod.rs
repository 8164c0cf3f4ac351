//! Session Registry & Lifecycle — the hardest part of the control plane.
//! Owns the concurrent mapping `{session id -> live adapter}` and drives
//! the per-session state machine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, RwLock};
use uuid::Uuid;

use crate::db::{NewSession, ProxyConfig, Session, SessionRepository, SessionStatus};
use crate::error::{GatewayError, Result};
use crate::metrics::Metrics;
use crate::protocol::{EventName, EventSink, ProtocolClient, ProtocolEvent};
use crate::router::EventRouter;

/// `CreateSession` input. Id and API key are generated when not
/// supplied.
#[derive(Debug, Clone, Default)]
pub struct NewSessionConfig {
    pub name: String,
    pub session_id: Option<Uuid>,
    pub api_key: Option<String>,
    pub proxy: Option<ProxyConfig>,
    pub auto_reconnect: bool,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub enum ConnectOutcome {
    QrCode { qr_code: String, timeout_secs: u64 },
    Authenticated,
}

/// Built once at startup and invoked per adapter. The `Option<String>` is
/// the session's persisted JID, if any, so a real protocol client (or the
/// mock) can resume an already-paired identity instead of issuing a fresh
/// QR challenge on restart reconciliation.
pub type AdapterFactory = dyn Fn(Option<String>) -> Arc<dyn ProtocolClient> + Send + Sync;

pub struct SessionRegistry {
    sessions_repo: Arc<dyn SessionRepository>,
    router: Arc<EventRouter>,
    metrics: Arc<Metrics>,
    adapter_factory: Arc<AdapterFactory>,
    adapters: RwLock<HashMap<Uuid, Arc<dyn ProtocolClient>>>,
    locks: RwLock<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
    qr_timeout: Duration,
    reconnect_deadline: Duration,
}

impl SessionRegistry {
    pub fn new(
        sessions_repo: Arc<dyn SessionRepository>,
        router: Arc<EventRouter>,
        metrics: Arc<Metrics>,
        adapter_factory: Arc<AdapterFactory>,
        qr_timeout: Duration,
        reconnect_deadline: Duration,
    ) -> Self {
        Self {
            sessions_repo,
            router,
            metrics,
            adapter_factory,
            adapters: RwLock::new(HashMap::new()),
            locks: RwLock::new(HashMap::new()),
            qr_timeout,
            reconnect_deadline,
        }
    }

    async fn lock_for(&self, id: Uuid) -> Arc<AsyncMutex<()>> {
        if let Some(lock) = self.locks.read().await.get(&id) {
            return lock.clone();
        }
        let mut locks = self.locks.write().await;
        locks.entry(id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// `CreateSession(config)`.
    pub async fn create_session(&self, config: NewSessionConfig) -> Result<Session> {
        validate_session_name(&config.name)?;

        let id = config.session_id.unwrap_or_else(Uuid::new_v4);
        let api_key = config.api_key.unwrap_or_else(generate_api_key);
        if api_key.len() < 32 {
            return Err(GatewayError::Validation("api_key must be at least 32 characters".into()));
        }

        let new = NewSession {
            id,
            name: config.name,
            api_key,
            proxy: config.proxy,
            auto_reconnect: config.auto_reconnect,
            metadata: config.metadata,
        };
        Ok(self.sessions_repo.create(new).await?)
    }

    /// `DeleteSession(id)`: adapter shutdown happens before the row is
    /// deleted; if shutdown fails the row survives.
    pub async fn delete_session(&self, id: Uuid) -> Result<()> {
        let _guard = self.lock_for(id).await.lock_owned().await;

        let adapter = self.adapters.read().await.get(&id).cloned();
        if let Some(adapter) = adapter {
            adapter
                .disconnect()
                .await
                .map_err(|err| GatewayError::Transport(err.to_string()))?;
        }
        self.adapters.write().await.remove(&id);
        self.locks.write().await.remove(&id);

        self.sessions_repo.delete(id).await?;
        Ok(())
    }

    /// `ConnectSession(id)`. Create-if-missing is permitted;
    /// this is the only place adapters are added to the registry during
    /// normal operation.
    pub async fn connect_session(&self, id: Uuid) -> Result<ConnectOutcome> {
        let _guard = self.lock_for(id).await.lock_owned().await;

        let session = self.sessions_repo.get_by_identifier(&id.to_string()).await?;

        let adapter = self.get_or_create_adapter(id, session.jid.clone()).await;
        self.sessions_repo.set_status(id, SessionStatus::Connecting).await?;

        adapter.connect().await.map_err(|err| GatewayError::Transport(err.to_string()))?;

        if adapter.is_logged_in().await {
            self.sessions_repo.set_status(id, SessionStatus::Authenticated).await?;
            self.sessions_repo.touch_last_connected(id).await?;
            return Ok(ConnectOutcome::Authenticated);
        }

        let mut qr_rx = adapter.qr_codes().await;
        match tokio::time::timeout(self.qr_timeout, qr_rx.recv()).await {
            Ok(Some(qr_code)) => Ok(ConnectOutcome::QrCode {
                qr_code,
                timeout_secs: self.qr_timeout.as_secs(),
            }),
            _ => {
                self.sessions_repo.set_status(id, SessionStatus::Error).await?;
                Err(GatewayError::QrFailed("no QR code produced before timeout".into()))
            }
        }
    }

    /// `DisconnectSession(id)`: idempotent.
    pub async fn disconnect_session(&self, id: Uuid) -> Result<()> {
        let _guard = self.lock_for(id).await.lock_owned().await;

        if let Some(adapter) = self.adapters.read().await.get(&id).cloned() {
            adapter.disconnect().await.map_err(|err| GatewayError::Transport(err.to_string()))?;
        }
        self.sessions_repo.set_status(id, SessionStatus::Disconnected).await?;
        Ok(())
    }

    pub async fn logout_session(&self, id: Uuid) -> Result<()> {
        let _guard = self.lock_for(id).await.lock_owned().await;

        if let Some(adapter) = self.adapters.read().await.get(&id).cloned() {
            adapter.logout().await.map_err(|err| GatewayError::Transport(err.to_string()))?;
        }
        self.sessions_repo.set_status(id, SessionStatus::Disconnected).await?;
        self.sessions_repo.set_jid(id, None).await?;
        Ok(())
    }

    /// `GetQRCode(id)`: returns the current QR string if the adapter is
    /// pairing. A session that isn't mid-pairing (already authenticated,
    /// disconnected, etc.) has no QR code to give and answers
    /// [`GatewayError::QrFailed`], same as a real timeout would.
    pub async fn get_qr_code(&self, id: Uuid) -> Result<String> {
        let session = self.sessions_repo.get_by_identifier(&id.to_string()).await?;
        if session.status != SessionStatus::Connecting {
            return Err(GatewayError::QrFailed("session is not pairing".into()));
        }

        let adapter = self
            .adapters
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| GatewayError::QrFailed("no live adapter for session".into()))?;

        let mut qr_rx = adapter.qr_codes().await;
        tokio::time::timeout(self.qr_timeout, qr_rx.recv())
            .await
            .ok()
            .flatten()
            .ok_or_else(|| GatewayError::QrFailed("no QR code available".into()))
    }

    /// `GetClient(id)`: fails with `session_not_ready` if the adapter is
    /// absent or not connected.
    pub async fn get_client(&self, id: Uuid) -> Result<Arc<dyn ProtocolClient>> {
        let adapter = self
            .adapters
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| GatewayError::NotReady("session has no live adapter".into()))?;

        if !adapter.is_connected().await {
            return Err(GatewayError::NotReady("session adapter is not connected".into()));
        }
        Ok(adapter)
    }

    async fn get_or_create_adapter(&self, id: Uuid, existing_jid: Option<String>) -> Arc<dyn ProtocolClient> {
        if let Some(adapter) = self.adapters.read().await.get(&id).cloned() {
            return adapter;
        }

        let mut adapters = self.adapters.write().await;
        adapters
            .entry(id)
            .or_insert_with(|| {
                let adapter = (self.adapter_factory)(existing_jid);
                adapter.register_sink(Arc::new(RegistrySink {
                    session_id: id,
                    sessions_repo: self.sessions_repo.clone(),
                    router: self.router.clone(),
                }));
                adapter
            })
            .clone()
    }

    /// `PairPhone(id, e164)`: requests a linking code from the adapter for
    /// the one-time-code pairing flow.
    pub async fn pair_phone(&self, id: Uuid, e164: &str) -> Result<String> {
        let session = self.sessions_repo.get_by_identifier(&id.to_string()).await?;
        let adapter = self.get_or_create_adapter(id, session.jid.clone()).await;
        adapter
            .pair_phone(e164)
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))
    }

    /// Enumerates every persisted Session at start-up and reconnects the
    /// ones that were connected/authenticated or marked auto-reconnect
    /// on restart. Adapters that miss their per-session deadline
    /// transition to `error` but stay registered.
    pub async fn reconcile(&self) {
        let sessions = match self.sessions_repo.list_all().await {
            Ok(sessions) => sessions,
            Err(err) => {
                tracing::error!(error = %err, "failed to list sessions for restart reconciliation");
                return;
            }
        };

        for session in sessions {
            let should_reconnect = session.auto_reconnect
                || matches!(session.status, SessionStatus::Connected | SessionStatus::Authenticated);
            if !should_reconnect {
                continue;
            }

            let id = session.id;
            match tokio::time::timeout(self.reconnect_deadline, self.connect_session(id)).await {
                Ok(Ok(_)) => {
                    self.metrics.incr_reconnections();
                    let _ = self.sessions_repo.increment_reconnections(id).await;
                }
                Ok(Err(err)) => {
                    tracing::warn!(%id, error = %err, "restart reconciliation failed to connect session");
                    let _ = self.sessions_repo.set_status(id, SessionStatus::Error).await;
                }
                Err(_) => {
                    tracing::warn!(%id, "restart reconciliation deadline exceeded");
                    let _ = self.sessions_repo.set_status(id, SessionStatus::Error).await;
                }
            }
        }
    }
}

/// Applies the lifecycle consequence of one protocol event to the
/// persisted Session row, then forwards the event unmodified to the
/// router — adapters must not rewrite events.
struct RegistrySink {
    session_id: Uuid,
    sessions_repo: Arc<dyn SessionRepository>,
    router: Arc<EventRouter>,
}

impl EventSink for RegistrySink {
    fn handle(&self, event: ProtocolEvent) {
        let session_id = self.session_id;
        let sessions_repo = self.sessions_repo.clone();
        let router = self.router.clone();
        tokio::spawn(async move {
            apply_lifecycle_transition(sessions_repo.as_ref(), session_id, &event).await;
            router.route(session_id, event).await;
        });
    }
}

async fn apply_lifecycle_transition(
    sessions_repo: &dyn SessionRepository,
    session_id: Uuid,
    event: &ProtocolEvent,
) {
    let result = match event.name {
        EventName::PairSuccess => {
            let jid = event.data.get("jid").and_then(|v| v.as_str()).map(str::to_string);
            let _ = sessions_repo.set_jid(session_id, jid.as_deref()).await;
            sessions_repo.set_status(session_id, SessionStatus::Authenticated).await
        }
        EventName::Connected => sessions_repo.set_status(session_id, SessionStatus::Connected).await,
        EventName::Disconnected => sessions_repo.set_status(session_id, SessionStatus::Disconnected).await,
        EventName::LoggedOut => {
            let _ = sessions_repo.set_jid(session_id, None).await;
            sessions_repo.set_status(session_id, SessionStatus::Disconnected).await
        }
        EventName::ConnectFailure | EventName::PairError => {
            sessions_repo.set_status(session_id, SessionStatus::Error).await
        }
        _ => return,
    };
    if let Err(err) = result {
        tracing::error!(%session_id, error = %err, "failed to apply lifecycle transition");
    }
}

fn validate_session_name(name: &str) -> Result<()> {
    let len_ok = (3..=50).contains(&name.len());
    let chars_ok = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if len_ok && chars_ok {
        Ok(())
    } else {
        Err(GatewayError::Validation(format!(
            "session name {name:?} must be 3-50 characters of [A-Za-z0-9_-]"
        )))
    }
}

fn generate_api_key() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MessageRepository, SqliteMessageRepository, SqliteSessionRepository, SqliteWebhookRepository, WebhookRepository};
    use crate::protocol::MockProtocolClient;
    use sqlx::SqlitePool;
    use tokio::sync::mpsc;

    async fn registry() -> SessionRegistry {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::db::schema::init_schema(&pool).await.unwrap();

        let sessions_repo: Arc<dyn SessionRepository> = Arc::new(SqliteSessionRepository::new(pool.clone()));
        let webhooks_repo: Arc<dyn WebhookRepository> = Arc::new(SqliteWebhookRepository::new(pool.clone()));
        let messages_repo: Arc<dyn MessageRepository> = Arc::new(SqliteMessageRepository::new(pool));
        let (tx, _rx) = mpsc::channel(100);
        let router = Arc::new(EventRouter::new(webhooks_repo, sessions_repo.clone(), messages_repo, tx, Arc::new(Metrics::new())));

        SessionRegistry::new(
            sessions_repo,
            router,
            Arc::new(Metrics::new()),
            Arc::new(|existing_jid: Option<String>| -> Arc<dyn ProtocolClient> {
                match existing_jid {
                    Some(jid) => Arc::new(MockProtocolClient::resuming(&jid)),
                    None => Arc::new(MockProtocolClient::new()),
                }
            }),
            Duration::from_millis(200),
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn create_session_rejects_bad_name() {
        let registry = registry().await;
        let err = registry
            .create_session(NewSessionConfig { name: "ab".into(), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[tokio::test]
    async fn create_then_connect_produces_a_qr_code_when_unpaired() {
        let registry = registry().await;
        let session = registry
            .create_session(NewSessionConfig { name: "happy-path".into(), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::Disconnected);

        let outcome = registry.connect_session(session.id).await.unwrap();
        match outcome {
            ConnectOutcome::QrCode { qr_code, timeout_secs } => {
                assert!(!qr_code.is_empty());
                assert_eq!(timeout_secs, 0); // qr_timeout is sub-second in this test config
            }
            ConnectOutcome::Authenticated => panic!("mock should not auto-pair on connect"),
        }
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let registry = registry().await;
        let session = registry
            .create_session(NewSessionConfig { name: "idempotent-disconnect".into(), ..Default::default() })
            .await
            .unwrap();

        registry.disconnect_session(session.id).await.unwrap();
        registry.disconnect_session(session.id).await.unwrap();
    }

    #[tokio::test]
    async fn delete_removes_adapter_and_row() {
        let registry = registry().await;
        let session = registry
            .create_session(NewSessionConfig { name: "to-delete".into(), ..Default::default() })
            .await
            .unwrap();
        registry.connect_session(session.id).await.unwrap();

        registry.delete_session(session.id).await.unwrap();

        match registry.get_client(session.id).await {
            Err(err) => assert!(matches!(err, GatewayError::NotReady(_))),
            Ok(_) => panic!("expected not ready after delete"),
        }
    }

    #[tokio::test]
    async fn get_client_before_connect_is_not_ready() {
        let registry = registry().await;
        let session = registry
            .create_session(NewSessionConfig { name: "never-connected".into(), ..Default::default() })
            .await
            .unwrap();

        match registry.get_client(session.id).await {
            Err(err) => assert!(matches!(err, GatewayError::NotReady(_))),
            Ok(_) => panic!("expected not ready before connect"),
        }
    }
}
