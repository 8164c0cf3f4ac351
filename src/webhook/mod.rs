//! Webhook Delivery Engine. A worker pool pulls `DeliveryItem`s off the
//! bounded channel the Event Router feeds, frames the wire payload exactly
//! per the documented JSON shape, and retries failures with exponential
//! backoff and jitter up to a configured bound. A failed delivery is handed
//! to a dedicated retry scheduler rather than slept out on the worker that
//! hit it, so a run of backoffs never eats into capacity first-attempt
//! traffic needs.

use std::future::poll_fn;
use std::sync::Arc;
use std::time::Duration;

use hmac::{Hmac, Mac};
use rand::Rng;
use serde_json::{json, Value};
use sha2::Sha256;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;

use crate::config::Config;
use crate::metrics::Metrics;
use crate::protocol::EventName;
use crate::router::{DeliveryItem, PayloadMode};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: f64,
    pub worker_count: usize,
    pub signing_secret: Option<String>,
}

impl From<&Config> for DeliveryConfig {
    fn from(config: &Config) -> Self {
        Self {
            timeout: config.webhook_timeout,
            max_retries: config.webhook_max_retries,
            base_backoff: config.webhook_base_backoff,
            max_backoff: config.webhook_max_backoff,
            jitter: config.webhook_jitter,
            worker_count: config.webhook_worker_count,
            signing_secret: config.webhook_signing_secret.clone(),
        }
    }
}

pub struct DeliveryEngine {
    client: reqwest::Client,
    config: DeliveryConfig,
    metrics: Arc<Metrics>,
}

impl DeliveryEngine {
    pub fn new(config: DeliveryConfig, metrics: Arc<Metrics>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("reqwest client configuration is static and always valid");
        Self { client, config, metrics }
    }

    /// Spawns the worker pool plus two supporting tasks: an intake task
    /// that turns every item off `rx` into a first-attempt ticket, and a
    /// retry scheduler that holds failed tickets on a [`DelayQueue`] until
    /// their backoff elapses, then feeds them back to the same worker pool.
    /// Workers only ever block on network I/O, never on `sleep` — a string
    /// of backing-off retries can't starve fresh first-attempt items.
    pub fn spawn_workers(
        self: Arc<Self>,
        rx: mpsc::Receiver<DeliveryItem>,
        cancel: CancellationToken,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let worker_count = self.config.worker_count.max(1);
        let (ready_tx, ready_rx) = mpsc::channel::<RetryTicket>(worker_count * 4);
        let (retry_tx, retry_rx) = mpsc::unbounded_channel::<(RetryTicket, Duration)>();

        let mut handles = Vec::with_capacity(worker_count + 2);
        handles.push(tokio::spawn(run_intake(rx, ready_tx.clone(), cancel.clone())));
        handles.push(tokio::spawn(run_retry_scheduler(retry_rx, ready_tx, cancel.clone())));

        let ready_rx = Arc::new(AsyncMutex::new(ready_rx));
        for worker_id in 0..worker_count {
            let engine = self.clone();
            let ready_rx = ready_rx.clone();
            let retry_tx = retry_tx.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move { engine.run_worker(worker_id, ready_rx, retry_tx, cancel).await }));
        }
        handles
    }

    async fn run_worker(
        &self,
        worker_id: usize,
        ready_rx: Arc<AsyncMutex<mpsc::Receiver<RetryTicket>>>,
        retry_tx: mpsc::UnboundedSender<(RetryTicket, Duration)>,
        cancel: CancellationToken,
    ) {
        loop {
            let ticket = {
                let mut guard = ready_rx.lock().await;
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    maybe = guard.recv() => match maybe {
                        Some(ticket) => ticket,
                        None => return,
                    },
                }
            };
            tracing::debug!(
                worker_id,
                session_id = %ticket.item.session_id,
                attempt = ticket.attempt,
                "delivering webhook item"
            );
            self.deliver_once(ticket, &retry_tx).await;
        }
    }

    /// One delivery attempt. On failure, schedules a retry on the shared
    /// [`DelayQueue`] instead of sleeping here, freeing the worker
    /// immediately for the next ready ticket.
    async fn deliver_once(&self, ticket: RetryTicket, retry_tx: &mpsc::UnboundedSender<(RetryTicket, Duration)>) {
        let RetryTicket { item, attempt } = ticket;
        let payload = build_payload(&item);

        self.metrics.incr_delivery_attempts();
        match self.try_deliver(&item, &payload).await {
            Ok(()) => self.metrics.incr_delivery_successes(),
            Err(err) => {
                if attempt >= self.config.max_retries {
                    self.metrics.incr_delivery_failures();
                    tracing::error!(
                        session_id = %item.session_id,
                        event = item.event_name.as_str(),
                        error = %err,
                        "webhook delivery exhausted retries, dropping"
                    );
                    return;
                }
                let delay = self.backoff(attempt);
                tracing::warn!(
                    session_id = %item.session_id,
                    attempt,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "webhook delivery failed, retrying"
                );
                let next = RetryTicket { item, attempt: attempt + 1 };
                if retry_tx.send((next, delay)).is_err() {
                    tracing::error!("retry scheduler gone, dropping webhook delivery");
                }
            }
        }
    }

    async fn try_deliver(&self, item: &DeliveryItem, payload: &Value) -> Result<(), String> {
        let body = serde_json::to_vec(payload).map_err(|err| err.to_string())?;

        let mut request = self
            .client
            .post(&item.url)
            .header("Content-Type", "application/json")
            .header("X-Session-ID", item.session_id.to_string())
            .header("X-Event-Type", item.event_type_tag.clone())
            .header("X-Webhook-Event", item.event_name.as_str())
            .header("X-Payload-Type", item.payload_mode.as_str());

        if let Some(secret) = &self.config.signing_secret {
            request = request.header("X-Webhook-Signature", sign(secret, &body));
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|err| err.to_string())?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("upstream status {}", response.status()))
        }
    }

    /// `min(max_backoff, base_backoff * 2^attempt) * (1 + U(-jitter, +jitter))`.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.config.base_backoff.saturating_mul(1 << attempt.min(16));
        let capped = exp.min(self.config.max_backoff);
        let jitter_factor = 1.0 + rand::rng().random_range(-self.config.jitter..=self.config.jitter);
        capped.mul_f64(jitter_factor.max(0.0))
    }
}

/// A delivery item plus how many attempts it has already had. `attempt == 0`
/// means it has never been tried.
struct RetryTicket {
    item: DeliveryItem,
    attempt: u32,
}

/// Forwards every item the Event Router hands off into the shared ready
/// queue as a fresh, `attempt == 0` ticket.
async fn run_intake(mut rx: mpsc::Receiver<DeliveryItem>, ready_tx: mpsc::Sender<RetryTicket>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            maybe = rx.recv() => match maybe {
                Some(item) => {
                    if ready_tx.send(RetryTicket { item, attempt: 0 }).await.is_err() {
                        return;
                    }
                }
                None => return,
            },
        }
    }
}

/// Holds failed tickets on a [`DelayQueue`] until their backoff elapses,
/// then re-enqueues them onto the same ready queue fresh first attempts use.
/// Keeping this off the worker pool is the whole point: a worker stuck
/// sleeping through a backoff can't pick up first-attempt traffic.
async fn run_retry_scheduler(
    mut retry_rx: mpsc::UnboundedReceiver<(RetryTicket, Duration)>,
    ready_tx: mpsc::Sender<RetryTicket>,
    cancel: CancellationToken,
) {
    let mut queue: DelayQueue<RetryTicket> = DelayQueue::new();
    let mut intake_open = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            scheduled = retry_rx.recv(), if intake_open => match scheduled {
                Some((ticket, delay)) => { queue.insert(ticket, delay); }
                None => { intake_open = false; }
            },
            expired = poll_fn(|cx| queue.poll_expired(cx)), if !queue.is_empty() => {
                if let Some(expired) = expired {
                    if ready_tx.send(expired.into_inner()).await.is_err() {
                        return;
                    }
                }
            },
            else => {
                if !intake_open && queue.is_empty() {
                    return;
                }
            }
        }
    }
}

/// `hex(hmac_sha256(secret, body))`, so consumers can verify a delivery
/// actually came from this gateway and the body wasn't tampered with.
fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts a key of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Builds the wire payload.
fn build_payload(item: &DeliveryItem) -> Value {
    let raw_event_data = match item.payload_mode {
        PayloadMode::NativeRaw => item.raw_event_data.clone(),
        PayloadMode::Processed => simplify_processed(item.event_name, &item.raw_event_data),
    };

    json!({
        "session_id": item.session_id.to_string(),
        "event_type": item.event_type_tag,
        "event_name": item.event_name.as_str(),
        "category": item.event_name.category(),
        "raw_event_data": raw_event_data,
        "event_meta": {
            "whatsmeow_version": env!("CARGO_PKG_VERSION"),
            "session_jid": item.session_jid,
            "server_timestamp": item.timestamp.to_rfc3339(),
            "session_name": item.session_name,
        },
        "timestamp": item.timestamp.to_rfc3339(),
        "payload_type": item.payload_mode.as_str(),
    })
}

/// A stable, simplified shape for legacy consumers ("processed" mode):
/// JIDs as plain strings (already true of the raw shape), timestamps as
/// unix seconds, message body hoisted to the top level.
fn simplify_processed(event_name: EventName, raw: &Value) -> Value {
    if event_name != EventName::Message {
        return raw.clone();
    }

    let mut simplified = json!({});
    if let Some(info) = raw.get("Info") {
        simplified["id"] = info.get("ID").cloned().unwrap_or(Value::Null);
        simplified["chat"] = info.get("Chat").cloned().unwrap_or(Value::Null);
        simplified["sender"] = info.get("Sender").cloned().unwrap_or(Value::Null);
        simplified["is_from_me"] = info.get("IsFromMe").cloned().unwrap_or(Value::Bool(false));
        if let Some(ts) = info.get("Timestamp").and_then(|v| v.as_str()) {
            if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(ts) {
                simplified["timestamp"] = json!(parsed.timestamp());
            }
        }
    }
    if let Some(text) = raw.pointer("/Message/conversation").and_then(|v| v.as_str()) {
        simplified["body"] = json!(text);
    }
    simplified
}
