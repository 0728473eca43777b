//! Realtime subscriptions over a single SSE connection.
//!
//! One [`RealtimeService`] per client. The first [`subscribe`] spawns a
//! background task that opens `GET /api/realtime`, waits for the
//! `PB_CONNECT` marker, registers the current topic set with
//! `POST /api/realtime`, and routes every named frame to the listeners of
//! that topic. Dropped connections are retried with exponential backoff
//! and the topics are registered again on the new client id.
//!
//! ```rust,ignore
//! let sub = client
//!     .realtime()
//!     .subscribe("posts", |msg| println!("{msg:?}"))
//!     .await?;
//! // ...
//! sub.unsubscribe().await?;
//! ```
//!
//! [`subscribe`]: RealtimeService::subscribe

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::models::{RealtimeEvent, RealtimeMessage};
use crate::pipeline::{Pipeline, RequestOptions};
use crate::sse::{SseEvent, sse_events};

/// Pseudo-topic that receives [`RealtimeMessage::Connected`].
pub const PB_CONNECT: &str = "PB_CONNECT";

const REALTIME_PATH: &str = "/api/realtime";

/// Listener invoked for every message routed to its topic.
pub type RealtimeCallback = Arc<dyn Fn(&RealtimeMessage) + Send + Sync>;

type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for realtime reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    /// A `retry:` field from the server replaces it.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum consecutive failed attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── Shared state ─────────────────────────────────────────────────────

struct Listener {
    id: u64,
    callback: RealtimeCallback,
}

struct Connection {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Shared {
    pipeline: Arc<Pipeline>,
    /// Client without a total request timeout.
    http: reqwest::Client,
    reconnect: ReconnectConfig,
    listeners: DashMap<String, Vec<Listener>>,
    next_listener_id: AtomicU64,
    client_id: RwLock<Option<String>>,
    error_listeners: RwLock<Vec<ErrorCallback>>,
    connection: Mutex<Option<Connection>>,
    /// Held from topic snapshot until the POST completes, so a later
    /// registration never carries an older topic set.
    registration: tokio::sync::Mutex<()>,
}

impl Shared {
    fn client_id(&self) -> Option<String> {
        self.client_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_client_id(&self, id: Option<String>) {
        *self.client_id.write().unwrap_or_else(PoisonError::into_inner) = id;
    }

    /// Registered topics, sorted, without the connect pseudo-topic.
    fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .listeners
            .iter()
            .filter(|entry| entry.key() != PB_CONNECT && !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        topics.sort();
        topics
    }

    /// Tell the server which topics this client id listens to.
    async fn submit_subscriptions(&self) -> Result<(), Error> {
        let _registration = self.registration.lock().await;
        let Some(client_id) = self.client_id() else {
            return Ok(());
        };
        let topics = self.topics();
        tracing::debug!(client_id = %client_id, ?topics, "submitting realtime subscriptions");

        let body = json!({ "clientId": client_id, "subscriptions": topics });
        self.pipeline
            .send_empty(REALTIME_PATH, RequestOptions::post(&body)?)
            .await
    }

    fn dispatch(&self, topic: &str, message: &RealtimeMessage) {
        // Clone out so callbacks may (un)subscribe without deadlocking.
        let callbacks: Vec<RealtimeCallback> = self
            .listeners
            .get(topic)
            .map(|entry| entry.iter().map(|l| Arc::clone(&l.callback)).collect())
            .unwrap_or_default();

        for callback in callbacks {
            callback(message);
        }
    }

    fn emit_error(&self, error: &Error) {
        let listeners: Vec<ErrorCallback> = self
            .error_listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(error);
        }
    }

    async fn handle_event(&self, event: SseEvent) {
        if event.event.as_deref() == Some(PB_CONNECT) || event.is_id_only() {
            self.handle_connect(&event).await;
            return;
        }

        let (Some(topic), Some(data)) = (event.event, event.data) else {
            return;
        };

        let payload = serde_json::from_str(&data).unwrap_or(Value::String(data));
        let message = RealtimeMessage::Record(RealtimeEvent::decode(&topic, payload));
        self.dispatch(&topic, &message);
    }

    async fn handle_connect(&self, event: &SseEvent) {
        let from_data = event
            .data
            .as_deref()
            .and_then(|d| serde_json::from_str::<Value>(d).ok())
            .and_then(|v| v.get("clientId").and_then(Value::as_str).map(str::to_owned));
        let Some(client_id) = from_data
            .filter(|id| !id.is_empty())
            .or_else(|| event.id.clone().filter(|id| !id.is_empty()))
        else {
            return;
        };

        if self.client_id().as_deref() == Some(client_id.as_str()) {
            tracing::trace!("realtime keepalive");
            return;
        }

        tracing::info!(client_id = %client_id, "Realtime connected");
        self.set_client_id(Some(client_id.clone()));

        if let Err(e) = self.submit_subscriptions().await {
            tracing::warn!(error = %e, "failed to register realtime subscriptions");
            self.emit_error(&e);
        }

        self.dispatch(PB_CONNECT, &RealtimeMessage::Connected { client_id });
    }
}

// ── RealtimeService ──────────────────────────────────────────────────

/// Realtime subscription manager. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RealtimeService {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RealtimeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeService")
            .field("client_id", &self.shared.client_id())
            .field("topics", &self.shared.topics())
            .finish_non_exhaustive()
    }
}

impl RealtimeService {
    pub(crate) fn new(
        pipeline: Arc<Pipeline>,
        http: reqwest::Client,
        reconnect: ReconnectConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                pipeline,
                http,
                reconnect,
                listeners: DashMap::new(),
                next_listener_id: AtomicU64::new(1),
                client_id: RwLock::new(None),
                error_listeners: RwLock::new(Vec::new()),
                connection: Mutex::new(None),
                registration: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// The id assigned by the server on the current connection.
    pub fn client_id(&self) -> Option<String> {
        self.shared.client_id()
    }

    /// `true` once `PB_CONNECT` has been received on the live connection.
    pub fn is_connected(&self) -> bool {
        self.shared.client_id().is_some()
    }

    /// `true` while the background connection task is alive.
    pub fn is_running(&self) -> bool {
        self.shared
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|c| !c.task.is_finished())
    }

    /// Topics currently registered (excluding `PB_CONNECT`).
    pub fn topics(&self) -> Vec<String> {
        self.shared.topics()
    }

    /// Register a listener for connection and stream errors.
    ///
    /// Non-200 responses from the SSE endpoint land here rather than in
    /// the caller of `subscribe`. Cancellation is never reported.
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.shared
            .error_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Start the background connection if it is not already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut slot = self
            .shared
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if slot.as_ref().is_some_and(|c| !c.task.is_finished()) {
            return;
        }

        let cancel = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            realtime_loop(shared, task_cancel).await;
        });

        *slot = Some(Connection { cancel, task });
    }

    /// Cancel the background task. Safe to call repeatedly.
    pub fn close(&self) {
        let connection = self
            .shared
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(connection) = connection {
            tracing::debug!("closing realtime connection");
            connection.cancel.cancel();
        }
        self.shared.set_client_id(None);
    }

    /// Listen on `topic` (a collection name or `<collection>/<recordId>`,
    /// or [`PB_CONNECT`]).
    ///
    /// Connects on first use. When already connected and the topic is
    /// new, the topic set is re-registered before returning; if that fails
    /// the listener is removed again and the error returned.
    pub async fn subscribe<F>(
        &self,
        topic: impl Into<String>,
        callback: F,
    ) -> Result<Subscription, Error>
    where
        F: Fn(&RealtimeMessage) + Send + Sync + 'static,
    {
        let topic = topic.into();
        let id = self.shared.next_listener_id.fetch_add(1, Ordering::Relaxed);

        let is_new_topic = {
            let mut entry = self.shared.listeners.entry(topic.clone()).or_default();
            let was_empty = entry.is_empty();
            entry.push(Listener {
                id,
                callback: Arc::new(callback),
            });
            was_empty
        };

        tracing::debug!(topic = %topic, "realtime subscribe");

        if !self.is_running() {
            self.connect();
        } else if is_new_topic && topic != PB_CONNECT {
            // Not yet connected means no client id; the connect handler
            // registers the full topic set instead.
            if let Err(e) = self.shared.submit_subscriptions().await {
                self.remove_listener(&topic, id);
                return Err(e);
            }
        }

        Ok(Subscription {
            topic,
            id,
            service: self.clone(),
        })
    }

    /// Drop every listener of `topic`.
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), Error> {
        if self.shared.listeners.remove(topic).is_none() {
            return Ok(());
        }
        self.topics_changed().await
    }

    /// Drop every topic equal to `prefix` or starting with `prefix/`.
    pub async fn unsubscribe_by_prefix(&self, prefix: &str) -> Result<(), Error> {
        let nested = format!("{prefix}/");
        let before = self.shared.listeners.len();
        self.shared
            .listeners
            .retain(|topic, _| topic != prefix && !topic.starts_with(&nested));
        if self.shared.listeners.len() == before {
            return Ok(());
        }
        self.topics_changed().await
    }

    /// Drop every listener and close the connection.
    pub async fn unsubscribe_all(&self) -> Result<(), Error> {
        self.shared.listeners.clear();
        self.topics_changed().await
    }

    /// Returns `true` if `topic` lost its last listener.
    fn remove_listener(&self, topic: &str, id: u64) -> bool {
        let emptied = match self.shared.listeners.get_mut(topic) {
            Some(mut entry) => {
                entry.retain(|l| l.id != id);
                entry.is_empty()
            }
            None => false,
        };
        if emptied {
            self.shared.listeners.remove(topic);
        }
        emptied
    }

    async fn topics_changed(&self) -> Result<(), Error> {
        if self.shared.topics().is_empty() {
            self.close();
            return Ok(());
        }
        self.shared.submit_subscriptions().await
    }
}

// ── Subscription handle ──────────────────────────────────────────────

/// Handle returned by [`RealtimeService::subscribe`].
///
/// Dropping it keeps the listener registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[must_use = "dropping a Subscription does not unsubscribe"]
pub struct Subscription {
    topic: String,
    id: u64,
    service: RealtimeService,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Remove this listener; the topic is dropped when it was the last one.
    pub async fn unsubscribe(self) -> Result<(), Error> {
        if self.service.remove_listener(&self.topic, self.id) {
            self.service.topics_changed().await
        } else {
            Ok(())
        }
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on error, backoff → reconnect.
async fn realtime_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    let mut attempt: u32 = 0;
    let mut config = shared.reconnect.clone();

    loop {
        let mut retry_hint = None;
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&shared, &mut retry_hint) => result,
        };

        shared.set_client_id(None);
        if let Some(hint) = retry_hint {
            config.initial_delay = hint;
        }

        let delay = match result {
            // Stream ended without an error. Reset the attempt counter.
            Ok(()) => {
                tracing::info!("Realtime stream ended, reconnecting");
                attempt = 0;
                calculate_backoff(0, &config)
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "Realtime connection error");
                shared.emit_error(&e);

                if let Some(max) = config.max_retries {
                    if attempt >= max {
                        tracing::error!(
                            max_retries = max,
                            "Realtime reconnection limit reached, giving up"
                        );
                        break;
                    }
                }

                let delay = calculate_backoff(attempt, &config);
                attempt += 1;
                delay
            }
        };

        tracing::info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "Waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    shared.set_client_id(None);
    tracing::debug!("Realtime loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Open one SSE connection and read frames until it drops.
async fn connect_and_read(
    shared: &Shared,
    retry_hint: &mut Option<Duration>,
) -> Result<(), Error> {
    let url = shared.pipeline.build_url(REALTIME_PATH, &[]);
    tracing::info!(url = %url, "Connecting to realtime stream");

    let mut request = shared
        .http
        .get(&url)
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache");

    let token = shared.pipeline.auth_store().token();
    if !token.is_empty() {
        request = request.header(AUTHORIZATION, token);
    }

    let resp = request.send().await?;
    if resp.status() != StatusCode::OK {
        return Err(Error::RealtimeRejected {
            status: resp.status().as_u16(),
        });
    }

    let mut frames = std::pin::pin!(sse_events(resp.bytes_stream()));
    while let Some(frame) = frames.next().await {
        let frame = frame.map_err(|e| Error::RealtimeStream(e.to_string()))?;
        if let Some(ms) = frame.retry {
            *retry_hint = Some(Duration::from_millis(ms));
        }
        shared.handle_event(frame).await;
    }

    Ok(())
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 ± 25%)`
///
/// The jitter is deterministic per attempt, which is enough to spread
/// reconnects from many clients that failed at different times.
#[allow(clippy::cast_precision_loss, clippy::as_conversions, clippy::cast_possible_wrap)]
pub(crate) fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = attempt.min(31) as i32;
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
