// PocketBase client
//
// Owns the auth store, the request pipeline and the realtime manager.
// Everything is constructed eagerly in `with_config`; nothing is created
// lazily on first access.

use std::sync::Arc;

use tracing::debug;

use crate::auth_store::AuthStore;
use crate::error::Error;
use crate::models::HealthStatus;
use crate::pipeline::{Middleware, Pipeline, RequestOptions};
use crate::realtime::{ReconnectConfig, RealtimeService};
use crate::records::RecordService;
use crate::token_store::TokenStore;
use crate::transport::TransportConfig;

/// Everything needed to build a [`Client`].
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub transport: TransportConfig,
    pub reconnect: ReconnectConfig,
    /// Session persistence; memory-only when `None`.
    pub token_store: Option<Arc<dyn TokenStore>>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("transport", &self.transport)
            .field("reconnect", &self.reconnect)
            .field("token_store", &self.token_store.is_some())
            .finish()
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            transport: TransportConfig::default(),
            reconnect: ReconnectConfig::default(),
            token_store: None,
        }
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }
}

/// Async client for a PocketBase-compatible backend.
///
/// Dropping the client cancels the realtime connection.
pub struct Client {
    pipeline: Arc<Pipeline>,
    realtime: RealtimeService,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.pipeline.base_url())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Client with default transport settings and an in-memory session.
    pub fn new(base_url: &str) -> Result<Self, Error> {
        Self::with_config(ClientConfig::new(base_url))
    }

    /// Build both HTTP clients from the transport config.
    pub fn with_config(config: ClientConfig) -> Result<Self, Error> {
        let http = config.transport.build_client()?;
        let streaming = config.transport.build_streaming_client()?;
        let auth = Arc::new(match config.token_store {
            Some(store) => AuthStore::with_persistence(store),
            None => AuthStore::new(),
        });
        Self::assemble(&config.base_url, http, streaming, auth, config.reconnect)
    }

    /// Wrap an existing `reqwest::Client` for both requests and realtime.
    pub fn from_reqwest(
        base_url: &str,
        http: reqwest::Client,
        reconnect: ReconnectConfig,
    ) -> Result<Self, Error> {
        Self::assemble(
            base_url,
            http.clone(),
            http,
            Arc::new(AuthStore::new()),
            reconnect,
        )
    }

    fn assemble(
        base_url: &str,
        http: reqwest::Client,
        streaming: reqwest::Client,
        auth: Arc<AuthStore>,
        reconnect: ReconnectConfig,
    ) -> Result<Self, Error> {
        let pipeline = Arc::new(Pipeline::new(http, base_url, auth)?);
        let realtime = RealtimeService::new(Arc::clone(&pipeline), streaming, reconnect);
        debug!(base_url = %pipeline.base_url(), "client constructed");
        Ok(Self { pipeline, realtime })
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn base_url(&self) -> &str {
        self.pipeline.base_url()
    }

    pub fn auth_store(&self) -> &Arc<AuthStore> {
        self.pipeline.auth_store()
    }

    pub fn realtime(&self) -> &RealtimeService {
        &self.realtime
    }

    /// The request pipeline, for endpoints without a typed wrapper.
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Append a middleware; it runs after those already registered.
    pub fn add_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.pipeline.add_middleware(middleware);
    }

    /// Record operations for `collection` (id or name).
    pub fn collection(&self, collection: &str) -> RecordService {
        RecordService::new(
            Arc::clone(&self.pipeline),
            self.realtime.clone(),
            collection,
        )
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET /api/health`.
    pub async fn health(&self) -> Result<HealthStatus, Error> {
        self.pipeline
            .send_as("/api/health", RequestOptions::get())
            .await
    }

    /// Cancel the realtime connection. Ordinary requests are unaffected.
    pub fn close(&self) {
        self.realtime.close();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.realtime.close();
    }
}
