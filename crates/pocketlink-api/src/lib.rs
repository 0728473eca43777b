//! Async client SDK for PocketBase-compatible backends.
//!
//! - **[`Client`]** owns the session ([`AuthStore`]), the serialized JSON
//!   request [`Pipeline`] with its [`Middleware`] chain, and the
//!   [`RealtimeService`] that multiplexes topic subscriptions over one SSE
//!   connection.
//! - **[`RecordService`]** is the typed per-collection facade: list, get,
//!   create, update, delete, password auth, subscribe.
//! - **[`sse`]** holds the line-level Server-Sent-Events decoder.

pub mod auth_store;
pub mod client;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod realtime;
pub mod records;
pub mod sse;
pub mod token_store;
pub mod transport;

pub use auth_store::{AuthState, AuthStore};
pub use client::{Client, ClientConfig};
pub use error::Error;
pub use models::{
    AuthResponse, ErrorEnvelope, HealthStatus, ListOptions, ListResult, RealtimeAction,
    RealtimeEvent, RealtimeMessage, RecordModel,
};
pub use pipeline::{
    BeforeSendOverride, Middleware, Payload, Pipeline, RequestOptions, ResponseKind, build_url,
};
pub use realtime::{PB_CONNECT, ReconnectConfig, RealtimeService, Subscription};
pub use records::RecordService;
pub use sse::{SseEvent, SseParser, sse_events};
pub use token_store::{MemoryTokenStore, StoredAuth, TokenStore, TokenStoreError};
pub use transport::{TlsMode, TransportConfig};
