use thiserror::Error;

use crate::models::ErrorEnvelope;

/// Top-level error type for the `pocketlink-api` crate.
///
/// Covers every failure mode of the SDK core: transport, HTTP responses
/// outside the 2xx range, JSON decoding, and the realtime connection.
/// `pocketlink-core` classifies these into domain error kinds.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A header name or value could not be encoded.
    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    /// TLS setup or HTTP client construction failed.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Protocol ────────────────────────────────────────────────────
    /// The server answered with a status outside `200..=299`.
    ///
    /// `envelope` is decoded from the body when possible, otherwise it is
    /// synthesized from the status code and reason phrase.
    #[error("Request to {url} failed (HTTP {status}): {}", envelope.message)]
    Response {
        url: String,
        status: u16,
        envelope: ErrorEnvelope,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// JSON serialization of a request body failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── Realtime ────────────────────────────────────────────────────
    /// The SSE endpoint answered with something other than HTTP 200.
    #[error("Realtime connection rejected (HTTP {status})")]
    RealtimeRejected { status: u16 },

    /// The SSE stream failed mid-read.
    #[error("Realtime stream error: {0}")]
    RealtimeStream(String),
}

impl Error {
    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Response { status, .. } | Self::RealtimeRejected { status } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Response { status, .. } | Self::RealtimeRejected { status } => {
                *status == 429 || *status >= 500
            }
            Self::RealtimeStream(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Returns `true` if the server rejected the credentials or token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    /// The decoded error envelope for HTTP-level failures.
    pub fn envelope(&self) -> Option<&ErrorEnvelope> {
        match self {
            Self::Response { envelope, .. } => Some(envelope),
            _ => None,
        }
    }
}
