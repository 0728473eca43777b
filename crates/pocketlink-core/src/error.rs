// ── Domain error taxonomy ──
//
// Callers of pocketlink-core see these kinds instead of raw transport or
// HTTP errors. `classify` is the single place where a `pocketlink_api::Error`
// is mapped onto the closed set below.

use pocketlink_api::Error as ApiError;
use thiserror::Error;

/// Closed set of failure kinds exposed to applications.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Missing, expired or rejected credentials (HTTP 401/403).
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// The request was rejected as malformed (HTTP 400/422) or could not
    /// be built locally.
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        /// Field names flagged by the server, if any.
        fields: Vec<String>,
    },

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Business(#[from] BusinessError),

    /// A response body could not be decoded, or a request body encoded.
    #[error("Could not parse data: {message}")]
    Parsing { message: String },

    #[error("Unexpected error: {message}")]
    Unknown { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("Request timed out: {message}")]
    Timeout { message: String },

    /// HTTP 429 or any 5xx.
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("No connection to server: {message}")]
    NoConnection { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusinessError {
    #[error("Resource not found: {message}")]
    ResourceNotFound { message: String },
}

impl DomainError {
    /// Network failures are the only kinds worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Short stable name of the kind, for logs and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Validation { .. } => "validation",
            Self::Network(NetworkError::Timeout { .. }) => "network.timeout",
            Self::Network(NetworkError::ServerError { .. }) => "network.server_error",
            Self::Network(NetworkError::NoConnection { .. }) => "network.no_connection",
            Self::Business(BusinessError::ResourceNotFound { .. }) => "business.not_found",
            Self::Parsing { .. } => "parsing",
            Self::Unknown { .. } => "unknown",
        }
    }
}

// ── Classification ───────────────────────────────────────────────────

/// Map an SDK error onto its domain kind.
pub fn classify(err: &ApiError) -> DomainError {
    match err {
        ApiError::Transport(e) => {
            if e.is_timeout() {
                NetworkError::Timeout {
                    message: e.to_string(),
                }
                .into()
            } else if e.is_decode() {
                DomainError::Parsing {
                    message: e.to_string(),
                }
            } else if let Some(status) = e.status() {
                classify_status(status.as_u16(), e.to_string(), Vec::new())
            } else {
                NetworkError::NoConnection {
                    message: e.to_string(),
                }
                .into()
            }
        }
        ApiError::Tls(msg) => NetworkError::NoConnection {
            message: format!("TLS error: {msg}"),
        }
        .into(),
        ApiError::RealtimeStream(msg) => NetworkError::NoConnection {
            message: msg.clone(),
        }
        .into(),
        ApiError::InvalidUrl(e) => DomainError::Validation {
            message: format!("Invalid URL: {e}"),
            fields: Vec::new(),
        },
        ApiError::InvalidHeader { name, reason } => DomainError::Validation {
            message: format!("Invalid header {name}: {reason}"),
            fields: Vec::new(),
        },
        ApiError::Response {
            status, envelope, ..
        } => classify_status(*status, envelope.message.clone(), envelope.invalid_fields()),
        ApiError::RealtimeRejected { status } => classify_status(
            *status,
            format!("realtime connection rejected (HTTP {status})"),
            Vec::new(),
        ),
        ApiError::Deserialization { message, .. } => DomainError::Parsing {
            message: message.clone(),
        },
        ApiError::Serialization(e) => DomainError::Parsing {
            message: e.to_string(),
        },
    }
}

fn classify_status(status: u16, message: String, fields: Vec<String>) -> DomainError {
    match status {
        401 | 403 => DomainError::Auth { message },
        400 | 422 => DomainError::Validation { message, fields },
        404 => BusinessError::ResourceNotFound { message }.into(),
        408 => NetworkError::Timeout { message }.into(),
        429 | 500..=599 => NetworkError::ServerError { status, message }.into(),
        _ => DomainError::Unknown { message },
    }
}

impl From<ApiError> for DomainError {
    fn from(err: ApiError) -> Self {
        classify(&err)
    }
}
