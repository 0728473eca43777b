//! CLI error types with miette diagnostics.
//!
//! Maps `DomainError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use pocketlink_config::ConfigError;
use pocketlink_core::{BusinessError, DomainError, NetworkError, classify};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const SERVER: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the server: {message}")]
    #[diagnostic(
        code(pocketlink::connection_failed),
        help(
            "Check that the server is running and the URL is correct.\n\
             Try: pocketlink health --url http://127.0.0.1:8090"
        )
    )]
    ConnectionFailed { message: String },

    #[error("Request timed out: {message}")]
    #[diagnostic(
        code(pocketlink::timeout),
        help("Increase the timeout with --timeout or check server responsiveness.")
    )]
    Timeout { message: String },

    #[error("Server error (HTTP {status}): {message}")]
    #[diagnostic(code(pocketlink::server_error))]
    ServerError { status: u16, message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(pocketlink::auth_failed),
        help(
            "Sign in again with: pocketlink auth login\n\
             Store a password with: pocketlink config set-password"
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(pocketlink::no_credentials),
        help(
            "Set identity with: pocketlink config set identity you@example.com\n\
             Then a password with: pocketlink config set-password\n\
             Or export POCKETLINK_IDENTITY and POCKETLINK_PASSWORD."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("Not found: {message}")]
    #[diagnostic(
        code(pocketlink::not_found),
        help("Run: pocketlink records list <collection> to see available records")
    )]
    NotFound { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(pocketlink::validation))]
    Validation { field: String, reason: String },

    #[error("Rejected by server: {message}")]
    #[diagnostic(code(pocketlink::rejected))]
    Rejected {
        message: String,
        #[help]
        hint: Option<String>,
    },

    #[error("Could not parse data: {message}")]
    #[diagnostic(code(pocketlink::parse))]
    Parsing { message: String },

    #[error("{message}")]
    #[diagnostic(code(pocketlink::unknown))]
    Unknown { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(pocketlink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: pocketlink config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No server configured")]
    #[diagnostic(
        code(pocketlink::no_config),
        help(
            "Create a profile with: pocketlink config init\n\
             Or pass --url. Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(pocketlink::config))]
    Config(ConfigError),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(pocketlink::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(pocketlink::json), help("Check the JSON payload and try again."))]
    Json(#[from] serde_json::Error),

    #[error("Could not render YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn rejected_hint(fields: &[String]) -> Option<String> {
    (!fields.is_empty()).then(|| format!("Invalid fields: {}", fields.join(", ")))
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::ServerError { .. } => exit_code::SERVER,
            Self::Validation { .. }
            | Self::Rejected { .. }
            | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── DomainError → CliError mapping ───────────────────────────────────

impl From<DomainError> for CliError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Auth { message } => Self::AuthFailed { message },
            DomainError::Validation { message, fields } => Self::Rejected {
                message,
                hint: rejected_hint(&fields),
            },
            DomainError::Network(NetworkError::Timeout { message }) => Self::Timeout { message },
            DomainError::Network(NetworkError::NoConnection { message }) => {
                Self::ConnectionFailed { message }
            }
            DomainError::Network(NetworkError::ServerError { status, message }) => {
                Self::ServerError { status, message }
            }
            DomainError::Business(BusinessError::ResourceNotFound { message }) => {
                Self::NotFound { message }
            }
            DomainError::Parsing { message } => Self::Parsing { message },
            DomainError::Unknown { message } => Self::Unknown { message },
        }
    }
}

impl From<pocketlink_api::Error> for CliError {
    fn from(err: pocketlink_api::Error) -> Self {
        classify(&err).into()
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::ProfileNotFound { name } => Self::ProfileNotFound {
                name,
                available: String::new(),
            },
            other => Self::Config(other),
        }
    }
}
