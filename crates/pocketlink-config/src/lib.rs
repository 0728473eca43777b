//! Shared configuration for pocketlink tools.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! a keyring-backed [`TokenStore`] for sessions, and translation to
//! `pocketlink_api::ClientConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use pocketlink_api::{ClientConfig, StoredAuth, TlsMode, TokenStore, TokenStoreError, TransportConfig};

/// Service name for every keyring entry written by pocketlink.
pub const KEYRING_SERVICE: &str = "pocketlink";

/// Environment variable consulted for the password after `password_env`.
pub const PASSWORD_ENV: &str = "POCKETLINK_PASSWORD";

/// Environment variable consulted when a profile has no `identity`.
pub const IDENTITY_ENV: &str = "POCKETLINK_IDENTITY";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<keyring::Error> for ConfigError {
    fn from(err: keyring::Error) -> Self {
        Self::Keyring(err.to_string())
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--profile` is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named server profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Name of the profile to use: the explicit one, else the configured
    /// default, else `"default"`.
    pub fn profile_name(&self, explicit: Option<&str>) -> String {
        explicit
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound { name: name.into() })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named server profile.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Server base URL (e.g., "http://127.0.0.1:8090").
    pub url: String,

    /// Auth collection used by `auth login`.
    #[serde(default = "default_auth_collection")]
    pub auth_collection: String,

    /// Email or username for password auth.
    pub identity: Option<String>,

    /// Password (plaintext, prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Accept invalid TLS certificates.
    pub insecure: Option<bool>,

    /// Override the default timeout (seconds).
    pub timeout: Option<u64>,
}

impl Profile {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_collection: default_auth_collection(),
            identity: None,
            password: None,
            password_env: None,
            ca_cert: None,
            insecure: None,
            timeout: None,
        }
    }
}

fn default_auth_collection() -> String {
    "users".into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "pocketlink", "pocketlink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("pocketlink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` (missing file is fine) layered over defaults, with
/// `POCKETLINK_` variables on top. Nested keys use `__`, e.g.
/// `POCKETLINK_DEFAULTS__TIMEOUT=5`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("POCKETLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

fn password_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
}

/// Identity from the profile, else `POCKETLINK_IDENTITY`.
pub fn resolve_identity(profile: &Profile, profile_name: &str) -> Result<String, ConfigError> {
    profile
        .identity
        .clone()
        .or_else(|| std::env::var(IDENTITY_ENV).ok())
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })
}

/// Resolve the password: `password_env`, then `POCKETLINK_PASSWORD`, then
/// the system keyring, then plaintext in the profile.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    pick_password(
        profile,
        profile_name,
        |name| std::env::var(name).ok(),
        || {
            password_entry(profile_name)
                .and_then(|entry| entry.get_password())
                .ok()
        },
    )
}

fn pick_password(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl FnOnce() -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env → env var lookup
    if let Some(value) = profile.password_env.as_deref().and_then(&env) {
        return Ok(SecretString::from(value));
    }

    // 2. Global env var
    if let Some(value) = env(PASSWORD_ENV) {
        return Ok(SecretString::from(value));
    }

    // 3. System keyring
    if let Some(value) = keyring() {
        return Ok(SecretString::from(value));
    }

    // 4. Plaintext in config
    if let Some(ref value) = profile.password {
        return Ok(SecretString::from(value.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &SecretString) -> Result<(), ConfigError> {
    password_entry(profile_name)?.set_password(password.expose_secret())?;
    Ok(())
}

// ── Session persistence ─────────────────────────────────────────────

/// Persists the session token for one profile in the system keyring.
#[derive(Debug, Clone)]
pub struct KeyringTokenStore {
    profile: String,
}

impl KeyringTokenStore {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, TokenStoreError> {
        keyring::Entry::new(KEYRING_SERVICE, &format!("{}/session", self.profile))
            .map_err(|e| TokenStoreError(e.to_string()))
    }
}

impl TokenStore for KeyringTokenStore {
    fn save_token(&self, auth: &StoredAuth) -> Result<(), TokenStoreError> {
        let json = serde_json::to_string(auth).map_err(|e| TokenStoreError(e.to_string()))?;
        self.entry()?
            .set_password(&json)
            .map_err(|e| TokenStoreError(e.to_string()))
    }

    fn get_token(&self) -> Result<Option<StoredAuth>, TokenStoreError> {
        match self.entry()?.get_password() {
            Ok(json) => decode_session(&json).map(Some),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(TokenStoreError(e.to_string())),
        }
    }

    fn clear_tokens(&self) -> Result<(), TokenStoreError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(TokenStoreError(e.to_string())),
        }
    }
}

fn decode_session(json: &str) -> Result<StoredAuth, TokenStoreError> {
    serde_json::from_str(json).map_err(|e| TokenStoreError(format!("corrupt session entry: {e}")))
}

// ── Client config translation ───────────────────────────────────────

/// Build a `ClientConfig` from a profile.
///
/// `persist_session` attaches a [`KeyringTokenStore`] so logins survive
/// across invocations. `timeout_override` wins over the profile and
/// `defaults.timeout`.
pub fn profile_to_client_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
    timeout_override: Option<u64>,
    persist_session: bool,
) -> Result<ClientConfig, ConfigError> {
    let url: url::Url = profile.url.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {}", profile.url),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation {
            field: "url".into(),
            reason: format!("expected http or https, got '{}'", url.scheme()),
        });
    }

    let tls = if profile.insecure.unwrap_or(false) {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    let timeout = timeout_override
        .or(profile.timeout)
        .unwrap_or(defaults.timeout);

    let transport = TransportConfig::default()
        .with_tls(tls)
        .with_timeout(Duration::from_secs(timeout));

    let mut config = ClientConfig::new(profile.url.clone()).with_transport(transport);
    if persist_session {
        config = config.with_token_store(Arc::new(KeyringTokenStore::new(profile_name)));
    }
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn password_env_wins_over_everything() {
        let mut profile = Profile::new("http://pb.test");
        profile.password_env = Some("MY_PB_PASS".into());
        profile.password = Some("plain".into());

        let env = |name: &str| match name {
            "MY_PB_PASS" => Some("from-named-env".to_owned()),
            PASSWORD_ENV => Some("from-global-env".to_owned()),
            _ => None,
        };
        let pw = pick_password(&profile, "p", env, || Some("from-keyring".into())).unwrap();
        assert_eq!(pw.expose_secret(), "from-named-env");
    }

    #[test]
    fn global_env_then_keyring_then_plaintext() {
        let mut profile = Profile::new("http://pb.test");
        profile.password = Some("plain".into());

        let global = |name: &str| (name == PASSWORD_ENV).then(|| "global".to_owned());
        let pw = pick_password(&profile, "p", global, || Some("kr".into())).unwrap();
        assert_eq!(pw.expose_secret(), "global");

        let pw = pick_password(&profile, "p", no_env, || Some("kr".into())).unwrap();
        assert_eq!(pw.expose_secret(), "kr");

        let pw = pick_password(&profile, "p", no_env, || None).unwrap();
        assert_eq!(pw.expose_secret(), "plain");
    }

    #[test]
    fn missing_password_is_no_credentials() {
        let profile = Profile::new("http://pb.test");
        let err = pick_password(&profile, "staging", no_env, || None).unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials { ref profile } if profile == "staging"));
    }

    #[test]
    fn client_config_timeout_precedence() {
        let defaults = Defaults::default();
        let mut profile = Profile::new("http://pb.test");

        let cfg = profile_to_client_config(&profile, "p", &defaults, None, false).unwrap();
        assert_eq!(cfg.transport.timeout, Duration::from_secs(30));
        assert!(cfg.token_store.is_none());

        profile.timeout = Some(5);
        let cfg = profile_to_client_config(&profile, "p", &defaults, None, false).unwrap();
        assert_eq!(cfg.transport.timeout, Duration::from_secs(5));

        let cfg = profile_to_client_config(&profile, "p", &defaults, Some(2), true).unwrap();
        assert_eq!(cfg.transport.timeout, Duration::from_secs(2));
        assert!(cfg.token_store.is_some());
    }

    #[test]
    fn client_config_tls_modes() {
        let defaults = Defaults::default();
        let mut profile = Profile::new("https://pb.test");
        profile.ca_cert = Some("/etc/ca.pem".into());

        let cfg = profile_to_client_config(&profile, "p", &defaults, None, false).unwrap();
        assert!(matches!(cfg.transport.tls, TlsMode::CustomCa(_)));

        profile.insecure = Some(true);
        let cfg = profile_to_client_config(&profile, "p", &defaults, None, false).unwrap();
        assert!(matches!(cfg.transport.tls, TlsMode::DangerAcceptInvalid));
    }

    #[test]
    fn client_config_rejects_bad_urls() {
        let defaults = Defaults::default();
        for url in ["not a url", "ftp://pb.test"] {
            let err = profile_to_client_config(&Profile::new(url), "p", &defaults, None, false)
                .unwrap_err();
            assert!(matches!(err, ConfigError::Validation { .. }), "{url}");
        }
    }

    #[test]
    fn profile_name_fallbacks() {
        let mut cfg = Config::default();
        assert_eq!(cfg.profile_name(Some("x")), "x");
        assert_eq!(cfg.profile_name(None), "default");
        cfg.default_profile = Some("prod".into());
        assert_eq!(cfg.profile_name(None), "prod");
    }

    #[test]
    fn corrupt_session_entry_is_an_error() {
        assert!(decode_session("not json").is_err());
        let auth = decode_session(r#"{"token":"t"}"#).unwrap();
        assert_eq!(auth.token, "t");
        assert!(auth.record.is_none());
    }
}
