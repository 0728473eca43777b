//! Session state: the current token, the auth record, and change listeners.
//!
//! The state is a single-writer-many-reader value. Every outgoing request
//! loads it through an [`ArcSwap`], so a concurrent login can never produce
//! a token from one session paired with the record of another.

use std::sync::{Arc, PoisonError, RwLock};

use arc_swap::ArcSwap;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::token_store::{StoredAuth, TokenStore};

/// Snapshot of the session.
///
/// An empty `token` means unauthenticated; `record` is only meaningful
/// while the token is set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub token: String,
    pub record: Option<Value>,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        !self.token.is_empty()
    }
}

type Listener = Arc<dyn Fn(&AuthState) + Send + Sync>;

/// Holds the current session and notifies listeners on every write.
pub struct AuthStore {
    state: ArcSwap<AuthState>,
    listeners: RwLock<Vec<Listener>>,
    persistence: Option<Arc<dyn TokenStore>>,
}

impl std::fmt::Debug for AuthStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStore")
            .field("authenticated", &self.state.load().is_authenticated())
            .field("persistent", &self.persistence.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for AuthStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthStore {
    /// An empty, memory-only store.
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(AuthState::default()),
            listeners: RwLock::new(Vec::new()),
            persistence: None,
        }
    }

    /// A store mirrored into `backend`, seeded from whatever it holds.
    pub fn with_persistence(backend: Arc<dyn TokenStore>) -> Self {
        let initial = match backend.get_token() {
            Ok(Some(stored)) => {
                debug!("restored session from token store");
                AuthState {
                    token: stored.token,
                    record: stored.record,
                }
            }
            Ok(None) => AuthState::default(),
            Err(e) => {
                warn!(error = %e, "failed to load persisted session");
                AuthState::default()
            }
        };

        Self {
            state: ArcSwap::from_pointee(initial),
            listeners: RwLock::new(Vec::new()),
            persistence: Some(backend),
        }
    }

    // ── Readers ──────────────────────────────────────────────────────

    /// The full current state (cheap `Arc` clone).
    pub fn state(&self) -> Arc<AuthState> {
        self.state.load_full()
    }

    pub fn token(&self) -> String {
        self.state.load().token.clone()
    }

    pub fn record(&self) -> Option<Value> {
        self.state.load().record.clone()
    }

    /// `false` for an empty token, or when the JWT `exp` claim is missing,
    /// malformed, or not in the future.
    pub fn is_valid(&self) -> bool {
        self.expires_at().is_some_and(|exp| exp > Utc::now())
    }

    /// Expiry decoded from the token's `exp` claim.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let state = self.state.load();
        if state.token.is_empty() {
            return None;
        }
        token_expiry(&state.token)
    }

    /// Whether the session belongs to a superuser.
    pub fn is_superuser(&self) -> bool {
        let state = self.state.load();
        let from_record = state
            .record
            .as_ref()
            .and_then(|r| r.get("collectionName"))
            .and_then(Value::as_str)
            == Some("_superusers");
        let from_token = decode_claims(&state.token)
            .and_then(|claims| claims.get("type").and_then(Value::as_str).map(str::to_owned))
            .is_some_and(|t| t == "admin");
        from_record || from_token
    }

    // ── Writers ──────────────────────────────────────────────────────

    /// Replace the token and record, then notify every listener.
    pub fn save(&self, token: impl Into<String>, record: Option<Value>) {
        let next = Arc::new(AuthState {
            token: token.into(),
            record,
        });
        self.state.store(Arc::clone(&next));
        self.persist(&next);
        self.notify(&next);
    }

    /// Equivalent to `save("", None)`.
    pub fn clear(&self) {
        self.save(String::new(), None);
    }

    /// Register a listener. Listeners live as long as the store and run
    /// synchronously inside `save`/`clear`.
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    fn notify(&self, state: &AuthState) {
        // Snapshot first so a listener may register another listener.
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(state);
        }
    }

    fn persist(&self, state: &AuthState) {
        let Some(backend) = &self.persistence else {
            return;
        };
        let result = if state.is_authenticated() {
            backend.save_token(&StoredAuth {
                token: state.token.clone(),
                record: state.record.clone(),
            })
        } else {
            backend.clear_tokens()
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to persist session");
        }
    }
}

// ── JWT helpers ──────────────────────────────────────────────────────

/// Decode the payload (middle) segment of a JWT. No signature check.
pub fn decode_claims(token: &str) -> Option<serde_json::Map<String, Value>> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let claims = decode_claims(token)?;
    let exp = claims.get("exp")?;
    let secs = exp.as_i64().or_else(|| {
        #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
        exp.as_f64().map(|f| f as i64)
    })?;
    DateTime::from_timestamp(secs, 0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::token_store::MemoryTokenStore;

    fn jwt(claims: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.signature")
    }

    fn jwt_expiring_in(secs: i64) -> String {
        jwt(&json!({"id": "u1", "exp": Utc::now().timestamp() + secs}))
    }

    #[test]
    fn empty_store_is_invalid() {
        let store = AuthStore::new();
        assert!(!store.is_valid());
        assert!(store.token().is_empty());
        assert!(store.record().is_none());
    }

    #[test]
    fn future_exp_is_valid_past_exp_is_not() {
        let store = AuthStore::new();
        store.save(jwt_expiring_in(3600), None);
        assert!(store.is_valid());

        store.save(jwt_expiring_in(-60), None);
        assert!(!store.is_valid());
    }

    #[test]
    fn clear_invalidates() {
        let store = AuthStore::new();
        store.save(jwt_expiring_in(3600), Some(json!({"id": "u1"})));
        store.clear();
        assert!(!store.is_valid());
        assert!(store.record().is_none());
    }

    #[test]
    fn malformed_or_missing_exp_is_invalid() {
        let store = AuthStore::new();
        store.save("not-a-jwt", None);
        assert!(!store.is_valid());

        store.save(jwt(&json!({"id": "u1"})), None);
        assert!(!store.is_valid());

        store.save(jwt(&json!({"exp": "tomorrow"})), None);
        assert!(!store.is_valid());

        store.save("a.!!!.c", None);
        assert!(!store.is_valid());
    }

    #[test]
    fn padded_payload_still_decodes() {
        let claims = json!({"exp": Utc::now().timestamp() + 60});
        let payload = base64::engine::general_purpose::URL_SAFE.encode(claims.to_string());
        let store = AuthStore::new();
        store.save(format!("h.{payload}.s"), None);
        assert!(store.is_valid());
    }

    #[test]
    fn listeners_fire_synchronously_on_every_write() {
        let store = AuthStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.on_change(move |state| sink.lock().unwrap().push(state.token.clone()));

        store.save("t1", None);
        assert_eq!(*seen.lock().unwrap(), vec!["t1".to_owned()]);

        store.clear();
        assert_eq!(*seen.lock().unwrap(), vec!["t1".to_owned(), String::new()]);
    }

    #[test]
    fn persistence_mirrors_writes_and_seeds_state() {
        let backend = Arc::new(MemoryTokenStore::new());
        let store = AuthStore::with_persistence(backend.clone());
        store.save("t1", Some(json!({"id": "u1"})));
        assert_eq!(backend.get_token().unwrap().unwrap().token, "t1");

        let restored = AuthStore::with_persistence(backend.clone());
        assert_eq!(restored.token(), "t1");

        restored.clear();
        assert!(backend.get_token().unwrap().is_none());
    }

    #[test]
    fn superuser_detection() {
        let store = AuthStore::new();
        store.save("t", Some(json!({"collectionName": "_superusers"})));
        assert!(store.is_superuser());

        store.save(jwt(&json!({"type": "admin"})), None);
        assert!(store.is_superuser());

        store.save(jwt(&json!({"type": "authRecord"})), Some(json!({"collectionName": "users"})));
        assert!(!store.is_superuser());
    }
}
