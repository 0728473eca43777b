// Token persistence collaborator.
//
// The auth store keeps the live session in memory and mirrors every change
// into a `TokenStore`. Disk- or keyring-backed stores live outside this
// crate; the in-memory default only survives for the process lifetime.

use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A persisted session: the token plus the auth record it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAuth {
    pub token: String,
    #[serde(default)]
    pub record: Option<Value>,
}

/// Failure reported by a token store backend.
#[derive(Debug, Error)]
#[error("token store error: {0}")]
pub struct TokenStoreError(pub String);

/// Key-value persistence for the session token.
pub trait TokenStore: Send + Sync {
    fn save_token(&self, auth: &StoredAuth) -> Result<(), TokenStoreError>;

    /// `Ok(None)` when nothing is stored.
    fn get_token(&self) -> Result<Option<StoredAuth>, TokenStoreError>;

    fn clear_tokens(&self) -> Result<(), TokenStoreError>;
}

/// Process-local token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: RwLock<Option<StoredAuth>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn save_token(&self, auth: &StoredAuth) -> Result<(), TokenStoreError> {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(auth.clone());
        Ok(())
    }

    fn get_token(&self) -> Result<Option<StoredAuth>, TokenStoreError> {
        Ok(self
            .slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn clear_tokens(&self) -> Result<(), TokenStoreError> {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryTokenStore::new();
        assert!(store.get_token().unwrap().is_none());

        let auth = StoredAuth {
            token: "abc".into(),
            record: Some(serde_json::json!({"id": "u1"})),
        };
        store.save_token(&auth).unwrap();
        assert_eq!(store.get_token().unwrap(), Some(auth));

        store.clear_tokens().unwrap();
        assert!(store.get_token().unwrap().is_none());
    }
}
