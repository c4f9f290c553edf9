//! Session token persistence.
//!
//! The id token is persisted base64-wrapped under a single well-known name.
//! The stored value is the only input used to rebuild clients that act on the
//! operator's behalf, so it is compared verbatim to detect token changes.

use std::{collections::HashMap, fmt};

use base64::{Engine, engine::general_purpose::STANDARD};
use parking_lot::RwLock;

use crate::error::{AuthError, Result};

/// Name under which the session token is stored.
pub const SESSION_TOKEN_KEY: &str = "logined";

/// A stored session token: the id token, base64-wrapped.
///
/// `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wraps a raw id token.
    #[must_use]
    pub fn from_id_token(id_token: &str) -> Self {
        Self(STANDARD.encode(id_token))
    }

    /// Adopts an already-wrapped value, e.g. one read back from a [`TokenStore`].
    #[must_use]
    pub fn from_stored(stored: impl Into<String>) -> Self {
        Self(stored.into())
    }

    /// The wrapped form, as persisted.
    #[must_use]
    pub fn as_stored(&self) -> &str {
        &self.0
    }

    /// Unwraps the raw id token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidTokenFormat`] if the stored value is not
    /// base64 or not UTF-8.
    pub fn id_token(&self) -> Result<String> {
        let bytes = STANDARD.decode(&self.0).map_err(|e| {
            AuthError::invalid_token_format(format!("stored token is not base64: {e}"))
        })?;
        String::from_utf8(bytes).map_err(|e| {
            AuthError::invalid_token_format(format!("stored token is not UTF-8: {e}"))
        })
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionToken").field(&"[redacted]").finish()
    }
}

/// Session-scoped name/value storage shared by the whole process.
pub trait TokenStore: Send + Sync {
    /// Returns the value stored under `name`.
    fn get(&self, name: &str) -> Option<String>;

    /// Stores `value` under `name`, replacing any previous value.
    fn set(&self, name: &str, value: String);

    /// Removes the value stored under `name`.
    fn remove(&self, name: &str);
}

/// In-memory [`TokenStore`].
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, name: &str) -> Option<String> {
        self.entries.read().get(name).cloned()
    }

    fn set(&self, name: &str, value: String) {
        self.entries.write().insert(name.to_owned(), value);
    }

    fn remove(&self, name: &str) {
        self.entries.write().remove(name);
    }
}
