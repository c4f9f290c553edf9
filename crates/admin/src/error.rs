//! Admin gateway error types.
//!
//! Every failure reaching the presentation layer is one of these variants;
//! failures are never folded into an empty success envelope.

use keyrot_authn::{AuthError, PasswordChallenge};
use keyrot_storage::{KeyStoreError, Version};
use thiserror::Error;

/// Result type alias for gateway and console operations.
pub type AdminResult<T> = Result<T, AdminError>;

/// Errors surfaced to the presentation layer.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. New variants may be added in
/// future minor releases without a semver-breaking change.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdminError {
    /// The identity provider rejected the credentials.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The operator is not in the admin group.
    #[error("Not authorized: missing group '{group}'")]
    NotAuthorized {
        /// Group the operator was required to hold.
        group: String,
    },

    /// The operator must set a new password before signing in.
    #[error("Password change required for '{}'", .0.username())]
    PasswordChangeRequired(PasswordChallenge),

    /// The session is gone; the console has to be reinitialized by signing in.
    #[error("Session expired")]
    SessionExpired,

    /// Any other authentication failure.
    #[error("Authentication failed: {0}")]
    Auth(#[source] AuthError),

    /// No record at the requested version.
    #[error("Key version {version} not found")]
    NotFound {
        /// The version that was looked up.
        version: Version,
    },

    /// A concurrent creator claimed the allocated version.
    #[error("Key version {version} was claimed by a concurrent writer")]
    VersionConflict {
        /// The version that could not be claimed.
        version: Version,
    },

    /// The sequence counter is corrupt; creation is blocked until repaired.
    #[error("Sequence counter is corrupt: {value:?}")]
    SequenceCorrupt {
        /// The raw stored value, if any.
        value: Option<String>,
    },

    /// The request names a resource that is not registered.
    #[error("Unknown resource: {name}")]
    UnknownResource {
        /// The requested resource name.
        name: String,
    },

    /// The raw request kind is not one the gateway understands.
    #[error("Unsupported operation: {kind}")]
    UnsupportedOperation {
        /// The raw kind string.
        kind: String,
    },

    /// The request payload is malformed or out of range.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// What was wrong with the request.
        message: String,
    },

    /// The console configuration is invalid.
    #[error("Invalid configuration: {message}")]
    Config {
        /// What was wrong with the configuration.
        message: String,
    },

    /// The key store or its backend failed.
    #[error("Store error: {0}")]
    Store(#[source] KeyStoreError),
}

impl AdminError {
    /// Creates an [`AdminError::InvalidRequest`].
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest { message: message.into() }
    }

    /// Creates an [`AdminError::UnsupportedOperation`].
    #[must_use]
    pub fn unsupported(kind: impl Into<String>) -> Self {
        Self::UnsupportedOperation { kind: kind.into() }
    }

    /// Creates an [`AdminError::UnknownResource`].
    #[must_use]
    pub fn unknown_resource(name: impl Into<String>) -> Self {
        Self::UnknownResource { name: name.into() }
    }

    /// Creates an [`AdminError::Config`].
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Returns `true` when re-running the request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::VersionConflict { .. } => true,
            Self::Store(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Returns `true` when the console has to sign in again before retrying.
    #[must_use]
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::InvalidCredentials)
    }
}

impl From<AuthError> for AdminError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::NotAuthorized { group } => Self::NotAuthorized { group },
            AuthError::PasswordChangeRequired(challenge) => Self::PasswordChangeRequired(challenge),
            AuthError::SessionExpired => Self::SessionExpired,
            other => Self::Auth(other),
        }
    }
}

impl From<KeyStoreError> for AdminError {
    fn from(err: KeyStoreError) -> Self {
        match err {
            KeyStoreError::NotFound { version } => Self::NotFound { version },
            KeyStoreError::VersionConflict { version } => Self::VersionConflict { version },
            KeyStoreError::SequenceCorrupt { value } => Self::SequenceCorrupt { value },
            KeyStoreError::ReservedVersion { version } => {
                Self::invalid_request(format!("version {version} is reserved"))
            },
            other => Self::Store(other),
        }
    }
}
