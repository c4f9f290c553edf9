//! Authentication error types.
//!
//! This module defines errors that can occur while establishing, checking and
//! tearing down an operator session.

use std::sync::Arc;

use thiserror::Error;

use crate::provider::PasswordChallenge;

/// Type alias for boxed errors that can be shared across threads.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Authentication and authorization errors.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. New variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The identity provider rejected the username or password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Credentials were valid but the principal lacks the admin group.
    #[error("Not authorized: missing group '{group}'")]
    NotAuthorized {
        /// Group the principal was required to hold.
        group: String,
    },

    /// The provider demands a new password before issuing tokens.
    ///
    /// Answer it with
    /// [`CredentialSession::complete_password_change`](crate::CredentialSession::complete_password_change).
    #[error("Password change required for '{}'", .0.username())]
    PasswordChangeRequired(PasswordChallenge),

    /// No usable session; the operator must sign in again.
    #[error("Session expired")]
    SessionExpired,

    /// The id token could not be decoded.
    #[error("Invalid token format: {0}")]
    InvalidTokenFormat(String),

    /// A required claim is missing from the id token.
    #[error("Missing claim: {0}")]
    MissingClaim(String),

    /// The identity provider failed for a reason other than bad credentials.
    #[error("Identity provider error: {message}")]
    Provider {
        /// Description of the failure.
        message: String,
        /// The underlying error, if any.
        #[source]
        source: Option<BoxError>,
    },
}

impl AuthError {
    /// Creates an [`AuthError::NotAuthorized`] for `group`.
    #[must_use]
    pub fn not_authorized(group: impl Into<String>) -> Self {
        Self::NotAuthorized { group: group.into() }
    }

    /// Creates an [`AuthError::InvalidTokenFormat`].
    #[must_use]
    pub fn invalid_token_format(message: impl Into<String>) -> Self {
        Self::InvalidTokenFormat(message.into())
    }

    /// Creates an [`AuthError::MissingClaim`].
    #[must_use]
    pub fn missing_claim(claim: impl Into<String>) -> Self {
        Self::MissingClaim(claim.into())
    }

    /// Creates an [`AuthError::Provider`] without a source.
    #[must_use]
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider { message: message.into(), source: None }
    }

    /// Creates an [`AuthError::Provider`] wrapping `source`.
    #[must_use]
    pub fn provider_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Provider { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Returns `true` if the operator has to sign in again to recover.
    #[must_use]
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::InvalidCredentials)
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::SessionExpired,
            ErrorKind::InvalidToken => AuthError::invalid_token_format("Invalid JWT structure"),
            ErrorKind::InvalidSignature => AuthError::invalid_token_format("Invalid signature"),
            ErrorKind::MissingRequiredClaim(claim) => AuthError::missing_claim(claim.clone()),
            _ => AuthError::invalid_token_format(format!("JWT error: {err}")),
        }
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
