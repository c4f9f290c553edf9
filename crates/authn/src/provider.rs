//! Identity provider seam.
//!
//! The provider's protocol is external. [`CredentialSession`] only needs it
//! to exchange credentials for an id token, answer a new-password challenge,
//! hand back the current (possibly refreshed) id token, and sign out.
//!
//! [`CredentialSession`]: crate::CredentialSession

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

/// A new-password challenge issued in place of tokens.
///
/// The `session` value is opaque provider state and is redacted from
/// `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordChallenge {
    username: String,
    session: String,
    required_attributes: Vec<String>,
}

impl PasswordChallenge {
    /// Creates a challenge for `username` carrying opaque provider state.
    #[must_use]
    pub fn new(username: impl Into<String>, session: impl Into<String>) -> Self {
        Self { username: username.into(), session: session.into(), required_attributes: Vec::new() }
    }

    /// Adds user attributes the provider requires alongside the new password.
    #[must_use]
    pub fn with_required_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// The user being challenged.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Opaque provider state to send back with the answer.
    #[must_use]
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Attributes the provider requires with the new password.
    #[must_use]
    pub fn required_attributes(&self) -> &[String] {
        &self.required_attributes
    }
}

impl fmt::Debug for PasswordChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordChallenge")
            .field("username", &self.username)
            .field("session", &"[redacted]")
            .field("required_attributes", &self.required_attributes)
            .finish()
    }
}

/// Result of a credential exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The provider issued an id token.
    Authenticated {
        /// Raw id token (JWT).
        id_token: String,
    },
    /// The provider requires a new password first.
    NewPasswordRequired(PasswordChallenge),
}

/// External identity provider.
///
/// Implementations report rejected credentials as
/// [`AuthError::InvalidCredentials`](crate::AuthError::InvalidCredentials)
/// and every other failure as [`AuthError::Provider`](crate::AuthError::Provider).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchanges a username and password for an id token or a challenge.
    async fn authenticate(&self, username: &str, password: &str) -> Result<AuthOutcome>;

    /// Answers a new-password challenge.
    async fn complete_new_password(
        &self,
        challenge: &PasswordChallenge,
        new_password: &str,
    ) -> Result<AuthOutcome>;

    /// Returns the current id token of the provider-side session, refreshing
    /// it if needed.
    ///
    /// `Ok(None)` means the provider holds no session.
    async fn refresh_session(&self) -> Result<Option<String>>;

    /// Ends the provider-side session.
    async fn sign_out(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_debug_redacts_session() {
        let challenge = PasswordChallenge::new("alice", "super-secret-session")
            .with_required_attributes(["name"]);
        let debug = format!("{challenge:?}");
        assert!(debug.contains("alice"));
        assert!(debug.contains("name"));
        assert!(!debug.contains("super-secret-session"));
    }
}
