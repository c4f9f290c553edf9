//! The operator credential session.
//!
//! # Lifecycle
//!
//! ```text
//!   SignedOut ──login──▶ Authenticated ──check_session──▶ Authenticated
//!       ▲                    │    │                        (Valid | Reload)
//!       └──────logout────────┘    └──refresh fails──▶ Expired
//! ```
//!
//! [`CredentialSession::check_session`] is the gate run before every
//! delegated operation. When the provider hands back a different id token
//! than the one stored, the new token is persisted and
//! [`SessionCheck::Reload`] is returned exactly once, so the caller can
//! rebuild everything bound to the old token.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    claims::{IdTokenClaims, TokenVerifier, decode_id_token_claims},
    error::{AuthError, Result},
    provider::{AuthOutcome, IdentityProvider, PasswordChallenge},
    token::{SESSION_TOKEN_KEY, SessionToken, TokenStore},
};

/// Group an operator must belong to by default.
pub const DEFAULT_ADMIN_GROUP: &str = "AdminGroup";

fn default_admin_group() -> String {
    DEFAULT_ADMIN_GROUP.to_owned()
}

fn default_token_key() -> String {
    SESSION_TOKEN_KEY.to_owned()
}

/// Session policy.
///
/// # Example
///
/// ```
/// use keyrot_authn::SessionConfig;
///
/// let config = SessionConfig::builder().admin_group("KeyAdmins").build();
/// assert_eq!(config.admin_group, "KeyAdmins");
/// assert_eq!(config.token_key, "logined");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Group required in the id token's group claim.
    #[builder(into, default = default_admin_group())]
    #[serde(default = "default_admin_group")]
    pub admin_group: String,
    /// Name the session token is stored under.
    #[builder(into, default = default_token_key())]
    #[serde(default = "default_token_key")]
    pub token_key: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// An authenticated operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    principal: String,
    subject: String,
    groups: Vec<String>,
    expires_at: DateTime<Utc>,
    token: SessionToken,
}

impl Session {
    fn from_claims(claims: IdTokenClaims, token: SessionToken) -> Self {
        Self {
            principal: claims.principal().to_owned(),
            expires_at: claims.expires_at(),
            subject: claims.sub,
            groups: claims.groups,
            token,
        }
    }

    /// Display name of the operator.
    #[must_use]
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Provider subject id.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Group memberships from the id token.
    #[must_use]
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Expiry of the id token.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// The stored token this session was built from.
    #[must_use]
    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    /// Returns `true` if the id token is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Local session state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Nobody signed in.
    #[default]
    SignedOut,
    /// An operator is signed in.
    Authenticated(Session),
    /// The last session could not be refreshed.
    Expired,
}

/// Outcome of a successful [`CredentialSession::check_session`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub enum SessionCheck {
    /// The stored token is still current.
    Valid,
    /// The token changed; anything bound to the old token must be rebuilt.
    Reload(Session),
}

/// Login, authorization and refresh against an [`IdentityProvider`].
///
/// The token store holds the only persisted state; the in-memory
/// [`SessionState`] is a cache of it and is never locked across an await.
pub struct CredentialSession {
    provider: Arc<dyn IdentityProvider>,
    tokens: Arc<dyn TokenStore>,
    config: SessionConfig,
    verifier: Option<TokenVerifier>,
    state: RwLock<SessionState>,
}

#[bon::bon]
impl CredentialSession {
    /// Creates a session gate.
    ///
    /// # Optional Fields
    ///
    /// * `config` - Session policy (default: [`SessionConfig::default`]).
    /// * `verifier` - Signature verifier for id tokens. Without one, claims are decoded
    ///   unverified and the provider is trusted to have verified them.
    #[builder]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        tokens: Arc<dyn TokenStore>,
        #[builder(default)] config: SessionConfig,
        verifier: Option<TokenVerifier>,
    ) -> Self {
        Self { provider, tokens, config, verifier, state: RwLock::new(SessionState::SignedOut) }
    }
}

impl fmt::Debug for CredentialSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSession")
            .field("config", &self.config)
            .field("verifier", &self.verifier)
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

impl CredentialSession {
    /// Session policy in effect.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Snapshot of the local state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.read().clone()
    }

    /// The persisted session token, if any.
    #[must_use]
    pub fn stored_token(&self) -> Option<SessionToken> {
        self.tokens.get(&self.config.token_key).map(SessionToken::from_stored)
    }

    /// Signs in with a username and password.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidCredentials`] if the provider rejects the credentials
    /// - [`AuthError::NotAuthorized`] if the operator lacks the admin group
    /// - [`AuthError::PasswordChangeRequired`] if the provider demands a new password
    /// - [`AuthError::SessionExpired`] if the issued token is already expired
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<Session> {
        let outcome = self.provider.authenticate(username, password).await?;
        self.accept(outcome)
    }

    /// Answers a new-password challenge returned by [`login`](Self::login).
    ///
    /// # Errors
    ///
    /// Same as [`login`](Self::login), plus [`AuthError::Provider`] if the
    /// provider refuses the answer.
    #[tracing::instrument(skip_all, fields(username = challenge.username()))]
    pub async fn complete_password_change(
        &self,
        challenge: &PasswordChallenge,
        new_password: &str,
    ) -> Result<Session> {
        let outcome = self.provider.complete_new_password(challenge, new_password).await?;
        self.accept(outcome)
    }

    fn accept(&self, outcome: AuthOutcome) -> Result<Session> {
        match outcome {
            AuthOutcome::Authenticated { id_token } => {
                let session = self.admit(&id_token)?;
                self.persist(session.clone());
                tracing::info!(principal = session.principal(), "operator signed in");
                Ok(session)
            },
            AuthOutcome::NewPasswordRequired(challenge) => {
                tracing::info!(username = challenge.username(), "password change required");
                Err(AuthError::PasswordChangeRequired(challenge))
            },
        }
    }

    /// Signs out.
    ///
    /// Local state is cleared before the provider is contacted; a provider
    /// failure is logged and otherwise ignored.
    #[tracing::instrument(skip(self))]
    pub async fn logout(&self) {
        {
            let mut state = self.state.write();
            self.tokens.remove(&self.config.token_key);
            *state = SessionState::SignedOut;
        }

        if let Err(err) = self.provider.sign_out().await {
            tracing::warn!(error = %err, "provider sign-out failed after local session was cleared");
        }
    }

    /// Refreshes the session through the provider.
    ///
    /// # Errors
    ///
    /// - [`AuthError::SessionExpired`] if there is no stored token, the provider holds no
    ///   session, the refresh fails, the refreshed token is expired, or the session was
    ///   ended by [`logout`](Self::logout) while the refresh was in flight
    /// - [`AuthError::NotAuthorized`] if the refreshed token lacks the admin group
    ///
    /// Every error leaves the stored token removed. The session becomes
    /// [`SessionState::Expired`], unless it was signed out, which it stays.
    #[tracing::instrument(skip(self))]
    pub async fn check_session(&self) -> Result<SessionCheck> {
        if self.tokens.get(&self.config.token_key).is_none() {
            self.expire();
            return Err(AuthError::SessionExpired);
        }

        let refreshed = match self.provider.refresh_session().await {
            Ok(Some(id_token)) => id_token,
            Ok(None) => {
                tracing::debug!("provider holds no session");
                self.expire();
                return Err(AuthError::SessionExpired);
            },
            Err(err) => {
                tracing::warn!(error = %err, "session refresh failed");
                self.expire();
                return Err(AuthError::SessionExpired);
            },
        };

        let session = match self.admit(&refreshed) {
            Ok(session) => session,
            Err(err) => {
                self.expire();
                return Err(err);
            },
        };

        // Compare and store under the state lock so concurrent checks report
        // a given token change once.
        let mut state = self.state.write();
        let Some(stored) = self.tokens.get(&self.config.token_key) else {
            // Logged out or expired while the refresh was in flight.
            tracing::debug!("session ended during refresh, discarding refreshed token");
            return Err(AuthError::SessionExpired);
        };
        let changed = stored != session.token().as_stored();
        if changed {
            self.tokens.set(&self.config.token_key, session.token().as_stored().to_owned());
        }
        *state = SessionState::Authenticated(session.clone());
        drop(state);

        if changed {
            tracing::info!(principal = session.principal(), "session token changed, reload required");
            Ok(SessionCheck::Reload(session))
        } else {
            Ok(SessionCheck::Valid)
        }
    }

    /// Returns the current session without contacting the provider.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SessionExpired`] unless an unexpired session is held.
    pub fn authorize(&self) -> Result<Session> {
        match &*self.state.read() {
            SessionState::Authenticated(session) if !session.is_expired_at(Utc::now()) => {
                Ok(session.clone())
            },
            _ => Err(AuthError::SessionExpired),
        }
    }

    /// Decodes `id_token` and applies the expiry and group policy.
    fn admit(&self, id_token: &str) -> Result<Session> {
        let claims = match &self.verifier {
            Some(verifier) => verifier.verify(id_token)?,
            None => decode_id_token_claims(id_token)?,
        };

        if claims.is_expired_at(Utc::now()) {
            return Err(AuthError::SessionExpired);
        }
        if !claims.is_member_of(&self.config.admin_group) {
            tracing::warn!(
                principal = claims.principal(),
                group = %self.config.admin_group,
                "principal is not in the admin group"
            );
            return Err(AuthError::not_authorized(&self.config.admin_group));
        }

        Ok(Session::from_claims(claims, SessionToken::from_id_token(id_token)))
    }

    fn persist(&self, session: Session) {
        let mut state = self.state.write();
        self.tokens.set(&self.config.token_key, session.token().as_stored().to_owned());
        *state = SessionState::Authenticated(session);
    }

    fn expire(&self) {
        let mut state = self.state.write();
        self.tokens.remove(&self.config.token_key);
        if !matches!(*state, SessionState::SignedOut) {
            *state = SessionState::Expired;
        }
    }
}
