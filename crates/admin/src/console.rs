//! Session-gated admin console.
//!
//! [`AdminConsole`] ties a [`CredentialSession`] to an [`AdminGateway`]. The
//! gateway's backend is built from the session token by a
//! [`BackendFactory`], so it is rebuilt whenever the token changes and
//! dropped whenever the session ends.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use keyrot_authn::{
    CredentialSession, IdentityProvider, MemoryTokenStore, PasswordChallenge, Session,
    SessionCheck, SessionToken, TokenStore, TokenVerifier,
};
use keyrot_storage::KvBackend;
use parking_lot::RwLock;
use serde_json::Value;

use crate::{
    config::ConsoleConfig,
    error::{AdminError, AdminResult},
    gateway::AdminGateway,
    request::AdminRequest,
    response::AdminResponse,
};

/// Builds a table backend bound to a session token.
pub trait BackendFactory: Send + Sync {
    /// Returns a backend whose requests are authorized by `token`.
    ///
    /// # Errors
    ///
    /// Any failure to derive delegated credentials from the token.
    fn build(&self, token: &SessionToken) -> AdminResult<Arc<dyn KvBackend>>;
}

/// Factory that hands out the same backend for every token.
///
/// Useful for development and tests, where the backend needs no delegated
/// credentials.
pub struct StaticBackendFactory {
    backend: Arc<dyn KvBackend>,
    builds: AtomicUsize,
}

impl StaticBackendFactory {
    /// Creates a factory over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend, builds: AtomicUsize::new(0) }
    }

    /// Number of times [`build`](BackendFactory::build) has been called.
    #[must_use]
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for StaticBackendFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticBackendFactory").field("builds", &self.builds()).finish_non_exhaustive()
    }
}

impl BackendFactory for StaticBackendFactory {
    fn build(&self, _token: &SessionToken) -> AdminResult<Arc<dyn KvBackend>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.backend))
    }
}

/// Entry point for the presentation layer.
///
/// Every request first runs [`CredentialSession::check_session`]. A changed
/// token rebuilds the gateway before the request proceeds; a failed check
/// drops the gateway and surfaces the error.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use keyrot_admin::{AdminConsole, AdminRequest, ConsoleConfig, KeyInput, StaticBackendFactory};
/// use keyrot_authn::testutil::{IdTokenSpec, MockIdentityProvider, unsigned_id_token};
/// use keyrot_storage::MemoryBackend;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let token = unsigned_id_token(&IdTokenSpec::admin("alice"));
///     let console = AdminConsole::builder()
///         .provider(Arc::new(MockIdentityProvider::new().with_user("alice", "pw", token)))
///         .factory(Arc::new(StaticBackendFactory::new(Arc::new(MemoryBackend::new()))))
///         .config(ConsoleConfig::builder().table_name("encryption-keys").build()?)
///         .build();
///
///     console.login("alice", "pw").await?;
///     let created = console
///         .handle("Encryption", AdminRequest::Create(KeyInput::new("A".repeat(32))))
///         .await?;
///     assert_eq!(created.as_record().map(|r| r.version.0), Some(1));
///     Ok(())
/// }
/// ```
pub struct AdminConsole {
    session: CredentialSession,
    factory: Arc<dyn BackendFactory>,
    config: ConsoleConfig,
    gateway: RwLock<Option<Arc<AdminGateway>>>,
}

#[bon::bon]
impl AdminConsole {
    /// Creates a console.
    ///
    /// # Optional Fields
    ///
    /// * `tokens` - Session token storage (default: a fresh [`MemoryTokenStore`]).
    /// * `verifier` - Signature verifier for id tokens.
    #[builder]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        factory: Arc<dyn BackendFactory>,
        config: ConsoleConfig,
        #[builder(default = Arc::new(MemoryTokenStore::new()) as Arc<dyn TokenStore>)]
        tokens: Arc<dyn TokenStore>,
        verifier: Option<TokenVerifier>,
    ) -> Self {
        let session = CredentialSession::builder()
            .provider(provider)
            .tokens(tokens)
            .config(config.session_config())
            .maybe_verifier(verifier)
            .build();
        Self { session, factory, config, gateway: RwLock::new(None) }
    }
}

impl fmt::Debug for AdminConsole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminConsole")
            .field("session", &self.session)
            .field("config", &self.config)
            .field("gateway_ready", &self.gateway.read().is_some())
            .finish_non_exhaustive()
    }
}

impl AdminConsole {
    /// Configuration in effect.
    #[must_use]
    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    /// The underlying credential session.
    #[must_use]
    pub fn session(&self) -> &CredentialSession {
        &self.session
    }

    /// Returns `true` while a gateway is bound to a session token.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.gateway.read().is_some()
    }

    /// Signs in and binds a gateway to the new session.
    ///
    /// # Errors
    ///
    /// Authentication errors mapped into [`AdminError`], or the factory's
    /// error if no backend can be built for the session.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> AdminResult<Session> {
        let session = self.session.login(username, password).await?;
        self.bind(&session)?;
        Ok(session)
    }

    /// Answers a new-password challenge and binds a gateway to the new session.
    ///
    /// # Errors
    ///
    /// Same as [`login`](Self::login).
    #[tracing::instrument(skip_all, fields(username = challenge.username()))]
    pub async fn complete_password_change(
        &self,
        challenge: &PasswordChallenge,
        new_password: &str,
    ) -> AdminResult<Session> {
        let session = self.session.complete_password_change(challenge, new_password).await?;
        self.bind(&session)?;
        Ok(session)
    }

    /// Signs out and drops the gateway.
    #[tracing::instrument(skip(self))]
    pub async fn logout(&self) {
        self.gateway.write().take();
        self.session.logout().await;
    }

    /// Checks the session, then executes `request` against `resource`.
    ///
    /// # Errors
    ///
    /// - [`AdminError::SessionExpired`] (or another auth error) if the session check fails;
    ///   the gateway is dropped and the console has to sign in again
    /// - any error from [`AdminGateway::handle`]
    #[tracing::instrument(skip(self, request), fields(kind = %request.kind()))]
    pub async fn handle(&self, resource: &str, request: AdminRequest) -> AdminResult<AdminResponse> {
        let gateway = self.current_gateway().await?;
        gateway.handle(resource, request).await
    }

    /// Parses a raw request and executes it, returning the serialized envelope.
    ///
    /// # Errors
    ///
    /// Parse errors from [`AdminRequest::from_raw`], then the same as
    /// [`handle`](Self::handle).
    pub async fn handle_raw(&self, resource: &str, kind: &str, params: Value) -> AdminResult<Value> {
        let request = AdminRequest::from_raw(kind, params)?;
        let response = self.handle(resource, request).await?;
        serde_json::to_value(&response)
            .map_err(|e| AdminError::invalid_request(format!("unserializable response: {e}")))
    }

    async fn current_gateway(&self) -> AdminResult<Arc<AdminGateway>> {
        match self.session.check_session().await {
            Ok(SessionCheck::Reload(session)) => {
                tracing::info!(principal = session.principal(), "rebuilding gateway for new token");
                self.bind(&session)
            },
            Ok(SessionCheck::Valid) => {
                let current = self.gateway.read().clone();
                match current {
                    Some(gateway) => Ok(gateway),
                    // Restored from a stored token without a login in this process.
                    None => self.bind(&self.session.authorize()?),
                }
            },
            Err(err) => {
                self.gateway.write().take();
                Err(err.into())
            },
        }
    }

    fn bind(&self, session: &Session) -> AdminResult<Arc<AdminGateway>> {
        let backend = self.factory.build(session.token())?;
        let gateway = Arc::new(AdminGateway::from_config(&self.config, backend));
        *self.gateway.write() = Some(Arc::clone(&gateway));
        Ok(gateway)
    }
}
