//! # keyrot authentication
//!
//! Operator sessions for the keyrot admin console.
//!
//! This crate provides:
//! - **Credential session**: login, group-membership authorization, refresh with a reload signal
//!   on token change, logout
//! - **Identity provider seam**: the [`IdentityProvider`] trait the session drives
//! - **Token persistence**: [`TokenStore`] and the wrapped [`SessionToken`]
//! - **Id token claims**: unverified decoding and optional signature verification
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use keyrot_authn::{CredentialSession, IdentityProvider, MemoryTokenStore, SessionCheck};
//!
//! # async fn example(provider: Arc<dyn IdentityProvider>) -> Result<(), Box<dyn std::error::Error>> {
//! let session = CredentialSession::builder()
//!     .provider(provider)
//!     .tokens(Arc::new(MemoryTokenStore::new()))
//!     .build();
//!
//! session.login("operator", "correct horse battery staple").await?;
//!
//! if let SessionCheck::Reload(fresh) = session.check_session().await? {
//!     println!("token rotated for {}", fresh.principal());
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Id token claims.
pub mod claims;
/// Authentication error types.
pub mod error;
/// Identity provider seam.
pub mod provider;
/// The operator credential session.
pub mod session;
/// Shared test utilities.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;
/// Session token persistence.
pub mod token;

// Re-export key types for convenience
pub use claims::{IdTokenClaims, TokenVerifier};
pub use error::{AuthError, Result};
pub use provider::{AuthOutcome, IdentityProvider, PasswordChallenge};
pub use session::{
    CredentialSession, DEFAULT_ADMIN_GROUP, Session, SessionCheck, SessionConfig, SessionState,
};
pub use token::{MemoryTokenStore, SESSION_TOKEN_KEY, SessionToken, TokenStore};
