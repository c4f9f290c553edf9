//! Shared test utilities for session testing.
//!
//! This module provides helpers for generating Ed25519 key pairs, minting id
//! tokens with chosen groups and lifetimes, crafting unsigned tokens, and a
//! scripted [`MockIdentityProvider`]. It is feature-gated behind `testutil`
//! to prevent leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! keyrot-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use keyrot_authn::testutil::{IdTokenSpec, MockIdentityProvider, unsigned_id_token};
//! ```

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use ed25519_dalek::SigningKey;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use rand_core::OsRng;
use serde_json::json;

use crate::{
    error::{AuthError, Result},
    provider::{AuthOutcome, IdentityProvider, PasswordChallenge},
    session::DEFAULT_ADMIN_GROUP,
};

/// Current time in seconds since the epoch.
#[must_use]
pub fn now_secs() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

/// Generates a test Ed25519 key pair.
///
/// Returns `(pkcs8_der, public_key_base64url)` where:
/// - `pkcs8_der` is the private key in PKCS#8 DER format (suitable for
///   [`EncodingKey::from_ed_der`])
/// - `public_key_base64url` is the 32-byte public key encoded as base64url without padding
///   (suitable for [`TokenVerifier::ed25519`](crate::claims::TokenVerifier::ed25519))
///
/// Each call generates a fresh random key pair.
#[must_use]
pub fn generate_test_keypair() -> (Vec<u8>, String) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let public_key_b64 = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes());

    let mut pkcs8_der = vec![
        0x30, 0x2e, // SEQUENCE, 46 bytes
        0x02, 0x01, 0x00, // INTEGER version 0
        0x30, 0x05, // SEQUENCE, 5 bytes (algorithm identifier)
        0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
        0x04, 0x22, // OCTET STRING, 34 bytes
        0x04, 0x20, // OCTET STRING, 32 bytes (the actual key)
    ];
    pkcs8_der.extend_from_slice(&signing_key.to_bytes());

    (pkcs8_der, public_key_b64)
}

/// Shape of an id token to mint.
#[derive(Clone, Debug)]
pub struct IdTokenSpec {
    /// `cognito:username` claim; also used to derive `sub`.
    pub username: String,
    /// `cognito:groups` claim. `None` omits the claim entirely.
    pub groups: Option<Vec<String>>,
    /// Seconds from now until expiry. Negative values mint expired tokens.
    pub lifetime_secs: i64,
    /// Extra `jti`-style nonce so two otherwise identical tokens differ.
    pub nonce: u64,
}

impl IdTokenSpec {
    /// A one-hour token for `username` in the default admin group.
    #[must_use]
    pub fn admin(username: &str) -> Self {
        Self {
            username: username.to_owned(),
            groups: Some(vec![DEFAULT_ADMIN_GROUP.to_owned()]),
            lifetime_secs: 3600,
            nonce: 0,
        }
    }

    /// A one-hour token for `username` with no group claim.
    #[must_use]
    pub fn without_groups(username: &str) -> Self {
        Self { groups: None, ..Self::admin(username) }
    }

    /// Replaces the group list.
    #[must_use]
    pub fn in_groups(mut self, groups: &[&str]) -> Self {
        self.groups = Some(groups.iter().map(|g| (*g).to_owned()).collect());
        self
    }

    /// Makes the token expired an hour ago.
    #[must_use]
    pub fn expired(mut self) -> Self {
        self.lifetime_secs = -3600;
        self
    }

    /// Sets the nonce, producing a distinct token for the same principal.
    #[must_use]
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    fn claims(&self) -> serde_json::Value {
        let now = now_secs();
        let exp = now.saturating_add_signed(self.lifetime_secs);
        let mut claims = json!({
            "sub": format!("sub-{}", self.username),
            "cognito:username": self.username,
            "exp": exp,
            "iat": now,
            "jti": format!("nonce-{}", self.nonce),
        });
        if let Some(groups) = &self.groups {
            claims["cognito:groups"] = json!(groups);
        }
        claims
    }
}

/// Mints an EdDSA-signed id token.
///
/// # Panics
///
/// Panics if JWT encoding fails (should not happen with valid inputs).
#[must_use]
pub fn mint_id_token(pkcs8_der: &[u8], spec: &IdTokenSpec) -> String {
    let header = Header::new(Algorithm::EdDSA);
    let encoding_key = EncodingKey::from_ed_der(pkcs8_der);
    jsonwebtoken::encode(&header, &spec.claims(), &encoding_key).expect("Failed to encode test JWT")
}

/// Crafts an id token with an empty signature.
///
/// Sufficient wherever claims are decoded without verification.
#[must_use]
pub fn unsigned_id_token(spec: &IdTokenSpec) -> String {
    craft_raw_jwt(&json!({"alg": "EdDSA", "typ": "JWT"}), &spec.claims())
}

/// Creates a raw JWT string from arbitrary header and payload JSON.
///
/// The resulting JWT has the structure `{header_b64}.{payload_b64}.`
/// with an empty signature.
///
/// # Panics
///
/// Panics if JSON serialization fails.
#[must_use]
pub fn craft_raw_jwt(header_json: &serde_json::Value, payload_json: &serde_json::Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.")
}

#[derive(Clone, Debug)]
enum Account {
    Ready { password: String, id_token: String },
    MustChangePassword { password: String, id_token: String },
}

/// Scripted [`IdentityProvider`].
///
/// Accounts are registered up front. A successful sign-in makes the
/// account's token the provider-side session, which
/// [`refresh_session`](IdentityProvider::refresh_session) then returns until
/// a test rotates it with [`rotate_token`](Self::rotate_token).
#[derive(Debug, Default)]
pub struct MockIdentityProvider {
    accounts: Mutex<HashMap<String, Account>>,
    current: Mutex<Option<String>>,
    fail_refresh: AtomicBool,
    fail_sign_out: AtomicBool,
    refresh_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
}

impl MockIdentityProvider {
    /// Creates a provider with no accounts and no session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account that signs in with `password` and receives `id_token`.
    #[must_use]
    pub fn with_user(self, username: &str, password: &str, id_token: String) -> Self {
        self.accounts.lock().insert(
            username.to_owned(),
            Account::Ready { password: password.to_owned(), id_token },
        );
        self
    }

    /// Registers an account that must change its password before receiving `id_token`.
    #[must_use]
    pub fn with_pending_user(self, username: &str, password: &str, id_token: String) -> Self {
        self.accounts.lock().insert(
            username.to_owned(),
            Account::MustChangePassword { password: password.to_owned(), id_token },
        );
        self
    }

    /// Replaces the provider-side session token, as a background refresh would.
    pub fn rotate_token(&self, id_token: Option<String>) {
        *self.current.lock() = id_token;
    }

    /// Makes subsequent refreshes fail with a provider error.
    pub fn fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent sign-outs fail with a provider error.
    pub fn fail_sign_out(&self, fail: bool) {
        self.fail_sign_out.store(fail, Ordering::SeqCst);
    }

    /// Number of refresh calls so far.
    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Number of sign-out calls so far.
    #[must_use]
    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn authenticate(&self, username: &str, password: &str) -> Result<AuthOutcome> {
        let account = self.accounts.lock().get(username).cloned();
        match account {
            Some(Account::Ready { password: expected, id_token }) if expected == password => {
                *self.current.lock() = Some(id_token.clone());
                Ok(AuthOutcome::Authenticated { id_token })
            },
            Some(Account::MustChangePassword { password: expected, .. }) if expected == password => {
                Ok(AuthOutcome::NewPasswordRequired(
                    PasswordChallenge::new(username, format!("challenge-{username}"))
                        .with_required_attributes(["name"]),
                ))
            },
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    async fn complete_new_password(
        &self,
        challenge: &PasswordChallenge,
        new_password: &str,
    ) -> Result<AuthOutcome> {
        let mut accounts = self.accounts.lock();
        let Some(Account::MustChangePassword { id_token, .. }) =
            accounts.get(challenge.username()).cloned()
        else {
            return Err(AuthError::provider("no pending password challenge"));
        };
        if challenge.session() != format!("challenge-{}", challenge.username()) {
            return Err(AuthError::provider("challenge session mismatch"));
        }

        accounts.insert(
            challenge.username().to_owned(),
            Account::Ready { password: new_password.to_owned(), id_token: id_token.clone() },
        );
        drop(accounts);

        *self.current.lock() = Some(id_token.clone());
        Ok(AuthOutcome::Authenticated { id_token })
    }

    async fn refresh_session(&self) -> Result<Option<String>> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(AuthError::provider("refresh endpoint unavailable"));
        }
        Ok(self.current.lock().clone())
    }

    async fn sign_out(&self) -> Result<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        *self.current.lock() = None;
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(AuthError::provider("sign-out endpoint unavailable"));
        }
        Ok(())
    }
}

/// Asserts that a [`Result<T, AuthError>`] is an `Err` matching the given [`AuthError`] variant.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use keyrot_authn::assert_auth_error;
/// use keyrot_authn::error::AuthError;
///
/// let result: Result<(), AuthError> = Err(AuthError::SessionExpired);
/// assert_auth_error!(result, SessionExpired);
/// ```
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "expected AuthError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
    ($result:expr, $variant:ident, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "{}: expected AuthError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            $result,
        );
    };
}
