//! Id token claims.
//!
//! The session only reads a handful of claims from the provider's id token:
//! the subject, the expiry and the group list. Decoding without verification
//! is the default because the provider already verified the token when it
//! issued it; a [`TokenVerifier`] adds signature checking on top.
//!
//! # Example
//!
//! ```no_run
//! // Requires a provider-issued id token string.
//! use keyrot_authn::claims::{decode_id_token_claims, decode_id_token_header};
//!
//! # fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let header = decode_id_token_header(token)?;
//! let claims = decode_id_token_claims(token)?;
//!
//! println!("Algorithm: {:?}", header.alg);
//! println!("Groups: {:?}", claims.groups);
//! # Ok(())
//! # }
//! ```

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Claim carrying the principal's group memberships.
pub const GROUPS_CLAIM: &str = "cognito:groups";

/// Claims read from an id token.
///
/// ```json
/// {
///   "sub": "5f1c0c8e-...",
///   "exp": 1234567890,
///   "iat": 1234564290,
///   "email": "ops@example.com",
///   "cognito:username": "ops",
///   "cognito:groups": ["AdminGroup"]
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Subject, the provider's stable user id.
    pub sub: String,
    /// Expiration time (seconds since epoch).
    pub exp: u64,
    /// Issued at (optional, seconds since epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    /// Email address (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Provider username (optional).
    #[serde(rename = "cognito:username", default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Group memberships. Absent means no groups.
    #[serde(rename = "cognito:groups", default)]
    pub groups: Vec<String>,
}

impl IdTokenClaims {
    /// Returns `true` if the principal belongs to `group`.
    #[must_use]
    pub fn is_member_of(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    /// Name to show for the principal: username, then email, then subject.
    #[must_use]
    pub fn principal(&self) -> &str {
        self.username.as_deref().or(self.email.as_deref()).unwrap_or(&self.sub)
    }

    /// Expiry as a timestamp. Out-of-range values saturate to the far future.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        i64::try_from(self.exp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Returns `true` if the token is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() <= now
    }
}

/// Decode the id token header without verification.
///
/// # Errors
///
/// Returns an error if the header cannot be decoded.
pub fn decode_id_token_header(token: &str) -> Result<Header> {
    decode_header(token)
        .map_err(|e| AuthError::invalid_token_format(format!("Failed to decode JWT header: {e}")))
}

/// Decode id token claims without verification.
///
/// # Errors
///
/// Returns an error if:
/// - The token does not have exactly 3 parts
/// - The payload cannot be base64-decoded
/// - The payload cannot be parsed as JSON
/// - The `sub` claim is empty
pub fn decode_id_token_claims(token: &str) -> Result<IdTokenClaims> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::invalid_token_format("JWT must have 3 parts separated by dots"));
    }

    let payload = URL_SAFE_NO_PAD.decode(parts[1]).map_err(|e| {
        AuthError::invalid_token_format(format!("Failed to decode JWT payload: {e}"))
    })?;

    let claims: IdTokenClaims = serde_json::from_slice(&payload)
        .map_err(|e| AuthError::invalid_token_format(format!("Failed to parse JWT claims: {e}")))?;

    if claims.sub.is_empty() {
        return Err(AuthError::missing_claim("sub"));
    }

    Ok(claims)
}

/// Verifies id token signatures against a known public key.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    algorithm: Algorithm,
}

impl TokenVerifier {
    /// Creates a verifier for tokens signed with `algorithm`.
    #[must_use]
    pub fn new(key: DecodingKey, algorithm: Algorithm) -> Self {
        Self { key, algorithm }
    }

    /// Creates an EdDSA verifier from a base64url Ed25519 public key.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidTokenFormat`] if the key is not valid base64url.
    pub fn ed25519(public_key_b64: &str) -> Result<Self> {
        let key = DecodingKey::from_ed_components(public_key_b64)?;
        Ok(Self::new(key, Algorithm::EdDSA))
    }

    /// Verifies the signature and expiry of `token` and returns its claims.
    ///
    /// # Errors
    ///
    /// - [`AuthError::SessionExpired`] if the token is expired
    /// - [`AuthError::InvalidTokenFormat`] if the token is malformed or the signature is invalid
    pub fn verify(&self, token: &str) -> Result<IdTokenClaims> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = 0;

        let data = decode::<IdTokenClaims>(token, &self.key, &validation)?;
        Ok(data.claims)
    }
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier").field("algorithm", &self.algorithm).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testutil::{
        IdTokenSpec, craft_raw_jwt, generate_test_keypair, mint_id_token, now_secs,
    };

    #[test]
    fn test_decode_reads_group_claim() {
        let token = craft_raw_jwt(
            &json!({"alg": "EdDSA", "typ": "JWT"}),
            &json!({"sub": "u-1", "exp": 4_000_000_000u64, "cognito:groups": ["AdminGroup", "Ops"]}),
        );
        let claims = decode_id_token_claims(&token).unwrap();
        assert!(claims.is_member_of("AdminGroup"));
        assert!(claims.is_member_of("Ops"));
        assert!(!claims.is_member_of("admingroup"));
    }

    #[test]
    fn test_missing_group_claim_means_no_groups() {
        let token =
            craft_raw_jwt(&json!({"alg": "EdDSA"}), &json!({"sub": "u-1", "exp": 4_000_000_000u64}));
        let claims = decode_id_token_claims(&token).unwrap();
        assert!(claims.groups.is_empty());
        assert!(!claims.is_member_of("AdminGroup"));
    }

    #[test]
    fn test_decode_rejects_wrong_part_count() {
        assert!(matches!(
            decode_id_token_claims("only.two"),
            Err(AuthError::InvalidTokenFormat(_))
        ));
    }

    #[test]
    fn test_decode_rejects_non_json_payload() {
        let payload = URL_SAFE_NO_PAD.encode("not json");
        let token = format!("e30.{payload}.");
        assert!(matches!(decode_id_token_claims(&token), Err(AuthError::InvalidTokenFormat(_))));
    }

    #[test]
    fn test_decode_rejects_empty_subject() {
        let token = craft_raw_jwt(&json!({"alg": "EdDSA"}), &json!({"sub": "", "exp": 1u64}));
        assert!(matches!(decode_id_token_claims(&token), Err(AuthError::MissingClaim(_))));
    }

    #[test]
    fn test_principal_preference() {
        let mut claims = IdTokenClaims {
            sub: "u-1".into(),
            exp: 0,
            iat: None,
            email: Some("ops@example.com".into()),
            username: None,
            groups: vec![],
        };
        assert_eq!(claims.principal(), "ops@example.com");
        claims.username = Some("ops".into());
        assert_eq!(claims.principal(), "ops");
    }

    #[test]
    fn test_expiry_comparison() {
        let now = Utc::now();
        let claims = IdTokenClaims {
            sub: "u-1".into(),
            exp: u64::try_from(now.timestamp()).unwrap() - 1,
            iat: None,
            email: None,
            username: None,
            groups: vec![],
        };
        assert!(claims.is_expired_at(now));
    }

    #[test]
    fn test_verifier_accepts_matching_key() {
        let (pkcs8, public_key) = generate_test_keypair();
        let token = mint_id_token(&pkcs8, &IdTokenSpec::admin("alice"));

        let verifier = TokenVerifier::ed25519(&public_key).unwrap();
        let claims = verifier.verify(&token).unwrap();
        assert_eq!(claims.principal(), "alice");
        assert!(claims.exp > now_secs());
    }

    #[test]
    fn test_verifier_rejects_foreign_key() {
        let (pkcs8, _) = generate_test_keypair();
        let (_, other_public) = generate_test_keypair();
        let token = mint_id_token(&pkcs8, &IdTokenSpec::admin("alice"));

        let verifier = TokenVerifier::ed25519(&other_public).unwrap();
        assert!(matches!(verifier.verify(&token), Err(AuthError::InvalidTokenFormat(_))));
    }

    #[test]
    fn test_verifier_rejects_expired_token() {
        let (pkcs8, public_key) = generate_test_keypair();
        let token = mint_id_token(&pkcs8, &IdTokenSpec::admin("alice").expired());

        let verifier = TokenVerifier::ed25519(&public_key).unwrap();
        assert!(matches!(verifier.verify(&token), Err(AuthError::SessionExpired)));
    }

    #[test]
    fn test_decode_header_reads_algorithm() {
        let (pkcs8, _) = generate_test_keypair();
        let token = mint_id_token(&pkcs8, &IdTokenSpec::admin("alice"));
        assert_eq!(decode_id_token_header(&token).unwrap().alg, Algorithm::EdDSA);
    }
}
