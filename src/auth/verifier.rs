//! Bearer-token verification against the identity provider's key set.
//!
//! Tokens are RS256-signed by the provider. Both the API audience and the
//! OAuth2 client id are accepted (access tokens carry the former, id tokens
//! the latter), tried in that order.

use super::jwks::JwksCache;
use crate::IdentityConfig;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// How long a fetched key set is trusted before it is refreshed.
const JWKS_TTL: Duration = Duration::from_secs(600);

/// Verified identity of the caller.
#[derive(Debug, Clone)]
pub struct Subject {
    /// Identity provider's stable user reference (the `sub` claim) — the
    /// tenancy key for all owned data.
    pub subject: String,
    /// Email claim when the token carries one.
    pub email: Option<String>,
}

/// Terminal authentication failures. Every variant maps to a stable error
/// code surfaced to the client.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingHeader,
    #[error("invalid authorization header format")]
    MalformedHeader,
    #[error("invalid token")]
    InvalidToken,
    #[error("token has expired")]
    TokenExpired,
    #[error("invalid token claims")]
    InvalidClaims,
    #[error("no matching signing key")]
    UnknownKey,
    #[error("identity provider unavailable")]
    JwksUnavailable,
    #[error("authentication not configured")]
    NotConfigured,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingHeader => "missing_header",
            AuthError::MalformedHeader => "malformed_header",
            AuthError::InvalidToken => "invalid_token",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidClaims => "invalid_claims",
            AuthError::UnknownKey => "unknown_key",
            AuthError::JwksUnavailable => "jwks_unavailable",
            AuthError::NotConfigured => "auth_not_configured",
        }
    }

    /// True for failures caused by the provider being unreachable, a key it
    /// does not publish, or the server being misconfigured — these surface
    /// as 503 rather than 401.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            AuthError::JwksUnavailable | AuthError::UnknownKey | AuthError::NotConfigured
        )
    }
}

#[derive(Deserialize)]
struct RawClaims {
    sub: Option<String>,
    email: Option<String>,
}

pub struct TokenVerifier {
    jwks: JwksCache,
    issuer: String,
    audiences: Vec<String>,
}

impl TokenVerifier {
    pub fn new(
        jwks_url: impl Into<String>,
        issuer: impl Into<String>,
        audiences: Vec<String>,
    ) -> Self {
        Self {
            jwks: JwksCache::new(jwks_url, JWKS_TTL),
            issuer: issuer.into(),
            audiences,
        }
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(
            config.jwks_url(),
            config.issuer(),
            vec![config.audience.clone(), config.client_id.clone()],
        )
    }

    /// Verify a bearer token and extract the caller's identity.
    pub async fn verify(&self, token: &str) -> Result<Subject, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::InvalidToken)?;
        let kid = header.kid.ok_or(AuthError::InvalidToken)?;
        let key = self.jwks.decoding_key(&kid).await?;

        let mut last_claim_error = AuthError::InvalidClaims;
        for audience in &self.audiences {
            let mut validation = Validation::new(Algorithm::RS256);
            validation.set_audience(&[audience]);
            validation.set_issuer(&[&self.issuer]);
            validation.validate_nbf = true;

            match decode::<RawClaims>(token, &key, &validation) {
                Ok(data) => {
                    let subject = data.claims.sub.ok_or(AuthError::InvalidClaims)?;
                    return Ok(Subject {
                        subject,
                        email: data.claims.email,
                    });
                }
                Err(e) => match e.kind() {
                    // Wrong audience: the other configured audience may match
                    ErrorKind::InvalidAudience => {
                        last_claim_error = AuthError::InvalidClaims;
                        continue;
                    }
                    ErrorKind::ExpiredSignature => return Err(AuthError::TokenExpired),
                    ErrorKind::ImmatureSignature
                    | ErrorKind::InvalidIssuer
                    | ErrorKind::MissingRequiredClaim(_) => return Err(AuthError::InvalidClaims),
                    _ => return Err(AuthError::InvalidToken),
                },
            }
        }
        Err(last_claim_error)
    }
}

// ============================================================================
// Tests
// ============================================================================
