//! Auth middleware for Axum routes.
//!
//! Validates provider-issued bearer tokens and injects the verified
//! [`Subject`] into request extensions. Deny-by-default: if no identity
//! provider is configured, all requests are rejected.

use crate::api::handlers::{ApiState, AppError};
use crate::auth::verifier::AuthError;
use crate::auth::Subject;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Middleware that requires a valid bearer token.
///
/// # Behavior
/// 1. If no verifier is configured → 503 (deny-by-default)
/// 2. Extract `Authorization: Bearer <token>` header → 401 if missing/malformed
/// 3. Verify signature, expiry, issuer, audience → 401 (or 503 when the
///    key set is unreachable)
/// 4. Inject `Subject` into request extensions for downstream handlers
pub async fn require_auth(
    State(state): State<ApiState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let verifier = state
        .verifier
        .as_ref()
        .ok_or(AppError::Unauthenticated(AuthError::NotConfigured))?;

    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthenticated(AuthError::MissingHeader))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthenticated(AuthError::MalformedHeader))?;

    let subject = verifier
        .verify(token)
        .await
        .map_err(AppError::Unauthenticated)?;

    req.extensions_mut().insert(subject);

    Ok(next.run(req).await)
}

// ============================================================================
// Tests
// ============================================================================
