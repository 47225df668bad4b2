//! Shared API state, the error type every handler returns, and the
//! health/service endpoints.

use crate::auth::verifier::AuthError;
use crate::auth::TokenVerifier;
use crate::billing::StripeClient;
use crate::speech::SpeechClient;
use crate::{store, Config};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;

/// Shared server state
pub struct ServerState {
    pub pool: PgPool,
    /// Token verifier — None means deny-by-default
    pub verifier: Option<TokenVerifier>,
    /// Stripe client — None when billing is not configured
    pub stripe: Option<StripeClient>,
    /// Speech-synthesis client — None when not configured
    pub speech: Option<SpeechClient>,
    pub config: Arc<Config>,
}

/// Shared API state handle
pub type ApiState = Arc<ServerState>;

// ============================================================================
// Error type
// ============================================================================

/// Client-facing error. Maps to a status code and a JSON body
/// `{"error": <message>, "code": <stable code>}`.
///
/// No 409: conflicts (duplicate friend edge, room full, already in a room)
/// surface as 400.
#[derive(Debug)]
pub enum AppError {
    Internal(anyhow::Error),
    NotFound(String),
    BadRequest(String),
    /// Business-rule violation on a state transition (e.g. accepting a
    /// non-pending friend request)
    InvalidState(String),
    RoomFull,
    Unauthenticated(AuthError),
    Forbidden(String),
    ServiceUnavailable(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::InvalidState(_) | AppError::RoomFull => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthenticated(e) if e.is_unavailable() => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal_error",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::InvalidState(_) => "invalid_state",
            AppError::RoomFull => "room_full",
            AppError::Unauthenticated(e) => e.code(),
            AppError::Forbidden(_) => "forbidden",
            AppError::ServiceUnavailable(_) => "service_unavailable",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let code = self.code();
        let message = match &self {
            // Never leak internal detail; the full chain goes to the log.
            AppError::Internal(e) => {
                tracing::error!("internal error: {e:#}");
                "internal server error".to_string()
            }
            AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::InvalidState(msg)
            | AppError::Forbidden(msg)
            | AppError::ServiceUnavailable(msg) => msg.clone(),
            AppError::RoomFull => "room is full".to_string(),
            AppError::Unauthenticated(e) => e.to_string(),
        };

        let body = Json(serde_json::json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.into())
    }
}

// ============================================================================
// Health & service endpoints
// ============================================================================

#[derive(Serialize)]
pub struct ServiceBanner {
    pub service: &'static str,
    pub version: &'static str,
}

/// GET / — public service banner.
pub async fn root() -> Json<ServiceBanner> {
    Json(ServiceBanner {
        service: "playroom-api",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
}

/// GET /healthz — liveness probe. Healthy whenever the process answers.
pub async fn healthz() -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "healthy" })
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub database: &'static str,
}

/// GET /readyz — readiness probe. Runs a trivial database round-trip and
/// reports degraded (503) on failure, with no side effects.
pub async fn readyz(State(state): State<ApiState>) -> (StatusCode, Json<ReadinessResponse>) {
    match store::ping(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready",
                database: "connected",
            }),
        ),
        Err(e) => {
            tracing::warn!("readiness check failed: {e:#}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "not_ready",
                    database: "disconnected",
                }),
            )
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
