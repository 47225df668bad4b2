//! Subject extractor for Axum handlers.
//!
//! Pulls the authenticated identity from request extensions (populated by
//! the `require_auth` middleware) so handlers can take it as a parameter
//! and thread it into the data-access layer explicitly.

use crate::api::handlers::{ApiState, AppError};
use crate::auth::verifier::{AuthError, Subject};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

impl FromRequestParts<ApiState> for Subject {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &ApiState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async {
            parts
                .extensions
                .get::<Subject>()
                .cloned()
                .ok_or(AppError::Unauthenticated(AuthError::MissingHeader))
        }
    }
}
