//! Billing API handlers: Stripe checkout and the voice-subscription record.

use crate::api::handlers::{ApiState, AppError};
use crate::api::profile_handlers::fetch_parent;
use crate::auth::Subject;
use crate::store::{self, models::*};
use axum::http::HeaderMap;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

const DEFAULT_ORIGIN: &str = "http://localhost:3000";

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Deserialize, Default)]
pub struct CheckoutRequest {
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

#[derive(Deserialize)]
pub struct VoiceSubscriptionUpsert {
    pub stripe_subscription_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub status: String,
    pub plan_type: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/billing/create-checkout — start a subscription checkout and
/// return the payment provider's redirect URL.
pub async fn create_checkout(
    State(state): State<ApiState>,
    subject: Subject,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let stripe = state.stripe.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("payment provider not configured".into())
    })?;

    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let parent = fetch_parent(&mut tx, &subject.subject).await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    let email = req.email.unwrap_or_else(|| parent.email.clone());
    if email.is_empty() {
        return Err(AppError::BadRequest("email is required".into()));
    }
    let name = req
        .name
        .or_else(|| parent.name.clone())
        .unwrap_or_else(|| email.clone());

    // Success/cancel URLs send the user back to wherever they came from
    let origin = headers
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_ORIGIN);

    let customer_id = stripe
        .find_or_create_customer(&email, &name)
        .await
        .map_err(|e| {
            tracing::error!("stripe customer lookup failed: {e:#}");
            AppError::ServiceUnavailable("payment provider unavailable".into())
        })?;

    let url = stripe
        .create_checkout_session(&customer_id, origin)
        .await
        .map_err(|e| {
            tracing::error!("stripe checkout failed: {e:#}");
            AppError::ServiceUnavailable("payment provider unavailable".into())
        })?;

    Ok(Json(CheckoutResponse { url }))
}

/// POST /api/billing/voice-subscription — create or update the parent's
/// subscription record (one per parent).
pub async fn upsert_voice_subscription(
    State(state): State<ApiState>,
    subject: Subject,
    Json(req): Json<VoiceSubscriptionUpsert>,
) -> Result<(StatusCode, Json<VoiceSubscription>), AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let parent = fetch_parent(&mut tx, &subject.subject).await?;

    let subscription = sqlx::query_as::<_, VoiceSubscription>(
        "INSERT INTO voice_subscriptions
           (parent_id, stripe_subscription_id, stripe_customer_id, status, plan_type)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (parent_id) DO UPDATE
           SET stripe_subscription_id = EXCLUDED.stripe_subscription_id,
               stripe_customer_id = EXCLUDED.stripe_customer_id,
               status = EXCLUDED.status,
               plan_type = EXCLUDED.plan_type
         RETURNING *",
    )
    .bind(parent.id)
    .bind(&req.stripe_subscription_id)
    .bind(&req.stripe_customer_id)
    .bind(&req.status)
    .bind(&req.plan_type)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok((StatusCode::CREATED, Json(subscription)))
}

/// GET /api/billing/voice-subscription
pub async fn get_voice_subscription(
    State(state): State<ApiState>,
    subject: Subject,
) -> Result<Json<VoiceSubscription>, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let parent = fetch_parent(&mut tx, &subject.subject).await?;

    let subscription = sqlx::query_as::<_, VoiceSubscription>(
        "SELECT * FROM voice_subscriptions WHERE parent_id = $1",
    )
    .bind(parent.id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("no subscription found".into()))?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(Json(subscription))
}

/// DELETE /api/billing/voice-subscription — marks the record cancelled;
/// the row is retained.
pub async fn cancel_voice_subscription(
    State(state): State<ApiState>,
    subject: Subject,
) -> Result<StatusCode, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let parent = fetch_parent(&mut tx, &subject.subject).await?;

    let updated = sqlx::query(
        "UPDATE voice_subscriptions SET status = 'cancelled' WHERE parent_id = $1",
    )
    .bind(parent.id)
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound("no subscription found".into()));
    }
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Tests
// ============================================================================
