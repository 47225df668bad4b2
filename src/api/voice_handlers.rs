//! Voice-cloning API handlers.
//!
//! Voice creation is gated on an active subscription; the audio travels
//! base64-encoded over the API and as raw bytes to the provider. Only the
//! provider's voice id is stored.

use crate::api::handlers::{ApiState, AppError};
use crate::api::profile_handlers::fetch_parent;
use crate::auth::Subject;
use crate::store::{self, models::*};
use axum::{extract::State, Json};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Request/Response types
// ============================================================================

fn default_sample_name() -> String {
    "voice_sample.wav".to_string()
}

#[derive(Deserialize)]
pub struct VoiceCloneRequest {
    pub child_id: Uuid,
    /// Base64-encoded audio sample
    pub audio_data: String,
    #[serde(default = "default_sample_name")]
    pub file_name: String,
}

#[derive(Serialize)]
pub struct VoiceCloneResponse {
    pub voice_id: String,
    pub child_id: Uuid,
}

#[derive(Deserialize)]
pub struct StoryAudioRequest {
    pub voice_id: String,
    pub story_text: String,
}

#[derive(Serialize)]
pub struct StoryAudioResponse {
    /// Base64-encoded audio
    pub audio_content: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/voice/create-voice-clone — clone a child's voice from an
/// uploaded sample. Requires an active voice subscription.
pub async fn create_voice_clone(
    State(state): State<ApiState>,
    subject: Subject,
    Json(req): Json<VoiceCloneRequest>,
) -> Result<Json<VoiceCloneResponse>, AppError> {
    let speech = state.speech.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("speech provider not configured".into())
    })?;

    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let parent = fetch_parent(&mut tx, &subject.subject).await?;

    let subscription = sqlx::query_as::<_, VoiceSubscription>(
        "SELECT * FROM voice_subscriptions WHERE parent_id = $1 AND status = 'active'",
    )
    .bind(parent.id)
    .fetch_optional(&mut *tx)
    .await?;
    if subscription.is_none() {
        return Err(AppError::Forbidden(
            "active subscription required for voice cloning".into(),
        ));
    }

    let child = sqlx::query_as::<_, ChildProfile>(
        "SELECT * FROM child_profiles WHERE id = $1 AND parent_id = $2",
    )
    .bind(req.child_id)
    .bind(parent.id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("child profile not found".into()))?;

    // Entitlement and ownership checked; don't hold the transaction open
    // across the provider upload.
    tx.commit().await.map_err(anyhow::Error::from)?;

    let audio = BASE64
        .decode(&req.audio_data)
        .map_err(|_| AppError::BadRequest("invalid base64 audio data".into()))?;

    let voice_name = format!("{}'s Voice", child.name);
    let voice_id = speech
        .create_voice(&voice_name, &req.file_name, audio)
        .await
        .map_err(|e| {
            tracing::error!("voice creation failed: {e:#}");
            AppError::ServiceUnavailable("speech provider unavailable".into())
        })?;

    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    sqlx::query(
        "UPDATE child_profiles
         SET voice_clone_enabled = TRUE, voice_clone_id = $2
         WHERE id = $1",
    )
    .bind(child.id)
    .bind(&voice_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(Json(VoiceCloneResponse {
        voice_id,
        child_id: child.id,
    }))
}

/// POST /api/voice/generate-story-audio — synthesize story text with a
/// cloned voice; returns base64 audio.
pub async fn generate_story_audio(
    State(state): State<ApiState>,
    _subject: Subject,
    Json(req): Json<StoryAudioRequest>,
) -> Result<Json<StoryAudioResponse>, AppError> {
    let speech = state.speech.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("speech provider not configured".into())
    })?;

    let audio = speech
        .synthesize(&req.voice_id, &req.story_text)
        .await
        .map_err(|e| {
            tracing::error!("speech synthesis failed: {e:#}");
            AppError::ServiceUnavailable("speech provider unavailable".into())
        })?;

    Ok(Json(StoryAudioResponse {
        audio_content: BASE64.encode(audio),
    }))
}

// ============================================================================
// Tests
// ============================================================================
