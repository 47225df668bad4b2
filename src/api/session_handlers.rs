//! Game session & score API handlers.

use crate::api::handlers::{ApiState, AppError};
use crate::auth::Subject;
use crate::store::{self, models::*};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

// ============================================================================
// Request types
// ============================================================================

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub room_id: Uuid,
    pub game_id: String,
    pub difficulty: String,
    pub selected_category: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateScoreRequest {
    pub room_id: Uuid,
    pub session_id: Uuid,
    pub child_id: Option<Uuid>,
    pub player_name: String,
    pub player_avatar: Option<String>,
    #[serde(default)]
    pub is_ai: bool,
    pub score: i32,
    #[serde(default)]
    pub questions_answered: i32,
    #[serde(default)]
    pub correct_answers: i32,
    #[serde(default)]
    pub time_spent_secs: i32,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/sessions — create a session for an existing room.
pub async fn create_session(
    State(state): State<ApiState>,
    subject: Subject,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<GameSession>), AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;

    let room_exists = sqlx::query("SELECT 1 FROM game_rooms WHERE id = $1")
        .bind(req.room_id)
        .fetch_optional(&mut *tx)
        .await?;
    if room_exists.is_none() {
        return Err(AppError::NotFound("room not found".into()));
    }

    let session = sqlx::query_as::<_, GameSession>(
        "INSERT INTO game_sessions (room_id, game_id, difficulty, selected_category)
         VALUES ($1, $2, $3, $4)
         RETURNING *",
    )
    .bind(req.room_id)
    .bind(&req.game_id)
    .bind(&req.difficulty)
    .bind(&req.selected_category)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/sessions/{session_id}
pub async fn get_session(
    State(state): State<ApiState>,
    subject: Subject,
    Path(session_id): Path<Uuid>,
) -> Result<Json<GameSession>, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;

    let session = sqlx::query_as::<_, GameSession>("SELECT * FROM game_sessions WHERE id = $1")
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("session not found".into()))?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(Json(session))
}

/// POST /api/sessions/scores — append a score record.
pub async fn create_score(
    State(state): State<ApiState>,
    subject: Subject,
    Json(req): Json<CreateScoreRequest>,
) -> Result<(StatusCode, Json<GameScore>), AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;

    let score = sqlx::query_as::<_, GameScore>(
        "INSERT INTO game_scores
           (room_id, session_id, child_id, player_name, player_avatar, is_ai,
            score, questions_answered, correct_answers, time_spent_secs)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         RETURNING *",
    )
    .bind(req.room_id)
    .bind(req.session_id)
    .bind(req.child_id)
    .bind(&req.player_name)
    .bind(&req.player_avatar)
    .bind(req.is_ai)
    .bind(req.score)
    .bind(req.questions_answered)
    .bind(req.correct_answers)
    .bind(req.time_spent_secs)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok((StatusCode::CREATED, Json(score)))
}

/// GET /api/sessions/room/{room_id}/scores
pub async fn get_room_scores(
    State(state): State<ApiState>,
    subject: Subject,
    Path(room_id): Path<Uuid>,
) -> Result<Json<Vec<GameScore>>, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;

    let scores = sqlx::query_as::<_, GameScore>(
        "SELECT * FROM game_scores WHERE room_id = $1 ORDER BY created_at",
    )
    .bind(room_id)
    .fetch_all(&mut *tx)
    .await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(Json(scores))
}

// ============================================================================
// Tests
// ============================================================================
