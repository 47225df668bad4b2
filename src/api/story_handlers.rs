//! Generated story API handlers. Stories are immutable once created.

use crate::api::handlers::{ApiState, AppError};
use crate::auth::Subject;
use crate::store::{self, models::*};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreateStoryRequest {
    pub child_id: Uuid,
    pub title: String,
    pub content: String,
    pub audio_url: Option<String>,
}

#[derive(Deserialize)]
pub struct ChildIdQuery {
    pub child_id: Uuid,
}

/// POST /api/stories
pub async fn create_story(
    State(state): State<ApiState>,
    subject: Subject,
    Json(req): Json<CreateStoryRequest>,
) -> Result<(StatusCode, Json<GeneratedStory>), AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;

    let child_exists = sqlx::query("SELECT 1 FROM child_profiles WHERE id = $1")
        .bind(req.child_id)
        .fetch_optional(&mut *tx)
        .await?;
    if child_exists.is_none() {
        return Err(AppError::NotFound("child profile not found".into()));
    }

    let story = sqlx::query_as::<_, GeneratedStory>(
        "INSERT INTO generated_stories (child_id, title, content, audio_url)
         VALUES ($1, $2, $3, $4)
         RETURNING *",
    )
    .bind(req.child_id)
    .bind(&req.title)
    .bind(&req.content)
    .bind(&req.audio_url)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok((StatusCode::CREATED, Json(story)))
}

/// GET /api/stories?child_id=
pub async fn list_stories(
    State(state): State<ApiState>,
    subject: Subject,
    Query(query): Query<ChildIdQuery>,
) -> Result<Json<Vec<GeneratedStory>>, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;

    let stories = sqlx::query_as::<_, GeneratedStory>(
        "SELECT * FROM generated_stories WHERE child_id = $1 ORDER BY created_at DESC",
    )
    .bind(query.child_id)
    .fetch_all(&mut *tx)
    .await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(Json(stories))
}

/// GET /api/stories/{story_id}
pub async fn get_story(
    State(state): State<ApiState>,
    subject: Subject,
    Path(story_id): Path<Uuid>,
) -> Result<Json<GeneratedStory>, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;

    let story =
        sqlx::query_as::<_, GeneratedStory>("SELECT * FROM generated_stories WHERE id = $1")
            .bind(story_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("story not found".into()))?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(Json(story))
}

/// DELETE /api/stories/{story_id}
pub async fn delete_story(
    State(state): State<ApiState>,
    subject: Subject,
    Path(story_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;

    let deleted = sqlx::query("DELETE FROM generated_stories WHERE id = $1")
        .bind(story_id)
        .execute(&mut *tx)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound("story not found".into()));
    }
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(StatusCode::NO_CONTENT)
}
