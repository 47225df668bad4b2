//! Parent & child profile API handlers.

use crate::api::handlers::{ApiState, AppError};
use crate::auth::Subject;
use crate::store::{self, models::*};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use sqlx::PgConnection;
use uuid::Uuid;

// ============================================================================
// Request types
// ============================================================================

#[derive(Deserialize)]
pub struct CreateParentRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateChildRequest {
    pub name: String,
    /// Age bracket such as "5-7", "8-10", "11-13"
    pub age_group: String,
    pub avatar: Option<String>,
}

/// Partial update: only fields present in the body change.
#[derive(Deserialize, Default)]
pub struct UpdateChildRequest {
    pub name: Option<String>,
    pub age_group: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateChildStatusRequest {
    pub is_online: Option<bool>,
}

// ============================================================================
// Shared lookups
// ============================================================================

pub(crate) async fn fetch_parent(
    conn: &mut PgConnection,
    subject: &str,
) -> Result<ParentProfile, AppError> {
    sqlx::query_as::<_, ParentProfile>("SELECT * FROM parent_profiles WHERE subject = $1")
        .bind(subject)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("parent profile not found".into()))
}

async fn fetch_owned_child(
    conn: &mut PgConnection,
    child_id: Uuid,
    parent_id: Uuid,
) -> Result<ChildProfile, AppError> {
    sqlx::query_as::<_, ChildProfile>(
        "SELECT * FROM child_profiles WHERE id = $1 AND parent_id = $2",
    )
    .bind(child_id)
    .bind(parent_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::NotFound("child profile not found".into()))
}

// ============================================================================
// Parent handlers
// ============================================================================

/// POST /api/profiles/parent — idempotent create-or-fetch keyed on the
/// token subject. The email comes from the token; a placeholder is
/// synthesized when the token carries none.
pub async fn create_parent_profile(
    State(state): State<ApiState>,
    subject: Subject,
    Json(req): Json<CreateParentRequest>,
) -> Result<(StatusCode, Json<ParentProfile>), AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;

    let existing =
        sqlx::query_as::<_, ParentProfile>("SELECT * FROM parent_profiles WHERE subject = $1")
            .bind(&subject.subject)
            .fetch_optional(&mut *tx)
            .await?;
    if let Some(parent) = existing {
        tx.commit().await.map_err(anyhow::Error::from)?;
        return Ok((StatusCode::CREATED, Json(parent)));
    }

    let email = subject
        .email
        .clone()
        .unwrap_or_else(|| format!("{}@placeholder.invalid", subject.subject));

    let parent = sqlx::query_as::<_, ParentProfile>(
        "INSERT INTO parent_profiles (subject, email, name)
         VALUES ($1, $2, $3)
         RETURNING *",
    )
    .bind(&subject.subject)
    .bind(&email)
    .bind(&req.name)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok((StatusCode::CREATED, Json(parent)))
}

/// GET /api/profiles/parent
pub async fn get_parent_profile(
    State(state): State<ApiState>,
    subject: Subject,
) -> Result<Json<ParentProfile>, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let parent = fetch_parent(&mut tx, &subject.subject).await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(Json(parent))
}

// ============================================================================
// Child handlers
// ============================================================================

/// POST /api/profiles/children — requires an existing parent profile.
pub async fn create_child_profile(
    State(state): State<ApiState>,
    subject: Subject,
    Json(req): Json<CreateChildRequest>,
) -> Result<(StatusCode, Json<ChildProfile>), AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let parent = fetch_parent(&mut tx, &subject.subject).await?;

    let child = sqlx::query_as::<_, ChildProfile>(
        "INSERT INTO child_profiles (parent_id, name, age_group, avatar)
         VALUES ($1, $2, $3, $4)
         RETURNING *",
    )
    .bind(parent.id)
    .bind(&req.name)
    .bind(&req.age_group)
    .bind(&req.avatar)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok((StatusCode::CREATED, Json(child)))
}

/// GET /api/profiles/children — all children of the caller's parent
/// profile. A parent with no children gets an empty list, not a 404.
pub async fn list_child_profiles(
    State(state): State<ApiState>,
    subject: Subject,
) -> Result<Json<Vec<ChildProfile>>, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let parent = fetch_parent(&mut tx, &subject.subject).await?;

    let children = sqlx::query_as::<_, ChildProfile>(
        "SELECT * FROM child_profiles WHERE parent_id = $1 ORDER BY created_at",
    )
    .bind(parent.id)
    .fetch_all(&mut *tx)
    .await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(Json(children))
}

/// PATCH /api/profiles/children/{child_id} — partial update; absent fields
/// are left untouched.
pub async fn update_child_profile(
    State(state): State<ApiState>,
    subject: Subject,
    Path(child_id): Path<Uuid>,
    Json(req): Json<UpdateChildRequest>,
) -> Result<Json<ChildProfile>, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let parent = fetch_parent(&mut tx, &subject.subject).await?;
    fetch_owned_child(&mut tx, child_id, parent.id).await?;

    let child = sqlx::query_as::<_, ChildProfile>(
        "UPDATE child_profiles
         SET name = COALESCE($2, name),
             age_group = COALESCE($3, age_group),
             avatar = COALESCE($4, avatar)
         WHERE id = $1
         RETURNING *",
    )
    .bind(child_id)
    .bind(&req.name)
    .bind(&req.age_group)
    .bind(&req.avatar)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(Json(child))
}

/// DELETE /api/profiles/children/{child_id}
pub async fn delete_child_profile(
    State(state): State<ApiState>,
    subject: Subject,
    Path(child_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let parent = fetch_parent(&mut tx, &subject.subject).await?;
    fetch_owned_child(&mut tx, child_id, parent.id).await?;

    sqlx::query("DELETE FROM child_profiles WHERE id = $1")
        .bind(child_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/profiles/children/{child_id}/status — online-status update;
/// always stamps `last_seen_at`, even when no field changes.
pub async fn update_child_status(
    State(state): State<ApiState>,
    subject: Subject,
    Path(child_id): Path<Uuid>,
    Json(req): Json<UpdateChildStatusRequest>,
) -> Result<Json<ChildProfile>, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let parent = fetch_parent(&mut tx, &subject.subject).await?;
    fetch_owned_child(&mut tx, child_id, parent.id).await?;

    let child = sqlx::query_as::<_, ChildProfile>(
        "UPDATE child_profiles
         SET is_online = COALESCE($2, is_online),
             last_seen_at = now()
         WHERE id = $1
         RETURNING *",
    )
    .bind(child_id)
    .bind(req.is_online)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(Json(child))
}

// ============================================================================
// Tests
// ============================================================================
