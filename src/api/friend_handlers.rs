//! Friend graph API handlers.
//!
//! Edges are unordered pairs with a status; at most one edge may exist per
//! pair regardless of direction. The database enforces this with a
//! symmetric unique index; handlers pre-check both directions so the
//! duplicate surfaces as a 400 rather than a constraint error.

use crate::api::handlers::{ApiState, AppError};
use crate::api::profile_handlers::fetch_parent;
use crate::auth::Subject;
use crate::store::{self, models::*};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Deserialize)]
pub struct FriendRequestCreate {
    /// The requesting child — explicit, so a parent with several children
    /// never has one guessed for them.
    pub requester_child_id: Uuid,
    pub addressee_id: Uuid,
}

#[derive(Deserialize)]
pub struct ChildIdQuery {
    pub child_id: Uuid,
}

#[derive(Deserialize)]
pub struct UnfriendQuery {
    pub friend_child_id: Uuid,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub child_id: Option<Uuid>,
}

/// Friend profile with presence derived at read time.
#[derive(Serialize)]
pub struct FriendWithPresence {
    pub id: Uuid,
    pub name: String,
    pub avatar: Option<String>,
    pub age_group: String,
    pub is_online: bool,
    /// "offline" | "online" | "in-game"
    pub status: &'static str,
}

/// Presence is not stored: offline unless online, in-game once a room is
/// attached.
fn presence(is_online: bool, room_id: Option<Uuid>) -> &'static str {
    match (is_online, room_id) {
        (false, _) => "offline",
        (true, None) => "online",
        (true, Some(_)) => "in-game",
    }
}

impl From<ChildProfile> for FriendWithPresence {
    fn from(child: ChildProfile) -> Self {
        Self {
            status: presence(child.is_online, child.room_id),
            id: child.id,
            name: child.name,
            avatar: child.avatar,
            age_group: child.age_group,
            is_online: child.is_online,
        }
    }
}

// ============================================================================
// Shared lookups
// ============================================================================

async fn fetch_edge_between(
    conn: &mut PgConnection,
    a: Uuid,
    b: Uuid,
) -> Result<Option<FriendEdge>, AppError> {
    Ok(sqlx::query_as::<_, FriendEdge>(
        "SELECT * FROM friend_edges
         WHERE (requester_id = $1 AND addressee_id = $2)
            OR (requester_id = $2 AND addressee_id = $1)",
    )
    .bind(a)
    .bind(b)
    .fetch_optional(conn)
    .await?)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/friends/requests — send a friend request.
pub async fn send_friend_request(
    State(state): State<ApiState>,
    subject: Subject,
    Json(req): Json<FriendRequestCreate>,
) -> Result<(StatusCode, Json<FriendEdge>), AppError> {
    if req.requester_child_id == req.addressee_id {
        return Err(AppError::BadRequest(
            "cannot send a friend request to yourself".into(),
        ));
    }

    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let parent = fetch_parent(&mut tx, &subject.subject).await?;

    // The requester must be one of the caller's own children
    let requester = sqlx::query_as::<_, ChildProfile>(
        "SELECT * FROM child_profiles WHERE id = $1 AND parent_id = $2",
    )
    .bind(req.requester_child_id)
    .bind(parent.id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("requester child not found".into()))?;

    let addressee =
        sqlx::query_as::<_, ChildProfile>("SELECT * FROM child_profiles WHERE id = $1")
            .bind(req.addressee_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("addressee child not found".into()))?;

    if fetch_edge_between(&mut tx, requester.id, addressee.id)
        .await?
        .is_some()
    {
        return Err(AppError::BadRequest("friend request already exists".into()));
    }

    let edge = sqlx::query_as::<_, FriendEdge>(
        "INSERT INTO friend_edges (requester_id, addressee_id, status)
         VALUES ($1, $2, 'pending')
         RETURNING *",
    )
    .bind(requester.id)
    .bind(addressee.id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok((StatusCode::CREATED, Json(edge)))
}

/// POST /api/friends/requests/{request_id}/accept
pub async fn accept_friend_request(
    State(state): State<ApiState>,
    subject: Subject,
    Path(request_id): Path<Uuid>,
) -> Result<Json<FriendEdge>, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;

    let edge = sqlx::query_as::<_, FriendEdge>("SELECT * FROM friend_edges WHERE id = $1")
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("friend request not found".into()))?;

    if edge.status != status::friend::PENDING {
        return Err(AppError::InvalidState("friend request is not pending".into()));
    }

    let edge = sqlx::query_as::<_, FriendEdge>(
        "UPDATE friend_edges SET status = 'accepted' WHERE id = $1 RETURNING *",
    )
    .bind(request_id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(Json(edge))
}

/// POST /api/friends/requests/{request_id}/decline — the pending edge is
/// deleted outright; no terminal "declined" state is kept.
pub async fn decline_friend_request(
    State(state): State<ApiState>,
    subject: Subject,
    Path(request_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;

    let deleted = sqlx::query("DELETE FROM friend_edges WHERE id = $1")
        .bind(request_id)
        .execute(&mut *tx)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound("friend request not found".into()));
    }
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/friends?child_id= — accepted friends with derived presence.
pub async fn list_friends(
    State(state): State<ApiState>,
    subject: Subject,
    Query(query): Query<ChildIdQuery>,
) -> Result<Json<Vec<FriendWithPresence>>, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;

    let friends = sqlx::query_as::<_, ChildProfile>(
        "SELECT c.* FROM child_profiles c
         JOIN friend_edges f
           ON (f.requester_id = $1 AND f.addressee_id = c.id)
           OR (f.addressee_id = $1 AND f.requester_id = c.id)
         WHERE f.status = 'accepted'
         ORDER BY c.name",
    )
    .bind(query.child_id)
    .fetch_all(&mut *tx)
    .await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(Json(friends.into_iter().map(Into::into).collect()))
}

/// GET /api/friends/requests?child_id= — pending requests addressed to the
/// child.
pub async fn list_friend_requests(
    State(state): State<ApiState>,
    subject: Subject,
    Query(query): Query<ChildIdQuery>,
) -> Result<Json<Vec<FriendEdge>>, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;

    let requests = sqlx::query_as::<_, FriendEdge>(
        "SELECT * FROM friend_edges
         WHERE addressee_id = $1 AND status = 'pending'
         ORDER BY created_at DESC",
    )
    .bind(query.child_id)
    .fetch_all(&mut *tx)
    .await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(Json(requests))
}

/// DELETE /api/friends/{child_id}?friend_child_id= — remove the edge in
/// either direction.
pub async fn unfriend(
    State(state): State<ApiState>,
    subject: Subject,
    Path(child_id): Path<Uuid>,
    Query(query): Query<UnfriendQuery>,
) -> Result<StatusCode, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;

    let deleted = sqlx::query(
        "DELETE FROM friend_edges
         WHERE (requester_id = $1 AND addressee_id = $2)
            OR (requester_id = $2 AND addressee_id = $1)",
    )
    .bind(child_id)
    .bind(query.friend_child_id)
    .execute(&mut *tx)
    .await?;
    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound("friendship not found".into()));
    }
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/friends/children/search?q=&child_id= — name substring search,
/// excluding the requesting child and anyone already connected by any edge
/// in either direction.
pub async fn search_children(
    State(state): State<ApiState>,
    subject: Subject,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<ChildProfile>>, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let pattern = format!("%{}%", query.q);

    let children = match query.child_id {
        Some(child_id) => {
            sqlx::query_as::<_, ChildProfile>(
                "SELECT * FROM child_profiles c
                 WHERE c.name ILIKE $1
                   AND c.id <> $2
                   AND NOT EXISTS (
                     SELECT 1 FROM friend_edges f
                     WHERE (f.requester_id = $2 AND f.addressee_id = c.id)
                        OR (f.addressee_id = $2 AND f.requester_id = c.id)
                   )
                 ORDER BY c.name
                 LIMIT 20",
            )
            .bind(&pattern)
            .bind(child_id)
            .fetch_all(&mut *tx)
            .await?
        }
        None => {
            sqlx::query_as::<_, ChildProfile>(
                "SELECT * FROM child_profiles WHERE name ILIKE $1 ORDER BY name LIMIT 20",
            )
            .bind(&pattern)
            .fetch_all(&mut *tx)
            .await?
        }
    };
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(Json(children))
}

// ============================================================================
// Tests
// ============================================================================
