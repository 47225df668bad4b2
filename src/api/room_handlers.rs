//! Room & invitation API handlers.
//!
//! Thin HTTP shells over [`crate::rooms`]: open the subject-scoped
//! transaction, run the lifecycle operation, commit, shape the response.

use crate::api::handlers::{ApiState, AppError};
use crate::auth::Subject;
use crate::rooms::{self, CreateRoom, RoomError};
use crate::store::{self, models::*};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

impl From<RoomError> for AppError {
    fn from(err: RoomError) -> Self {
        match err {
            RoomError::ChildNotFound => AppError::NotFound("child profile not found".into()),
            RoomError::RoomNotFound => AppError::NotFound("room not found".into()),
            RoomError::RequestNotFound => AppError::NotFound("join request not found".into()),
            RoomError::NoInvitees => AppError::NotFound("no valid invitees found".into()),
            RoomError::NotInRoom => AppError::NotFound("child is not in a room".into()),
            RoomError::AlreadyInRoom => {
                AppError::BadRequest("child is already in a room".into())
            }
            RoomError::NotAccepting => {
                AppError::BadRequest("room is not accepting new players".into())
            }
            RoomError::RoomFull => AppError::RoomFull,
            RoomError::AlreadyHandled => {
                AppError::InvalidState("join request was already handled".into())
            }
            RoomError::CodeSpaceExhausted => {
                AppError::Internal(anyhow::anyhow!("room code space exhausted"))
            }
            RoomError::Db(e) => AppError::Internal(e.into()),
        }
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

fn default_max_players() -> i32 {
    4
}

#[derive(Deserialize)]
pub struct CreateRoomRequest {
    pub host_child_id: Uuid,
    pub game_id: String,
    pub difficulty: String,
    #[serde(default = "default_max_players")]
    pub max_players: i32,
    pub selected_category: Option<String>,
    #[serde(default)]
    pub friend_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct JoinRoomRequest {
    pub child_id: Uuid,
    pub room_code: String,
}

#[derive(Deserialize)]
pub struct LeaveRoomRequest {
    pub child_id: Uuid,
}

#[derive(Deserialize)]
pub struct CloseRoomRequest {
    pub room_id: Uuid,
}

#[derive(Deserialize)]
pub struct InviteFriendsRequest {
    pub room_code: String,
    pub friend_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct JoinRequestCreate {
    pub room_code: String,
    pub child_id: Uuid,
}

#[derive(Deserialize)]
pub struct HandleJoinRequestRequest {
    pub request_id: Uuid,
    pub approve: bool,
}

#[derive(Deserialize)]
pub struct AcceptInvitationRequest {
    pub invitation_id: Uuid,
    pub child_id: Uuid,
}

#[derive(Deserialize)]
pub struct DeclineInvitationRequest {
    pub invitation_id: Uuid,
    pub child_id: Uuid,
}

#[derive(Deserialize)]
pub struct ChildIdQuery {
    pub child_id: Uuid,
}

/// A room together with its roster.
#[derive(Serialize)]
pub struct RoomResponse {
    #[serde(flatten)]
    pub room: GameRoom,
    pub participants: Vec<RoomParticipant>,
}

impl From<(GameRoom, Vec<RoomParticipant>)> for RoomResponse {
    fn from((room, participants): (GameRoom, Vec<RoomParticipant>)) -> Self {
        Self { room, participants }
    }
}

#[derive(Serialize)]
pub struct InviteFriendsResponse {
    pub invitations_sent: usize,
    pub invitations: Vec<JoinRequest>,
}

#[derive(Serialize)]
pub struct HandleJoinRequestResponse {
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant: Option<RoomParticipant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<GameRoom>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/rooms — create a room (auto-seats an AI companion when no
/// friends are invited).
pub async fn create_room(
    State(state): State<ApiState>,
    subject: Subject,
    Json(req): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<RoomResponse>), AppError> {
    if req.max_players < 1 {
        return Err(AppError::BadRequest("max_players must be at least 1".into()));
    }

    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let created = rooms::create_room(
        &mut *tx,
        CreateRoom {
            host_child_id: req.host_child_id,
            game_id: req.game_id,
            difficulty: req.difficulty,
            max_players: req.max_players,
            selected_category: req.selected_category,
            friend_ids: req.friend_ids,
        },
    )
    .await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// POST /api/rooms/join — join a waiting room by code.
pub async fn join_room(
    State(state): State<ApiState>,
    subject: Subject,
    Json(req): Json<JoinRoomRequest>,
) -> Result<Json<RoomResponse>, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let joined = rooms::join_room(&mut *tx, req.child_id, &req.room_code).await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(Json(joined.into()))
}

/// POST /api/rooms/leave — leave the current room. A host leaving deletes
/// the room outright.
pub async fn leave_room(
    State(state): State<ApiState>,
    subject: Subject,
    Json(req): Json<LeaveRoomRequest>,
) -> Result<StatusCode, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    rooms::leave_room(&mut *tx, req.child_id).await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/rooms/close — host-initiated teardown.
pub async fn close_room(
    State(state): State<ApiState>,
    subject: Subject,
    Json(req): Json<CloseRoomRequest>,
) -> Result<StatusCode, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    rooms::close_room(&mut *tx, req.room_id).await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/rooms/current?child_id= — the child's room, or null.
pub async fn get_current_room(
    State(state): State<ApiState>,
    subject: Subject,
    Query(query): Query<ChildIdQuery>,
) -> Result<Json<Option<RoomResponse>>, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let current = rooms::current_room(&mut *tx, query.child_id).await?;
    // Commit even on the read path: a dangling room_id is repaired here.
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(Json(current.map(Into::into)))
}

/// GET /api/rooms/{room_id}/participants
pub async fn get_room_participants(
    State(state): State<ApiState>,
    subject: Subject,
    Path(room_id): Path<Uuid>,
) -> Result<Json<Vec<RoomParticipant>>, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let participants = rooms::list_participants(&mut *tx, room_id).await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(Json(participants))
}

/// POST /api/rooms/invite — invite friends into a room.
pub async fn invite_friends(
    State(state): State<ApiState>,
    subject: Subject,
    Json(req): Json<InviteFriendsRequest>,
) -> Result<Json<InviteFriendsResponse>, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let invitations = rooms::invite_friends(&mut *tx, &req.room_code, &req.friend_ids).await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(Json(InviteFriendsResponse {
        invitations_sent: invitations.len(),
        invitations,
    }))
}

/// POST /api/rooms/request-to-join — child-initiated join ask.
pub async fn request_to_join(
    State(state): State<ApiState>,
    subject: Subject,
    Json(req): Json<JoinRequestCreate>,
) -> Result<(StatusCode, Json<JoinRequest>), AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let request = rooms::request_to_join(&mut *tx, &req.room_code, req.child_id).await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok((StatusCode::CREATED, Json(request)))
}

/// POST /api/rooms/handle-join-request — host approves or denies.
pub async fn handle_join_request(
    State(state): State<ApiState>,
    subject: Subject,
    Json(req): Json<HandleJoinRequestRequest>,
) -> Result<Json<HandleJoinRequestResponse>, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let outcome = rooms::handle_join_request(&mut *tx, req.request_id, req.approve).await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    let (participant, room) = match outcome {
        Some((participant, room)) => (Some(participant), Some(room)),
        None => (None, None),
    };
    Ok(Json(HandleJoinRequestResponse {
        approved: req.approve,
        participant,
        room,
    }))
}

/// GET /api/rooms/pending-invitations?child_id=
pub async fn get_pending_invitations(
    State(state): State<ApiState>,
    subject: Subject,
    Query(query): Query<ChildIdQuery>,
) -> Result<Json<Vec<JoinRequest>>, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let invitations = rooms::pending_invitations(&mut *tx, query.child_id).await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(Json(invitations))
}

/// POST /api/rooms/accept-invitation — invitee joins through an invitation.
pub async fn accept_invitation(
    State(state): State<ApiState>,
    subject: Subject,
    Json(req): Json<AcceptInvitationRequest>,
) -> Result<Json<RoomResponse>, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    let (_, room) = rooms::accept_invitation(&mut *tx, req.invitation_id, req.child_id).await?;
    let participants = rooms::list_participants(&mut *tx, room.id).await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(Json((room, participants).into()))
}

/// POST /api/rooms/decline-invitation
pub async fn decline_invitation(
    State(state): State<ApiState>,
    subject: Subject,
    Json(req): Json<DeclineInvitationRequest>,
) -> Result<StatusCode, AppError> {
    let mut tx = store::begin_scoped(&state.pool, &subject.subject).await?;
    rooms::decline_invitation(&mut *tx, req.invitation_id, req.child_id).await?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Tests
// ============================================================================
