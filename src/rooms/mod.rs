//! Game room and invitation lifecycle.
//!
//! Rooms move `waiting → playing → finished`; deletion (host leave or
//! close) is the absorbing end state. Every operation here runs on the
//! caller's connection — the API hands in its per-request transaction, so
//! commit/rollback covers the whole multi-row transition.
//!
//! Two invariants are enforced structurally rather than by read-then-write:
//! - `current_players <= max_players`: seats are taken with a single
//!   conditional UPDATE, so concurrent joins against the last slot cannot
//!   both succeed.
//! - room codes are unique: generation retries on the unique constraint
//!   instead of trusting a pre-check.

use crate::store::models::{status, ChildProfile, GameRoom, JoinRequest, RoomParticipant};
use rand::RngExt;
use sqlx::PgConnection;
use thiserror::Error;
use uuid::Uuid;

/// Fixed roster of AI companions used to fill otherwise-empty rooms.
pub struct AiPlayer {
    pub name: &'static str,
    pub avatar: &'static str,
    pub personality: &'static str,
}

pub const AI_ROSTER: [AiPlayer; 4] = [
    AiPlayer {
        name: "Nova the Navigator",
        avatar: "🧭",
        personality: "curious",
    },
    AiPlayer {
        name: "Milo the Maker",
        avatar: "🛠️",
        personality: "creative",
    },
    AiPlayer {
        name: "Pip the Chef",
        avatar: "🍳",
        personality: "playful",
    },
    AiPlayer {
        name: "Sage the Sleuth",
        avatar: "🔍",
        personality: "analytical",
    },
];

const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const ROOM_CODE_LEN: usize = 6;
const MAX_CODE_ATTEMPTS: usize = 5;
const FALLBACK_AVATAR: &str = "👤";

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("child profile not found")]
    ChildNotFound,
    #[error("room not found")]
    RoomNotFound,
    #[error("join request not found")]
    RequestNotFound,
    #[error("no valid invitees found")]
    NoInvitees,
    #[error("child is already in a room")]
    AlreadyInRoom,
    #[error("child is not in a room")]
    NotInRoom,
    #[error("room is not accepting new players")]
    NotAccepting,
    #[error("room is full")]
    RoomFull,
    #[error("join request was already handled")]
    AlreadyHandled,
    #[error("could not allocate a unique room code")]
    CodeSpaceExhausted,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Inputs for [`create_room`].
pub struct CreateRoom {
    pub host_child_id: Uuid,
    pub game_id: String,
    pub difficulty: String,
    pub max_players: i32,
    pub selected_category: Option<String>,
    /// Children to invite at creation. Empty → an AI companion fills the room.
    pub friend_ids: Vec<Uuid>,
}

/// Generate a random room code (uppercase alphanumeric).
pub fn generate_room_code(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

fn pick_ai() -> &'static AiPlayer {
    &AI_ROSTER[rand::rng().random_range(0..AI_ROSTER.len())]
}

// ============================================================================
// Row helpers
// ============================================================================

async fn fetch_child(conn: &mut PgConnection, id: Uuid) -> Result<ChildProfile, RoomError> {
    sqlx::query_as::<_, ChildProfile>("SELECT * FROM child_profiles WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(RoomError::ChildNotFound)
}

async fn fetch_room(conn: &mut PgConnection, id: Uuid) -> Result<Option<GameRoom>, RoomError> {
    Ok(
        sqlx::query_as::<_, GameRoom>("SELECT * FROM game_rooms WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await?,
    )
}

async fn fetch_room_by_code(
    conn: &mut PgConnection,
    code: &str,
) -> Result<GameRoom, RoomError> {
    sqlx::query_as::<_, GameRoom>("SELECT * FROM game_rooms WHERE room_code = $1")
        .bind(code)
        .fetch_optional(conn)
        .await?
        .ok_or(RoomError::RoomNotFound)
}

/// Take one seat iff the room still has capacity. The WHERE clause is the
/// capacity check — no separate read, so two racing callers cannot both win
/// the last slot.
async fn claim_seat(conn: &mut PgConnection, room_id: Uuid) -> Result<bool, RoomError> {
    let result = sqlx::query(
        "UPDATE game_rooms
         SET current_players = current_players + 1
         WHERE id = $1 AND current_players < max_players",
    )
    .bind(room_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

async fn release_seat(conn: &mut PgConnection, room_id: Uuid) -> Result<(), RoomError> {
    sqlx::query(
        "UPDATE game_rooms
         SET current_players = current_players - 1
         WHERE id = $1 AND current_players > 0",
    )
    .bind(room_id)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_participant(
    conn: &mut PgConnection,
    room_id: Uuid,
    child: &ChildProfile,
) -> Result<RoomParticipant, RoomError> {
    let avatar = child
        .avatar
        .clone()
        .unwrap_or_else(|| FALLBACK_AVATAR.to_string());
    Ok(sqlx::query_as::<_, RoomParticipant>(
        "INSERT INTO room_participants (room_id, child_id, player_name, player_avatar, is_ai)
         VALUES ($1, $2, $3, $4, FALSE)
         RETURNING *",
    )
    .bind(room_id)
    .bind(child.id)
    .bind(&child.name)
    .bind(avatar)
    .fetch_one(conn)
    .await?)
}

async fn set_child_room(
    conn: &mut PgConnection,
    child_id: Uuid,
    room_id: Option<Uuid>,
) -> Result<(), RoomError> {
    sqlx::query("UPDATE child_profiles SET room_id = $2 WHERE id = $1")
        .bind(child_id)
        .bind(room_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// List a room's occupants, humans and AI alike, in join order.
pub async fn list_participants(
    conn: &mut PgConnection,
    room_id: Uuid,
) -> Result<Vec<RoomParticipant>, RoomError> {
    Ok(sqlx::query_as::<_, RoomParticipant>(
        "SELECT * FROM room_participants WHERE room_id = $1 ORDER BY joined_at",
    )
    .bind(room_id)
    .fetch_all(conn)
    .await?)
}

// ============================================================================
// Lifecycle operations
// ============================================================================

/// Create a room hosted by `host_child_id`.
///
/// The host must not already be in a room. The room code is drawn at random
/// and the insert retried (bounded) on a code collision. Without invited
/// friends an AI companion takes the second seat; with friends, each gets a
/// pending invitation instead.
pub async fn create_room(
    conn: &mut PgConnection,
    params: CreateRoom,
) -> Result<(GameRoom, Vec<RoomParticipant>), RoomError> {
    let host = fetch_child(conn, params.host_child_id).await?;
    if host.room_id.is_some() {
        return Err(RoomError::AlreadyInRoom);
    }

    let mut room = insert_room_with_code(conn, &params).await?;
    insert_participant(conn, room.id, &host).await?;

    if params.friend_ids.is_empty() {
        // Nobody invited: seat an AI companion so the host has someone to
        // play with. The seat claim is conditional, so a 1-player room
        // simply stays solo.
        if claim_seat(conn, room.id).await? {
            let ai = pick_ai();
            sqlx::query(
                "INSERT INTO room_participants (room_id, player_name, player_avatar, is_ai)
                 VALUES ($1, $2, $3, TRUE)",
            )
            .bind(room.id)
            .bind(ai.name)
            .bind(ai.avatar)
            .execute(&mut *conn)
            .await?;

            room = sqlx::query_as::<_, GameRoom>(
                "UPDATE game_rooms
                 SET has_ai_player = TRUE, ai_player_name = $2, ai_player_avatar = $3
                 WHERE id = $1
                 RETURNING *",
            )
            .bind(room.id)
            .bind(ai.name)
            .bind(ai.avatar)
            .fetch_one(&mut *conn)
            .await?;
        }
    } else {
        invite_children(conn, &room, &params.friend_ids).await?;
    }

    set_child_room(conn, host.id, Some(room.id)).await?;

    let participants = list_participants(conn, room.id).await?;
    Ok((room, participants))
}

async fn insert_room_with_code(
    conn: &mut PgConnection,
    params: &CreateRoom,
) -> Result<GameRoom, RoomError> {
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = generate_room_code(ROOM_CODE_LEN);
        let inserted = sqlx::query_as::<_, GameRoom>(
            "INSERT INTO game_rooms
               (room_code, host_child_id, game_id, difficulty, max_players,
                current_players, selected_category)
             VALUES ($1, $2, $3, $4, $5, 1, $6)
             RETURNING *",
        )
        .bind(&code)
        .bind(params.host_child_id)
        .bind(&params.game_id)
        .bind(&params.difficulty)
        .bind(params.max_players)
        .bind(&params.selected_category)
        .fetch_one(&mut *conn)
        .await;

        match inserted {
            Ok(room) => return Ok(room),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                tracing::debug!("room code collision on {code}, retrying");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(RoomError::CodeSpaceExhausted)
}

/// Join a waiting room by its shareable code.
pub async fn join_room(
    conn: &mut PgConnection,
    child_id: Uuid,
    room_code: &str,
) -> Result<(GameRoom, Vec<RoomParticipant>), RoomError> {
    let child = fetch_child(conn, child_id).await?;
    if child.room_id.is_some() {
        return Err(RoomError::AlreadyInRoom);
    }

    let room = fetch_room_by_code(conn, room_code).await?;
    if room.status != status::room::WAITING {
        return Err(RoomError::NotAccepting);
    }
    if !claim_seat(conn, room.id).await? {
        return Err(RoomError::RoomFull);
    }

    insert_participant(conn, room.id, &child).await?;
    set_child_room(conn, child.id, Some(room.id)).await?;

    let room = fetch_room(conn, room.id).await?.ok_or(RoomError::RoomNotFound)?;
    let participants = list_participants(conn, room.id).await?;
    Ok((room, participants))
}

/// Leave the current room.
///
/// The host leaving tears the whole room down: every participant's
/// `room_id` is cleared and the room row (with its participants, via
/// cascade) is deleted. A non-host just gives their seat back.
pub async fn leave_room(conn: &mut PgConnection, child_id: Uuid) -> Result<(), RoomError> {
    let child = fetch_child(conn, child_id).await?;
    let room_id = child.room_id.ok_or(RoomError::NotInRoom)?;

    let Some(room) = fetch_room(conn, room_id).await? else {
        // Dangling reference (room already torn down): repair and succeed.
        set_child_room(conn, child.id, None).await?;
        return Ok(());
    };

    if room.host_child_id == child_id {
        teardown(conn, room.id).await?;
    } else {
        let deleted = sqlx::query(
            "DELETE FROM room_participants WHERE room_id = $1 AND child_id = $2",
        )
        .bind(room.id)
        .bind(child_id)
        .execute(&mut *conn)
        .await?;
        if deleted.rows_affected() > 0 {
            release_seat(conn, room.id).await?;
        }
        set_child_room(conn, child_id, None).await?;
    }
    Ok(())
}

/// Host-initiated teardown by room id.
pub async fn close_room(conn: &mut PgConnection, room_id: Uuid) -> Result<(), RoomError> {
    if fetch_room(conn, room_id).await?.is_none() {
        return Err(RoomError::RoomNotFound);
    }
    teardown(conn, room_id).await
}

async fn teardown(conn: &mut PgConnection, room_id: Uuid) -> Result<(), RoomError> {
    sqlx::query("UPDATE child_profiles SET room_id = NULL WHERE room_id = $1")
        .bind(room_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM game_rooms WHERE id = $1")
        .bind(room_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// The room a child currently occupies, with its roster. A `room_id`
/// pointing at a room that no longer exists is cleared on read.
pub async fn current_room(
    conn: &mut PgConnection,
    child_id: Uuid,
) -> Result<Option<(GameRoom, Vec<RoomParticipant>)>, RoomError> {
    let child = fetch_child(conn, child_id).await?;
    let Some(room_id) = child.room_id else {
        return Ok(None);
    };

    match fetch_room(conn, room_id).await? {
        Some(room) => {
            let participants = list_participants(conn, room.id).await?;
            Ok(Some((room, participants)))
        }
        None => {
            set_child_room(conn, child.id, None).await?;
            Ok(None)
        }
    }
}

// ============================================================================
// Invitations & join requests
// ============================================================================

/// Invite children into a room: one pending join request each, referencing
/// the room by both id and code.
pub async fn invite_friends(
    conn: &mut PgConnection,
    room_code: &str,
    friend_ids: &[Uuid],
) -> Result<Vec<JoinRequest>, RoomError> {
    let room = fetch_room_by_code(conn, room_code).await?;
    invite_children(conn, &room, friend_ids).await
}

async fn invite_children(
    conn: &mut PgConnection,
    room: &GameRoom,
    friend_ids: &[Uuid],
) -> Result<Vec<JoinRequest>, RoomError> {
    let friends = sqlx::query_as::<_, ChildProfile>(
        "SELECT * FROM child_profiles WHERE id = ANY($1)",
    )
    .bind(friend_ids)
    .fetch_all(&mut *conn)
    .await?;

    if friends.is_empty() {
        return Err(RoomError::NoInvitees);
    }

    let mut invitations = Vec::with_capacity(friends.len());
    for friend in &friends {
        let avatar = friend
            .avatar
            .clone()
            .unwrap_or_else(|| FALLBACK_AVATAR.to_string());
        let invitation = sqlx::query_as::<_, JoinRequest>(
            "INSERT INTO join_requests
               (room_id, room_code, child_id, player_name, player_avatar, status)
             VALUES ($1, $2, $3, $4, $5, 'pending')
             RETURNING *",
        )
        .bind(room.id)
        .bind(&room.room_code)
        .bind(friend.id)
        .bind(&friend.name)
        .bind(avatar)
        .fetch_one(&mut *conn)
        .await?;
        invitations.push(invitation);
    }
    Ok(invitations)
}

/// Child-initiated ask to join a room by code.
pub async fn request_to_join(
    conn: &mut PgConnection,
    room_code: &str,
    child_id: Uuid,
) -> Result<JoinRequest, RoomError> {
    let room = fetch_room_by_code(conn, room_code).await?;
    let child = fetch_child(conn, child_id).await?;

    let avatar = child
        .avatar
        .clone()
        .unwrap_or_else(|| FALLBACK_AVATAR.to_string());
    Ok(sqlx::query_as::<_, JoinRequest>(
        "INSERT INTO join_requests
           (room_id, room_code, child_id, player_name, player_avatar, status)
         VALUES ($1, $2, $3, $4, $5, 'pending')
         RETURNING *",
    )
    .bind(room.id)
    .bind(&room.room_code)
    .bind(child.id)
    .bind(&child.name)
    .bind(avatar)
    .fetch_one(conn)
    .await?)
}

/// Pending invitations for a child, newest first.
pub async fn pending_invitations(
    conn: &mut PgConnection,
    child_id: Uuid,
) -> Result<Vec<JoinRequest>, RoomError> {
    Ok(sqlx::query_as::<_, JoinRequest>(
        "SELECT * FROM join_requests
         WHERE child_id = $1 AND status = 'pending'
         ORDER BY created_at DESC",
    )
    .bind(child_id)
    .fetch_all(conn)
    .await?)
}

/// Host-side approve/deny of a pending join request.
///
/// Approving a request against a full room fails the whole operation with
/// [`RoomError::RoomFull`]; the surrounding transaction rolls back and the
/// request stays pending. Denying touches nothing but the request row.
pub async fn handle_join_request(
    conn: &mut PgConnection,
    request_id: Uuid,
    approve: bool,
) -> Result<Option<(RoomParticipant, GameRoom)>, RoomError> {
    let request = sqlx::query_as::<_, JoinRequest>("SELECT * FROM join_requests WHERE id = $1")
        .bind(request_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RoomError::RequestNotFound)?;

    if request.status != status::request::PENDING {
        return Err(RoomError::AlreadyHandled);
    }

    if !approve {
        deny(conn, request.id).await?;
        return Ok(None);
    }
    approve_request(conn, request).await.map(Some)
}

/// Invitee-side accept. Same capacity policy as the host-side approve.
pub async fn accept_invitation(
    conn: &mut PgConnection,
    invitation_id: Uuid,
    child_id: Uuid,
) -> Result<(RoomParticipant, GameRoom), RoomError> {
    let invitation = sqlx::query_as::<_, JoinRequest>(
        "SELECT * FROM join_requests WHERE id = $1 AND child_id = $2",
    )
    .bind(invitation_id)
    .bind(child_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(RoomError::RequestNotFound)?;

    approve_request(conn, invitation).await
}

/// Invitee-side decline. Never mutates room occupancy.
pub async fn decline_invitation(
    conn: &mut PgConnection,
    invitation_id: Uuid,
    child_id: Uuid,
) -> Result<(), RoomError> {
    let invitation = sqlx::query_as::<_, JoinRequest>(
        "SELECT * FROM join_requests WHERE id = $1 AND child_id = $2",
    )
    .bind(invitation_id)
    .bind(child_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(RoomError::RequestNotFound)?;

    if invitation.status != status::request::PENDING {
        return Err(RoomError::AlreadyHandled);
    }
    deny(conn, invitation.id).await
}

async fn deny(conn: &mut PgConnection, request_id: Uuid) -> Result<(), RoomError> {
    sqlx::query("UPDATE join_requests SET status = 'denied' WHERE id = $1")
        .bind(request_id)
        .execute(conn)
        .await?;
    Ok(())
}

async fn approve_request(
    conn: &mut PgConnection,
    request: JoinRequest,
) -> Result<(RoomParticipant, GameRoom), RoomError> {
    if request.status != status::request::PENDING {
        return Err(RoomError::AlreadyHandled);
    }

    let room = match request.room_id {
        Some(id) => fetch_room(conn, id).await?.ok_or(RoomError::RoomNotFound)?,
        None => fetch_room_by_code(conn, &request.room_code).await?,
    };

    let child = fetch_child(conn, request.child_id).await?;
    if child.room_id.is_some() {
        return Err(RoomError::AlreadyInRoom);
    }

    if !claim_seat(conn, room.id).await? {
        return Err(RoomError::RoomFull);
    }

    let participant = insert_participant(conn, room.id, &child).await?;
    set_child_room(conn, child.id, Some(room.id)).await?;
    sqlx::query("UPDATE join_requests SET status = 'approved' WHERE id = $1")
        .bind(request.id)
        .execute(&mut *conn)
        .await?;

    let room = fetch_room(conn, room.id).await?.ok_or(RoomError::RoomNotFound)?;
    Ok((participant, room))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_room_code_length_and_charset() {
        for _ in 0..100 {
            let code = generate_room_code(ROOM_CODE_LEN);
            assert_eq!(code.len(), ROOM_CODE_LEN);
            assert!(code
                .bytes()
                .all(|b| ROOM_CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_room_codes_vary() {
        let codes: HashSet<String> = (0..50).map(|_| generate_room_code(ROOM_CODE_LEN)).collect();
        // 36^6 combinations: 50 draws virtually never collide entirely
        assert!(codes.len() > 1);
    }

    #[test]
    fn test_ai_pick_is_from_roster() {
        for _ in 0..20 {
            let ai = pick_ai();
            assert!(AI_ROSTER.iter().any(|r| r.name == ai.name));
        }
    }

    #[test]
    fn test_roster_entries_are_distinct() {
        let names: HashSet<&str> = AI_ROSTER.iter().map(|a| a.name).collect();
        assert_eq!(names.len(), AI_ROSTER.len());
    }
}
