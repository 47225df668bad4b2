//! Room & invitation lifecycle tests against a real Postgres database.
//!
//! These tests require TEST_DATABASE_URL to point at a disposable database.
//! They self-skip when it is unset or unreachable.
//! Run with: TEST_DATABASE_URL=postgres://... cargo test --test room_lifecycle_tests

use playroom::rooms::{self, CreateRoom, RoomError};
use playroom::store::models::{ChildProfile, GameRoom, ParentProfile};
use playroom::store::schema;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

async fn test_pool() -> Option<PgPool> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return None;
        }
    };
    let pool = match PgPoolOptions::new().max_connections(5).connect(&url).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Skipping test: cannot connect to test database: {e}");
            return None;
        }
    };
    schema::provision(&pool).await.expect("schema provisioning failed");
    Some(pool)
}

/// Insert a parent with a unique subject and `n` children.
async fn seed_family(pool: &PgPool, n: usize) -> (ParentProfile, Vec<ChildProfile>) {
    let subject = format!("auth0|test-{}", Uuid::new_v4());
    let parent = sqlx::query_as::<_, ParentProfile>(
        "INSERT INTO parent_profiles (subject, email, name)
         VALUES ($1, $2, 'Test Parent') RETURNING *",
    )
    .bind(&subject)
    .bind(format!("{subject}@example.com"))
    .fetch_one(pool)
    .await
    .unwrap();

    let mut children = Vec::new();
    for i in 0..n {
        let child = sqlx::query_as::<_, ChildProfile>(
            "INSERT INTO child_profiles (parent_id, name, age_group, avatar)
             VALUES ($1, $2, '8-10', '🦊') RETURNING *",
        )
        .bind(parent.id)
        .bind(format!("Child {i}"))
        .fetch_one(pool)
        .await
        .unwrap();
        children.push(child);
    }
    (parent, children)
}

async fn fetch_child(pool: &PgPool, id: Uuid) -> ChildProfile {
    sqlx::query_as::<_, ChildProfile>("SELECT * FROM child_profiles WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn fetch_room(pool: &PgPool, id: Uuid) -> Option<GameRoom> {
    sqlx::query_as::<_, GameRoom>("SELECT * FROM game_rooms WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .unwrap()
}

fn create_params(host: Uuid, max_players: i32, friend_ids: Vec<Uuid>) -> CreateRoom {
    CreateRoom {
        host_child_id: host,
        game_id: "story-quest".into(),
        difficulty: "easy".into(),
        max_players,
        selected_category: None,
        friend_ids,
    }
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_without_friends_seats_an_ai() {
    let Some(pool) = test_pool().await else { return };
    let (_, children) = seed_family(&pool, 1).await;
    let host = &children[0];

    let mut conn = pool.acquire().await.unwrap();
    let (room, participants) = rooms::create_room(&mut conn, create_params(host.id, 2, vec![]))
        .await
        .unwrap();

    assert_eq!(room.current_players, 2);
    assert!(room.has_ai_player);
    assert!(room.ai_player_name.is_some());
    assert_eq!(room.room_code.len(), rooms::ROOM_CODE_LEN);
    assert_eq!(participants.len(), 2);
    assert_eq!(participants.iter().filter(|p| p.is_ai).count(), 1);

    // Host's current-room reference is set
    assert_eq!(fetch_child(&pool, host.id).await.room_id, Some(room.id));
}

#[tokio::test]
async fn test_create_with_friends_issues_invitations_instead_of_ai() {
    let Some(pool) = test_pool().await else { return };
    let (_, children) = seed_family(&pool, 1).await;
    let (_, friends) = seed_family(&pool, 1).await;
    let host = &children[0];
    let friend = &friends[0];

    let mut conn = pool.acquire().await.unwrap();
    let (room, participants) =
        rooms::create_room(&mut conn, create_params(host.id, 4, vec![friend.id]))
            .await
            .unwrap();

    assert_eq!(room.current_players, 1);
    assert!(!room.has_ai_player);
    assert_eq!(participants.len(), 1);

    let invitations = rooms::pending_invitations(&mut conn, friend.id).await.unwrap();
    assert_eq!(invitations.len(), 1);
    assert_eq!(invitations[0].room_id, Some(room.id));
    assert_eq!(invitations[0].room_code, room.room_code);
}

#[tokio::test]
async fn test_host_cannot_create_while_in_a_room() {
    let Some(pool) = test_pool().await else { return };
    let (_, children) = seed_family(&pool, 1).await;
    let host = &children[0];

    let mut conn = pool.acquire().await.unwrap();
    rooms::create_room(&mut conn, create_params(host.id, 2, vec![]))
        .await
        .unwrap();

    let err = rooms::create_room(&mut conn, create_params(host.id, 2, vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::AlreadyInRoom));
}

// ============================================================================
// Join
// ============================================================================

#[tokio::test]
async fn test_join_on_full_room_fails() {
    let Some(pool) = test_pool().await else { return };
    let (_, children) = seed_family(&pool, 1).await;
    let (_, others) = seed_family(&pool, 1).await;

    let mut conn = pool.acquire().await.unwrap();
    // max 2 → host + auto-seated AI fill the room completely
    let (room, _) = rooms::create_room(&mut conn, create_params(children[0].id, 2, vec![]))
        .await
        .unwrap();

    let err = rooms::join_room(&mut conn, others[0].id, &room.room_code)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::RoomFull));
    assert_eq!(fetch_room(&pool, room.id).await.unwrap().current_players, 2);
}

#[tokio::test]
async fn test_join_sets_current_room_and_occupancy() {
    let Some(pool) = test_pool().await else { return };
    let (_, hosts) = seed_family(&pool, 1).await;
    let (_, joiners) = seed_family(&pool, 2).await;

    let mut conn = pool.acquire().await.unwrap();
    let (room, _) = rooms::create_room(&mut conn, create_params(hosts[0].id, 4, vec![joiners[1].id]))
        .await
        .unwrap();

    let (joined, participants) = rooms::join_room(&mut conn, joiners[0].id, &room.room_code)
        .await
        .unwrap();
    assert_eq!(joined.current_players, 2);
    assert_eq!(participants.len(), 2);
    assert_eq!(fetch_child(&pool, joiners[0].id).await.room_id, Some(room.id));

    // Same child cannot join twice
    let err = rooms::join_room(&mut conn, joiners[0].id, &room.room_code)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::AlreadyInRoom));
}

#[tokio::test]
async fn test_concurrent_joins_never_exceed_capacity() {
    let Some(pool) = test_pool().await else { return };
    let (_, hosts) = seed_family(&pool, 1).await;
    let (_, racers) = seed_family(&pool, 2).await;

    // 2-seat room with one seat taken: invite someone so no AI fills it
    let mut conn = pool.acquire().await.unwrap();
    let (room, _) = rooms::create_room(
        &mut conn,
        create_params(hosts[0].id, 2, vec![racers[0].id, racers[1].id]),
    )
    .await
    .unwrap();
    drop(conn);

    let mut c1 = pool.acquire().await.unwrap();
    let mut c2 = pool.acquire().await.unwrap();
    let (r1, r2) = tokio::join!(
        rooms::join_room(&mut c1, racers[0].id, &room.room_code),
        rooms::join_room(&mut c2, racers[1].id, &room.room_code),
    );

    let successes = [r1.is_ok(), r2.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1, "exactly one racer may take the last seat");

    let final_room = fetch_room(&pool, room.id).await.unwrap();
    assert_eq!(final_room.current_players, final_room.max_players);
}

// ============================================================================
// Leave / close
// ============================================================================

#[tokio::test]
async fn test_nonhost_leave_releases_seat() {
    let Some(pool) = test_pool().await else { return };
    let (_, hosts) = seed_family(&pool, 1).await;
    let (_, joiners) = seed_family(&pool, 2).await;

    let mut conn = pool.acquire().await.unwrap();
    let (room, _) = rooms::create_room(&mut conn, create_params(hosts[0].id, 4, vec![joiners[1].id]))
        .await
        .unwrap();
    rooms::join_room(&mut conn, joiners[0].id, &room.room_code)
        .await
        .unwrap();

    rooms::leave_room(&mut conn, joiners[0].id).await.unwrap();

    assert_eq!(fetch_room(&pool, room.id).await.unwrap().current_players, 1);
    assert_eq!(fetch_child(&pool, joiners[0].id).await.room_id, None);
    // Room still exists, host still in it
    assert_eq!(fetch_child(&pool, hosts[0].id).await.room_id, Some(room.id));
}

#[tokio::test]
async fn test_host_leave_tears_down_room() {
    let Some(pool) = test_pool().await else { return };
    let (_, hosts) = seed_family(&pool, 1).await;
    let (_, joiners) = seed_family(&pool, 2).await;

    let mut conn = pool.acquire().await.unwrap();
    let (room, _) = rooms::create_room(&mut conn, create_params(hosts[0].id, 4, vec![joiners[1].id]))
        .await
        .unwrap();
    rooms::join_room(&mut conn, joiners[0].id, &room.room_code)
        .await
        .unwrap();

    rooms::leave_room(&mut conn, hosts[0].id).await.unwrap();

    // Room gone, every former occupant's reference cleared
    assert!(fetch_room(&pool, room.id).await.is_none());
    assert_eq!(fetch_child(&pool, hosts[0].id).await.room_id, None);
    assert_eq!(fetch_child(&pool, joiners[0].id).await.room_id, None);

    // Participants cascade-deleted
    let remaining = rooms::list_participants(&mut conn, room.id).await.unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn test_host_leave_with_only_ai_remaining() {
    let Some(pool) = test_pool().await else { return };
    let (_, hosts) = seed_family(&pool, 1).await;

    let mut conn = pool.acquire().await.unwrap();
    let (room, _) = rooms::create_room(&mut conn, create_params(hosts[0].id, 2, vec![]))
        .await
        .unwrap();

    rooms::leave_room(&mut conn, hosts[0].id).await.unwrap();
    assert!(fetch_room(&pool, room.id).await.is_none());
}

#[tokio::test]
async fn test_leave_without_room_is_not_found() {
    let Some(pool) = test_pool().await else { return };
    let (_, children) = seed_family(&pool, 1).await;

    let mut conn = pool.acquire().await.unwrap();
    let err = rooms::leave_room(&mut conn, children[0].id).await.unwrap_err();
    assert!(matches!(err, RoomError::NotInRoom));
}

#[tokio::test]
async fn test_close_clears_all_participants() {
    let Some(pool) = test_pool().await else { return };
    let (_, hosts) = seed_family(&pool, 1).await;
    let (_, joiners) = seed_family(&pool, 2).await;

    let mut conn = pool.acquire().await.unwrap();
    let (room, _) = rooms::create_room(&mut conn, create_params(hosts[0].id, 4, vec![joiners[1].id]))
        .await
        .unwrap();
    rooms::join_room(&mut conn, joiners[0].id, &room.room_code)
        .await
        .unwrap();

    rooms::close_room(&mut conn, room.id).await.unwrap();

    assert!(fetch_room(&pool, room.id).await.is_none());
    assert_eq!(fetch_child(&pool, hosts[0].id).await.room_id, None);
    assert_eq!(fetch_child(&pool, joiners[0].id).await.room_id, None);
}

#[tokio::test]
async fn test_current_room_roundtrip() {
    let Some(pool) = test_pool().await else { return };
    let (_, children) = seed_family(&pool, 1).await;
    let child = &children[0];

    let mut conn = pool.acquire().await.unwrap();
    assert!(rooms::current_room(&mut conn, child.id).await.unwrap().is_none());

    let (room, _) = rooms::create_room(&mut conn, create_params(child.id, 2, vec![]))
        .await
        .unwrap();

    let (current, participants) = rooms::current_room(&mut conn, child.id)
        .await
        .unwrap()
        .expect("host should be in the room");
    assert_eq!(current.id, room.id);
    assert_eq!(participants.len(), 2);

    rooms::leave_room(&mut conn, child.id).await.unwrap();
    assert!(rooms::current_room(&mut conn, child.id).await.unwrap().is_none());
}

// ============================================================================
// Invitations & join requests
// ============================================================================

#[tokio::test]
async fn test_invite_and_accept() {
    let Some(pool) = test_pool().await else { return };
    let (_, hosts) = seed_family(&pool, 1).await;
    let (_, invitees) = seed_family(&pool, 1).await;

    let mut conn = pool.acquire().await.unwrap();
    let (room, _) = rooms::create_room(&mut conn, create_params(hosts[0].id, 4, vec![invitees[0].id]))
        .await
        .unwrap();

    let invitations = rooms::pending_invitations(&mut conn, invitees[0].id)
        .await
        .unwrap();
    let invitation = &invitations[0];

    let (participant, updated) =
        rooms::accept_invitation(&mut conn, invitation.id, invitees[0].id)
            .await
            .unwrap();
    assert_eq!(participant.child_id, Some(invitees[0].id));
    assert_eq!(updated.current_players, 2);
    assert_eq!(fetch_child(&pool, invitees[0].id).await.room_id, Some(room.id));

    // Accepted invitations no longer show as pending
    let pending = rooms::pending_invitations(&mut conn, invitees[0].id)
        .await
        .unwrap();
    assert!(pending.is_empty());

    // A handled invitation cannot be accepted again
    let err = rooms::accept_invitation(&mut conn, invitation.id, invitees[0].id)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::AlreadyHandled));
}

#[tokio::test]
async fn test_accept_against_full_room_fails_hard() {
    let Some(pool) = test_pool().await else { return };
    let (_, hosts) = seed_family(&pool, 1).await;
    let (_, invitees) = seed_family(&pool, 2).await;

    let mut conn = pool.acquire().await.unwrap();
    // 2 seats, both invitees invited; the first to accept takes the seat
    let (room, _) = rooms::create_room(
        &mut conn,
        create_params(hosts[0].id, 2, vec![invitees[0].id, invitees[1].id]),
    )
    .await
    .unwrap();

    let first = rooms::pending_invitations(&mut conn, invitees[0].id)
        .await
        .unwrap()
        .remove(0);
    rooms::accept_invitation(&mut conn, first.id, invitees[0].id)
        .await
        .unwrap();

    let second = rooms::pending_invitations(&mut conn, invitees[1].id)
        .await
        .unwrap()
        .remove(0);
    let err = rooms::accept_invitation(&mut conn, second.id, invitees[1].id)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::RoomFull));

    // Hard failure: occupancy untouched, invitation still pending
    assert_eq!(fetch_room(&pool, room.id).await.unwrap().current_players, 2);
    let pending = rooms::pending_invitations(&mut conn, invitees[1].id)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn test_decline_never_touches_occupancy() {
    let Some(pool) = test_pool().await else { return };
    let (_, hosts) = seed_family(&pool, 1).await;
    let (_, invitees) = seed_family(&pool, 1).await;

    let mut conn = pool.acquire().await.unwrap();
    let (room, _) = rooms::create_room(&mut conn, create_params(hosts[0].id, 4, vec![invitees[0].id]))
        .await
        .unwrap();
    let before = fetch_room(&pool, room.id).await.unwrap().current_players;

    let invitation = rooms::pending_invitations(&mut conn, invitees[0].id)
        .await
        .unwrap()
        .remove(0);
    rooms::decline_invitation(&mut conn, invitation.id, invitees[0].id)
        .await
        .unwrap();

    assert_eq!(fetch_room(&pool, room.id).await.unwrap().current_players, before);
    assert_eq!(fetch_child(&pool, invitees[0].id).await.room_id, None);
}

#[tokio::test]
async fn test_request_to_join_and_host_approval() {
    let Some(pool) = test_pool().await else { return };
    let (_, hosts) = seed_family(&pool, 1).await;
    let (_, askers) = seed_family(&pool, 2).await;

    let mut conn = pool.acquire().await.unwrap();
    let (room, _) = rooms::create_room(&mut conn, create_params(hosts[0].id, 4, vec![askers[1].id]))
        .await
        .unwrap();

    let request = rooms::request_to_join(&mut conn, &room.room_code, askers[0].id)
        .await
        .unwrap();
    assert_eq!(request.status, "pending");

    // Deny leaves occupancy alone
    let denied = rooms::handle_join_request(&mut conn, request.id, false)
        .await
        .unwrap();
    assert!(denied.is_none());
    assert_eq!(fetch_room(&pool, room.id).await.unwrap().current_players, 1);

    // A fresh request approved adds the player exactly once
    let request = rooms::request_to_join(&mut conn, &room.room_code, askers[0].id)
        .await
        .unwrap();
    let approved = rooms::handle_join_request(&mut conn, request.id, true)
        .await
        .unwrap();
    assert!(approved.is_some());
    assert_eq!(fetch_room(&pool, room.id).await.unwrap().current_players, 2);
    assert_eq!(fetch_child(&pool, askers[0].id).await.room_id, Some(room.id));
}

// ============================================================================
// Friend edge storage invariant
// ============================================================================

#[tokio::test]
async fn test_friend_edge_unique_per_unordered_pair() {
    let Some(pool) = test_pool().await else { return };
    let (_, a) = seed_family(&pool, 1).await;
    let (_, b) = seed_family(&pool, 1).await;

    sqlx::query("INSERT INTO friend_edges (requester_id, addressee_id) VALUES ($1, $2)")
        .bind(a[0].id)
        .bind(b[0].id)
        .execute(&pool)
        .await
        .unwrap();

    // Reversed direction hits the symmetric unique index
    let err = sqlx::query("INSERT INTO friend_edges (requester_id, addressee_id) VALUES ($1, $2)")
        .bind(b[0].id)
        .bind(a[0].id)
        .execute(&pool)
        .await
        .unwrap_err();
    match err {
        sqlx::Error::Database(db) => assert!(db.is_unique_violation()),
        other => panic!("expected unique violation, got {other}"),
    }
}
