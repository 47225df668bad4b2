//! Profile and friend-graph flows exercised through the real handlers
//! against a real Postgres database (no HTTP layer; the verified subject
//! is injected directly, as the auth middleware would).
//!
//! These tests require TEST_DATABASE_URL and self-skip without it.

use axum::extract::{Path, Query, State};
use axum::Json;
use playroom::api::handlers::{AppError, ServerState};
use playroom::api::{friend_handlers, profile_handlers};
use playroom::auth::Subject;
use playroom::store::schema;
use playroom::Config;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use uuid::Uuid;

async fn test_state() -> Option<Arc<ServerState>> {
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

    Some(Arc::new(ServerState {
        pool,
        verifier: None,
        stripe: None,
        speech: None,
        config: Arc::new(Config {
            server_port: 0,
            public_url: None,
            database_url: url,
            max_connections: 5,
            allowed_origins: "*".into(),
            auth: None,
            stripe: None,
            elevenlabs: None,
        }),
    }))
}

fn fresh_subject() -> Subject {
    Subject {
        subject: format!("auth0|flow-{}", Uuid::new_v4()),
        email: Some("parent@example.com".into()),
    }
}

async fn create_parent(state: &Arc<ServerState>, subject: &Subject) -> playroom::store::models::ParentProfile {
    let (_, Json(parent)) = profile_handlers::create_parent_profile(
        State(state.clone()),
        subject.clone(),
        Json(profile_handlers::CreateParentRequest {
            name: "Flow Parent".into(),
        }),
    )
    .await
    .unwrap();
    parent
}

async fn create_child(
    state: &Arc<ServerState>,
    subject: &Subject,
    name: &str,
) -> playroom::store::models::ChildProfile {
    let (_, Json(child)) = profile_handlers::create_child_profile(
        State(state.clone()),
        subject.clone(),
        Json(profile_handlers::CreateChildRequest {
            name: name.into(),
            age_group: "8-10".into(),
            avatar: Some("🦊".into()),
        }),
    )
    .await
    .unwrap();
    child
}

// ============================================================================
// Parent profile
// ============================================================================

#[tokio::test]
async fn test_parent_create_is_idempotent() {
    let Some(state) = test_state().await else { return };
    let subject = fresh_subject();

    let first = create_parent(&state, &subject).await;
    let second = create_parent(&state, &subject).await;
    assert_eq!(first.id, second.id);

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM parent_profiles WHERE subject = $1")
            .bind(&subject.subject)
            .fetch_one(&state.pool)
            .await
            .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_parent_email_placeholder_when_token_has_none() {
    let Some(state) = test_state().await else { return };
    let subject = Subject {
        subject: format!("auth0|flow-{}", Uuid::new_v4()),
        email: None,
    };

    let parent = create_parent(&state, &subject).await;
    assert!(parent.email.contains("@placeholder.invalid"));
}

#[tokio::test]
async fn test_get_parent_before_create_is_404() {
    let Some(state) = test_state().await else { return };
    let subject = fresh_subject();

    let err = profile_handlers::get_parent_profile(State(state.clone()), subject)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

// ============================================================================
// Child profiles
// ============================================================================

#[tokio::test]
async fn test_children_list_empty_is_ok_not_404() {
    let Some(state) = test_state().await else { return };
    let subject = fresh_subject();
    create_parent(&state, &subject).await;

    let Json(children) =
        profile_handlers::list_child_profiles(State(state.clone()), subject)
            .await
            .unwrap();
    assert!(children.is_empty());
}

#[tokio::test]
async fn test_child_create_requires_parent() {
    let Some(state) = test_state().await else { return };
    let subject = fresh_subject();

    let err = profile_handlers::create_child_profile(
        State(state.clone()),
        subject,
        Json(profile_handlers::CreateChildRequest {
            name: "Orphan".into(),
            age_group: "5-7".into(),
            avatar: None,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_child_partial_update_leaves_absent_fields() {
    let Some(state) = test_state().await else { return };
    let subject = fresh_subject();
    create_parent(&state, &subject).await;
    let child = create_child(&state, &subject, "Maya").await;

    let Json(updated) = profile_handlers::update_child_profile(
        State(state.clone()),
        subject.clone(),
        Path(child.id),
        Json(profile_handlers::UpdateChildRequest {
            name: Some("Maya B.".into()),
            ..Default::default()
        }),
    )
    .await
    .unwrap();

    assert_eq!(updated.name, "Maya B.");
    assert_eq!(updated.age_group, child.age_group);
    assert_eq!(updated.avatar, child.avatar);
}

#[tokio::test]
async fn test_status_update_stamps_last_seen() {
    let Some(state) = test_state().await else { return };
    let subject = fresh_subject();
    create_parent(&state, &subject).await;
    let child = create_child(&state, &subject, "Maya").await;

    let Json(updated) = profile_handlers::update_child_status(
        State(state.clone()),
        subject.clone(),
        Path(child.id),
        Json(profile_handlers::UpdateChildStatusRequest {
            is_online: Some(true),
        }),
    )
    .await
    .unwrap();

    assert!(updated.is_online);
    assert!(updated.last_seen_at.unwrap() >= child.last_seen_at.unwrap());
}

#[tokio::test]
async fn test_child_of_another_parent_is_invisible() {
    let Some(state) = test_state().await else { return };
    let subject_a = fresh_subject();
    let subject_b = fresh_subject();
    create_parent(&state, &subject_a).await;
    create_parent(&state, &subject_b).await;
    let child_a = create_child(&state, &subject_a, "Maya").await;

    let err = profile_handlers::update_child_profile(
        State(state.clone()),
        subject_b,
        Path(child_a.id),
        Json(Default::default()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

// ============================================================================
// Friend graph
// ============================================================================

async fn send_request(
    state: &Arc<ServerState>,
    subject: &Subject,
    requester: Uuid,
    addressee: Uuid,
) -> Result<playroom::store::models::FriendEdge, AppError> {
    friend_handlers::send_friend_request(
        State(state.clone()),
        subject.clone(),
        Json(friend_handlers::FriendRequestCreate {
            requester_child_id: requester,
            addressee_id: addressee,
        }),
    )
    .await
    .map(|(_, Json(edge))| edge)
}

#[tokio::test]
async fn test_friend_request_duplicate_rejected_both_directions() {
    let Some(state) = test_state().await else { return };
    let subject_a = fresh_subject();
    let subject_b = fresh_subject();
    create_parent(&state, &subject_a).await;
    create_parent(&state, &subject_b).await;
    let child_a = create_child(&state, &subject_a, "Maya").await;
    let child_b = create_child(&state, &subject_b, "Ben").await;

    let edge = send_request(&state, &subject_a, child_a.id, child_b.id)
        .await
        .unwrap();
    assert_eq!(edge.status, "pending");

    // Same direction again
    let err = send_request(&state, &subject_a, child_a.id, child_b.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Reverse direction from the other family
    let err = send_request(&state, &subject_b, child_b.id, child_a.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_friend_accept_then_presence_listing() {
    let Some(state) = test_state().await else { return };
    let subject_a = fresh_subject();
    let subject_b = fresh_subject();
    create_parent(&state, &subject_a).await;
    create_parent(&state, &subject_b).await;
    let child_a = create_child(&state, &subject_a, "Maya").await;
    let child_b = create_child(&state, &subject_b, "Ben").await;

    let edge = send_request(&state, &subject_a, child_a.id, child_b.id)
        .await
        .unwrap();

    let Json(accepted) = friend_handlers::accept_friend_request(
        State(state.clone()),
        subject_b.clone(),
        Path(edge.id),
    )
    .await
    .unwrap();
    assert_eq!(accepted.status, "accepted");

    // Accepting twice is an invalid state transition
    let err = friend_handlers::accept_friend_request(
        State(state.clone()),
        subject_b.clone(),
        Path(edge.id),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    // Ben shows up in Maya's friend list, offline by default
    let Json(friends) = friend_handlers::list_friends(
        State(state.clone()),
        subject_a.clone(),
        Query(friend_handlers::ChildIdQuery { child_id: child_a.id }),
    )
    .await
    .unwrap();
    assert_eq!(friends.len(), 1);
    assert_eq!(friends[0].id, child_b.id);
    assert_eq!(friends[0].status, "offline");
}

#[tokio::test]
async fn test_friend_decline_deletes_edge() {
    let Some(state) = test_state().await else { return };
    let subject_a = fresh_subject();
    let subject_b = fresh_subject();
    create_parent(&state, &subject_a).await;
    create_parent(&state, &subject_b).await;
    let child_a = create_child(&state, &subject_a, "Maya").await;
    let child_b = create_child(&state, &subject_b, "Ben").await;

    let edge = send_request(&state, &subject_a, child_a.id, child_b.id)
        .await
        .unwrap();

    friend_handlers::decline_friend_request(
        State(state.clone()),
        subject_b.clone(),
        Path(edge.id),
    )
    .await
    .unwrap();

    // Edge is gone entirely: a fresh request is allowed again
    send_request(&state, &subject_a, child_a.id, child_b.id)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_search_excludes_self_and_connected() {
    let Some(state) = test_state().await else { return };
    let marker_id = Uuid::new_v4().to_string();
    let marker = &marker_id[..8];
    let subject_a = fresh_subject();
    let subject_b = fresh_subject();
    let subject_c = fresh_subject();
    create_parent(&state, &subject_a).await;
    create_parent(&state, &subject_b).await;
    create_parent(&state, &subject_c).await;
    let child_a = create_child(&state, &subject_a, &format!("Searcher-{marker}")).await;
    let child_b = create_child(&state, &subject_b, &format!("Pending-{marker}")).await;
    let child_c = create_child(&state, &subject_c, &format!("Stranger-{marker}")).await;

    send_request(&state, &subject_a, child_a.id, child_b.id)
        .await
        .unwrap();

    let Json(found) = friend_handlers::search_children(
        State(state.clone()),
        subject_a.clone(),
        Query(friend_handlers::SearchQuery {
            q: marker.to_string(),
            child_id: Some(child_a.id),
        }),
    )
    .await
    .unwrap();

    let ids: Vec<Uuid> = found.iter().map(|c| c.id).collect();
    assert!(ids.contains(&child_c.id), "stranger should be found");
    assert!(!ids.contains(&child_a.id), "self is excluded");
    assert!(!ids.contains(&child_b.id), "pending edge is excluded");
}
