//! API route definitions

use super::handlers::{self, ApiState};
use super::{
    billing_handlers, friend_handlers, profile_handlers, room_handlers, session_handlers,
    story_handlers, voice_handlers,
};
use crate::auth::require_auth;
use axum::http::HeaderValue;
use axum::middleware::from_fn_with_state;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the API router.
///
/// Everything under /api requires a bearer token; the health probes and
/// the root banner stay open.
pub fn create_router(state: ApiState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    let protected = Router::new()
        // ====================================================================
        // Profiles
        // ====================================================================
        .route(
            "/api/profiles/parent",
            get(profile_handlers::get_parent_profile).post(profile_handlers::create_parent_profile),
        )
        .route(
            "/api/profiles/children",
            get(profile_handlers::list_child_profiles).post(profile_handlers::create_child_profile),
        )
        .route(
            "/api/profiles/children/{child_id}",
            axum::routing::patch(profile_handlers::update_child_profile)
                .delete(profile_handlers::delete_child_profile),
        )
        .route(
            "/api/profiles/children/{child_id}/status",
            post(profile_handlers::update_child_status),
        )
        // ====================================================================
        // Friends
        // ====================================================================
        .route(
            "/api/friends",
            get(friend_handlers::list_friends),
        )
        .route(
            "/api/friends/requests",
            get(friend_handlers::list_friend_requests).post(friend_handlers::send_friend_request),
        )
        .route(
            "/api/friends/requests/{request_id}/accept",
            post(friend_handlers::accept_friend_request),
        )
        .route(
            "/api/friends/requests/{request_id}/decline",
            post(friend_handlers::decline_friend_request),
        )
        .route(
            "/api/friends/children/search",
            get(friend_handlers::search_children),
        )
        .route("/api/friends/{child_id}", delete(friend_handlers::unfriend))
        // ====================================================================
        // Rooms & invitations
        // ====================================================================
        .route("/api/rooms", post(room_handlers::create_room))
        .route("/api/rooms/join", post(room_handlers::join_room))
        .route("/api/rooms/leave", post(room_handlers::leave_room))
        .route("/api/rooms/close", post(room_handlers::close_room))
        .route("/api/rooms/current", get(room_handlers::get_current_room))
        .route(
            "/api/rooms/invite",
            post(room_handlers::invite_friends),
        )
        .route(
            "/api/rooms/request-to-join",
            post(room_handlers::request_to_join),
        )
        .route(
            "/api/rooms/handle-join-request",
            post(room_handlers::handle_join_request),
        )
        .route(
            "/api/rooms/pending-invitations",
            get(room_handlers::get_pending_invitations),
        )
        .route(
            "/api/rooms/accept-invitation",
            post(room_handlers::accept_invitation),
        )
        .route(
            "/api/rooms/decline-invitation",
            post(room_handlers::decline_invitation),
        )
        .route(
            "/api/rooms/{room_id}/participants",
            get(room_handlers::get_room_participants),
        )
        // ====================================================================
        // Sessions & scores
        // ====================================================================
        .route("/api/sessions", post(session_handlers::create_session))
        .route(
            "/api/sessions/scores",
            post(session_handlers::create_score),
        )
        .route(
            "/api/sessions/room/{room_id}/scores",
            get(session_handlers::get_room_scores),
        )
        .route(
            "/api/sessions/{session_id}",
            get(session_handlers::get_session),
        )
        // ====================================================================
        // Stories
        // ====================================================================
        .route(
            "/api/stories",
            get(story_handlers::list_stories).post(story_handlers::create_story),
        )
        .route(
            "/api/stories/{story_id}",
            get(story_handlers::get_story).delete(story_handlers::delete_story),
        )
        // ====================================================================
        // Billing & voice
        // ====================================================================
        .route(
            "/api/billing/create-checkout",
            post(billing_handlers::create_checkout),
        )
        .route(
            "/api/billing/voice-subscription",
            get(billing_handlers::get_voice_subscription)
                .post(billing_handlers::upsert_voice_subscription)
                .delete(billing_handlers::cancel_voice_subscription),
        )
        .route(
            "/api/voice/create-voice-clone",
            post(voice_handlers::create_voice_clone),
        )
        .route(
            "/api/voice/generate-story-audio",
            post(voice_handlers::generate_story_audio),
        )
        .layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .merge(protected)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Build the CORS layer from the configured origin list ("*" → any).
fn cors_layer(allowed_origins: &str) -> CorsLayer {
    if allowed_origins.trim() == "*" {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

// ============================================================================
// Tests
// ============================================================================
