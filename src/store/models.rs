//! Row structs for every table, shared by handlers and the rooms module.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// String constants for the status columns. The database enforces the same
/// sets with CHECK constraints.
pub mod status {
    pub mod room {
        pub const WAITING: &str = "waiting";
        pub const PLAYING: &str = "playing";
        pub const FINISHED: &str = "finished";
    }
    pub mod friend {
        pub const PENDING: &str = "pending";
        pub const ACCEPTED: &str = "accepted";
        pub const BLOCKED: &str = "blocked";
    }
    pub mod request {
        pub const PENDING: &str = "pending";
        pub const APPROVED: &str = "approved";
        pub const DENIED: &str = "denied";
    }
    pub mod session {
        pub const ACTIVE: &str = "active";
        pub const PAUSED: &str = "paused";
        pub const FINISHED: &str = "finished";
    }
    pub mod subscription {
        pub const ACTIVE: &str = "active";
        pub const INACTIVE: &str = "inactive";
        pub const CANCELLED: &str = "cancelled";
    }
}

/// Parent account, keyed by the identity provider's subject.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ParentProfile {
    pub id: Uuid,
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Child profile belonging to a parent.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ChildProfile {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub name: String,
    pub age_group: String,
    pub avatar: Option<String>,
    pub voice_clone_enabled: bool,
    pub voice_clone_id: Option<String>,
    pub is_online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub room_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Friend edge between two children (unordered pair, status-tracked).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FriendEdge {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub addressee_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Multiplayer game room.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GameRoom {
    pub id: Uuid,
    pub room_code: String,
    pub host_child_id: Uuid,
    pub game_id: String,
    pub difficulty: String,
    pub max_players: i32,
    pub current_players: i32,
    pub status: String,
    pub has_ai_player: bool,
    pub ai_player_name: Option<String>,
    pub ai_player_avatar: Option<String>,
    pub selected_category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Occupant of a room. `child_id` is null for AI players.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RoomParticipant {
    pub id: Uuid,
    pub room_id: Uuid,
    pub child_id: Option<Uuid>,
    pub player_name: String,
    pub player_avatar: Option<String>,
    pub is_ai: bool,
    pub joined_at: DateTime<Utc>,
}

/// Invitation or join ask against a room, keyed by room code.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JoinRequest {
    pub id: Uuid,
    pub room_id: Option<Uuid>,
    pub room_code: String,
    pub child_id: Uuid,
    pub player_name: String,
    pub player_avatar: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Game session tied to a room.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GameSession {
    pub id: Uuid,
    pub room_id: Uuid,
    pub game_id: String,
    pub difficulty: String,
    pub selected_category: Option<String>,
    pub game_data: Option<serde_json::Value>,
    pub current_turn_child_id: Option<Uuid>,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only score record.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GameScore {
    pub id: Uuid,
    pub room_id: Uuid,
    pub session_id: Uuid,
    pub child_id: Option<Uuid>,
    pub player_name: String,
    pub player_avatar: Option<String>,
    pub is_ai: bool,
    pub score: i32,
    pub questions_answered: i32,
    pub correct_answers: i32,
    pub time_spent_secs: i32,
    pub created_at: DateTime<Utc>,
}

/// Generated story for a child. Immutable after creation.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GeneratedStory {
    pub id: Uuid,
    pub child_id: Uuid,
    pub title: String,
    pub content: String,
    pub audio_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Voice-cloning subscription; at most one per parent.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VoiceSubscription {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub status: String,
    pub plan_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
