//! HTTP API surface

pub mod billing_handlers;
pub mod friend_handlers;
pub mod handlers;
pub mod profile_handlers;
pub mod room_handlers;
pub mod routes;
pub mod session_handlers;
pub mod story_handlers;
pub mod voice_handlers;

pub use routes::create_router;
