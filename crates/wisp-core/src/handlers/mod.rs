//! Built-in request handlers

pub mod health;
pub mod hold;
pub mod static_files;
pub mod websocket;

pub use health::health;
pub use hold::{Hold, HoldOutcome, HOLD_BODY};
pub use static_files::{mime_type, StaticFiles, DEFAULT_MIME_TYPE};
pub use websocket::{
    accept_key, is_upgrade_request, upgrade_response, ConnectionId, HandshakeError,
    ServerMessage, Sessions, SHUTDOWN_REASON,
};
