//! wisp-core: demo HTTP/WebSocket server core
//!
//! One listener, three behaviors:
//! - static files under a configurable root, with a few fixed demo pages
//! - `/hold`, a response that stays open until a timer fires or the client leaves
//! - WebSocket echo with per-connection ids and a 1001 close on shutdown

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod router;
pub mod server;

// Re-exports
pub use config::{ServerConfig, DEFAULT_HOLD_DURATION};
pub use error::{Error, Result};
pub use request::{from_hyper_request, Request, RequestBuilder};
pub use response::{Body, HttpBody, Response, ResponseBuilder};
pub use router::{route, Route};

// Middleware re-exports
pub use middleware::{Cors, Middleware, MiddlewareChain};

// Handlers re-exports
pub use handlers::{
    health, ConnectionId, Hold, HoldOutcome, ServerMessage, Sessions, StaticFiles, HOLD_BODY,
    SHUTDOWN_REASON,
};

pub use server::{create_listener_socket, Server, ServerState};
