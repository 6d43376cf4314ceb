//! Health check handler

use crate::Response;
use http::StatusCode;

/// Liveness probe body
pub const HEALTH_BODY: &str = "OK\n";

/// Always healthy while the process can answer
pub fn health() -> Response {
    Response::text(StatusCode::OK, HEALTH_BODY)
}
