//! Request routing
//!
//! A fixed table of paths; everything else falls through to the static root.
//! Preflight (`OPTIONS`) is answered by the CORS middleware before routing.

/// Fixed demo pages, relative to the static root
pub const MENU_PAGE: &str = "menu.html";
pub const WEBSOCKET_PAGE: &str = "websockets/websocket.html";
pub const FETCH_PAGE: &str = "http1/fetch.html";

/// Where a request goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route<'a> {
    Health,
    Hold,
    /// File relative to the static root
    File(&'a str),
}

/// Resolve a path (query already stripped). Methods are not distinguished.
pub fn route(path: &str) -> Route<'_> {
    match path {
        "/health" => Route::Health,
        "/hold" => Route::Hold,
        "/" => Route::File(MENU_PAGE),
        "/websocket" => Route::File(WEBSOCKET_PAGE),
        "/fetch" => Route::File(FETCH_PAGE),
        other => Route::File(other),
    }
}
