//! Static file serving handler
//!
//! Reads a whole file asynchronously and answers with its bytes. Paths are joined onto
//! the root as given; there is no traversal check.

use crate::{Response, ResponseBuilder};
use http::StatusCode;
use std::io;
use std::path::{Path, PathBuf};

/// Extension (lowercased, with leading dot) to content type
const MIME_TYPES: &[(&str, &str)] = &[
    (".html", "text/html"),
    (".js", "text/javascript"),
    (".css", "text/css"),
    (".png", "image/png"),
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".ico", "image/x-icon"),
    (".json", "application/json"),
];

/// Content type for unknown or missing extensions
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Resolve a content type from the file extension (case-insensitive)
pub fn mime_type(path: &Path) -> &'static str {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!(".{}", ext.to_ascii_lowercase()),
        None => return DEFAULT_MIME_TYPE,
    };

    MIME_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_MIME_TYPE)
}

/// Static file handler
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    /// Serve static files from directory
    pub fn serve(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a request path (or a fixed page name) onto the root directory
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative.trim_start_matches('/'))
    }

    /// Read `path` and build the response
    pub async fn serve_file(&self, path: &Path) -> Response {
        match tokio::fs::read(path).await {
            Ok(content) => ResponseBuilder::new(StatusCode::OK)
                .header("Content-Type", mime_type(path))
                .body(content)
                .build(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Response::not_found(),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "static file read failed");
                Response::internal_error(&format!("Server Error: {}", error_code(&e)))
            }
        }
    }
}

/// Short name for an I/O failure, e.g. `PermissionDenied` or `IsADirectory`
fn error_code(e: &io::Error) -> String {
    format!("{:?}", e.kind())
}
