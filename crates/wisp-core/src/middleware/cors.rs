//! CORS (Cross-Origin Resource Sharing) middleware
//!
//! Answers preflight requests and stamps the allow headers on every response,
//! whether or not the request carried an `Origin`.

use super::Middleware;
use crate::{Request, Response};
use http::{Method, StatusCode};

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET,POST,OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type";

/// CORS middleware: any origin; GET, POST and OPTIONS; `Content-Type` header
#[derive(Debug, Clone, Copy, Default)]
pub struct Cors;

impl Cors {
    pub fn permissive() -> Self {
        Self
    }

    fn add_cors_headers(&self, res: &mut Response) {
        res.headers
            .push(("Access-Control-Allow-Origin".to_string(), ALLOW_ORIGIN.to_string()));
        res.headers
            .push(("Access-Control-Allow-Methods".to_string(), ALLOW_METHODS.to_string()));
        res.headers
            .push(("Access-Control-Allow-Headers".to_string(), ALLOW_HEADERS.to_string()));
    }
}

impl Middleware for Cors {
    fn before(&self, req: &Request) -> Option<Response> {
        // Preflight on any path
        if req.method == Method::OPTIONS {
            return Some(Response::new(StatusCode::NO_CONTENT));
        }
        None
    }

    fn after(&self, _req: &Request, res: &mut Response) {
        self.add_cors_headers(res);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RequestBuilder;

    #[test]
    fn test_permissive_headers() {
        let cors = Cors::permissive();
        let req = RequestBuilder::new(Method::GET, "/health")
            .header("Origin", "https://example.com")
            .build();
        let mut res = Response::new(StatusCode::OK);
        cors.after(&req, &mut res);

        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
        assert_eq!(res.header("access-control-allow-methods"), Some("GET,POST,OPTIONS"));
        assert_eq!(res.header("access-control-allow-headers"), Some("Content-Type"));
    }

    #[test]
    fn test_preflight_any_path() {
        let cors = Cors::permissive();
        for path in ["/", "/hold", "/nope/deeper.txt"] {
            let req = RequestBuilder::new(Method::OPTIONS, path).build();
            let res = cors.before(&req).expect("preflight answered");
            assert_eq!(res.status, StatusCode::NO_CONTENT);
            assert!(res.body_bytes().unwrap().is_empty());
        }
    }

    #[test]
    fn test_non_options_passes_through() {
        let cors = Cors::permissive();
        let req = RequestBuilder::new(Method::POST, "/health").build();
        assert!(cors.before(&req).is_none());
    }
}
