//! HTTP Response types

use bytes::Bytes;
use futures_util::{future, StreamExt};
use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use smallvec::SmallVec;
use std::convert::Infallible;
use tokio::sync::oneshot;

/// Body type handed to hyper
pub type HttpBody = UnsyncBoxBody<Bytes, Infallible>;

/// Response body
#[derive(Debug)]
pub enum Body {
    /// Whole body known up front
    Full(Bytes),
    /// Headers go out now, the body arrives later (or never, if the sender is dropped)
    Deferred(oneshot::Receiver<Bytes>),
}

/// HTTP Response
#[derive(Debug)]
pub struct Response {
    /// Status code
    pub status: StatusCode,
    /// Response headers (stack-allocated for small header counts)
    pub headers: SmallVec<[(String, String); 8]>,
    /// Response body
    pub body: Body,
}

impl Response {
    /// Create a new response
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: SmallVec::new(),
            body: Body::Full(Bytes::new()),
        }
    }

    /// Create a plain text response
    pub fn text(status: StatusCode, body: impl Into<Bytes>) -> Self {
        ResponseBuilder::new(status)
            .header("Content-Type", "text/plain")
            .body(body)
            .build()
    }

    /// Create a 404 Not Found response
    pub fn not_found() -> Self {
        Self::text(StatusCode::NOT_FOUND, "404 Not Found")
    }

    /// Create a 400 Bad Request response
    pub fn bad_request(message: &str) -> Self {
        Self::text(StatusCode::BAD_REQUEST, message.to_string())
    }

    /// Create a 500 Internal Server Error response
    pub fn internal_error(message: &str) -> Self {
        Self::text(StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
    }

    /// Get a header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get content-type header
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Body bytes, if the body is already known
    pub fn body_bytes(&self) -> Option<&Bytes> {
        match &self.body {
            Body::Full(bytes) => Some(bytes),
            Body::Deferred(_) => None,
        }
    }

    /// Convert to a hyper response
    ///
    /// Headers that are not valid HTTP are dropped with a warning.
    pub fn into_hyper(self) -> hyper::Response<HttpBody> {
        let body = match self.body {
            Body::Full(bytes) => Full::new(bytes).boxed_unsync(),
            Body::Deferred(rx) => {
                let frames = futures_util::stream::once(rx).filter_map(|received| {
                    let frame = received
                        .ok()
                        .map(|bytes| Ok::<_, Infallible>(Frame::data(bytes)));
                    future::ready(frame)
                });
                StreamBody::new(frames).boxed_unsync()
            }
        };

        let mut res = hyper::Response::new(body);
        *res.status_mut() = self.status;

        let headers = res.headers_mut();
        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => tracing::warn!(header = %name, "dropping invalid response header"),
            }
        }

        res
    }
}

/// Builder for constructing responses
pub struct ResponseBuilder {
    response: Response,
}

impl ResponseBuilder {
    /// Create a new builder
    pub fn new(status: StatusCode) -> Self {
        Self {
            response: Response::new(status),
        }
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.response.headers.push((name.into(), value.into()));
        self
    }

    /// Set body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.response.body = Body::Full(body.into());
        self
    }

    /// Set a body that is delivered later through `rx`
    pub fn deferred(mut self, rx: oneshot::Receiver<Bytes>) -> Self {
        self.response.body = Body::Deferred(rx);
        self
    }

    /// Build the response
    pub fn build(self) -> Response {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_response() {
        let res = Response::text(StatusCode::OK, "OK\n");
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.content_type(), Some("text/plain"));
        assert_eq!(res.body_bytes().unwrap().as_ref(), b"OK\n");
    }

    #[test]
    fn test_into_hyper_keeps_headers() {
        let res = ResponseBuilder::new(StatusCode::NO_CONTENT)
            .header("Access-Control-Allow-Origin", "*")
            .header("bad header", "x")
            .build()
            .into_hyper();

        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert_eq!(res.headers()["access-control-allow-origin"], "*");
        assert_eq!(res.headers().len(), 1);
    }

    #[tokio::test]
    async fn test_deferred_body_delivers_later() {
        let (tx, rx) = oneshot::channel();
        let res = ResponseBuilder::new(StatusCode::OK).deferred(rx).build();
        assert!(res.body_bytes().is_none());

        let body = res.into_hyper().into_body();
        tx.send(Bytes::from_static(b"later")).unwrap();
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected.as_ref(), b"later");
    }

    #[tokio::test]
    async fn test_deferred_body_dropped_sender_is_empty() {
        let (tx, rx) = oneshot::channel::<Bytes>();
        let body = ResponseBuilder::new(StatusCode::OK)
            .deferred(rx)
            .build()
            .into_hyper()
            .into_body();
        drop(tx);
        let collected = body.collect().await.unwrap().to_bytes();
        assert!(collected.is_empty());
    }
}
