//! Hold endpoint
//!
//! Sends response headers right away and keeps the body open until a timer fires.
//! If the client goes away first, hyper drops the response body, the session task sees
//! its sender close, and the timer is dropped without writing anything.

use crate::{Request, Response, ResponseBuilder};
use bytes::Bytes;
use http::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Body written when the hold runs to completion
pub const HOLD_BODY: &str = "Done holding.\n";

/// How a hold session ended. Exactly one of these per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldOutcome {
    /// Timer fired and the body was handed to the connection
    Completed,
    /// Connection closed first; the timer was cancelled
    Cancelled,
}

/// Hold endpoint handler
#[derive(Debug, Clone)]
pub struct Hold {
    duration: Duration,
    active: Arc<AtomicUsize>,
}

impl Hold {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of holds whose timer is still pending
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Start a hold session for `req` and return its (still open) response
    pub fn start(&self, req: &Request) -> Response {
        match req.remote_addr {
            Some(addr) => tracing::info!(
                method = %req.method,
                url = %req.url(),
                remote = %addr.ip(),
                port = addr.port(),
                "holding connection"
            ),
            None => tracing::info!(method = %req.method, url = %req.url(), "holding connection"),
        }

        let (tx, rx) = oneshot::channel();
        let guard = ActiveGuard::new(self.active.clone());
        let duration = self.duration;

        tokio::spawn(async move {
            let _guard = guard;
            match hold_session(tx, duration).await {
                HoldOutcome::Completed => tracing::info!(?duration, "hold completed"),
                HoldOutcome::Cancelled => tracing::debug!("hold cancelled, client disconnected"),
            }
        });

        ResponseBuilder::new(StatusCode::OK)
            .header("Content-Type", "text/plain")
            .header("Cache-Control", "no-store")
            .deferred(rx)
            .build()
    }
}

/// Wait for either the timer or the receiver going away
pub async fn hold_session(mut tx: oneshot::Sender<Bytes>, duration: Duration) -> HoldOutcome {
    let fired = tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = tx.closed() => false,
    };

    if !fired {
        return HoldOutcome::Cancelled;
    }

    // The receiver may have gone away right as the timer fired
    match tx.send(Bytes::from_static(HOLD_BODY.as_bytes())) {
        Ok(()) => HoldOutcome::Completed,
        Err(_) => HoldOutcome::Cancelled,
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Body, RequestBuilder};
    use http::Method;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_and_writes_body() {
        let (tx, mut rx) = oneshot::channel();
        let outcome = hold_session(tx, Duration::from_millis(10_000_000)).await;

        assert_eq!(outcome, HoldOutcome::Completed);
        assert_eq!(rx.try_recv().unwrap().as_ref(), HOLD_BODY.as_bytes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_timer() {
        let (tx, rx) = oneshot::channel();
        let session = tokio::spawn(hold_session(tx, Duration::from_secs(60)));

        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(rx);

        assert_eq!(session.await.unwrap(), HoldOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_returns_open_response() {
        let hold = Hold::new(Duration::from_secs(30));
        let req = RequestBuilder::new(Method::GET, "/hold")
            .remote_addr("127.0.0.1:40000".parse().unwrap())
            .build();

        let res = hold.start(&req);
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.header("cache-control"), Some("no-store"));
        assert_eq!(res.content_type(), Some("text/plain"));
        assert_eq!(hold.active(), 1);

        let Body::Deferred(rx) = res.body else {
            panic!("hold body must be deferred");
        };
        assert_eq!(rx.await.unwrap().as_ref(), HOLD_BODY.as_bytes());

        tokio::task::yield_now().await;
        assert_eq!(hold.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_response_releases_session() {
        let hold = Hold::new(Duration::from_secs(30));
        let res = hold.start(&RequestBuilder::new(Method::GET, "/hold").build());
        assert_eq!(hold.active(), 1);

        drop(res);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(hold.active(), 0);
    }
}
