//! Native HTTP + WebSocket server
//!
//! One listener serves both protocols:
//! - hyper HTTP/1.1 connections, one task each, with upgrades enabled
//! - WebSocket sessions on upgraded connections, one task each
//! - graceful stop: close sockets with 1001, drop the listener, wait for close handshakes

use crate::handlers::{self, websocket, Hold, Sessions, StaticFiles};
use crate::middleware::{Cors, MiddlewareChain};
use crate::request::from_hyper_request;
use crate::response::HttpBody;
use crate::router::{self, Route};
use crate::{Request, Response, Result, ServerConfig};
use http::StatusCode;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use socket2::{Domain, Protocol, Socket, Type};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

/// Server state shared across all connections
pub struct ServerState {
    config: ServerConfig,
    middleware: MiddlewareChain,
    files: StaticFiles,
    hold: Hold,
    sessions: Arc<Sessions>,
    shutting_down: AtomicBool,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        let mut middleware = MiddlewareChain::new();
        middleware.add(Cors::permissive());

        Self {
            files: StaticFiles::serve(config.root.clone()),
            hold: Hold::new(config.hold_duration),
            sessions: Arc::new(Sessions::new()),
            shutting_down: AtomicBool::new(false),
            middleware,
            config,
        }
    }

    /// Holds whose timer has not fired or been cancelled yet
    pub fn active_holds(&self) -> usize {
        self.hold.active()
    }

    /// WebSocket sessions still running
    pub fn open_websockets(&self) -> usize {
        self.sessions.len()
    }

    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Answer a plain HTTP request: CORS, preflight, then the route
    pub async fn handle(&self, req: &Request) -> Response {
        let mut res = match self.middleware.run_before(req) {
            Some(res) => res,
            None => self.dispatch(req).await,
        };
        self.middleware.run_after(req, &mut res);
        res
    }

    async fn dispatch(&self, req: &Request) -> Response {
        match router::route(&req.path) {
            Route::Health => handlers::health(),
            Route::Hold => self.hold.start(req),
            Route::File(relative) => self.files.serve_file(&self.files.resolve(relative)).await,
        }
    }
}

/// Create the listening socket
///
/// No SO_REUSEPORT: a second server on the same port must fail to bind.
pub fn create_listener_socket(addr: &SocketAddr) -> std::io::Result<Socket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // SO_REUSEADDR - allow binding to address in TIME_WAIT
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&(*addr).into())?;
    socket.listen(1024)?;

    Ok(socket)
}

/// Bound server, ready to run
pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl Server {
    /// Bind the listener and log the startup banner
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let addr = config.bind_addr()?;
        let socket = create_listener_socket(&addr)?;
        let listener = TcpListener::from_std(socket.into())?;

        let server = Self {
            listener,
            state: Arc::new(ServerState::new(config)),
        };
        server.log_banner()?;
        Ok(server)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> Arc<ServerState> {
        self.state.clone()
    }

    fn log_banner(&self) -> Result<()> {
        let port = self.local_addr()?.port();
        let host = &self.state.config.public_host;
        tracing::info!(port, root = %self.state.config.root.display(), "Server running on port {}", port);
        tracing::info!("Menu:       http://{}:{}/", host, port);
        tracing::info!("WebSocket:  http://{}:{}/websocket", host, port);
        tracing::info!("HTTP fetch: http://{}:{}/fetch", host, port);
        Ok(())
    }

    /// Accept connections until `shutdown` resolves, then drain WebSocket sessions
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, remote)) => self.spawn_connection(stream, remote),
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                },
                () = &mut shutdown => break,
            }
        }

        let Server { listener, state } = self;
        state.shutting_down.store(true, Ordering::SeqCst);

        let signalled = state.sessions.close_all();
        drop(listener);
        tracing::info!(websockets = signalled, "listener closed, closing websockets");

        if !state.sessions.wait_closed(state.config.shutdown_grace).await {
            tracing::warn!(
                remaining = state.sessions.len(),
                "websockets still open after shutdown grace period"
            );
        }

        tracing::info!("server stopped");
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, remote: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%remote, error = %e, "failed to set TCP_NODELAY");
        }

        let state = self.state.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| handle_request(state.clone(), remote, req));

            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service)
                .with_upgrades()
                .await
            {
                tracing::debug!(%remote, error = %e, "connection error");
            }
        });
    }
}

/// Handle incoming HTTP request
async fn handle_request(
    state: Arc<ServerState>,
    remote: SocketAddr,
    req: hyper::Request<Incoming>,
) -> std::result::Result<hyper::Response<HttpBody>, Infallible> {
    let request = from_hyper_request(&req, Some(remote));

    if websocket::is_upgrade_request(&request) {
        let mut res = upgrade(state.clone(), req, &request);
        if res.status != StatusCode::SWITCHING_PROTOCOLS {
            state.middleware.run_after(&request, &mut res);
        }
        return Ok(res.into_hyper());
    }

    Ok(state.handle(&request).await.into_hyper())
}

/// Answer the handshake and hand the connection to the echo loop once hyper lets go of it.
/// Anything but 101 is a rejection (400 or 503).
fn upgrade(state: Arc<ServerState>, req: hyper::Request<Incoming>, request: &Request) -> Response {
    if state.is_shutting_down() {
        return Response::text(StatusCode::SERVICE_UNAVAILABLE, "Server shutting down");
    }

    let accept = match websocket::accept_key(request) {
        Ok(accept) => accept,
        Err(e) => {
            tracing::debug!(path = %request.path, error = %e, "rejected websocket handshake");
            return Response::bad_request(&e.to_string());
        }
    };

    let remote = request.remote_addr;
    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => websocket::serve_upgraded(upgraded, remote, &state.sessions).await,
            Err(e) => tracing::warn!(error = %e, "websocket upgrade failed"),
        }
    });

    websocket::upgrade_response(&accept)
}
