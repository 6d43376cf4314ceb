//! Server configuration
//!
//! Values come from environment-style variables. [`ServerConfig::from_lookup`] takes the
//! lookup as a function so tests never touch the process environment.

use crate::{Error, Result};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default hold duration: 10,000,000 ms (about 166.7 minutes).
pub const DEFAULT_HOLD_DURATION: Duration = Duration::from_millis(10_000_000);

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub hostname: String,
    /// Directory that static paths resolve against
    pub root: PathBuf,
    /// How long `/hold` keeps a response open
    pub hold_duration: Duration,
    /// Host name printed in the startup banner
    pub public_host: String,
    pub workers: usize,
    /// Upper bound on waiting for WebSocket close handshakes at shutdown
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            hostname: "0.0.0.0".to_string(),
            root: PathBuf::from("public"),
            hold_duration: DEFAULT_HOLD_DURATION,
            public_host: "localhost".to_string(),
            workers: num_cpus::get(),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup; unset variables keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(port) = parse_var(&lookup, "PORT")? {
            config.port = port;
        }
        if let Some(host) = lookup("HOST") {
            config.hostname = host;
        }
        if let Some(root) = lookup("STATIC_ROOT") {
            config.root = PathBuf::from(root);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "HOLD_DURATION_MS")? {
            config.hold_duration = Duration::from_millis(ms);
        }
        if let Some(host) = lookup("PUBLIC_HOST") {
            config.public_host = host;
        }
        if let Some(workers) = parse_var::<usize>(&lookup, "WORKERS")? {
            if workers == 0 {
                return Err(Error::Config { var: "WORKERS", value: "0".to_string() });
            }
            config.workers = workers;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "SHUTDOWN_GRACE_MS")? {
            config.shutdown_grace = Duration::from_millis(ms);
        }

        Ok(config)
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn hold_duration(mut self, duration: Duration) -> Self {
        self.hold_duration = duration;
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Address the listener binds to
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip = IpAddr::from_str(&self.hostname)
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", self.hostname, e)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config { var, value: raw }),
    }
}
