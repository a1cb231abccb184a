//! Server-level configuration used by the control endpoint and relay server.

use std::time::Duration;

/// Default rendezvous blocking timeout: how long `Initiate` and `Listen`
/// park the caller before failing with [`crate::error::RelayError::Timeout`].
pub const DEFAULT_BLOCKING_TIMEOUT_MS: u64 = 30_000;

/// Default session lifetime from creation to expiry.
pub const DEFAULT_SESSION_EXPIRY_MS: u64 = 120_000;

/// Default TCP accept backlog.
pub const DEFAULT_BACKLOG: u32 = 128;

/// Default advertised socket port (returned to clients in `socketPort`).
pub const DEFAULT_SOCKET_PORT: u16 = 10_000;

/// Configuration shared by the control listener and the TCP relay server.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the HTTP control endpoint binds.
    pub http_addr: String,
    /// Address the TCP relay server binds.
    pub socket_addr: String,
    /// Port advertised to clients as `socketPort` in control responses.
    ///
    /// Normally equal to the port component of `socket_addr`, but kept
    /// separate so the relay can sit behind a port-forwarding NAT/LB.
    pub socket_port: u16,
    /// Worker thread count hint. The relay is thread-per-connection, so
    /// this is accepted for forward compatibility with a pooled executor
    /// and otherwise unused.
    pub worker_threads: Option<usize>,
    /// TCP accept backlog.
    pub backlog: u32,
    /// How long `Initiate`/`Listen` may park before timing out.
    pub blocking_timeout: Duration,
    /// Session lifetime from creation to expiry.
    pub session_expiry: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".to_string(),
            socket_addr: "0.0.0.0:10000".to_string(),
            socket_port: DEFAULT_SOCKET_PORT,
            worker_threads: None,
            backlog: DEFAULT_BACKLOG,
            blocking_timeout: Duration::from_millis(DEFAULT_BLOCKING_TIMEOUT_MS),
            session_expiry: Duration::from_millis(DEFAULT_SESSION_EXPIRY_MS),
        }
    }
}
