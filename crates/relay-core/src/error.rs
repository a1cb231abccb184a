//! Error types for the relay server library.

/// Errors that can occur anywhere in the relay.
///
/// Variants map to the failure modes named in the control-plane and
/// data-plane protocols:
///
/// - **Control-plane**: [`InvalidArgument`](Self::InvalidArgument) (HTTP 400),
///   [`Timeout`](Self::Timeout) (HTTP 408), [`Conflict`](Self::Conflict) (HTTP 409).
/// - **Data-plane**: [`SessionAbsent`](Self::SessionAbsent),
///   [`ProtocolViolation`](Self::ProtocolViolation), [`PeerLost`](Self::PeerLost) —
///   all close the offending connection only, never surfaced over HTTP.
/// - **Transport**: [`Io`](Self::Io).
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required request field was missing or failed validation.
    #[error("invalid argument: {field} ({reason})")]
    InvalidArgument {
        field: &'static str,
        reason: String,
    },

    /// No counterpart arrived within the blocking timeout.
    #[error("rendezvous timed out")]
    Timeout,

    /// The session id was not found in the registry (expired, unknown, or
    /// already torn down).
    #[error("session not found")]
    SessionAbsent,

    /// Malformed handshake, unknown role, or an ACK expected but not seen.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The partner connection of an active transfer is gone.
    #[error("peer connection lost")]
    PeerLost,

    /// A second waiter collided with one already parked (e.g. a second
    /// `Listen` for a receiver fingerprint that already has one parked).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl RelayError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        RelayError::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }
}

/// Convenience alias for `Result<T, RelayError>`.
pub type Result<T> = std::result::Result<T, RelayError>;
