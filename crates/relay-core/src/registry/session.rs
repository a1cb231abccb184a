//! Session data model.

use std::time::{Duration, SystemTime};

use crate::error::{RelayError, Result};

/// An opaque client identifier, compared by byte equality.
///
/// In practice a hex-encoded public-key digest, but the relay never
/// interprets the bytes — it only indexes and compares them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Validate and wrap a fingerprint. Fails if empty, per the
    /// `InvalidArgument` precondition on `Initiate`/`Listen`.
    pub fn parse(field: &'static str, raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(RelayError::invalid(field, "must not be empty"));
        }
        Ok(Fingerprint(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session lifecycle state.
///
/// Transitions only move `WaitingReceiver -> Matched -> Completed` or
/// `WaitingReceiver -> Timeout`; both are terminal. `waiting_sender` is
/// deliberately not modeled — see DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    WaitingReceiver,
    Matched,
    Completed,
    Timeout,
}

impl SessionStatus {
    /// Whether `self -> next` is an allowed transition.
    fn can_transition_to(self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::WaitingReceiver, SessionStatus::Matched)
                | (SessionStatus::Matched, SessionStatus::Completed)
                | (SessionStatus::WaitingReceiver, SessionStatus::Timeout)
        )
    }
}

/// Server-side rendezvous record matching one sender to one receiver for one
/// transfer. Created by `Initiate`, lives until completion,
/// timeout, or expiry.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub sender_fp: Fingerprint,
    pub receiver_fp: Fingerprint,
    pub filename: String,
    pub file_size: u64,
    pub signature: String,
    pub file_hash: String,
    pub status: SessionStatus,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
}

impl Session {
    pub fn new(
        session_id: String,
        sender_fp: Fingerprint,
        receiver_fp: Fingerprint,
        filename: String,
        file_size: u64,
        signature: String,
        file_hash: String,
        expiry: Duration,
    ) -> Self {
        let created_at = SystemTime::now();
        Session {
            session_id,
            sender_fp,
            receiver_fp,
            filename,
            file_size,
            signature,
            file_hash,
            status: SessionStatus::WaitingReceiver,
            created_at,
            expires_at: created_at + expiry,
        }
    }

    /// Attempt a status transition, enforcing the allowed graph. Returns
    /// `false` (no-op) on a disallowed transition instead of panicking —
    /// callers decide whether that is an error.
    pub fn set_status(&mut self, next: SessionStatus) -> bool {
        if self.status == next {
            return true;
        }
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Whether wall-clock time has passed `expires_at`.
    pub fn is_expired(&self) -> bool {
        SystemTime::now() > self.expires_at
    }

    /// Milliseconds remaining until expiry, 0 if already past.
    pub fn expires_in_ms(&self) -> u64 {
        self.expires_at
            .duration_since(SystemTime::now())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// The two roles a TCP connection can claim during handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "sender" => Some(Role::Sender),
            "receiver" => Some(Role::Receiver),
            _ => None,
        }
    }

    pub fn other(self) -> Role {
        match self {
            Role::Sender => Role::Receiver,
            Role::Receiver => Role::Sender,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Sender => "sender",
            Role::Receiver => "receiver",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_rejects_empty() {
        assert!(Fingerprint::parse("senderFp", "").is_err());
        assert!(Fingerprint::parse("senderFp", "abc123").is_ok());
    }

    #[test]
    fn status_transitions_follow_the_allowed_graph() {
        let mut session = sample_session();
        assert_eq!(session.status, SessionStatus::WaitingReceiver);

        assert!(session.set_status(SessionStatus::Matched));
        assert_eq!(session.status, SessionStatus::Matched);

        // No back-transition to WaitingReceiver.
        assert!(!session.set_status(SessionStatus::WaitingReceiver));
        assert_eq!(session.status, SessionStatus::Matched);

        assert!(session.set_status(SessionStatus::Completed));
        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[test]
    fn timeout_only_reachable_from_waiting_receiver() {
        let mut session = sample_session();
        session.set_status(SessionStatus::Matched);
        assert!(!session.set_status(SessionStatus::Timeout));
    }

    #[test]
    fn role_parse_and_other() {
        assert_eq!(Role::parse("sender"), Some(Role::Sender));
        assert_eq!(Role::parse("receiver"), Some(Role::Receiver));
        assert_eq!(Role::parse("bogus"), None);
        assert_eq!(Role::Sender.other(), Role::Receiver);
    }

    fn sample_session() -> Session {
        Session::new(
            "deadbeef".into(),
            Fingerprint::parse("senderFp", "A").unwrap(),
            Fingerprint::parse("receiverFp", "B").unwrap(),
            "f".into(),
            100,
            "s".into(),
            "h".into(),
            Duration::from_secs(120),
        )
    }
}
