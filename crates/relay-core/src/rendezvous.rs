//! Rendezvous service: `Initiate` and `Listen`.

use std::time::Duration;

use rand::Rng;

use crate::error::{RelayError, Result};
use crate::registry::oneshot;
use crate::registry::session::{Fingerprint, Session, SessionStatus};
use crate::registry::SessionRegistry;

/// Generate a fresh 128-bit session id, rendered as 32 lowercase hex chars.
///
/// Random rather than a sequential counter: rendezvous ids must be
/// unguessable, since they are the only capability a client needs to attach
/// to someone else's transfer.
fn generate_session_id() -> String {
    let bits: u128 = rand::rng().random();
    format!("{bits:032x}")
}

/// Blocks `Initiate` and `Listen` callers until a counterpart arrives or the
/// blocking timeout fires. Holds no connection state of its own — all of it
/// lives in the shared [`SessionRegistry`].
#[derive(Clone)]
pub struct RendezvousService {
    registry: SessionRegistry,
    blocking_timeout: Duration,
    session_expiry: Duration,
}

impl RendezvousService {
    pub fn new(registry: SessionRegistry, blocking_timeout: Duration, session_expiry: Duration) -> Self {
        RendezvousService {
            registry,
            blocking_timeout,
            session_expiry,
        }
    }

    /// `Initiate(senderFp, receiverFp, filename, fileSize, signature, fileHash)`.
    /// Blocks the calling thread until matched or timed out.
    #[allow(clippy::too_many_arguments)]
    pub fn initiate(
        &self,
        sender_fp: String,
        receiver_fp: String,
        filename: String,
        file_size: i64,
        signature: String,
        file_hash: String,
    ) -> Result<Session> {
        let sender_fp = Fingerprint::parse("senderFp", sender_fp)?;
        let receiver_fp = Fingerprint::parse("receiverFp", receiver_fp)?;
        if filename.is_empty() {
            return Err(RelayError::invalid("filename", "must not be empty"));
        }
        if signature.is_empty() {
            return Err(RelayError::invalid("signature", "must not be empty"));
        }
        if file_hash.is_empty() {
            return Err(RelayError::invalid("fileHash", "must not be empty"));
        }
        if file_size < 0 {
            return Err(RelayError::invalid("fileSize", "must be >= 0"));
        }

        let session_id = generate_session_id();
        let session = Session::new(
            session_id.clone(),
            sender_fp,
            receiver_fp.clone(),
            filename,
            file_size as u64,
            signature,
            file_hash,
            self.session_expiry,
        );
        self.registry
            .put_session(session)
            .map_err(|_| RelayError::invalid("sessionId", "collided with an existing session"))?;

        if let Some(matched) = self
            .registry
            .try_match_new_sender(&session_id, receiver_fp.as_str())
        {
            tracing::info!(session_id, "initiate matched an already-parked receiver");
            return Ok(matched);
        }

        let (promise, waiter) = oneshot::pair();
        self.registry.park_sender(session_id.clone(), promise);
        tracing::debug!(session_id, "initiate parked, waiting for a receiver");

        match waiter.wait(self.blocking_timeout) {
            Ok(session) => Ok(session),
            Err(err) => {
                self.registry.unpark_sender(&session_id);
                self.registry
                    .set_session_status(&session_id, SessionStatus::Timeout);
                self.registry.remove_session(&session_id);
                tracing::info!(session_id, "initiate timed out waiting for a receiver");
                Err(err)
            }
        }
    }

    /// `Listen(receiverFp)`. Blocks the calling thread until matched or
    /// timed out.
    ///
    /// A second concurrent `Listen` for a fingerprint that already has one
    /// parked is rejected with [`RelayError::Conflict`] instead of silently
    /// overwriting the first (see DESIGN.md).
    pub fn listen(&self, receiver_fp: String) -> Result<Session> {
        let receiver_fp = Fingerprint::parse("receiverFp", receiver_fp)?;

        if let Some(matched) = self.registry.try_match_new_receiver(receiver_fp.as_str()) {
            tracing::info!(session_id = %matched.session_id, "listen matched an already-parked sender");
            return Ok(matched);
        }

        let (promise, waiter) = oneshot::pair();
        if !self
            .registry
            .park_receiver_if_absent(receiver_fp.as_str().to_string(), promise)
        {
            return Err(RelayError::Conflict(format!(
                "receiver {} already has a Listen in flight",
                receiver_fp
            )));
        }
        tracing::debug!(receiver_fp = %receiver_fp, "listen parked, waiting for a sender");

        match waiter.wait(self.blocking_timeout) {
            Ok(session) => Ok(session),
            Err(err) => {
                self.registry.unpark_receiver(receiver_fp.as_str());
                tracing::info!(receiver_fp = %receiver_fp, "listen timed out waiting for a sender");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn service() -> RendezvousService {
        RendezvousService::new(
            SessionRegistry::new(),
            Duration::from_millis(500),
            Duration::from_secs(120),
        )
    }

    #[test]
    fn rejects_empty_sender_fingerprint() {
        let svc = service();
        let err = svc
            .initiate(
                "".into(),
                "B".into(),
                "f".into(),
                10,
                "s".into(),
                "h".into(),
            )
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidArgument { field: "senderFp", .. }));
    }

    #[test]
    fn rejects_negative_file_size() {
        let svc = service();
        let err = svc
            .initiate(
                "A".into(),
                "B".into(),
                "f".into(),
                -1,
                "s".into(),
                "h".into(),
            )
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidArgument { field: "fileSize", .. }));
    }

    #[test]
    fn sender_first_then_receiver_matches() {
        let svc = Arc::new(service());
        let svc2 = svc.clone();

        let initiate_handle = thread::spawn(move || {
            svc2.initiate(
                "A".into(),
                "B".into(),
                "f".into(),
                100,
                "s".into(),
                "h".into(),
            )
        });

        thread::sleep(Duration::from_millis(50));
        let listen_result = svc.listen("B".into()).unwrap();
        let initiate_result = initiate_handle.join().unwrap().unwrap();

        assert_eq!(listen_result.session_id, initiate_result.session_id);
        assert_eq!(listen_result.status, SessionStatus::Matched);
    }

    #[test]
    fn receiver_first_then_sender_matches() {
        let svc = Arc::new(service());
        let svc2 = svc.clone();

        let listen_handle = thread::spawn(move || svc2.listen("B".into()));

        thread::sleep(Duration::from_millis(50));
        let initiate_result = svc
            .initiate(
                "A".into(),
                "B".into(),
                "f".into(),
                100,
                "s".into(),
                "h".into(),
            )
            .unwrap();
        let listen_result = listen_handle.join().unwrap().unwrap();

        assert_eq!(listen_result.session_id, initiate_result.session_id);
    }

    #[test]
    fn initiate_times_out_with_no_listener() {
        let svc = service();
        let err = svc
            .initiate(
                "A".into(),
                "B".into(),
                "f".into(),
                100,
                "s".into(),
                "h".into(),
            )
            .unwrap_err();
        assert!(matches!(err, RelayError::Timeout));
    }

    #[test]
    fn second_listen_on_same_fingerprint_conflicts() {
        let svc = Arc::new(service());
        let svc2 = svc.clone();
        let handle = thread::spawn(move || svc2.listen("B".into()));
        thread::sleep(Duration::from_millis(50));

        let err = svc.listen("B".into()).unwrap_err();
        assert!(matches!(err, RelayError::Conflict(_)));

        // Let the first Listen time out so the thread can join.
        handle.join().unwrap().unwrap_err();
    }
}
