//! Single-shot promise/future pair used to park a rendezvous caller.
//!
//! Built on `std::sync::mpsc::sync_channel(1)` rather than pulling in an
//! async runtime the rest of the relay doesn't use.

use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, sync_channel};
use std::time::Duration;

use crate::error::{RelayError, Result};
use crate::registry::session::Session;

/// The producer half: completed exactly once, either with a matched
/// [`Session`] or a [`RelayError`] (only ever `Timeout` in practice).
pub struct Promise {
    tx: SyncSender<Result<Session>>,
}

/// The consumer half: blocks the calling thread until the promise resolves
/// or `timeout` elapses.
pub struct Waiter {
    rx: Receiver<Result<Session>>,
}

/// Create a fresh promise/waiter pair.
pub fn pair() -> (Promise, Waiter) {
    let (tx, rx) = sync_channel(1);
    (Promise { tx }, Waiter { rx })
}

impl Promise {
    /// Resolve with a matched session. Removing the index entry the waiter
    /// was parked under is the caller's responsibility — this method only
    /// delivers the value.
    pub fn resolve(self, session: Session) {
        let _ = self.tx.send(Ok(session));
    }

    /// Reject with an error (used by the timeout timer).
    pub fn reject(self, err: RelayError) {
        let _ = self.tx.send(Err(err));
    }
}

impl Waiter {
    /// Block until resolved/rejected or `timeout` elapses.
    ///
    /// A timeout here means nobody fired the timer yet (e.g. it raced this
    /// call) — the caller should still treat it as [`RelayError::Timeout`].
    pub fn wait(self, timeout: Duration) -> Result<Session> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(RelayError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(RelayError::Timeout),
        }
    }
}
