//! The shared, thread-safe session registry.
//!
//! All structural mutations happen under a single short-held
//! `parking_lot::Mutex`: the lock never spans I/O, only map/struct
//! bookkeeping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::registry::oneshot::Promise;
use crate::registry::session::{Role, Session, SessionStatus};
use crate::registry::transfer::{ActiveTransfer, ConnHandle, PendingConnection, RegisterOutcome};

struct Inner {
    sessions: HashMap<String, Session>,
    sender_waiters: HashMap<String, Promise>,
    receiver_waiters: HashMap<String, Promise>,
    pending: HashMap<String, PendingConnection>,
    active: HashMap<String, Arc<ActiveTransfer>>,
}

/// Shared in-memory session/connection state. Cheap to clone (`Arc` inside);
/// constructed once per server and threaded through every component that
/// needs it.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Mutex<Inner>>,
    /// Sum of `bytes_transferred` for transfers that have already been
    /// removed from `active`. Live transfers are added in when read.
    completed_bytes: Arc<AtomicU64>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry {
            inner: Arc::new(Mutex::new(Inner {
                sessions: HashMap::new(),
                sender_waiters: HashMap::new(),
                receiver_waiters: HashMap::new(),
                pending: HashMap::new(),
                active: HashMap::new(),
            })),
            completed_bytes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Insert a freshly created session. Fails if `session_id` collides —
    /// in practice unreachable given 128-bit random ids, but checked rather
    /// than assumed.
    pub fn put_session(&self, session: Session) -> Result<(), &'static str> {
        let mut inner = self.inner.lock();
        if inner.sessions.contains_key(&session.session_id) {
            return Err("session_id collision");
        }
        inner.sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    /// Look up a session, treating an expired one as absent and removing it
    /// eagerly.
    pub fn get_session(&self, id: &str) -> Option<Session> {
        let mut inner = self.inner.lock();
        let expired = inner.sessions.get(id).is_some_and(Session::is_expired);
        if expired {
            inner.sessions.remove(id);
            return None;
        }
        inner.sessions.get(id).cloned()
    }

    /// Mark a session completed. Idempotent: repeated calls are no-ops once
    /// the status is already `Completed`.
    pub fn complete_session(&self, id: &str) {
        let mut inner = self.inner.lock();
        if let Some(session) = inner.sessions.get_mut(id) {
            session.set_status(SessionStatus::Completed);
        }
    }

    /// Transition a waiting session to `Matched` and return the updated
    /// snapshot, if it still exists and is waiting.
    fn mark_matched(inner: &mut Inner, id: &str) -> Option<Session> {
        let session = inner.sessions.get_mut(id)?;
        session.set_status(SessionStatus::Matched);
        Some(session.clone())
    }

    pub fn park_sender(&self, session_id: String, promise: Promise) {
        self.inner.lock().sender_waiters.insert(session_id, promise);
    }

    pub fn unpark_sender(&self, session_id: &str) -> Option<Promise> {
        self.inner.lock().sender_waiters.remove(session_id)
    }

    pub fn unpark_receiver(&self, receiver_fp: &str) -> Option<Promise> {
        self.inner.lock().receiver_waiters.remove(receiver_fp)
    }

    /// Whether a receiver waiter is already parked for this fingerprint.
    /// Read-only; racy against a concurrent park unless paired with a lock
    /// (see [`Self::park_receiver_if_absent`] for the atomic version used
    /// to reject a second concurrent `Listen`).
    pub fn has_receiver_waiter(&self, receiver_fp: &str) -> bool {
        self.inner.lock().receiver_waiters.contains_key(receiver_fp)
    }

    /// Park a receiver waiter for `receiver_fp` iff none is parked yet,
    /// under one lock acquisition. Returns `false` (and drops `promise`
    /// without inserting it) if a waiter was already parked — the caller
    /// rejects with `RelayError::Conflict` in that case rather than
    /// silently overwriting the existing `Promise` and orphaning it.
    pub fn park_receiver_if_absent(&self, receiver_fp: String, promise: Promise) -> bool {
        let mut inner = self.inner.lock();
        if inner.receiver_waiters.contains_key(&receiver_fp) {
            return false;
        }
        inner.receiver_waiters.insert(receiver_fp, promise);
        true
    }

    /// Any session matching `receiver_fp` that is still `WaitingReceiver`.
    /// Linear scan; a `receiver_fp -> session_id` index would make this
    /// O(1) but must be updated transactionally with status changes to
    /// stay correct.
    pub fn find_waiting_session_for(&self, receiver_fp: &str) -> Option<Session> {
        let inner = self.inner.lock();
        inner
            .sessions
            .values()
            .find(|s| s.receiver_fp.as_str() == receiver_fp && s.status == SessionStatus::WaitingReceiver)
            .cloned()
    }

    /// `Initiate`'s match check: under one lock acquisition, pop a parked
    /// receiver waiter for `receiver_fp`, transition `session_id` to
    /// `Matched`, and resolve the receiver's promise — all atomic so a
    /// concurrent `Listen` can never observe the gap between "waiter
    /// popped" and "session matched".
    pub fn try_match_new_sender(&self, session_id: &str, receiver_fp: &str) -> Option<Session> {
        let mut inner = self.inner.lock();
        let promise = inner.receiver_waiters.remove(receiver_fp)?;
        let matched = Self::mark_matched(&mut inner, session_id)?;
        promise.resolve(matched.clone());
        Some(matched)
    }

    /// `Listen`'s match check: under one lock acquisition, find a
    /// `WaitingReceiver` session for `receiver_fp`, pop its sender waiter,
    /// transition it to `Matched`, and resolve the sender's promise.
    pub fn try_match_new_receiver(&self, receiver_fp: &str) -> Option<Session> {
        let mut inner = self.inner.lock();
        let session_id = inner
            .sessions
            .values()
            .find(|s| {
                s.receiver_fp.as_str() == receiver_fp && s.status == SessionStatus::WaitingReceiver
            })
            .map(|s| s.session_id.clone())?;
        let promise = inner.sender_waiters.remove(&session_id)?;
        let matched = Self::mark_matched(&mut inner, &session_id)?;
        promise.resolve(matched.clone());
        Some(matched)
    }

    /// Remove a session outright (used on rendezvous timeout).
    pub fn remove_session(&self, id: &str) {
        self.inner.lock().sessions.remove(id);
    }

    pub fn set_session_status(&self, id: &str, status: SessionStatus) {
        if let Some(session) = self.inner.lock().sessions.get_mut(id) {
            session.set_status(status);
        }
    }

    /// Attach a handshaken TCP connection to its session.
    pub fn register_socket(
        &self,
        session_id: &str,
        role: Role,
        conn: Arc<ConnHandle>,
        session: Session,
    ) -> RegisterOutcome {
        let mut inner = self.inner.lock();

        match inner.pending.remove(session_id) {
            None => {
                inner.pending.insert(
                    session_id.to_string(),
                    PendingConnection {
                        role,
                        conn,
                        session,
                    },
                );
                RegisterOutcome::Pending
            }
            Some(existing) if existing.role == role => {
                // Duplicate role: leave the existing pending entry intact,
                // reject the new connection.
                inner.pending.insert(session_id.to_string(), existing);
                RegisterOutcome::DuplicateRole
            }
            Some(existing) => {
                let (sender, receiver) = match existing.role {
                    Role::Sender => (existing.conn, conn),
                    Role::Receiver => (conn, existing.conn),
                };
                let transfer = Arc::new(ActiveTransfer::new(session, sender, receiver));
                inner.active.insert(session_id.to_string(), transfer.clone());
                RegisterOutcome::Paired(transfer)
            }
        }
    }

    /// Remove a pending entry for a session that lost its socket before
    /// pairing (e.g. client disconnected while in `AwaitPartner`).
    pub fn remove_pending(&self, session_id: &str) {
        self.inner.lock().pending.remove(session_id);
    }

    pub fn get_active(&self, session_id: &str) -> Option<Arc<ActiveTransfer>> {
        self.inner.lock().active.get(session_id).cloned()
    }

    /// Tear down an active transfer, folding its byte count into the
    /// historical total so `total_bytes_transferred` stays monotone.
    pub fn remove_transfer(&self, session_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(transfer) = inner.active.remove(session_id) {
            self.completed_bytes
                .fetch_add(transfer.bytes_transferred(), Ordering::Relaxed);
        }
    }

    /// Remove whatever entry (pending or active) references `conn_id`,
    /// regardless of role — used on socket loss when the caller doesn't
    /// know if it raced a pairing.
    pub fn remove_by_conn(&self, conn_id: u64) {
        let mut inner = self.inner.lock();
        inner
            .pending
            .retain(|_, p| p.conn.id() != conn_id);

        let dead: Vec<String> = inner
            .active
            .iter()
            .filter(|(_, t)| t.sender.id() == conn_id || t.receiver.id() == conn_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in dead {
            if let Some(transfer) = inner.active.remove(&id) {
                self.completed_bytes
                    .fetch_add(transfer.bytes_transferred(), Ordering::Relaxed);
            }
        }
    }

    /// Sum over historical (removed) and live active transfers. Monotone
    /// non-decreasing: completed totals only ever grow, and live totals are
    /// read via atomic loads without the registry lock.
    pub fn total_bytes_transferred(&self) -> u64 {
        let live: u64 = {
            let inner = self.inner.lock();
            inner.active.values().map(|t| t.bytes_transferred()).sum()
        };
        self.completed_bytes.load(Ordering::Relaxed) + live
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
