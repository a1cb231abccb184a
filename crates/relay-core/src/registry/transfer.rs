//! Per-connection socket state: [`ConnHandle`], [`PendingConnection`], and
//! [`ActiveTransfer`].

use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::registry::session::{Role, Session};

static CONN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A TCP connection attached to a session, shared between the connection's
/// own reader thread and (once paired) its partner's forwarding writes.
///
/// Registry lookups never read payload bytes — only the owning connection
/// thread drains `pending`, and only on the pairing edge.
pub struct ConnHandle {
    id: u64,
    peer_addr: SocketAddr,
    writer: Mutex<TcpStream>,
    /// Bytes observed before both ACKs were seen: buffered in arrival order
    /// and flushed to the partner once pairing completes.
    pending: Mutex<Vec<u8>>,
}

impl ConnHandle {
    pub fn new(stream: TcpStream) -> std::io::Result<Arc<Self>> {
        let peer_addr = stream.peer_addr()?;
        Ok(Arc::new(ConnHandle {
            id: CONN_COUNTER.fetch_add(1, Ordering::Relaxed),
            peer_addr,
            writer: Mutex::new(stream),
            pending: Mutex::new(Vec::new()),
        }))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Append bytes observed while this connection's session is not yet
    /// fully paired.
    pub fn buffer(&self, bytes: &[u8]) {
        self.pending.lock().extend_from_slice(bytes);
    }

    /// Take and clear the buffered pre-pair bytes, in arrival order.
    pub fn take_buffered(&self) -> Vec<u8> {
        std::mem::take(&mut *self.pending.lock())
    }

    pub fn write_all(&self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.lock().write_all(bytes)
    }

    pub fn shutdown(&self) {
        let _ = self.writer.lock().shutdown(std::net::Shutdown::Both);
    }
}

/// Half-open TCP state for a session that has completed handshake but whose
/// partner has not yet connected.
pub struct PendingConnection {
    pub role: Role,
    pub conn: Arc<ConnHandle>,
    pub session: Session,
}

/// Fully paired state: both sockets attached, handshake (READY/ACK) driven
/// to completion or in progress.
pub struct ActiveTransfer {
    pub session_id: String,
    pub session: Session,
    pub sender: Arc<ConnHandle>,
    pub receiver: Arc<ConnHandle>,
    bytes_transferred: AtomicU64,
    sender_acked: AtomicBool,
    receiver_acked: AtomicBool,
    paired: AtomicBool,
}

impl ActiveTransfer {
    pub fn new(session: Session, sender: Arc<ConnHandle>, receiver: Arc<ConnHandle>) -> Self {
        ActiveTransfer {
            session_id: session.session_id.clone(),
            session,
            sender,
            receiver,
            bytes_transferred: AtomicU64::new(0),
            sender_acked: AtomicBool::new(false),
            receiver_acked: AtomicBool::new(false),
            paired: AtomicBool::new(false),
        }
    }

    pub fn conn_for(&self, role: Role) -> &Arc<ConnHandle> {
        match role {
            Role::Sender => &self.sender,
            Role::Receiver => &self.receiver,
        }
    }

    pub fn partner_of(&self, role: Role) -> &Arc<ConnHandle> {
        self.conn_for(role.other())
    }

    /// Mark `role`'s ack flag. Returns `true` iff both roles are now acked
    /// (idempotent: calling this twice for the same role never re-triggers
    /// the both-acked transition more than the one time it first becomes true).
    pub fn mark_ack(&self, role: Role) -> bool {
        match role {
            Role::Sender => self.sender_acked.store(true, Ordering::SeqCst),
            Role::Receiver => self.receiver_acked.store(true, Ordering::SeqCst),
        }
        self.sender_acked.load(Ordering::SeqCst) && self.receiver_acked.load(Ordering::SeqCst)
    }

    /// Latch `paired`, returning `true` the first time it is set (so the
    /// caller flushes buffers exactly once).
    pub fn latch_paired(&self) -> bool {
        !self.paired.swap(true, Ordering::SeqCst)
    }

    pub fn is_paired(&self) -> bool {
        self.paired.load(Ordering::SeqCst)
    }

    pub fn add_bytes(&self, n: u64) -> u64 {
        self.bytes_transferred.fetch_add(n, Ordering::Relaxed) + n
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Relaxed)
    }
}

/// Outcome of [`crate::registry::SessionRegistry::register_socket`].
pub enum RegisterOutcome {
    /// No partner yet; this connection is now the pending entry.
    Pending,
    /// A partner was already pending; both are now paired.
    Paired(Arc<ActiveTransfer>),
    /// A pending entry for this session already claims the same role.
    DuplicateRole,
}
