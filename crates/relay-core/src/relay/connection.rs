//! Per-connection handshake and forwarding loop.
//!
//! One OS thread per TCP connection: a connection owns a
//! `BufReader<TcpStream>` for its own reads and a cloned writer handle
//! (here inside [`ConnHandle`]) for writes the *partner's* thread performs.
//!
//! The connection's lifecycle collapses to four code blocks below:
//! `AwaitHandshake` (the one-line parse), `AwaitPartner`/post-ACK waiting
//! (unified as [`buffer_while_waiting`], since both just retain bytes until
//! a registry condition flips), `AwaitAck` (the one-line ACK scan), and
//! `Paired` (the forwarding loop). `Closing` is the shared teardown path.

use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::registry::transfer::{ActiveTransfer, RegisterOutcome};
use crate::registry::{ConnHandle, Role, SessionRegistry};

/// How often a parked reader wakes to re-check registry state. Not a
/// per-read deadline on the client — only used while this connection has
/// nothing useful to read yet.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

const FORWARD_BUF_SIZE: usize = 64 * 1024;

/// Drive one accepted TCP connection through handshake, pairing, and (if it
/// gets that far) byte forwarding, until it closes.
pub fn handle_connection(stream: TcpStream, registry: SessionRegistry, _config: Arc<RelayConfig>) {
    let peer_addr = match stream.peer_addr() {
        Ok(addr) => addr,
        Err(_) => return,
    };

    let cloned = match stream.try_clone() {
        Ok(cloned) => cloned,
        Err(err) => {
            tracing::warn!(%peer_addr, error = %RelayError::from(err), "failed to clone accepted socket");
            return;
        }
    };
    let conn = match ConnHandle::new(cloned) {
        Ok(conn) => conn,
        Err(err) => {
            tracing::warn!(%peer_addr, error = %RelayError::from(err), "failed to wrap accepted socket");
            return;
        }
    };
    let mut reader = BufReader::new(stream);

    tracing::info!(%peer_addr, conn_id = conn.id(), "connection accepted");

    let (session_id, role) = match read_handshake(&mut reader) {
        Ok(pair) => pair,
        Err(err) => {
            tracing::debug!(%peer_addr, error = %err, "handshake failed");
            return;
        }
    };

    let Some(session) = registry.get_session(&session_id) else {
        tracing::info!(%peer_addr, session_id, error = %RelayError::SessionAbsent, "handshake named an absent or expired session");
        return;
    };

    let transfer = match registry.register_socket(&session_id, role, conn.clone(), session) {
        RegisterOutcome::DuplicateRole => {
            tracing::warn!(%peer_addr, session_id, ?role, "duplicate role for session, rejecting");
            return;
        }
        RegisterOutcome::Pending => {
            tracing::debug!(%peer_addr, session_id, ?role, "connection pending, awaiting partner");
            match wait_for_partner(&mut reader, &conn, &registry, &session_id) {
                Some(transfer) => transfer,
                None => {
                    registry.remove_by_conn(conn.id());
                    return;
                }
            }
        }
        RegisterOutcome::Paired(transfer) => {
            tracing::info!(%peer_addr, session_id, "paired immediately, sending READY");
            if transfer.sender.write_all(b"READY\n").is_err() || transfer.receiver.write_all(b"READY\n").is_err() {
                registry.remove_transfer(&session_id);
                registry.remove_by_conn(conn.id());
                return;
            }
            transfer
        }
    };

    if !run_await_ack(&mut reader, &conn, &session_id, role, &transfer) {
        teardown(&registry, &conn, &transfer, &session_id, role);
        return;
    }

    run_forwarding_loop(&mut reader, &conn, &registry, &session_id, role, &transfer);
}

/// Read and parse the one-line handshake: `<sessionId>:<role>\n`.
fn read_handshake(reader: &mut BufReader<TcpStream>) -> Result<(String, Role), RelayError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line)?;
    if n == 0 {
        return Err(RelayError::ProtocolViolation(
            "connection closed before handshake".to_string(),
        ));
    }

    let trimmed = line.trim_end_matches(['\r', '\n']);
    let (session_id, role_str) = trimmed
        .split_once(':')
        .ok_or_else(|| RelayError::ProtocolViolation(format!("malformed handshake line: {trimmed:?}")))?;
    let role = Role::parse(role_str)
        .ok_or_else(|| RelayError::ProtocolViolation(format!("unknown role: {role_str:?}")))?;
    Ok((session_id.to_string(), role))
}

/// `AwaitPartner`: retain raw bytes verbatim until the registry reports this
/// session has become active (i.e. the partner attached and paired us).
fn wait_for_partner(
    reader: &mut BufReader<TcpStream>,
    conn: &Arc<ConnHandle>,
    registry: &SessionRegistry,
    session_id: &str,
) -> Option<Arc<ActiveTransfer>> {
    match buffer_while_waiting(reader, conn, || registry.get_active(session_id)) {
        WaitOutcome::Ready(transfer) => Some(transfer),
        WaitOutcome::Closed | WaitOutcome::Err => None,
    }
}

enum WaitOutcome<T> {
    Ready(T),
    Closed,
    Err,
}

/// Poll `ready` every [`POLL_INTERVAL`] while buffering any bytes read in
/// between. Used both for `AwaitPartner` and for "I've ACKed, waiting on my
/// partner's ACK" — both are "retain bytes until a shared-state condition
/// flips".
fn buffer_while_waiting<T>(
    reader: &mut BufReader<TcpStream>,
    conn: &Arc<ConnHandle>,
    mut ready: impl FnMut() -> Option<T>,
) -> WaitOutcome<T> {
    if reader.get_ref().set_read_timeout(Some(POLL_INTERVAL)).is_err() {
        return WaitOutcome::Err;
    }

    let mut buf = [0u8; FORWARD_BUF_SIZE];
    let outcome = loop {
        if let Some(value) = ready() {
            break WaitOutcome::Ready(value);
        }
        match reader.read(&mut buf) {
            Ok(0) => break WaitOutcome::Closed,
            Ok(n) => conn.buffer(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => continue,
            Err(_) => break WaitOutcome::Err,
        }
    };

    let _ = reader.get_ref().set_read_timeout(None);
    outcome
}

/// `AwaitAck`: read one line, require it to be exactly `ACK`, retain any
/// trailing bytes from the same read as buffered payload, mark this role's
/// ack, and — if both roles have now acked — flush both buffers and latch
/// the transfer as paired.
fn run_await_ack(
    reader: &mut BufReader<TcpStream>,
    conn: &Arc<ConnHandle>,
    session_id: &str,
    role: Role,
    transfer: &Arc<ActiveTransfer>,
) -> bool {
    let mut line = String::new();
    match reader.read_line(&mut line) {
        Ok(0) => {
            tracing::info!(session_id, ?role, error = %RelayError::PeerLost, "connection closed before ACK");
            return false;
        }
        Err(io_err) => {
            tracing::info!(session_id, ?role, error = %RelayError::from(io_err), "read error awaiting ACK");
            return false;
        }
        Ok(_) => {}
    }

    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed != "ACK" {
        let err = RelayError::ProtocolViolation(format!("expected ACK, got {trimmed:?}"));
        tracing::warn!(session_id, ?role, error = %err, "protocol violation");
        return false;
    }

    let leftover = reader.buffer().to_vec();
    reader.consume(leftover.len());
    if !leftover.is_empty() {
        conn.buffer(&leftover);
    }

    if transfer.mark_ack(role) {
        flush_both(transfer);
        transfer.latch_paired();
        return true;
    }

    // Wait for the partner's ACK, retaining anything this client sends
    // meanwhile — payload received before both ACKs is retained, not
    // forwarded early.
    match buffer_while_waiting(reader, conn, || transfer.is_paired().then_some(())) {
        WaitOutcome::Ready(()) => {
            // `flush_both` (run by whichever side's `mark_ack` flipped both
            // flags true) may have drained this connection's buffer before
            // this side's last `conn.buffer()` call landed. Re-drain here so
            // nothing sent in that window is left stranded.
            flush_straggler(conn, transfer, role);
            true
        }
        WaitOutcome::Closed | WaitOutcome::Err => {
            tracing::info!(session_id, ?role, error = %RelayError::PeerLost, "connection lost while awaiting partner's ACK");
            false
        }
    }
}

/// Forward each buffer's content to the opposite role, in order, exactly
/// once. Whichever thread observes `mark_ack` flip to `true` runs this —
/// the other side simply observes `is_paired()` become true and moves on.
fn flush_both(transfer: &Arc<ActiveTransfer>) {
    let sender_bytes = transfer.sender.take_buffered();
    if !sender_bytes.is_empty() {
        if transfer.receiver.write_all(&sender_bytes).is_ok() {
            transfer.add_bytes(sender_bytes.len() as u64);
        }
    }
    let receiver_bytes = transfer.receiver.take_buffered();
    if !receiver_bytes.is_empty() {
        if transfer.sender.write_all(&receiver_bytes).is_ok() {
            transfer.add_bytes(receiver_bytes.len() as u64);
        }
    }
}

/// Drain whatever `conn` still holds and forward it to its partner. Covers
/// the race where `conn` buffered bytes after `flush_both` already took its
/// snapshot but before `paired` became visible to this side's poll — without
/// this, those bytes would sit in `conn`'s buffer forever, since
/// `run_forwarding_loop` only reads fresh socket data.
fn flush_straggler(conn: &Arc<ConnHandle>, transfer: &Arc<ActiveTransfer>, role: Role) {
    let leftover = conn.take_buffered();
    if !leftover.is_empty() {
        if transfer.partner_of(role).write_all(&leftover).is_ok() {
            transfer.add_bytes(leftover.len() as u64);
        }
    }
}

/// `Paired`: forward raw bytes to the partner until either side closes.
fn run_forwarding_loop(
    reader: &mut BufReader<TcpStream>,
    conn: &Arc<ConnHandle>,
    registry: &SessionRegistry,
    session_id: &str,
    role: Role,
    transfer: &Arc<ActiveTransfer>,
) {
    let mut buf = [0u8; FORWARD_BUF_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                tracing::info!(session_id, ?role, bytes = transfer.bytes_transferred(), "peer closed");
                break;
            }
            Ok(n) => {
                if transfer.partner_of(role).write_all(&buf[..n]).is_err() {
                    tracing::info!(session_id, ?role, error = %RelayError::PeerLost, "partner write failed");
                    break;
                }
                transfer.add_bytes(n as u64);
            }
            Err(io_err) => {
                tracing::info!(session_id, ?role, error = %RelayError::from(io_err), "read error while paired");
                break;
            }
        }
    }

    teardown(registry, conn, transfer, session_id, role);
}

/// Close the partner's socket (to unblock its thread promptly rather than
/// waiting for it to notice on its own), remove the transfer, and mark the
/// session completed.
fn teardown(
    registry: &SessionRegistry,
    conn: &Arc<ConnHandle>,
    transfer: &Arc<ActiveTransfer>,
    session_id: &str,
    role: Role,
) {
    transfer.partner_of(role).shutdown();
    registry.remove_transfer(session_id);
    registry.remove_by_conn(conn.id());
    registry.complete_session(session_id);
}
