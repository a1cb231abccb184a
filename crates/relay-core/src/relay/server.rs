//! TCP accept loop for the data plane.
//!
//! Binds with an explicit backlog via `socket2` (`std::net::TcpListener`
//! has no backlog knob) and tunes each accepted socket's `SO_KEEPALIVE`,
//! `TCP_NODELAY`, and send/recv buffer sizes the same way.
//!
//! Non-blocking listener, 50ms poll against a `running` flag,
//! thread-per-connection.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};

use crate::config::RelayConfig;
use crate::relay::connection;
use crate::registry::SessionRegistry;

/// Fixed send/recv buffer size applied to every accepted connection.
const SOCKET_BUFFER_SIZE: usize = 2 * 1024 * 1024;

/// Bind a `TcpListener` with the configured backlog.
pub fn bind(addr: &SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&(*addr).into())?;
    socket.listen(backlog as i32)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// Apply the fixed socket options every accepted connection gets: keepalive
/// on, Nagle off, 2 MiB buffers each way.
fn tune_connection(stream: &TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)?;
    let sockref = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(60))
        .with_interval(Duration::from_secs(10));
    sockref.set_tcp_keepalive(&keepalive)?;
    sockref.set_send_buffer_size(SOCKET_BUFFER_SIZE)?;
    sockref.set_recv_buffer_size(SOCKET_BUFFER_SIZE)?;
    Ok(())
}

/// Spawn the accept loop on its own thread. Returns immediately; the loop
/// runs until `running` is cleared.
pub fn spawn_accept_loop(
    listener: TcpListener,
    registry: SessionRegistry,
    config: Arc<RelayConfig>,
    running: Arc<AtomicBool>,
) {
    thread::spawn(move || accept_loop(listener, registry, config, running));
}

fn accept_loop(
    listener: TcpListener,
    registry: SessionRegistry,
    config: Arc<RelayConfig>,
    running: Arc<AtomicBool>,
) {
    tracing::info!(addr = ?listener.local_addr().ok(), "relay TCP listener started");

    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                if let Err(err) = stream.set_nonblocking(false) {
                    tracing::warn!(%peer_addr, error = %err, "failed to clear nonblocking on accept");
                    continue;
                }
                if let Err(err) = tune_connection(&stream) {
                    tracing::warn!(%peer_addr, error = %err, "failed to tune accepted socket");
                }
                let registry = registry.clone();
                let config = config.clone();
                thread::spawn(move || connection::handle_connection(stream, registry, config));
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "relay TCP accept error");
                }
            }
        }
    }

    tracing::debug!("relay accept loop exited");
}
