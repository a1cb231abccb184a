//! Top-level orchestrator tying config, registry, and the two listeners
//! together.

use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::RelayConfig;
use crate::control;
use crate::error::{RelayError, Result};
use crate::registry::SessionRegistry;
use crate::relay;
use crate::rendezvous::RendezvousService;

/// Owns the registry and config, and spawns the control-plane HTTP listener
/// and the data-plane TCP accept loop: `new`/`start`/`stop`, a `running`
/// flag shared with both accept loops.
pub struct RelayServer {
    config: Arc<RelayConfig>,
    registry: SessionRegistry,
    rendezvous: RendezvousService,
    running: Arc<AtomicBool>,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        let registry = SessionRegistry::new();
        let rendezvous = RendezvousService::new(
            registry.clone(),
            config.blocking_timeout,
            config.session_expiry,
        );

        if let Some(threads) = config.worker_threads {
            tracing::info!(threads, "RELAY_WORKER_THREADS set but unused by the thread-per-connection accept loop");
        }

        RelayServer {
            config: Arc::new(config),
            registry,
            rendezvous,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bind both listeners and spawn their accept loops. Returns once both
    /// sockets are bound; the loops themselves run on their own threads.
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RelayError::invalid("server", "already running"));
        }

        let http_listener = TcpListener::bind(&self.config.http_addr)?;
        http_listener.set_nonblocking(true)?;
        tracing::info!(addr = %self.config.http_addr, "control endpoint bound");

        let socket_addr = self
            .config
            .socket_addr
            .parse()
            .map_err(|_| RelayError::invalid("socketAddr", "not a valid socket address"))?;
        let relay_listener = relay::server::bind(&socket_addr, self.config.backlog)?;
        tracing::info!(addr = %self.config.socket_addr, backlog = self.config.backlog, "relay endpoint bound");

        control::spawn_accept_loop(
            http_listener,
            self.rendezvous.clone(),
            self.registry.clone(),
            self.config.clone(),
            self.running.clone(),
        );

        relay::spawn_accept_loop(
            relay_listener,
            self.registry.clone(),
            self.config.clone(),
            self.running.clone(),
        );

        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("relay server stopping");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}
