//! # relay-core
//!
//! Rendezvous and byte-relay server for a peer-to-peer file transfer tool.
//!
//! A sender and a receiver each hold the other's public-key fingerprint out
//! of band. One calls `Initiate`, the other calls `Listen`; whichever
//! arrives second is told the session details immediately, the other
//! unblocks from its park. Both then open a TCP connection to the relay's
//! data-plane port, identify themselves with the session id and their role,
//! and the relay forwards opaque bytes between the two sockets until both
//! disconnect.
//!
//! ## Crate layout
//!
//! | Module | Responsibility |
//! |---|---|
//! | [`config`] | `RelayConfig`: addresses, backlog, timeouts. |
//! | [`error`] | `RelayError`, the one error type used throughout. |
//! | [`registry`] | `SessionRegistry`: the single piece of shared mutable state. |
//! | [`rendezvous`] | `RendezvousService`: `Initiate`/`Listen`. |
//! | [`relay`] | The TCP data plane: handshake, pairing, forwarding. |
//! | [`control`] | The HTTP control plane: JSON routes over the rendezvous service. |
//! | [`server`] | `RelayServer`: wires everything together, owns `start`/`stop`. |
//!
//! Thread-per-connection throughout: no async runtime, one OS thread per
//! accepted socket on both the control and data planes.

pub mod config;
pub mod control;
pub mod error;
pub mod registry;
pub mod relay;
pub mod rendezvous;
pub mod server;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use registry::SessionRegistry;
pub use rendezvous::RendezvousService;
pub use server::RelayServer;
