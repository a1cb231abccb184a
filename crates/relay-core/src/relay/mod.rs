//! The TCP data plane: handshake, pairing, and byte forwarding.

pub mod connection;
pub mod server;

pub use server::spawn_accept_loop;
