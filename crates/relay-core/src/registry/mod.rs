//! The session registry: the single piece of shared mutable state in the
//! relay.

pub mod oneshot;
pub mod session;
pub mod store;
pub mod transfer;

pub use session::{Fingerprint, Role, Session, SessionStatus};
pub use store::SessionRegistry;
pub use transfer::{ActiveTransfer, ConnHandle, PendingConnection, RegisterOutcome};
