// src/connection/mod.rs

//! Manages the lifecycle of client connections: the central registry that owns
//! connection metadata and eviction, the RAII cleanup guard, and the two
//! per-connection protocol adapters.

mod guard;
mod line;
mod message;
mod registry;

pub use guard::ConnectionGuard;
pub use line::LineConnection;
pub use message::MessageConnection;
pub use registry::{
    ClientKind, ConnectionId, ConnectionInfo, ConnectionRegistry, KillSender, RegistryStats,
};
