// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use crate::connection::ConnectionId;
use crate::core::state::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// An RAII guard to ensure a connection is always unregistered when its
/// adapter task's scope is exited, whatever the exit path was.
pub struct ConnectionGuard {
    state: Arc<ServerState>,
    id: ConnectionId,
    addr: SocketAddr,
}

impl ConnectionGuard {
    pub(crate) fn new(state: Arc<ServerState>, id: ConnectionId, addr: SocketAddr) -> Self {
        Self { state, id, addr }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        debug!(
            "ConnectionGuard dropping, cleaning up resources for connection {} ({})",
            self.id, self.addr
        );
        // Idempotent: a no-op if the sweeper or close_all got there first.
        self.state.registry.unregister(self.id);
    }
}
