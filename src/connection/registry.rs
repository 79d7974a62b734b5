// src/connection/registry.rs

//! The connection registry: the sole owner of connection lifetime.
//!
//! Every live client session is an entry in a concurrency-safe map keyed by a
//! stable per-session id. The entry carries metadata (kind, timestamps,
//! message counter) plus a targeted kill sender; "closing the transport" means
//! signalling the connection's adapter task, which owns the socket exclusively
//! and drops it exactly once on its way out.

use crate::core::ConsoleError;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use strum_macros::Display;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub type ConnectionId = u64;

/// Sender half of a connection's targeted kill channel. Dropping the receiver
/// (the adapter task exiting) is what actually closes the socket.
pub type KillSender = broadcast::Sender<()>;

/// Which protocol adapter is driving the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ClientKind {
    Line,
    Message,
}

#[derive(Debug)]
struct Activity {
    last_active: Instant,
}

/// Metadata for one live client session.
#[derive(Debug)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub kind: ClientKind,
    pub addr: SocketAddr,
    pub created: Instant,
    activity: Mutex<Activity>,
    message_count: AtomicU64,
    kill: KillSender,
}

impl ConnectionInfo {
    pub fn last_active(&self) -> Instant {
        self.activity.lock().last_active
    }

    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::Relaxed)
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_active())
    }
}

/// A point-in-time aggregate over the current registry contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub active_count: usize,
    pub total_registered: u64,
    pub line_count: usize,
    pub message_count: usize,
    pub total_messages: u64,
    pub oldest_connection_age: Duration,
}

/// Concurrency-safe mapping from connection id to live connection metadata.
///
/// Constructed once by the server lifecycle and handed around by reference;
/// there is no ambient global instance.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ConnectionInfo>>,
    next_id: AtomicU64,
    total_registered: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection and returns its id. Both timestamps start at
    /// now. The only failure is a transport that is already gone, i.e. the
    /// kill channel has no live receiver.
    pub fn register(
        &self,
        addr: SocketAddr,
        kind: ClientKind,
        kill: KillSender,
    ) -> Result<ConnectionId, ConsoleError> {
        if kill.receiver_count() == 0 {
            return Err(ConsoleError::TransportClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Instant::now();
        let info = Arc::new(ConnectionInfo {
            id,
            kind,
            addr,
            created: now,
            activity: Mutex::new(Activity { last_active: now }),
            message_count: AtomicU64::new(0),
            kill,
        });
        self.connections.insert(id, info);
        self.total_registered.fetch_add(1, Ordering::Relaxed);

        info!(
            "Connection registered: id={} kind={} remote={} active={}",
            id,
            kind,
            addr,
            self.connections.len()
        );
        Ok(id)
    }

    /// Removes the connection and signals its adapter to drop the transport.
    /// Idempotent: a second call for the same id is a no-op.
    pub fn unregister(&self, id: ConnectionId) {
        let Some((_, info)) = self.connections.remove(&id) else {
            return;
        };
        // The adapter may already be gone (normal disconnect path); a dead
        // receiver is not an error.
        let _ = info.kill.send(());

        info!(
            "Connection unregistered: id={} kind={} duration={}s messages={} active={}",
            id,
            info.kind,
            info.created.elapsed().as_secs(),
            info.message_count(),
            self.connections.len()
        );
    }

    /// Updates the last-active timestamp; called on every inbound frame.
    /// The timestamp never moves backwards.
    pub fn touch(&self, id: ConnectionId) {
        if let Some(info) = self.connections.get(&id) {
            let now = Instant::now();
            let mut activity = info.activity.lock();
            if now > activity.last_active {
                activity.last_active = now;
            }
        }
    }

    pub fn increment_message_count(&self, id: ConnectionId) {
        if let Some(info) = self.connections.get(&id) {
            info.message_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionInfo>> {
        self.connections.get(&id).map(|e| Arc::clone(e.value()))
    }

    pub fn active_count(&self) -> usize {
        self.connections.len()
    }

    /// Ids of the currently registered connections, in no particular order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|e| *e.key()).collect()
    }

    pub fn total_registered(&self) -> u64 {
        self.total_registered.load(Ordering::Relaxed)
    }

    /// Computes the aggregate snapshot by iterating the current registry.
    /// O(active connections).
    pub fn stats(&self) -> RegistryStats {
        let now = Instant::now();
        let mut stats = RegistryStats {
            total_registered: self.total_registered(),
            ..RegistryStats::default()
        };

        for entry in self.connections.iter() {
            let info = entry.value();
            stats.active_count += 1;
            match info.kind {
                ClientKind::Line => stats.line_count += 1,
                ClientKind::Message => stats.message_count += 1,
            }
            stats.total_messages += info.message_count();
            let age = now.saturating_duration_since(info.created);
            if age > stats.oldest_connection_age {
                stats.oldest_connection_age = age;
            }
        }
        stats
    }

    /// Evicts every connection idle for strictly longer than `max_idle` and
    /// returns the number evicted.
    ///
    /// Iteration is lock-free with per-entry removal, so registrations and
    /// unregistrations may proceed concurrently. Idleness is re-checked under
    /// the entry lock at removal time, so a connection touched during the
    /// sweep window is never evicted.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let candidates: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|entry| entry.value().idle_for(now) > max_idle)
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = 0;
        for id in candidates {
            let Some((_, info)) = self
                .connections
                .remove_if(&id, |_, info| info.idle_for(now) > max_idle)
            else {
                continue;
            };

            if info.kill.send(()).is_err() {
                // Receiver already gone; the transport is closing on its own.
                debug!("Idle eviction of {} raced a local disconnect.", id);
            }
            info!(
                "Evicted idle connection: id={} kind={} idle={}s",
                id,
                info.kind,
                info.idle_for(now).as_secs()
            );
            evicted += 1;
        }

        if evicted > 0 {
            info!("Idle sweep complete, evicted {} connection(s).", evicted);
        }
        evicted
    }

    /// Closes every registered connection. Used during shutdown, after the
    /// listeners have stopped accepting.
    pub fn close_all(&self) {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|e| *e.key()).collect();
        let count = ids.len();
        for id in ids {
            if let Some((_, info)) = self.connections.remove(&id) {
                if info.kill.send(()).is_err() {
                    warn!("Connection {} had no live receiver during close_all.", id);
                }
            }
        }
        if count > 0 {
            info!("Closed {} registered connection(s).", count);
        }
    }
}
