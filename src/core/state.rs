// src/core/state.rs

//! Defines the central `ServerState` struct holding all shared server-wide state.

use crate::config::Config;
use crate::connection::ConnectionRegistry;
use crate::core::alerts::AlertEvent;
use crate::core::commands::HandlerContext;
use crate::core::commands::executor::CommandExecutor;
use crate::core::metrics::MetricsProvider;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Holds all state and logic related to server-wide statistics and monitoring.
#[derive(Debug, Default)]
pub struct StatsState {
    /// The total number of commands processed by the server since startup.
    total_commands: AtomicU64,
}

impl StatsState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically increments the total number of commands processed.
    pub fn increment_total_commands(&self) {
        self.total_commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_commands(&self) -> u64 {
        self.total_commands.load(Ordering::Relaxed)
    }
}

/// The central struct holding all shared, server-wide state.
///
/// Constructed once during startup, wrapped in an `Arc`, and passed to every
/// task and connection adapter; there is no ambient global state anywhere.
pub struct ServerState {
    /// The immutable runtime configuration.
    pub config: Config,
    /// The sole owner of connection lifetime.
    pub registry: Arc<ConnectionRegistry>,
    /// The process introspection capability.
    pub provider: Arc<dyn MetricsProvider>,
    /// Handle for submitting commands to the bounded execution pool.
    pub executor: CommandExecutor,
    /// Server-wide counters.
    pub stats: Arc<StatsState>,
    /// Notification hook for raised alerts. Subscribing is optional; alert
    /// emission never depends on a listener being present.
    pub alert_events: broadcast::Sender<AlertEvent>,
    /// When the server came up, for uptime reporting.
    pub started_at: Instant,
}

impl ServerState {
    pub fn new(
        config: Config,
        provider: Arc<dyn MetricsProvider>,
        executor: CommandExecutor,
    ) -> Arc<Self> {
        let (alert_events, _) = broadcast::channel(64);
        Arc::new(Self {
            config,
            registry: Arc::new(ConnectionRegistry::new()),
            provider,
            executor,
            stats: Arc::new(StatsState::new()),
            alert_events,
            started_at: Instant::now(),
        })
    }

    /// The read-only view command handlers run against.
    pub fn handler_context(&self) -> HandlerContext {
        HandlerContext {
            provider: Arc::clone(&self.provider),
            registry: Arc::clone(&self.registry),
            stats: Arc::clone(&self.stats),
            started_at: self.started_at,
        }
    }
}
