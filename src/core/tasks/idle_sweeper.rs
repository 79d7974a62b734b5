// src/core/tasks/idle_sweeper.rs

//! Periodic eviction of idle connections, independent of connection traffic.

use crate::core::state::ServerState;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Sweeps the connection registry on a fixed interval, evicting every
/// connection idle for longer than the configured maximum. Per-connection
/// close failures are logged inside the registry and never abort the sweep.
pub struct IdleSweeperTask {
    state: Arc<ServerState>,
}

impl IdleSweeperTask {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let sweep_interval = self.state.config.idle.sweep_interval;
        let max_idle = self.state.config.idle.max_idle;
        info!(
            "Idle sweeper started (interval {:?}, max idle {:?}).",
            sweep_interval, max_idle
        );

        let mut interval = tokio::time::interval(sweep_interval);
        // The immediate first tick would sweep an empty registry.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let evicted = self.state.registry.sweep_idle(max_idle);
                    if evicted == 0 {
                        debug!("Idle sweep found nothing to evict.");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Idle sweeper shutting down.");
                    return;
                }
            }
        }
    }
}
