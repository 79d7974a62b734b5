// src/core/tasks/status_reporter.rs

//! Periodic one-line server status summary in the log.

use crate::core::commands::handlers::{format_bytes, format_duration};
use crate::core::state::ServerState;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

pub struct StatusReporterTask {
    state: Arc<ServerState>,
}

impl StatusReporterTask {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.state.config.sampler.status_interval);
        // Skip the immediate first tick; there is nothing to report yet.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => self.report(),
                _ = shutdown_rx.recv() => {
                    info!("Status reporter shutting down.");
                    return;
                }
            }
        }
    }

    fn report(&self) {
        let stats = self.state.registry.stats();
        let memory = self
            .state
            .provider
            .snapshot()
            .map(|s| format_bytes(s.heap.used))
            .unwrap_or_else(|_| "n/a".to_string());
        info!(
            "Status: uptime={} connections={} (total {}) messages={} commands={} memory={}",
            format_duration(self.state.started_at.elapsed()),
            stats.active_count,
            stats.total_registered,
            stats.total_messages,
            self.state.stats.total_commands(),
            memory
        );
    }
}
