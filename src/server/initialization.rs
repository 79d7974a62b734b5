// src/server/initialization.rs

//! Handles the server initialization process: configuration validation,
//! metrics provider construction, and shared state setup.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::commands::executor::CommandExecutor;
use crate::core::metrics::SystemMetricsProvider;
use crate::core::state::ServerState;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tracing::info;

/// Initializes all server components before the background tasks are spawned
/// and the listeners are bound.
pub fn setup(config: Config) -> Result<ServerContext> {
    config.validate()?;
    log_startup_info(&config);

    let (shutdown_tx, _) = broadcast::channel(1);
    let max_clients = config.max_clients;

    let provider = Arc::new(SystemMetricsProvider::new());
    let (executor, command_jobs) = CommandExecutor::bounded(config.limits.command_queue);

    let state = ServerState::new(config, provider, executor);
    info!("Server state initialized.");

    Ok(ServerContext {
        state,
        shutdown_tx,
        background_tasks: JoinSet::new(),
        command_workers: JoinSet::new(),
        command_jobs: Some(command_jobs),
        connection_permits: Arc::new(Semaphore::new(max_clients)),
    })
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!(
        "Console ports: line={} message={} (host {}).",
        config.line_port, config.message_port, config.host
    );
    info!(
        "Command pool: {} worker(s), queue depth {}.",
        config.limits.command_workers, config.limits.command_queue
    );
    info!(
        "Idle policy: sweep every {:?}, evict after {:?}.",
        config.idle.sweep_interval, config.idle.max_idle
    );
    info!(
        "Alert thresholds: heap warn {:.0}%, heap critical {:.0}%, gc {}ms, threads {}.",
        config.alerts.heap_warning_ratio * 100.0,
        config.alerts.heap_critical_ratio * 100.0,
        config.alerts.gc_time_warning_ms,
        config.alerts.thread_count_warning
    );
}
