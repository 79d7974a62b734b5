// src/server/context.rs

use crate::core::commands::executor::CommandJob;
use crate::core::state::ServerState;
use std::sync::Arc;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::task::JoinSet;

/// Holds all the initialized state required to run the server's main loop.
pub struct ServerContext {
    pub state: Arc<ServerState>,
    pub shutdown_tx: broadcast::Sender<()>,
    /// Periodic tasks: sampler, idle sweeper, status reporter.
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
    /// The bounded command execution pool.
    pub command_workers: JoinSet<()>,
    /// Receiver side of the command queue, consumed when the workers spawn.
    pub command_jobs: Option<mpsc::Receiver<CommandJob>>,
    /// Caps concurrently accepted clients across both listeners.
    pub connection_permits: Arc<Semaphore>,
}
