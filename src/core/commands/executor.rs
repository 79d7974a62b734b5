// src/core/commands/executor.rs

//! The bounded command execution pool.
//!
//! Commands are never executed on the task servicing network I/O: adapters
//! enqueue a job and receive the result over a oneshot channel, and a small
//! fixed set of worker tasks drains the queue. A full queue rejects new work
//! instead of applying backpressure to the I/O path, so one slow command
//! cannot starve unrelated connections.

use super::{CommandRequest, CommandResult, HandlerContext, execute};
use crate::core::ConsoleError;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::debug;

/// One queued unit of command work.
pub struct CommandJob {
    pub request: CommandRequest,
    pub reply: oneshot::Sender<CommandResult>,
}

/// Cloneable handle for submitting commands to the pool.
#[derive(Clone)]
pub struct CommandExecutor {
    tx: mpsc::Sender<CommandJob>,
}

impl CommandExecutor {
    /// Creates the handle and the job queue it feeds. The receiver is handed
    /// to [`spawn_workers`] during server startup.
    pub fn bounded(queue_depth: usize) -> (Self, mpsc::Receiver<CommandJob>) {
        let (tx, rx) = mpsc::channel(queue_depth);
        (Self { tx }, rx)
    }

    /// Submits a command for asynchronous execution. Returns the receiver the
    /// result will be delivered on, preserving the caller's dispatch order for
    /// its own write sequencing.
    pub fn dispatch(
        &self,
        request: CommandRequest,
    ) -> Result<oneshot::Receiver<CommandResult>, ConsoleError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .try_send(CommandJob {
                request,
                reply: reply_tx,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => ConsoleError::CommandQueueFull,
                mpsc::error::TrySendError::Closed(_) => {
                    ConsoleError::Internal("command pool is stopped".to_string())
                }
            })?;
        Ok(reply_rx)
    }
}

/// Spawns `worker_count` pool workers into the provided JoinSet.
pub fn spawn_workers(
    worker_count: usize,
    ctx: Arc<HandlerContext>,
    rx: mpsc::Receiver<CommandJob>,
    shutdown_tx: &broadcast::Sender<()>,
    join_set: &mut JoinSet<()>,
) {
    let rx = Arc::new(Mutex::new(rx));
    for worker_id in 0..worker_count {
        let ctx = Arc::clone(&ctx);
        let rx = Arc::clone(&rx);
        let shutdown_rx = shutdown_tx.subscribe();
        join_set.spawn(worker(worker_id, ctx, rx, shutdown_rx));
    }
}

async fn worker(
    worker_id: usize,
    ctx: Arc<HandlerContext>,
    rx: Arc<Mutex<mpsc::Receiver<CommandJob>>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                // Drain whatever is already queued, then stop. Remaining work
                // past the drain timeout is force-cancelled by the lifecycle.
                loop {
                    let job = rx.lock().await.try_recv();
                    match job {
                        Ok(job) => run_job(&ctx, job),
                        Err(_) => break,
                    }
                }
                debug!("Command worker {} stopped.", worker_id);
                return;
            }

            job = async { rx.lock().await.recv().await } => {
                match job {
                    Some(job) => run_job(&ctx, job),
                    None => {
                        debug!("Command queue closed, worker {} exiting.", worker_id);
                        return;
                    }
                }
            }
        }
    }
}

fn run_job(ctx: &HandlerContext, job: CommandJob) {
    let name = job.request.name.clone();
    let result = execute(ctx, &job.request);
    if job.reply.send(result).is_err() {
        // The connection went away while the command was in flight; the
        // result is simply discarded.
        debug!("Discarding result of '{}': requester is gone.", name);
    }
}
