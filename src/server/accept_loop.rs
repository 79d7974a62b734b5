// src/server/accept_loop.rs

//! Binds both listeners and contains the main accept loop plus the graceful
//! shutdown sequence.

use super::context::ServerContext;
use crate::connection::{ClientKind, LineConnection, MessageConnection};
use crate::core::state::ServerState;
use anyhow::{Result, anyhow};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// How long shutdown waits for each group of tasks before force-cancelling.
const CLIENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const POOL_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs the server until a shutdown signal arrives, then performs the
/// ordered teardown: stop accepting, close registered connections, stop the
/// periodic tasks, and drain the command pool under a timeout.
pub async fn run(mut ctx: ServerContext) -> Result<()> {
    let (host, line_port, message_port) = {
        let config = &ctx.state.config;
        (config.host.clone(), config.line_port, config.message_port)
    };

    let line_listener = TcpListener::bind((host.as_str(), line_port)).await?;
    info!("Line console listening on {}:{}", host, line_port);
    let message_listener = TcpListener::bind((host.as_str(), message_port)).await?;
    info!("Message console listening on {}:{}", host, message_port);

    let mut client_tasks = JoinSet::new();

    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to register SIGINT handler: {}", e))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to register SIGTERM handler: {}", e))?;

    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = line_listener.accept() => {
                handle_accept(
                    &ctx.state,
                    &ctx.connection_permits,
                    &ctx.shutdown_tx,
                    &mut client_tasks,
                    res,
                    ClientKind::Line,
                );
            },

            res = message_listener.accept() => {
                handle_accept(
                    &ctx.state,
                    &ctx.connection_permits,
                    &ctx.shutdown_tx,
                    &mut client_tasks,
                    res,
                    ClientKind::Message,
                );
            },

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res {
                    if e.is_panic() {
                        error!("A client handler panicked: {e:?}");
                    }
                }
            },
        }
    }

    // --- Ordered teardown, the reverse of startup ---

    drop(line_listener);
    drop(message_listener);
    info!("Stopped accepting new connections.");

    ctx.state.registry.close_all();

    if ctx.shutdown_tx.send(()).is_err() {
        error!("Failed to send shutdown signal. Some tasks may not terminate gracefully.");
    }

    if tokio::time::timeout(CLIENT_DRAIN_TIMEOUT, async {
        while client_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for client connections to close; aborting the rest.");
        client_tasks.shutdown().await;
    }
    info!("All client connections closed.");

    if tokio::time::timeout(POOL_DRAIN_TIMEOUT, async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
        ctx.background_tasks.shutdown().await;
    }

    if tokio::time::timeout(POOL_DRAIN_TIMEOUT, async {
        while ctx.command_workers.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Command pool did not drain in time; force-cancelling remaining work.");
        ctx.command_workers.shutdown().await;
    }

    info!("Server shutdown complete.");
    Ok(())
}

/// Admits one accepted socket: enforces the client cap, registers the
/// connection, and spawns its protocol adapter task.
fn handle_accept(
    state: &Arc<ServerState>,
    connection_permits: &Arc<Semaphore>,
    shutdown_tx: &broadcast::Sender<()>,
    client_tasks: &mut JoinSet<()>,
    res: std::io::Result<(TcpStream, SocketAddr)>,
    kind: ClientKind,
) {
    let (socket, addr) = match res {
        Ok(pair) => pair,
        Err(e) => {
            error!("Failed to accept connection: {}", e);
            return;
        }
    };

    let Ok(permit) = Arc::clone(connection_permits).try_acquire_owned() else {
        warn!("Max client limit reached, rejecting connection from {}.", addr);
        return;
    };

    let (kill_tx, kill_rx) = broadcast::channel(1);
    let id = match state.registry.register(addr, kind, kill_tx) {
        Ok(id) => id,
        Err(e) => {
            warn!("Failed to register connection from {}: {}", addr, e);
            return;
        }
    };

    let state = Arc::clone(state);
    let global_shutdown_rx = shutdown_tx.subscribe();
    client_tasks.spawn(async move {
        let _permit = permit;
        let result = match kind {
            ClientKind::Line => {
                LineConnection::new(state, id, addr, kill_rx, global_shutdown_rx)
                    .run(socket)
                    .await
            }
            ClientKind::Message => {
                MessageConnection::new(state, id, addr, kill_rx, global_shutdown_rx)
                    .run(socket)
                    .await
            }
        };
        match result {
            Ok(()) => debug!("Connection {} ({}) finished.", id, addr),
            Err(e) => warn!("Connection from {} terminated unexpectedly: {}", addr, e),
        }
    });
}
