// src/core/protocol/outbox.rs

//! The per-connection serialized write path.
//!
//! Command execution is asynchronous and can complete out of order across a
//! connection's pipelined requests, so ordering is not free: each connection
//! gets an outbound queue drained by exactly one writer task. Immediate
//! writes (banner, prompt, acks) are enqueued as ready text; command replies
//! are enqueued as a pending result receiver at dispatch time, so the wire
//! order always matches dispatch order regardless of completion order.

use crate::core::ConsoleError;
use crate::core::commands::CommandResult;
use futures::{Sink, SinkExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::debug;

/// Renders a completed command result into wire text. Returning `None`
/// suppresses the write (nothing to say).
pub type RenderFn = Box<dyn FnOnce(&CommandResult) -> Option<String> + Send>;

/// One entry in a connection's outbound queue.
pub enum Outbound {
    /// Text ready to be written as-is.
    Ready(String),
    /// A command reply still in flight on the command pool.
    Deferred {
        result: oneshot::Receiver<CommandResult>,
        render: RenderFn,
    },
    /// Flush everything queued before this item, then close the connection.
    Close,
}

/// Sending half of a connection's outbound queue.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Outbound>,
}

impl Outbox {
    pub fn channel(depth: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(depth);
        (Self { tx }, rx)
    }

    pub async fn text(&self, text: impl Into<String>) -> Result<(), ConsoleError> {
        self.send(Outbound::Ready(text.into())).await
    }

    pub async fn deferred(
        &self,
        result: oneshot::Receiver<CommandResult>,
        render: RenderFn,
    ) -> Result<(), ConsoleError> {
        self.send(Outbound::Deferred { result, render }).await
    }

    pub async fn close(&self) -> Result<(), ConsoleError> {
        self.send(Outbound::Close).await
    }

    async fn send(&self, item: Outbound) -> Result<(), ConsoleError> {
        self.tx
            .send(item)
            .await
            .map_err(|_| ConsoleError::TransportClosed)
    }
}

/// Tracks when a connection last saw traffic in each direction. Shared by the
/// reader loop (read marks, probe deadlines) and the writer task (write marks).
#[derive(Debug)]
pub struct IdleTracker {
    last_read: Mutex<Instant>,
    last_write: Mutex<Instant>,
}

impl IdleTracker {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_read: Mutex::new(now),
            last_write: Mutex::new(now),
        }
    }

    pub fn mark_read(&self) {
        *self.last_read.lock() = Instant::now();
    }

    pub fn mark_write(&self) {
        *self.last_write.lock() = Instant::now();
    }

    pub fn last_read(&self) -> Instant {
        *self.last_read.lock()
    }

    /// Time since the last inbound traffic.
    pub fn read_idle(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_read.lock())
    }

    /// Time the connection has been idle in both directions.
    pub fn all_idle(&self, now: Instant) -> Duration {
        let read = now.saturating_duration_since(*self.last_read.lock());
        let write = now.saturating_duration_since(*self.last_write.lock());
        read.min(write)
    }
}

impl Default for IdleTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// The single writer task for one connection. Drains the queue in order and
/// returns when asked to close, when the queue is dropped, or on sink error.
pub async fn drain<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<Outbound>,
    idle: Arc<IdleTracker>,
) -> Result<(), ConsoleError>
where
    S: Sink<String, Error = ConsoleError> + Unpin,
{
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Ready(text) => {
                sink.send(text).await?;
                idle.mark_write();
            }
            Outbound::Deferred { result, render } => {
                match result.await {
                    Ok(result) => {
                        let close = result.close_connection;
                        if let Some(text) = render(&result) {
                            sink.send(text).await?;
                            idle.mark_write();
                        }
                        if close {
                            let _ = sink.flush().await;
                            return Ok(());
                        }
                    }
                    Err(_) => {
                        // The command pool dropped the reply (shutdown drain);
                        // there is nothing to write for this slot.
                        debug!("Deferred command reply was dropped before completion.");
                    }
                }
            }
            Outbound::Close => {
                let _ = sink.flush().await;
                return Ok(());
            }
        }
    }
    Ok(())
}
