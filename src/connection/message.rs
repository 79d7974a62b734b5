// src/connection/message.rs

//! The message-oriented (structured) protocol adapter.
//!
//! Frames are newline-delimited JSON envelopes with a required `type` tag.
//! A `command` frame is acknowledged immediately and answered asynchronously
//! with a `command_result` carrying the same correlation id; ack and result
//! flow through the connection's outbox, so reply order always matches
//! request order. Malformed text frames get an `error` envelope without
//! closing the connection; binary frames are accepted at the transport layer
//! and left uninterpreted.

use crate::connection::{ConnectionGuard, ConnectionId};
use crate::core::ConsoleError;
use crate::core::commands::{CommandRequest, CommandResult};
use crate::core::protocol::{
    IdleTracker, MessageFrameCodec, Outbox, RenderFn, RequestEnvelope, ResponseEnvelope,
    ServerDescriptor, drain,
};
use crate::core::state::ServerState;
use futures::StreamExt;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Manages the full lifecycle of one message-protocol client connection.
pub struct MessageConnection {
    state: Arc<ServerState>,
    id: ConnectionId,
    addr: SocketAddr,
    kill_rx: broadcast::Receiver<()>,
    global_shutdown_rx: broadcast::Receiver<()>,
    /// Topics this session has expressed interest in. Push delivery is an
    /// extension point; only the interest set lives in core.
    subscriptions: HashSet<String>,
}

impl MessageConnection {
    pub fn new(
        state: Arc<ServerState>,
        id: ConnectionId,
        addr: SocketAddr,
        kill_rx: broadcast::Receiver<()>,
        global_shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            state,
            id,
            addr,
            kill_rx,
            global_shutdown_rx,
            subscriptions: HashSet::new(),
        }
    }

    pub async fn run(mut self, stream: TcpStream) -> Result<(), ConsoleError> {
        let _guard = ConnectionGuard::new(self.state.clone(), self.id, self.addr);

        let limits = &self.state.config.limits;
        let framed = Framed::new(stream, MessageFrameCodec::new(limits.max_frame_len));
        let (sink, mut frames) = framed.split();

        let idle = Arc::new(IdleTracker::new());
        let (outbox, outbox_rx) = Outbox::channel(limits.outbox_depth);
        let mut writer = tokio::spawn(drain(sink, outbox_rx, Arc::clone(&idle)));
        let mut writer_finished = false;

        let welcome = self.welcome_envelope();
        if outbox.text(welcome.encode()).await.is_err() {
            return Err(ConsoleError::TransportClosed);
        }

        let all_idle = self.state.config.idle.all_idle;

        loop {
            let now = Instant::now();
            let close_deadline = now + all_idle.saturating_sub(idle.all_idle(now));

            tokio::select! {
                biased;

                _ = self.global_shutdown_rx.recv() => {
                    info!("Message connection {} received global shutdown signal.", self.id);
                    let envelope = ResponseEnvelope::error(None, "server is shutting down");
                    let _ = outbox.text(envelope.encode()).await;
                    let _ = outbox.close().await;
                    break;
                }

                _ = self.kill_rx.recv() => {
                    debug!("Message connection {} received kill signal.", self.id);
                    let _ = outbox.close().await;
                    break;
                }

                res = &mut writer => {
                    writer_finished = true;
                    if let Ok(Err(e)) = res {
                        if e.is_normal_disconnect() {
                            debug!("Writer for connection {} hit peer disconnect: {}", self.id, e);
                        } else {
                            warn!("Writer for connection {} failed: {}", self.id, e);
                        }
                    }
                    break;
                }

                maybe_frame = frames.next() => {
                    match maybe_frame {
                        Some(Ok(frame)) => {
                            idle.mark_read();
                            self.state.registry.touch(self.id);
                            if self.handle_frame(&frame, &outbox).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) if matches!(e, ConsoleError::FrameTooLong) => {
                            warn!(
                                "Protocol violation from {} ({}): oversized frame, closing.",
                                self.addr, self.id
                            );
                            let envelope = ResponseEnvelope::error(None, "frame too large");
                            let _ = outbox.text(envelope.encode()).await;
                            let _ = outbox.close().await;
                            break;
                        }
                        Some(Err(e)) => {
                            if e.is_normal_disconnect() {
                                debug!("Connection from {} closed by peer: {}", self.addr, e);
                            } else {
                                warn!("Connection error for {}: {}", self.addr, e);
                            }
                            break;
                        }
                        None => {
                            debug!("Connection from {} closed by peer.", self.addr);
                            break;
                        }
                    }
                }

                _ = tokio::time::sleep_until(close_deadline) => {
                    warn!(
                        "Connection {} idle in both directions for {:?}, closing.",
                        self.id, all_idle
                    );
                    let _ = outbox.close().await;
                    break;
                }
            }
        }

        if !writer_finished {
            drop(outbox);
            if tokio::time::timeout(Duration::from_secs(5), &mut writer)
                .await
                .is_err()
            {
                debug!("Writer for connection {} did not drain in time.", self.id);
                writer.abort();
            }
        }
        Ok(())
    }

    /// Interprets one inbound frame. Errors returned here mean the outbox is
    /// gone and the connection loop should end.
    async fn handle_frame(
        &mut self,
        frame: &[u8],
        outbox: &Outbox,
    ) -> Result<(), ConsoleError> {
        // Binary frames are accepted but reserved; they are not messages and
        // do not count toward the message counter.
        let Ok(text) = std::str::from_utf8(frame) else {
            debug!(
                "Connection {} sent a binary frame ({} bytes); ignoring (reserved).",
                self.id,
                frame.len()
            );
            return Ok(());
        };

        self.state.registry.increment_message_count(self.id);

        let envelope: RequestEnvelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("Malformed frame from {}: {}", self.addr, e);
                let reply = ResponseEnvelope::error(None, format!("malformed frame: {e}"));
                return outbox.text(reply.encode()).await;
            }
        };

        match envelope {
            RequestEnvelope::Command { command, id } => {
                self.handle_command(command, id, outbox).await
            }
            RequestEnvelope::Heartbeat { id } => {
                self.state.registry.touch(self.id);
                let reply = ResponseEnvelope::heartbeat_ack(id);
                outbox.text(reply.encode()).await
            }
            RequestEnvelope::Subscribe { topic, id } => {
                info!("Connection {} subscribed to topic '{}'.", self.id, topic);
                self.subscriptions.insert(topic.clone());
                let reply = ResponseEnvelope::SubscribeAck {
                    id,
                    topic,
                    success: true,
                };
                outbox.text(reply.encode()).await
            }
            RequestEnvelope::Unsubscribe { topic, id } => {
                info!("Connection {} unsubscribed from topic '{}'.", self.id, topic);
                self.subscriptions.remove(&topic);
                let reply = ResponseEnvelope::UnsubscribeAck {
                    id,
                    topic,
                    success: true,
                };
                outbox.text(reply.encode()).await
            }
        }
    }

    async fn handle_command(
        &self,
        command: String,
        correlation_id: Option<String>,
        outbox: &Outbox,
    ) -> Result<(), ConsoleError> {
        // Acknowledge receipt before execution begins.
        let ack = ResponseEnvelope::command_ack(correlation_id.clone(), command.as_str());
        outbox.text(ack.encode()).await?;

        let Some(request) = CommandRequest::parse(&command, correlation_id.clone()) else {
            let reply = ResponseEnvelope::command_result(
                correlation_id,
                &CommandResult::fail("empty command"),
            );
            return outbox.text(reply.encode()).await;
        };

        match self.state.executor.dispatch(request) {
            Ok(result_rx) => {
                let render: RenderFn = Box::new(move |result: &CommandResult| {
                    Some(ResponseEnvelope::command_result(correlation_id, result).encode())
                });
                outbox.deferred(result_rx, render).await
            }
            Err(e) => {
                let reply = ResponseEnvelope::command_result(
                    correlation_id,
                    &CommandResult::fail(e.to_string()),
                );
                outbox.text(reply.encode()).await
            }
        }
    }

    fn welcome_envelope(&self) -> ResponseEnvelope {
        let runtime = self.state.provider.runtime();
        let memory_ceiling = self
            .state
            .provider
            .snapshot()
            .ok()
            .and_then(|s| s.heap.max);
        ResponseEnvelope::welcome(
            "Welcome to the procscope diagnostic console!",
            ServerDescriptor {
                pid: runtime.pid,
                version: VERSION.to_string(),
                os: runtime.os,
                cpu_count: runtime.cpu_count,
                memory_ceiling,
            },
        )
    }
}
