// src/connection/line.rs

//! The line-oriented protocol adapter.
//!
//! One instance drives one accepted TCP connection: banner and prompt on
//! connect, one command per newline-delimited line, responses followed by a
//! fresh prompt. Command execution happens on the command pool; replies are
//! queued in dispatch order through the connection's outbox so pipelined
//! commands cannot answer out of order.

use crate::connection::{ConnectionGuard, ConnectionId};
use crate::core::ConsoleError;
use crate::core::commands::{CommandRequest, CommandResult};
use crate::core::protocol::{IdleTracker, LineCodec, Outbox, RenderFn, drain};
use crate::core::state::ServerState;
use chrono::Utc;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

const BANNER_ART: &str = r"
  _ __  _ __ ___   ___ ___  ___ ___  _ __   ___
 | '_ \| '__/ _ \ / __/ __|/ __/ _ \| '_ \ / _ \
 | |_) | | | (_) | (__\__ \ (_| (_) | |_) |  __/
 | .__/|_|  \___/ \___|___/\___\___/| .__/ \___|
 |_|                                |_|
";

/// Manages the full lifecycle of one line-protocol client connection.
pub struct LineConnection {
    state: Arc<ServerState>,
    id: ConnectionId,
    addr: SocketAddr,
    kill_rx: broadcast::Receiver<()>,
    global_shutdown_rx: broadcast::Receiver<()>,
}

impl LineConnection {
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
        }
    }

    /// The main event loop for the connection. The stream is owned here
    /// exclusively and dropped exactly once, on exit.
    pub async fn run(mut self, stream: TcpStream) -> Result<(), ConsoleError> {
        let _guard = ConnectionGuard::new(self.state.clone(), self.id, self.addr);

        let limits = &self.state.config.limits;
        let framed = Framed::new(stream, LineCodec::new(limits.max_line_len));
        let (sink, mut frames) = framed.split();

        let idle = Arc::new(IdleTracker::new());
        let (outbox, outbox_rx) = Outbox::channel(limits.outbox_depth);
        let mut writer = tokio::spawn(drain(sink, outbox_rx, Arc::clone(&idle)));
        let mut writer_finished = false;

        let prompt = prompt_text();
        if outbox.text(banner_text()).await.is_err() || outbox.text(prompt.clone()).await.is_err() {
            return Err(ConsoleError::TransportClosed);
        }

        let read_probe = self.state.config.idle.read_probe;
        let all_idle = self.state.config.idle.all_idle;
        let mut probe_sent = false;

        loop {
            let now = Instant::now();
            let probe_deadline = now + read_probe.saturating_sub(idle.read_idle(now));
            let close_deadline = now + all_idle.saturating_sub(idle.all_idle(now));

            tokio::select! {
                biased;

                _ = self.global_shutdown_rx.recv() => {
                    info!("Line connection {} received global shutdown signal.", self.id);
                    let _ = outbox.text("\nServer is shutting down. Bye!\n").await;
                    let _ = outbox.close().await;
                    break;
                }

                _ = self.kill_rx.recv() => {
                    debug!("Line connection {} received kill signal.", self.id);
                    let _ = outbox.close().await;
                    break;
                }

                res = &mut writer => {
                    writer_finished = true;
                    log_writer_result(self.id, res);
                    break;
                }

                maybe_line = frames.next() => {
                    match maybe_line {
                        Some(Ok(line)) => {
                            idle.mark_read();
                            probe_sent = false;
                            self.state.registry.touch(self.id);
                            if self.handle_line(&line, &outbox, &prompt).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) if matches!(e, ConsoleError::LineTooLong) => {
                            warn!(
                                "Protocol violation from {} ({}): oversized line, closing.",
                                self.addr, self.id
                            );
                            let _ = outbox.text("ERROR: line too long, closing connection.\n").await;
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

                _ = tokio::time::sleep_until(probe_deadline), if !probe_sent => {
                    debug!("Connection {} read-idle, probing.", self.id);
                    if outbox.text("HEARTBEAT\n").await.is_err() {
                        break;
                    }
                    probe_sent = true;
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
            match tokio::time::timeout(Duration::from_secs(5), &mut writer).await {
                Ok(res) => log_writer_result(self.id, res),
                Err(_) => {
                    debug!("Writer for connection {} did not drain in time.", self.id);
                    writer.abort();
                }
            }
        }
        Ok(())
    }

    /// Processes one complete inbound line.
    async fn handle_line(
        &self,
        line: &str,
        outbox: &Outbox,
        prompt: &str,
    ) -> Result<(), ConsoleError> {
        let trimmed = line.trim();

        // An empty line re-issues the prompt without dispatching anything.
        let Some(request) = CommandRequest::parse(trimmed, None) else {
            return outbox.text(prompt.to_string()).await;
        };

        self.state.registry.increment_message_count(self.id);

        match self.state.executor.dispatch(request) {
            Ok(result_rx) => {
                let prompt = prompt.to_string();
                let render: RenderFn = Box::new(move |result: &CommandResult| {
                    let mut text = result.render_text();
                    if !text.is_empty() && !text.ends_with('\n') {
                        text.push('\n');
                    }
                    if !result.close_connection {
                        text.push_str(&prompt);
                    }
                    Some(text)
                });
                outbox.deferred(result_rx, render).await
            }
            Err(e) => outbox.text(format!("ERROR: {e}\n{prompt}")).await,
        }
    }
}

fn prompt_text() -> String {
    format!("[console@{}]$ ", std::process::id())
}

fn banner_text() -> String {
    format!(
        "{BANNER_ART}\nWelcome to the procscope diagnostic console!\nVersion: {VERSION}\nPid: {}\nTime: {}\n\nType 'help' for the list of commands\n",
        std::process::id(),
        Utc::now().to_rfc3339(),
    )
}

fn log_writer_result(
    id: ConnectionId,
    res: Result<Result<(), ConsoleError>, tokio::task::JoinError>,
) {
    match res {
        Ok(Ok(())) => debug!("Writer for connection {} finished.", id),
        Ok(Err(e)) if e.is_normal_disconnect() => {
            debug!("Writer for connection {} hit peer disconnect: {}", id, e);
        }
        Ok(Err(e)) => warn!("Writer for connection {} failed: {}", id, e),
        Err(e) if e.is_cancelled() => {}
        Err(e) => warn!("Writer task for connection {} panicked: {}", id, e),
    }
}
