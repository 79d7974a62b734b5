// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests.

use procscope::config::Config;
use procscope::connection::{ClientKind, LineConnection, MessageConnection};
use procscope::core::ConsoleError;
use procscope::core::commands::executor::{self, CommandExecutor};
use procscope::core::metrics::{
    GcRecord, MemoryRegion, MetricsProvider, MetricsSnapshot, RuntimeInfo, ThreadRecord,
    ThreadSummary,
};
use procscope::core::state::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// A deterministic metrics provider for end-to-end tests.
pub struct StubProvider;

impl MetricsProvider for StubProvider {
    fn snapshot(&self) -> Result<MetricsSnapshot, ConsoleError> {
        Ok(MetricsSnapshot {
            heap: MemoryRegion {
                init: Some(64),
                used: 512,
                committed: 1024,
                max: Some(2048),
            },
            non_heap: MemoryRegion::default(),
            gc: vec![GcRecord {
                name: "collector".to_string(),
                count: 3,
                time_ms: 45,
                pools: vec![],
            }],
            threads: ThreadSummary {
                count: 9,
                daemon_count: 2,
                peak_count: 9,
                total_started: 20,
                deadlocked: 0,
            },
            compilation_time_ms: None,
        })
    }

    fn runtime(&self) -> RuntimeInfo {
        RuntimeInfo {
            pid: 999,
            process_name: "stub".to_string(),
            os: "StubOS".to_string(),
            kernel: "0.0".to_string(),
            hostname: "stubhost".to_string(),
            cpu_count: 2,
            exe: "/stub".to_string(),
            working_dir: "/".to_string(),
            args: vec![],
        }
    }

    fn threads(&self) -> Vec<ThreadRecord> {
        vec![ThreadRecord {
            id: 1,
            name: "main".to_string(),
            state: "RUNNING".to_string(),
        }]
    }

    fn properties(&self) -> Vec<(String, String)> {
        vec![("process.pid".to_string(), "999".to_string())]
    }
}

/// A complete server instance on ephemeral ports. Dropping it aborts the
/// accept loops and command workers.
pub struct TestServer {
    pub state: Arc<ServerState>,
    pub line_addr: SocketAddr,
    pub message_addr: SocketAddr,
    pub shutdown_tx: broadcast::Sender<()>,
    _tasks: JoinSet<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with_config(Config::default()).await
    }

    pub async fn start_with_config(config: Config) -> Self {
        let (executor, jobs) = CommandExecutor::bounded(config.limits.command_queue);
        let state = ServerState::new(config, Arc::new(StubProvider), executor);
        let (shutdown_tx, _) = broadcast::channel(1);

        let mut tasks = JoinSet::new();
        executor::spawn_workers(
            2,
            Arc::new(state.handler_context()),
            jobs,
            &shutdown_tx,
            &mut tasks,
        );

        let line_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind line");
        let line_addr = line_listener.local_addr().expect("line addr");
        let message_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind message");
        let message_addr = message_listener.local_addr().expect("message addr");

        spawn_accept_loop(
            &mut tasks,
            line_listener,
            state.clone(),
            shutdown_tx.clone(),
            ClientKind::Line,
        );
        spawn_accept_loop(
            &mut tasks,
            message_listener,
            state.clone(),
            shutdown_tx.clone(),
            ClientKind::Message,
        );

        Self {
            state,
            line_addr,
            message_addr,
            shutdown_tx,
            _tasks: tasks,
        }
    }

    pub async fn connect_line(&self) -> TcpStream {
        TcpStream::connect(self.line_addr).await.expect("connect")
    }

    pub async fn connect_message(&self) -> TcpStream {
        TcpStream::connect(self.message_addr)
            .await
            .expect("connect")
    }

    /// Waits until the registry holds exactly `count` connections.
    pub async fn wait_for_connections(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + IO_TIMEOUT;
        while self.state.registry.active_count() != count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "registry never reached {count} connection(s)"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

fn spawn_accept_loop(
    tasks: &mut JoinSet<()>,
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown_tx: broadcast::Sender<()>,
    kind: ClientKind,
) {
    tasks.spawn(async move {
        loop {
            let Ok((socket, addr)) = listener.accept().await else {
                break;
            };
            let (kill_tx, kill_rx) = broadcast::channel(1);
            let Ok(id) = state.registry.register(addr, kind, kill_tx) else {
                continue;
            };
            let global_shutdown_rx = shutdown_tx.subscribe();
            let state = state.clone();
            tokio::spawn(async move {
                let _ = match kind {
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
            });
        }
    });
}

/// Reads from the stream until the accumulated output contains `pattern`,
/// returning everything read so far. Panics on EOF or timeout.
pub async fn read_until(stream: &mut TcpStream, pattern: &str) -> String {
    let mut collected = Vec::new();
    loop {
        let mut chunk = [0u8; 1024];
        let n = tokio::time::timeout(IO_TIMEOUT, stream.read(&mut chunk))
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {pattern:?}"))
            .expect("read");
        if n == 0 {
            panic!(
                "connection closed before {:?} appeared; got: {}",
                pattern,
                String::from_utf8_lossy(&collected)
            );
        }
        collected.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&collected);
        if text.contains(pattern) {
            return text.into_owned();
        }
    }
}

/// Reads until the peer closes the connection, returning everything read.
pub async fn read_to_eof(stream: &mut TcpStream) -> String {
    let mut collected = Vec::new();
    loop {
        let mut chunk = [0u8; 1024];
        let n = tokio::time::timeout(IO_TIMEOUT, stream.read(&mut chunk))
            .await
            .expect("timed out waiting for EOF")
            .expect("read");
        if n == 0 {
            return String::from_utf8_lossy(&collected).into_owned();
        }
        collected.extend_from_slice(&chunk[..n]);
    }
}
