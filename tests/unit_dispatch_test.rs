// tests/unit_dispatch_test.rs

//! Unit tests for command parsing, the static handler table, and the
//! bounded command execution pool.

use procscope::connection::ConnectionRegistry;
use procscope::core::ConsoleError;
use procscope::core::commands::executor::{self, CommandExecutor};
use procscope::core::commands::{
    CommandPayload, CommandRequest, HandlerContext, execute, lookup,
};
use procscope::core::metrics::{
    GcRecord, MemoryRegion, MetricsProvider, MetricsSnapshot, RuntimeInfo, ThreadRecord,
    ThreadSummary,
};
use procscope::core::state::StatsState;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// A scripted provider with deterministic readings.
struct FakeProvider {
    fail_snapshot: bool,
}

impl FakeProvider {
    fn healthy() -> Self {
        Self {
            fail_snapshot: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail_snapshot: true,
        }
    }
}

impl MetricsProvider for FakeProvider {
    fn snapshot(&self) -> Result<MetricsSnapshot, ConsoleError> {
        if self.fail_snapshot {
            return Err(ConsoleError::MetricsUnavailable(
                "scripted failure".to_string(),
            ));
        }
        Ok(MetricsSnapshot {
            heap: MemoryRegion {
                init: Some(64),
                used: 512,
                committed: 1024,
                max: Some(2048),
            },
            non_heap: MemoryRegion::default(),
            gc: vec![GcRecord {
                name: "young".to_string(),
                count: 7,
                time_ms: 120,
                pools: vec!["eden".to_string()],
            }],
            threads: ThreadSummary {
                count: 12,
                daemon_count: 3,
                peak_count: 14,
                total_started: 40,
                deadlocked: 0,
            },
            compilation_time_ms: Some(250),
        })
    }

    fn runtime(&self) -> RuntimeInfo {
        RuntimeInfo {
            pid: 4242,
            process_name: "fake-process".to_string(),
            os: "TestOS 1.0".to_string(),
            kernel: "1.2.3".to_string(),
            hostname: "testhost".to_string(),
            cpu_count: 8,
            exe: "/bin/fake".to_string(),
            working_dir: "/tmp".to_string(),
            args: vec!["fake".to_string()],
        }
    }

    fn threads(&self) -> Vec<ThreadRecord> {
        vec![
            ThreadRecord {
                id: 1,
                name: "main".to_string(),
                state: "RUNNING".to_string(),
            },
            ThreadRecord {
                id: 2,
                name: "worker".to_string(),
                state: "SLEEPING".to_string(),
            },
        ]
    }

    fn properties(&self) -> Vec<(String, String)> {
        vec![
            ("process.name".to_string(), "fake-process".to_string()),
            ("process.pid".to_string(), "4242".to_string()),
        ]
    }
}

fn context_with(provider: FakeProvider) -> HandlerContext {
    HandlerContext {
        provider: Arc::new(provider),
        registry: Arc::new(ConnectionRegistry::new()),
        stats: Arc::new(StatsState::new()),
        started_at: Instant::now(),
    }
}

fn text_of(payload: &CommandPayload) -> String {
    payload.render_text()
}

#[test]
fn parse_splits_on_whitespace_and_lowercases_the_name() {
    let request = CommandRequest::parse("  THREAD   -all  ", None).unwrap();
    assert_eq!(request.name, "thread");
    assert_eq!(request.args, vec!["-all".to_string()]);
    assert_eq!(request.correlation_id, None);
}

#[test]
fn parse_returns_none_for_blank_input() {
    assert!(CommandRequest::parse("", None).is_none());
    assert!(CommandRequest::parse("   \t ", None).is_none());
}

#[test]
fn lookup_resolves_aliases() {
    for (alias, canonical) in [
        ("dash", "dashboard"),
        ("jvm", "runtime"),
        ("mem", "memory"),
        ("v", "version"),
        ("exit", "quit"),
        ("q", "quit"),
        ("cls", "clear"),
        ("h", "help"),
        ("connection-stats", "stats"),
    ] {
        let spec = lookup(alias).unwrap_or_else(|| panic!("alias {alias} must resolve"));
        assert_eq!(spec.name, canonical);
    }
    assert!(lookup("no-such-command").is_none());
}

#[tokio::test]
async fn unknown_command_yields_a_failed_result_with_an_error() {
    let ctx = context_with(FakeProvider::healthy());
    let request = CommandRequest::parse("frobnicate now", None).unwrap();

    let result = execute(&ctx, &request);
    assert!(!result.success);
    let error = result.error.expect("failed result carries an error");
    assert!(!error.is_empty());
    assert!(error.contains("frobnicate"));
    assert!(!result.close_connection);
}

#[tokio::test]
async fn help_lists_the_command_set() {
    let ctx = context_with(FakeProvider::healthy());
    let request = CommandRequest::parse("help", None).unwrap();

    let result = execute(&ctx, &request);
    assert!(result.success);
    let text = text_of(&result.payload.unwrap());
    for name in [
        "dashboard", "runtime", "thread", "memory", "gc", "sysprop", "sysenv", "stats",
        "version", "clear", "help", "quit",
    ] {
        assert!(text.contains(name), "help must mention '{name}'");
    }
}

#[tokio::test]
async fn command_names_are_case_insensitive() {
    let ctx = context_with(FakeProvider::healthy());
    let request = CommandRequest::parse("VERSION", None).unwrap();

    let result = execute(&ctx, &request);
    assert!(result.success);
    assert!(text_of(&result.payload.unwrap()).contains("procscope"));
}

#[tokio::test]
async fn quit_requests_connection_close_after_the_reply() {
    let ctx = context_with(FakeProvider::healthy());
    let request = CommandRequest::parse("quit", None).unwrap();

    let result = execute(&ctx, &request);
    assert!(result.success);
    assert!(result.close_connection);
}

#[tokio::test]
async fn thread_all_lists_individual_threads() {
    let ctx = context_with(FakeProvider::healthy());

    let summary = execute(&ctx, &CommandRequest::parse("thread", None).unwrap());
    let summary_text = text_of(&summary.payload.unwrap());
    assert!(summary_text.contains("Live:"));
    assert!(summary_text.contains("12"));

    let all = execute(&ctx, &CommandRequest::parse("thread -all", None).unwrap());
    let all_text = text_of(&all.payload.unwrap());
    assert!(all_text.contains("main"));
    assert!(all_text.contains("worker"));
    assert!(all_text.contains("SLEEPING"));
}

#[tokio::test]
async fn sysprop_resolves_single_keys_and_misses() {
    let ctx = context_with(FakeProvider::healthy());

    let hit = execute(&ctx, &CommandRequest::parse("sysprop process.pid", None).unwrap());
    assert!(text_of(&hit.payload.unwrap()).contains("4242"));

    let miss = execute(&ctx, &CommandRequest::parse("sysprop nope", None).unwrap());
    assert!(miss.success);
    assert!(text_of(&miss.payload.unwrap()).contains("not present"));
}

#[tokio::test]
async fn extra_arguments_are_a_command_fault_not_a_crash() {
    let ctx = context_with(FakeProvider::healthy());
    let result = execute(&ctx, &CommandRequest::parse("sysprop a b c", None).unwrap());
    assert!(!result.success);
    assert!(result.error.unwrap().contains("sysprop"));
}

#[tokio::test]
async fn gc_info_reports_each_collector() {
    let ctx = context_with(FakeProvider::healthy());
    let result = execute(&ctx, &CommandRequest::parse("gc", None).unwrap());
    let text = text_of(&result.payload.unwrap());
    assert!(text.contains("young"));
    assert!(text.contains("120ms"));
    assert!(text.contains("eden"));
}

#[tokio::test]
async fn provider_faults_become_failed_results_not_panics() {
    let ctx = context_with(FakeProvider::failing());
    let result = execute(&ctx, &CommandRequest::parse("dashboard", None).unwrap());

    assert!(!result.success);
    assert!(result.error.unwrap().contains("scripted failure"));
}

#[tokio::test]
async fn handlers_count_toward_the_command_counter() {
    let ctx = context_with(FakeProvider::healthy());
    execute(&ctx, &CommandRequest::parse("version", None).unwrap());
    execute(&ctx, &CommandRequest::parse("unknown-cmd", None).unwrap());
    assert_eq!(ctx.stats.total_commands(), 2);
}

#[tokio::test]
async fn executor_runs_commands_off_the_calling_task() {
    let (executor, jobs) = CommandExecutor::bounded(16);
    let (shutdown_tx, _) = broadcast::channel(1);
    let mut workers = JoinSet::new();
    executor::spawn_workers(
        2,
        Arc::new(context_with(FakeProvider::healthy())),
        jobs,
        &shutdown_tx,
        &mut workers,
    );

    let rx = executor
        .dispatch(CommandRequest::parse("version", None).unwrap())
        .unwrap();
    let result = rx.await.expect("worker delivers the result");
    assert!(result.success);
}

#[tokio::test]
async fn executor_rejects_work_when_the_queue_is_full() {
    // No workers are draining the queue, so the second job cannot fit.
    let (executor, _jobs) = CommandExecutor::bounded(1);
    let first = executor.dispatch(CommandRequest::parse("version", None).unwrap());
    assert!(first.is_ok());

    let second = executor
        .dispatch(CommandRequest::parse("version", None).unwrap())
        .unwrap_err();
    assert_eq!(second, ConsoleError::CommandQueueFull);
}

#[tokio::test]
async fn executor_discards_results_for_vanished_requesters() {
    let (executor, jobs) = CommandExecutor::bounded(16);
    let (shutdown_tx, _) = broadcast::channel(1);
    let mut workers = JoinSet::new();
    executor::spawn_workers(
        1,
        Arc::new(context_with(FakeProvider::healthy())),
        jobs,
        &shutdown_tx,
        &mut workers,
    );

    let rx = executor
        .dispatch(CommandRequest::parse("version", None).unwrap())
        .unwrap();
    // The "connection" goes away before the result lands.
    drop(rx);

    // The pool keeps serving other requesters.
    let rx = executor
        .dispatch(CommandRequest::parse("help", None).unwrap())
        .unwrap();
    assert!(rx.await.unwrap().success);
}
