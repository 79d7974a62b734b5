// tests/integration/line_protocol_test.rs

//! End-to-end tests for the line-oriented console protocol.

use super::test_helpers::{TestServer, read_to_eof, read_until};
use tokio::io::AsyncWriteExt;

const PROMPT_TAIL: &str = "]$ ";

#[tokio::test]
async fn banner_and_prompt_greet_new_connections() {
    let server = TestServer::start().await;
    let mut stream = server.connect_line().await;

    let greeting = read_until(&mut stream, PROMPT_TAIL).await;
    assert!(greeting.contains("procscope"));
    assert!(greeting.contains("help"));
    assert!(greeting.contains("[console@"));
}

#[tokio::test]
async fn help_returns_the_command_list_and_a_fresh_prompt() {
    let server = TestServer::start().await;
    let mut stream = server.connect_line().await;
    read_until(&mut stream, PROMPT_TAIL).await;

    stream.write_all(b"help\n").await.unwrap();
    let response = read_until(&mut stream, PROMPT_TAIL).await;

    for name in ["dashboard", "thread", "memory", "gc", "version", "quit"] {
        assert!(response.contains(name), "help must list '{name}'");
    }
    assert!(response.trim_end().ends_with("]$"));
}

#[tokio::test]
async fn empty_lines_reprompt_without_dispatching() {
    let server = TestServer::start().await;
    let mut stream = server.connect_line().await;
    read_until(&mut stream, PROMPT_TAIL).await;

    stream.write_all(b"\n").await.unwrap();
    let response = read_until(&mut stream, PROMPT_TAIL).await;
    assert!(response.contains("[console@"));
    // Nothing was dispatched for the blank line.
    assert_eq!(server.state.stats.total_commands(), 0);
}

#[tokio::test]
async fn unknown_commands_answer_with_an_error_line() {
    let server = TestServer::start().await;
    let mut stream = server.connect_line().await;
    read_until(&mut stream, PROMPT_TAIL).await;

    stream.write_all(b"frobnicate\n").await.unwrap();
    let response = read_until(&mut stream, PROMPT_TAIL).await;
    assert!(response.contains("ERROR"));
    assert!(response.contains("frobnicate"));
}

#[tokio::test]
async fn dashboard_renders_provider_readings() {
    let server = TestServer::start().await;
    let mut stream = server.connect_line().await;
    read_until(&mut stream, PROMPT_TAIL).await;

    stream.write_all(b"dashboard\n").await.unwrap();
    let response = read_until(&mut stream, PROMPT_TAIL).await;
    assert!(response.contains("Heap:"));
    assert!(response.contains("25.0%"));
    assert!(response.contains("Connections: 1 active"));
}

#[tokio::test]
async fn quit_says_farewell_and_closes() {
    let server = TestServer::start().await;
    let mut stream = server.connect_line().await;
    read_until(&mut stream, PROMPT_TAIL).await;
    server.wait_for_connections(1).await;

    stream.write_all(b"quit\n").await.unwrap();
    let farewell = read_to_eof(&mut stream).await;
    assert!(farewell.contains("Bye"));
    // No prompt follows the farewell.
    assert!(!farewell.contains(PROMPT_TAIL));

    server.wait_for_connections(0).await;
}

#[tokio::test]
async fn oversized_lines_are_a_protocol_violation() {
    let server = TestServer::start().await;
    let mut stream = server.connect_line().await;
    read_until(&mut stream, PROMPT_TAIL).await;
    server.wait_for_connections(1).await;

    let mut oversized = vec![b'a'; 10 * 1024];
    oversized.push(b'\n');
    stream.write_all(&oversized).await.unwrap();

    let tail = read_to_eof(&mut stream).await;
    assert!(tail.contains("line too long"));
    server.wait_for_connections(0).await;
}

#[tokio::test]
async fn commands_advance_the_activity_timestamp() {
    let server = TestServer::start().await;
    let mut stream = server.connect_line().await;
    read_until(&mut stream, PROMPT_TAIL).await;
    server.wait_for_connections(1).await;

    let id = server.state.registry.ids()[0];
    let before = server.state.registry.get(id).unwrap().last_active();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    stream.write_all(b"version\n").await.unwrap();
    read_until(&mut stream, "procscope").await;

    let after = server.state.registry.get(id).unwrap().last_active();
    assert!(after > before);
    assert_eq!(server.state.registry.get(id).unwrap().message_count(), 1);
}

#[tokio::test]
async fn pipelined_commands_answer_in_dispatch_order() {
    let server = TestServer::start().await;
    let mut stream = server.connect_line().await;
    read_until(&mut stream, PROMPT_TAIL).await;

    // Both commands land before anything is read back; replies must come
    // back in order regardless of pool scheduling.
    stream.write_all(b"version\nhelp\n").await.unwrap();

    let both = read_until(&mut stream, "Available commands").await;
    let version_at = both.find("procscope 0.").expect("version reply present");
    let help_at = both.find("Available commands").expect("help reply present");
    assert!(version_at < help_at);
}
