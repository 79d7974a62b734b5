// tests/integration/message_protocol_test.rs

//! End-to-end tests for the message-oriented (JSON envelope) protocol.

use super::test_helpers::TestServer;
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects and splits the stream into a buffered JSON-line reader and a
/// writer, consuming the welcome envelope on the way.
async fn connect(server: &TestServer) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
    let stream = server.connect_message().await;
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let welcome = next_envelope(&mut reader).await;
    assert_eq!(welcome["type"], "welcome");
    (reader, write_half)
}

async fn next_envelope(reader: &mut BufReader<OwnedReadHalf>) -> Value {
    let mut line = String::new();
    let n = tokio::time::timeout(IO_TIMEOUT, reader.read_line(&mut line))
        .await
        .expect("timed out waiting for an envelope")
        .expect("read_line");
    assert!(n > 0, "connection closed while waiting for an envelope");
    serde_json::from_str(&line).unwrap_or_else(|e| panic!("invalid envelope {line:?}: {e}"))
}

async fn send(writer: &mut OwnedWriteHalf, frame: &str) {
    writer.write_all(frame.as_bytes()).await.unwrap();
    writer.write_all(b"\n").await.unwrap();
}

#[tokio::test]
async fn welcome_describes_the_server() {
    let server = TestServer::start().await;
    let stream = server.connect_message().await;
    let (read_half, _write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let welcome = next_envelope(&mut reader).await;
    assert_eq!(welcome["type"], "welcome");
    assert_eq!(welcome["server"]["pid"], 999);
    assert_eq!(welcome["server"]["os"], "StubOS");
    assert!(welcome["timestamp"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn heartbeat_is_acked_and_advances_activity() {
    let server = TestServer::start().await;
    let (mut reader, mut writer) = connect(&server).await;
    server.wait_for_connections(1).await;

    let id = server.state.registry.ids()[0];
    let before = server.state.registry.get(id).unwrap().last_active();
    tokio::time::sleep(Duration::from_millis(20)).await;

    send(&mut writer, r#"{"type":"heartbeat","id":"1"}"#).await;
    let ack = next_envelope(&mut reader).await;

    assert_eq!(ack["type"], "heartbeat_ack");
    assert_eq!(ack["id"], "1");
    assert!(ack["timestamp"].as_i64().unwrap() > 0);

    let after = server.state.registry.get(id).unwrap().last_active();
    assert!(after > before);
}

#[tokio::test]
async fn command_produces_one_ack_then_one_result_with_matching_id() {
    let server = TestServer::start().await;
    let (mut reader, mut writer) = connect(&server).await;

    send(
        &mut writer,
        r#"{"type":"command","command":"version","id":"req-42"}"#,
    )
    .await;

    let ack = next_envelope(&mut reader).await;
    assert_eq!(ack["type"], "command_ack");
    assert_eq!(ack["id"], "req-42");
    assert_eq!(ack["command"], "version");

    let result = next_envelope(&mut reader).await;
    assert_eq!(result["type"], "command_result");
    assert_eq!(result["id"], "req-42");
    assert_eq!(result["success"], true);
    assert!(result["result"].as_str().unwrap().contains("procscope"));

    // Exactly one result: the next reply belongs to the next request.
    send(&mut writer, r#"{"type":"heartbeat","id":"after"}"#).await;
    let next = next_envelope(&mut reader).await;
    assert_eq!(next["type"], "heartbeat_ack");
    assert_eq!(next["id"], "after");
}

#[tokio::test]
async fn failed_commands_report_an_error_payload() {
    let server = TestServer::start().await;
    let (mut reader, mut writer) = connect(&server).await;

    send(
        &mut writer,
        r#"{"type":"command","command":"frobnicate","id":"x"}"#,
    )
    .await;

    let ack = next_envelope(&mut reader).await;
    assert_eq!(ack["type"], "command_ack");

    let result = next_envelope(&mut reader).await;
    assert_eq!(result["type"], "command_result");
    assert_eq!(result["success"], false);
    assert!(result["error"].as_str().unwrap().contains("frobnicate"));
    assert!(result.get("result").is_none());
}

#[tokio::test]
async fn pipelined_commands_reply_in_request_order() {
    let server = TestServer::start().await;
    let (mut reader, mut writer) = connect(&server).await;

    // Two commands written back to back before reading anything.
    send(&mut writer, r#"{"type":"command","command":"version","id":"a"}"#).await;
    send(&mut writer, r#"{"type":"command","command":"help","id":"b"}"#).await;

    let first_ack = next_envelope(&mut reader).await;
    assert_eq!(first_ack["id"], "a");
    let first_result = next_envelope(&mut reader).await;
    assert_eq!(first_result["type"], "command_result");
    assert_eq!(first_result["id"], "a");

    let second_ack = next_envelope(&mut reader).await;
    assert_eq!(second_ack["id"], "b");
    let second_result = next_envelope(&mut reader).await;
    assert_eq!(second_result["id"], "b");
}

#[tokio::test]
async fn malformed_frames_get_an_error_without_closing() {
    let server = TestServer::start().await;
    let (mut reader, mut writer) = connect(&server).await;

    send(&mut writer, "this is not json").await;
    let error = next_envelope(&mut reader).await;
    assert_eq!(error["type"], "error");
    assert!(error["message"].as_str().unwrap().contains("malformed"));

    // Missing `type` tag is malformed too.
    send(&mut writer, r#"{"command":"gc"}"#).await;
    let error = next_envelope(&mut reader).await;
    assert_eq!(error["type"], "error");

    // The connection survived both.
    send(&mut writer, r#"{"type":"heartbeat","id":"ok"}"#).await;
    let ack = next_envelope(&mut reader).await;
    assert_eq!(ack["type"], "heartbeat_ack");
}

#[tokio::test]
async fn binary_frames_are_accepted_and_ignored() {
    let server = TestServer::start().await;
    let (mut reader, mut writer) = connect(&server).await;
    server.wait_for_connections(1).await;

    writer.write_all(&[0xff, 0xfe, 0x00, b'\n']).await.unwrap();

    // No reply for the binary frame; the next envelope answers the heartbeat.
    send(&mut writer, r#"{"type":"heartbeat","id":"still-here"}"#).await;
    let ack = next_envelope(&mut reader).await;
    assert_eq!(ack["type"], "heartbeat_ack");
    assert_eq!(ack["id"], "still-here");
}

#[tokio::test]
async fn subscribe_and_unsubscribe_are_acknowledged() {
    let server = TestServer::start().await;
    let (mut reader, mut writer) = connect(&server).await;

    send(
        &mut writer,
        r#"{"type":"subscribe","topic":"alerts","id":"s1"}"#,
    )
    .await;
    let ack = next_envelope(&mut reader).await;
    assert_eq!(ack["type"], "subscribe_ack");
    assert_eq!(ack["topic"], "alerts");
    assert_eq!(ack["success"], true);

    send(
        &mut writer,
        r#"{"type":"unsubscribe","topic":"alerts","id":"s2"}"#,
    )
    .await;
    let ack = next_envelope(&mut reader).await;
    assert_eq!(ack["type"], "unsubscribe_ack");
    assert_eq!(ack["topic"], "alerts");
}

#[tokio::test]
async fn quit_command_closes_after_the_result_is_flushed() {
    let server = TestServer::start().await;
    let (mut reader, mut writer) = connect(&server).await;
    server.wait_for_connections(1).await;

    send(&mut writer, r#"{"type":"command","command":"quit","id":"bye"}"#).await;

    let ack = next_envelope(&mut reader).await;
    assert_eq!(ack["type"], "command_ack");
    let result = next_envelope(&mut reader).await;
    assert_eq!(result["type"], "command_result");
    assert_eq!(result["id"], "bye");

    let mut rest = String::new();
    let n = tokio::time::timeout(IO_TIMEOUT, reader.read_line(&mut rest))
        .await
        .expect("timed out waiting for close")
        .expect("read_line");
    assert_eq!(n, 0, "connection must close after the quit result");

    server.wait_for_connections(0).await;
}

#[tokio::test]
async fn eviction_by_sweep_closes_the_connection() {
    let server = TestServer::start().await;
    let (mut reader, _writer) = connect(&server).await;
    server.wait_for_connections(1).await;

    // Force an eviction as the sweeper would.
    assert_eq!(server.state.registry.sweep_idle(Duration::ZERO), 1);

    let mut rest = String::new();
    let n = tokio::time::timeout(IO_TIMEOUT, reader.read_line(&mut rest))
        .await
        .expect("timed out waiting for close")
        .expect("read_line");
    assert_eq!(n, 0, "evicted connection must be closed");
    assert_eq!(server.state.registry.active_count(), 0);
}
