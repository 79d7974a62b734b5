// src/core/protocol/envelope.rs

//! JSON envelope types for the message-oriented protocol.
//!
//! Each frame is a single JSON object with a required `type` tag. Request
//! envelopes arrive from clients; response envelopes are what the server
//! writes back.

use crate::core::commands::CommandResult;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Message types that can be sent by clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestEnvelope {
    /// Execute a console command; `id` correlates the asynchronous replies.
    Command {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// Keep-alive; touches the connection's activity timestamp.
    Heartbeat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// Record interest in a named topic.
    Subscribe {
        topic: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// Clear interest in a named topic.
    Unsubscribe {
        topic: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
}

/// Static server facts carried by the `welcome` envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerDescriptor {
    pub pid: u32,
    pub version: String,
    pub os: String,
    pub cpu_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_ceiling: Option<u64>,
}

/// Messages sent from the server to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseEnvelope {
    Welcome {
        message: String,
        /// Epoch milliseconds.
        timestamp: i64,
        server: ServerDescriptor,
    },
    CommandAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        command: String,
        timestamp: i64,
    },
    CommandResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: i64,
    },
    HeartbeatAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        timestamp: i64,
        server_time: String,
    },
    SubscribeAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        topic: String,
        success: bool,
    },
    UnsubscribeAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        topic: String,
        success: bool,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        message: String,
    },
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl ResponseEnvelope {
    pub fn welcome(message: impl Into<String>, server: ServerDescriptor) -> Self {
        Self::Welcome {
            message: message.into(),
            timestamp: now_millis(),
            server,
        }
    }

    pub fn command_ack(id: Option<String>, command: impl Into<String>) -> Self {
        Self::CommandAck {
            id,
            command: command.into(),
            timestamp: now_millis(),
        }
    }

    pub fn command_result(id: Option<String>, result: &CommandResult) -> Self {
        Self::CommandResult {
            id,
            success: result.success,
            result: result.payload.as_ref().map(|p| p.to_json_value()),
            error: result.error.clone(),
            timestamp: now_millis(),
        }
    }

    pub fn heartbeat_ack(id: Option<String>) -> Self {
        let now = Utc::now();
        Self::HeartbeatAck {
            id,
            timestamp: now.timestamp_millis(),
            server_time: now.to_rfc3339(),
        }
    }

    pub fn error(id: Option<String>, message: impl Into<String>) -> Self {
        Self::Error {
            id,
            message: message.into(),
        }
    }

    /// Serializes the envelope to its wire form (one JSON object, no
    /// trailing delimiter).
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","message":"internal serialization failure"}"#.to_string()
        })
    }
}
