// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the server.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Line exceeds the maximum allowed length")]
    LineTooLong,

    #[error("Frame exceeds the maximum allowed length")]
    FrameTooLong,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unknown command '{0}'. Type 'help' for the list of commands.")]
    UnknownCommand(String),

    #[error("Wrong number of arguments for '{0}'")]
    WrongArgumentCount(String),

    #[error("Metrics provider unavailable: {0}")]
    MetricsUnavailable(String),

    #[error("Transport is already closed")]
    TransportClosed,

    #[error("Command queue is full, try again later")]
    CommandQueueFull,

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// We wrap it in an Arc to allow for cheap, shared cloning.
impl Clone for ConsoleError {
    fn clone(&self) -> Self {
        match self {
            ConsoleError::Io(e) => ConsoleError::Io(Arc::clone(e)),
            ConsoleError::LineTooLong => ConsoleError::LineTooLong,
            ConsoleError::FrameTooLong => ConsoleError::FrameTooLong,
            ConsoleError::Protocol(s) => ConsoleError::Protocol(s.clone()),
            ConsoleError::UnknownCommand(s) => ConsoleError::UnknownCommand(s.clone()),
            ConsoleError::WrongArgumentCount(s) => ConsoleError::WrongArgumentCount(s.clone()),
            ConsoleError::MetricsUnavailable(s) => ConsoleError::MetricsUnavailable(s.clone()),
            ConsoleError::TransportClosed => ConsoleError::TransportClosed,
            ConsoleError::CommandQueueFull => ConsoleError::CommandQueueFull,
            ConsoleError::Internal(s) => ConsoleError::Internal(s.clone()),
        }
    }
}

impl PartialEq for ConsoleError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConsoleError::Io(e1), ConsoleError::Io(e2)) => e1.to_string() == e2.to_string(),
            (ConsoleError::Protocol(s1), ConsoleError::Protocol(s2)) => s1 == s2,
            (ConsoleError::UnknownCommand(s1), ConsoleError::UnknownCommand(s2)) => s1 == s2,
            (ConsoleError::WrongArgumentCount(s1), ConsoleError::WrongArgumentCount(s2)) => {
                s1 == s2
            }
            (ConsoleError::MetricsUnavailable(s1), ConsoleError::MetricsUnavailable(s2)) => {
                s1 == s2
            }
            (ConsoleError::Internal(s1), ConsoleError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for ConsoleError {
    fn from(e: std::io::Error) -> Self {
        ConsoleError::Io(Arc::new(e))
    }
}

impl From<std::str::Utf8Error> for ConsoleError {
    fn from(e: std::str::Utf8Error) -> Self {
        ConsoleError::Protocol(format!("invalid UTF-8 in frame: {e}"))
    }
}

impl From<std::string::FromUtf8Error> for ConsoleError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        ConsoleError::Protocol(format!("invalid UTF-8 in frame: {e}"))
    }
}

impl From<serde_json::Error> for ConsoleError {
    fn from(e: serde_json::Error) -> Self {
        ConsoleError::Internal(format!("JSON serialization/deserialization error: {e}"))
    }
}

impl ConsoleError {
    /// Returns true for errors that represent a peer simply going away, which
    /// are logged at debug level rather than warn.
    pub fn is_normal_disconnect(&self) -> bool {
        matches!(self, ConsoleError::Io(arc_err) if matches!(
            arc_err.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionAborted
        ))
    }
}
