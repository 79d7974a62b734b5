// src/core/commands/mod.rs

//! Command parsing and dispatch.
//!
//! A command is a named, argument-bearing request for introspection or
//! control. The name → handler mapping is a static table established at
//! startup; resolution is case-insensitive and an unknown name is an ordinary
//! failed result, never a panic escaping to the caller.

pub mod executor;
pub mod handlers;

use crate::connection::ConnectionRegistry;
use crate::core::ConsoleError;
use crate::core::metrics::MetricsProvider;
use crate::core::state::StatsState;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

/// An ephemeral value object: one parsed inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// Lowercased command name (first whitespace-separated token).
    pub name: String,
    /// Remaining tokens, in order.
    pub args: Vec<String>,
    /// Client-supplied token used by the message protocol to match
    /// asynchronous replies. Absent on the line protocol.
    pub correlation_id: Option<String>,
}

impl CommandRequest {
    /// Splits an input line on whitespace. Returns `None` for blank input.
    pub fn parse(input: &str, correlation_id: Option<String>) -> Option<Self> {
        let mut tokens = input.split_whitespace();
        let name = tokens.next()?.to_lowercase();
        Some(Self {
            name,
            args: tokens.map(str::to_string).collect(),
            correlation_id,
        })
    }
}

/// The payload of a successful command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandPayload {
    Text(String),
    Structured(serde_json::Value),
}

impl CommandPayload {
    /// Human-readable rendering, used verbatim by the line protocol.
    pub fn render_text(&self) -> String {
        match self {
            CommandPayload::Text(s) => s.clone(),
            CommandPayload::Structured(v) => {
                serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
            }
        }
    }

    /// Structured rendering, used by the message protocol.
    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            CommandPayload::Text(s) => serde_json::Value::String(s.clone()),
            CommandPayload::Structured(v) => v.clone(),
        }
    }
}

/// The outcome of one dispatched command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    pub success: bool,
    pub payload: Option<CommandPayload>,
    pub error: Option<String>,
    /// Set by `quit`: the protocol adapter closes the connection after the
    /// response is flushed.
    pub close_connection: bool,
}

impl CommandResult {
    pub fn ok(payload: CommandPayload) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
            close_connection: false,
        }
    }

    pub fn ok_closing(payload: CommandPayload) -> Self {
        Self {
            close_connection: true,
            ..Self::ok(payload)
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error.into()),
            close_connection: false,
        }
    }

    /// Human-readable rendering for the line protocol.
    pub fn render_text(&self) -> String {
        if self.success {
            self.payload
                .as_ref()
                .map(CommandPayload::render_text)
                .unwrap_or_default()
        } else {
            format!(
                "ERROR: {}",
                self.error.as_deref().unwrap_or("command failed")
            )
        }
    }
}

/// Everything a handler may read from. Handlers are read-only apart from the
/// command counter; they must not block on I/O beyond the metrics provider.
pub struct HandlerContext {
    pub provider: Arc<dyn MetricsProvider>,
    pub registry: Arc<ConnectionRegistry>,
    pub stats: Arc<StatsState>,
    pub started_at: Instant,
}

/// What a handler produces on success.
pub struct CommandReply {
    pub payload: CommandPayload,
    pub close_connection: bool,
}

impl CommandReply {
    pub fn text(s: impl Into<String>) -> Self {
        Self {
            payload: CommandPayload::Text(s.into()),
            close_connection: false,
        }
    }

    pub fn structured(v: serde_json::Value) -> Self {
        Self {
            payload: CommandPayload::Structured(v),
            close_connection: false,
        }
    }
}

type HandlerFn = fn(&HandlerContext, &CommandRequest) -> Result<CommandReply, ConsoleError>;

/// One entry in the static handler table.
pub struct CommandSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub usage: &'static str,
    pub summary: &'static str,
    handler: HandlerFn,
}

/// The fixed command set. Order is the order `help` lists them in.
static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "dashboard",
        aliases: &["dash"],
        usage: "dashboard",
        summary: "overall process health at a glance",
        handler: handlers::dashboard,
    },
    CommandSpec {
        name: "runtime",
        aliases: &["jvm"],
        usage: "runtime",
        summary: "runtime and host information",
        handler: handlers::runtime_info,
    },
    CommandSpec {
        name: "thread",
        aliases: &[],
        usage: "thread [-all]",
        summary: "thread statistics, or every live thread with -all",
        handler: handlers::thread_info,
    },
    CommandSpec {
        name: "memory",
        aliases: &["mem"],
        usage: "memory",
        summary: "heap and non-heap memory details",
        handler: handlers::memory_info,
    },
    CommandSpec {
        name: "gc",
        aliases: &[],
        usage: "gc",
        summary: "per-collector garbage collection statistics",
        handler: handlers::gc_info,
    },
    CommandSpec {
        name: "sysprop",
        aliases: &[],
        usage: "sysprop [key]",
        summary: "runtime properties, or a single one by key",
        handler: handlers::sysprop,
    },
    CommandSpec {
        name: "sysenv",
        aliases: &[],
        usage: "sysenv [key]",
        summary: "environment variables, or a single one by key",
        handler: handlers::sysenv,
    },
    CommandSpec {
        name: "stats",
        aliases: &["connection-stats", "conn"],
        usage: "stats",
        summary: "connection registry statistics",
        handler: handlers::connection_stats,
    },
    CommandSpec {
        name: "version",
        aliases: &["v"],
        usage: "version",
        summary: "server version",
        handler: handlers::version,
    },
    CommandSpec {
        name: "clear",
        aliases: &["cls"],
        usage: "clear",
        summary: "clear the screen",
        handler: handlers::clear_screen,
    },
    CommandSpec {
        name: "help",
        aliases: &["h"],
        usage: "help",
        summary: "show this help",
        handler: handlers::help,
    },
    CommandSpec {
        name: "quit",
        aliases: &["exit", "q"],
        usage: "quit",
        summary: "close the connection",
        handler: handlers::quit,
    },
];

static LOOKUP: Lazy<HashMap<&'static str, &'static CommandSpec>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for spec in COMMANDS {
        map.insert(spec.name, spec);
        for alias in spec.aliases {
            map.insert(*alias, spec);
        }
    }
    map
});

/// Resolves a (lowercased) command name or alias.
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    LOOKUP.get(name).copied()
}

/// The table in declaration order, for `help`.
pub fn command_table() -> &'static [CommandSpec] {
    COMMANDS
}

/// Resolves and runs one command. Every handler fault is converted into a
/// failed result carrying the fault's message; nothing propagates out.
pub fn execute(ctx: &HandlerContext, request: &CommandRequest) -> CommandResult {
    ctx.stats.increment_total_commands();
    debug!("Executing command '{}' args={:?}", request.name, request.args);

    let Some(spec) = lookup(&request.name) else {
        return CommandResult::fail(ConsoleError::UnknownCommand(request.name.clone()).to_string());
    };

    match (spec.handler)(ctx, request) {
        Ok(reply) => {
            if reply.close_connection {
                CommandResult::ok_closing(reply.payload)
            } else {
                CommandResult::ok(reply.payload)
            }
        }
        Err(e) => {
            debug!("Command '{}' failed: {}", request.name, e);
            CommandResult::fail(e.to_string())
        }
    }
}
