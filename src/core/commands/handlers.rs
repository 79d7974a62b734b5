// src/core/commands/handlers.rs

//! The handler functions behind the static command table.
//!
//! Handlers read from the metrics provider and the connection registry and
//! format a response; they never mutate server state and never block on
//! anything but the provider call itself.

use super::{CommandReply, CommandRequest, HandlerContext, command_table};
use crate::core::ConsoleError;
use chrono::Utc;
use std::fmt::Write as _;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub(super) fn help(_ctx: &HandlerContext, _req: &CommandRequest) -> Result<CommandReply, ConsoleError> {
    let mut out = String::from("\n=== Available commands ===\n");
    for spec in command_table() {
        let names = if spec.aliases.is_empty() {
            spec.name.to_string()
        } else {
            format!("{} ({})", spec.name, spec.aliases.join(", "))
        };
        let _ = writeln!(out, "{:<28} - {}", names, spec.summary);
    }
    Ok(CommandReply::text(out))
}

pub(super) fn dashboard(ctx: &HandlerContext, _req: &CommandRequest) -> Result<CommandReply, ConsoleError> {
    let snapshot = ctx.provider.snapshot()?;
    let runtime = ctx.provider.runtime();
    let conn = ctx.registry.stats();

    let mut out = String::from("\n=== Dashboard ===\n");
    let _ = writeln!(
        out,
        "Process:     {} (pid {})",
        runtime.process_name, runtime.pid
    );
    let _ = writeln!(
        out,
        "Uptime:      {}",
        format_duration(ctx.started_at.elapsed())
    );
    let _ = writeln!(out, "Time:        {}", Utc::now().to_rfc3339());

    let heap_line = match snapshot.heap.max {
        Some(max) => format!(
            "{}/{} ({:.1}%)",
            format_bytes(snapshot.heap.used),
            format_bytes(max),
            snapshot.heap_usage_ratio().unwrap_or(0.0) * 100.0
        ),
        None => format!("{} (no ceiling)", format_bytes(snapshot.heap.used)),
    };
    let _ = writeln!(out, "Heap:        {heap_line}");
    let _ = writeln!(
        out,
        "Threads:     {} ({} daemon)",
        snapshot.threads.count, snapshot.threads.daemon_count
    );
    let _ = writeln!(
        out,
        "GC:          {} collections, {}ms total",
        snapshot.total_gc_count(),
        snapshot.total_gc_time_ms()
    );
    let _ = writeln!(
        out,
        "Connections: {} active (LINE: {}, MESSAGE: {}), {} total",
        conn.active_count, conn.line_count, conn.message_count, conn.total_registered
    );
    let _ = writeln!(
        out,
        "Commands:    {} processed",
        ctx.stats.total_commands()
    );
    Ok(CommandReply::text(out))
}

pub(super) fn runtime_info(ctx: &HandlerContext, _req: &CommandRequest) -> Result<CommandReply, ConsoleError> {
    let runtime = ctx.provider.runtime();
    let mut out = String::from("\n=== Runtime ===\n");
    let _ = writeln!(out, "Process:     {}", runtime.process_name);
    let _ = writeln!(out, "Pid:         {}", runtime.pid);
    let _ = writeln!(out, "OS:          {}", runtime.os);
    let _ = writeln!(out, "Kernel:      {}", runtime.kernel);
    let _ = writeln!(out, "Host:        {}", runtime.hostname);
    let _ = writeln!(out, "CPUs:        {}", runtime.cpu_count);
    let _ = writeln!(out, "Executable:  {}", runtime.exe);
    let _ = writeln!(out, "Working dir: {}", runtime.working_dir);
    if !runtime.args.is_empty() {
        let _ = writeln!(out, "Arguments:   {}", runtime.args.join(" "));
    }
    Ok(CommandReply::text(out))
}

pub(super) fn thread_info(ctx: &HandlerContext, req: &CommandRequest) -> Result<CommandReply, ConsoleError> {
    if req.args.iter().any(|a| a == "-all") {
        let threads = ctx.provider.threads();
        let mut out = String::from("\n=== All threads ===\n");
        if threads.is_empty() {
            out.push_str("No per-thread detail available from this runtime.\n");
        }
        for t in threads {
            let _ = writeln!(out, "id={:<8} state={:<10} name={}", t.id, t.state, t.name);
        }
        return Ok(CommandReply::text(out));
    }

    let snapshot = ctx.provider.snapshot()?;
    let t = snapshot.threads;
    let mut out = String::from("\n=== Thread statistics ===\n");
    let _ = writeln!(out, "Live:          {}", t.count);
    let _ = writeln!(out, "Daemon:        {}", t.daemon_count);
    let _ = writeln!(out, "Peak:          {}", t.peak_count);
    let _ = writeln!(out, "Total started: {}", t.total_started);
    let _ = writeln!(out, "Deadlocked:    {}", t.deadlocked);
    Ok(CommandReply::text(out))
}

pub(super) fn memory_info(ctx: &HandlerContext, _req: &CommandRequest) -> Result<CommandReply, ConsoleError> {
    let snapshot = ctx.provider.snapshot()?;
    let mut out = String::from("\n=== Memory ===\n");
    out.push_str("Heap:\n");
    let _ = writeln!(
        out,
        "  init:      {}",
        snapshot
            .heap
            .init
            .map(format_bytes)
            .unwrap_or_else(|| "n/a".to_string())
    );
    let _ = writeln!(out, "  used:      {}", format_bytes(snapshot.heap.used));
    let _ = writeln!(
        out,
        "  committed: {}",
        format_bytes(snapshot.heap.committed)
    );
    let _ = writeln!(
        out,
        "  max:       {}",
        snapshot
            .heap
            .max
            .map(format_bytes)
            .unwrap_or_else(|| "unlimited".to_string())
    );
    out.push_str("Non-heap:\n");
    let _ = writeln!(out, "  used:      {}", format_bytes(snapshot.non_heap.used));
    let _ = writeln!(
        out,
        "  committed: {}",
        format_bytes(snapshot.non_heap.committed)
    );
    Ok(CommandReply::text(out))
}

pub(super) fn gc_info(ctx: &HandlerContext, _req: &CommandRequest) -> Result<CommandReply, ConsoleError> {
    let snapshot = ctx.provider.snapshot()?;
    let mut out = String::from("\n=== Garbage collection ===\n");
    if snapshot.gc.is_empty() {
        out.push_str("No collector statistics reported by this runtime.\n");
        return Ok(CommandReply::text(out));
    }
    for gc in &snapshot.gc {
        let _ = writeln!(out, "{}:", gc.name);
        let _ = writeln!(out, "  collections: {}", gc.count);
        let _ = writeln!(out, "  time:        {}ms", gc.time_ms);
        if !gc.pools.is_empty() {
            let _ = writeln!(out, "  pools:       {}", gc.pools.join(", "));
        }
    }
    Ok(CommandReply::text(out))
}

pub(super) fn sysprop(ctx: &HandlerContext, req: &CommandRequest) -> Result<CommandReply, ConsoleError> {
    if req.args.len() > 1 {
        return Err(ConsoleError::WrongArgumentCount("sysprop".to_string()));
    }
    let props = ctx.provider.properties();
    match req.args.first() {
        Some(key) => {
            let line = match props.iter().find(|(k, _)| k == key) {
                Some((k, v)) => format!("{k} = {v}\n"),
                None => format!("Property not present: {key}\n"),
            };
            Ok(CommandReply::text(line))
        }
        None => {
            let mut out = String::from("\n=== Runtime properties ===\n");
            for (k, v) in props {
                let _ = writeln!(out, "{k} = {v}");
            }
            Ok(CommandReply::text(out))
        }
    }
}

pub(super) fn sysenv(_ctx: &HandlerContext, req: &CommandRequest) -> Result<CommandReply, ConsoleError> {
    if req.args.len() > 1 {
        return Err(ConsoleError::WrongArgumentCount("sysenv".to_string()));
    }
    match req.args.first() {
        Some(key) => {
            let line = match std::env::var(key) {
                Ok(v) => format!("{key} = {v}\n"),
                Err(_) => format!("Environment variable not present: {key}\n"),
            };
            Ok(CommandReply::text(line))
        }
        None => {
            let mut vars: Vec<(String, String)> = std::env::vars().collect();
            vars.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = String::from("\n=== Environment ===\n");
            for (k, v) in vars {
                let _ = writeln!(out, "{k} = {v}");
            }
            Ok(CommandReply::text(out))
        }
    }
}

pub(super) fn connection_stats(ctx: &HandlerContext, _req: &CommandRequest) -> Result<CommandReply, ConsoleError> {
    let stats = ctx.registry.stats();
    let mut out = String::from("\n=== Connections ===\n");
    let _ = writeln!(out, "Active:           {}", stats.active_count);
    let _ = writeln!(out, "  line:           {}", stats.line_count);
    let _ = writeln!(out, "  message:        {}", stats.message_count);
    let _ = writeln!(out, "Total registered: {}", stats.total_registered);
    let _ = writeln!(out, "Total messages:   {}", stats.total_messages);
    let _ = writeln!(
        out,
        "Oldest session:   {}",
        format_duration(stats.oldest_connection_age)
    );
    Ok(CommandReply::text(out))
}

pub(super) fn version(ctx: &HandlerContext, _req: &CommandRequest) -> Result<CommandReply, ConsoleError> {
    let runtime = ctx.provider.runtime();
    Ok(CommandReply::text(format!(
        "procscope {VERSION} (pid {}, {})\n",
        runtime.pid, runtime.os
    )))
}

pub(super) fn quit(_ctx: &HandlerContext, _req: &CommandRequest) -> Result<CommandReply, ConsoleError> {
    Ok(CommandReply {
        close_connection: true,
        ..CommandReply::text("Bye! Closing connection.\n")
    })
}

pub(super) fn clear_screen(_ctx: &HandlerContext, _req: &CommandRequest) -> Result<CommandReply, ConsoleError> {
    // ANSI: erase display, cursor home.
    Ok(CommandReply::text("\x1b[2J\x1b[H"))
}

/// Renders a byte count as B/KB/MB/GB.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes}B")
    } else if b < MB {
        format!("{:.1}KB", b / KB)
    } else if b < GB {
        format!("{:.1}MB", b / MB)
    } else {
        format!("{:.1}GB", b / GB)
    }
}

/// Renders a duration as days/hours/minutes/seconds.
pub fn format_duration(d: std::time::Duration) -> String {
    let seconds = d.as_secs();
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{}d{}h{}m", days, hours % 24, minutes % 60)
    } else if hours > 0 {
        format!("{}h{}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds % 60)
    } else {
        format!("{seconds}s")
    }
}
