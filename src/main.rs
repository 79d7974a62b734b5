// src/main.rs

//! The main entry point for the procscope console server.

use anyhow::Result;
use procscope::config::Config;
use procscope::server;
use std::env;
use std::path::Path;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    // Define version information.
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    // Collect command-line arguments to decide the execution mode.
    let args: Vec<String> = env::args().collect();

    // Handle the --version flag.
    if args.contains(&"--version".to_string()) {
        println!("procscope version {VERSION}");
        return Ok(());
    }

    // Determine the configuration path. It can be provided via a --config
    // flag; otherwise, it defaults to "config.toml".
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("config.toml");

    // A console is often embedded next to the process it watches, so a
    // missing default config file is not fatal; explicit parse errors are.
    let mut config = if Path::new(config_path).exists() {
        match Config::from_file(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration from \"{config_path}\": {e}");
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    // Override the listener ports if provided as command-line arguments.
    if let Some(port) = port_override(&args, "--line-port") {
        config.line_port = port;
    }
    if let Some(port) = port_override(&args, "--message-port") {
        config.message_port = port;
    }

    // Setup logging. The RUST_LOG environment variable overrides the
    // configured level.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .compact()
        .with_ansi(true)
        .init();

    if !Path::new(config_path).exists() {
        warn!(
            "No config file at \"{}\"; starting with built-in defaults.",
            config_path
        );
    }

    info!("Starting procscope diagnostic console v{VERSION} (pid {}).", std::process::id());

    if let Err(e) = server::run(config).await {
        error!("Server runtime error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// Reads a `--flag <port>` pair from the argument list, exiting with a usage
/// error when the value is missing or unparsable.
fn port_override(args: &[String], flag: &str) -> Option<u16> {
    let index = args.iter().position(|arg| arg == flag)?;
    match args.get(index + 1) {
        Some(value) => match value.parse::<u16>() {
            Ok(port) => Some(port),
            Err(_) => {
                eprintln!("Invalid port number: {value}");
                std::process::exit(1);
            }
        },
        None => {
            eprintln!("{flag} flag requires a value");
            std::process::exit(1);
        }
    }
}
