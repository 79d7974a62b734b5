// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;

mod accept_loop;
mod context;
mod initialization;
mod spawner;

/// The main server startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    // 1. Initialize server state and the command pool plumbing.
    let mut server_context = initialization::setup(config)?;

    // 2. Spawn the command workers and all background tasks.
    spawner::spawn_all(&mut server_context)?;

    // 3. Bind the listeners and run the accept loop until shutdown.
    accept_loop::run(server_context).await
}
