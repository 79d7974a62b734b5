// src/server/spawner.rs

//! Spawns the command pool workers and all long-running background tasks,
//! in lifecycle order: worker pool first, then the metrics sampler, then the
//! idle supervisor. Listeners are bound afterwards by the accept loop.

use super::context::ServerContext;
use crate::core::commands::executor;
use crate::core::tasks::{IdleSweeperTask, MetricsSamplerTask, StatusReporterTask};
use anyhow::{Result, anyhow};
use std::sync::Arc;
use tracing::info;

pub fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let state = &ctx.state;
    let shutdown_tx = &ctx.shutdown_tx;

    // --- Command pool ---
    let command_jobs = ctx
        .command_jobs
        .take()
        .ok_or_else(|| anyhow!("command job queue already consumed"))?;
    executor::spawn_workers(
        state.config.limits.command_workers,
        Arc::new(state.handler_context()),
        command_jobs,
        shutdown_tx,
        &mut ctx.command_workers,
    );
    info!(
        "Command pool started with {} worker(s).",
        state.config.limits.command_workers
    );

    // --- Metrics sampler & alerting ---
    let sampler = MetricsSamplerTask::new(state.clone());
    let shutdown_rx_sampler = shutdown_tx.subscribe();
    ctx.background_tasks.spawn(async move {
        sampler.run(shutdown_rx_sampler).await;
        Ok(())
    });

    // --- Idle supervisor ---
    let sweeper = IdleSweeperTask::new(state.clone());
    let shutdown_rx_sweeper = shutdown_tx.subscribe();
    ctx.background_tasks.spawn(async move {
        sweeper.run(shutdown_rx_sweeper).await;
        Ok(())
    });

    // --- Status reporter ---
    let reporter = StatusReporterTask::new(state.clone());
    let shutdown_rx_reporter = shutdown_tx.subscribe();
    ctx.background_tasks.spawn(async move {
        reporter.run(shutdown_rx_reporter).await;
        Ok(())
    });

    info!("All background tasks have been spawned.");
    Ok(())
}
