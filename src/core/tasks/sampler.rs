// src/core/tasks/sampler.rs

//! The metrics sampler and alerting driver.
//!
//! On a fixed interval the task pulls a snapshot from the metrics provider,
//! derives rates against the immediately previous snapshot (no deeper
//! history is kept), and runs the alert rule set. A provider fault degrades
//! the cycle to unknown readings without stopping the sampler.

use crate::core::alerts::{AlertEngine, AlertSeverity, SampleObservation};
use crate::core::commands::handlers::format_bytes;
use crate::core::metrics::MetricsSnapshot;
use crate::core::state::ServerState;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{error, info, warn};

pub struct MetricsSamplerTask {
    state: Arc<ServerState>,
}

impl MetricsSamplerTask {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let sample_interval = self.state.config.sampler.interval;
        info!("Metrics sampler started (interval {:?}).", sample_interval);

        let mut engine = AlertEngine::new(self.state.config.alerts.clone());
        let mut previous: Option<(Instant, MetricsSnapshot)> = None;
        let mut interval = tokio::time::interval(sample_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sample_once(&mut engine, &mut previous);
                }
                _ = shutdown_rx.recv() => {
                    info!("Metrics sampler shutting down.");
                    return;
                }
            }
        }
    }

    fn sample_once(
        &self,
        engine: &mut AlertEngine,
        previous: &mut Option<(Instant, MetricsSnapshot)>,
    ) {
        let now = Instant::now();
        let observation = match self.state.provider.snapshot() {
            Ok(snapshot) => {
                let (gc_time_delta_ms, gc_count_delta) = match previous.as_ref() {
                    Some((_, prev)) => (
                        Some(
                            snapshot
                                .total_gc_time_ms()
                                .saturating_sub(prev.total_gc_time_ms()),
                        ),
                        Some(
                            snapshot
                                .total_gc_count()
                                .saturating_sub(prev.total_gc_count()),
                        ),
                    ),
                    None => (None, None),
                };

                log_sample(&snapshot, gc_count_delta, gc_time_delta_ms);

                let observation = SampleObservation {
                    heap_ratio: snapshot.heap_usage_ratio(),
                    gc_time_delta_ms,
                    gc_count_delta,
                    thread_count: Some(snapshot.threads.count),
                    deadlocked: Some(snapshot.threads.deadlocked),
                };
                *previous = Some((now, snapshot));
                observation
            }
            Err(e) => {
                // Keep the last good snapshot; every rule degrades to
                // unknown for this cycle.
                warn!("Metrics snapshot failed, degrading this cycle: {}", e);
                SampleObservation::default()
            }
        };

        for event in engine.evaluate(&observation) {
            match event.severity {
                AlertSeverity::Critical => {
                    error!("ALERT [{}]: {}", event.rule, event.message);
                }
                AlertSeverity::Warning => {
                    warn!("ALERT [{}]: {}", event.rule, event.message);
                }
            }
            // Listener presence is optional.
            let _ = self.state.alert_events.send(event);
        }
    }
}

fn log_sample(
    snapshot: &MetricsSnapshot,
    gc_count_delta: Option<u64>,
    gc_time_delta_ms: Option<u64>,
) {
    let heap = match snapshot.heap.max {
        Some(max) => format!(
            "{}/{} ({:.1}%)",
            format_bytes(snapshot.heap.used),
            format_bytes(max),
            snapshot.heap_usage_ratio().unwrap_or(0.0) * 100.0
        ),
        None => format_bytes(snapshot.heap.used),
    };
    let recent_gc = match (gc_count_delta, gc_time_delta_ms) {
        (Some(count), Some(time)) => format!(", recent gc {count}x/{time}ms"),
        _ => String::new(),
    };
    info!(
        "Sample: heap {} | gc {}x/{}ms{} | threads {}",
        heap,
        snapshot.total_gc_count(),
        snapshot.total_gc_time_ms(),
        recent_gc,
        snapshot.threads.count
    );
}
