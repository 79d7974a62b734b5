// src/config.rs

//! Manages server configuration: loading, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::info;

/// Limits applied to wire framing and the command execution pool.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LimitsConfig {
    /// Maximum accepted length of a single line on the line protocol, in bytes.
    /// Exceeding it is a protocol violation that closes the connection.
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,
    /// Maximum accepted length of a single frame on the message protocol, in bytes.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
    /// Number of workers in the command execution pool.
    #[serde(default = "default_command_workers")]
    pub command_workers: usize,
    /// Depth of the command job queue. A full queue rejects new commands
    /// instead of blocking the I/O path.
    #[serde(default = "default_command_queue")]
    pub command_queue: usize,
    /// Depth of the per-connection outbound write queue.
    #[serde(default = "default_outbox_depth")]
    pub outbox_depth: usize,
}

fn default_max_line_len() -> usize {
    8 * 1024
}
fn default_max_frame_len() -> usize {
    64 * 1024
}
fn default_command_workers() -> usize {
    4
}
fn default_command_queue() -> usize {
    256
}
fn default_outbox_depth() -> usize {
    64
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_line_len: default_max_line_len(),
            max_frame_len: default_max_frame_len(),
            command_workers: default_command_workers(),
            command_queue: default_command_queue(),
            outbox_depth: default_outbox_depth(),
        }
    }
}

/// Idle handling: the registry sweep plus the per-connection probe policy.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IdleConfig {
    /// How often the idle sweeper walks the registry.
    #[serde(with = "humantime_serde", default = "default_sweep_interval")]
    pub sweep_interval: Duration,
    /// A connection idle for longer than this is evicted by the sweeper.
    #[serde(with = "humantime_serde", default = "default_max_idle")]
    pub max_idle: Duration,
    /// With no inbound traffic for this long, the connection is probed with
    /// a heartbeat line.
    #[serde(with = "humantime_serde", default = "default_read_probe")]
    pub read_probe: Duration,
    /// With no traffic in either direction for this long, the connection is
    /// closed by its adapter.
    #[serde(with = "humantime_serde", default = "default_all_idle")]
    pub all_idle: Duration,
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(5 * 60)
}
fn default_max_idle() -> Duration {
    Duration::from_secs(30 * 60)
}
fn default_read_probe() -> Duration {
    Duration::from_secs(60)
}
fn default_all_idle() -> Duration {
    Duration::from_secs(120)
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            sweep_interval: default_sweep_interval(),
            max_idle: default_max_idle(),
            read_probe: default_read_probe(),
            all_idle: default_all_idle(),
        }
    }
}

/// Health sampling cadence.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SamplerConfig {
    /// How often a metrics snapshot is pulled and the alert rules evaluated.
    #[serde(with = "humantime_serde", default = "default_sample_interval")]
    pub interval: Duration,
    /// How often the one-line server status summary is logged.
    #[serde(with = "humantime_serde", default = "default_status_interval")]
    pub status_interval: Duration,
}

fn default_sample_interval() -> Duration {
    Duration::from_secs(30)
}
fn default_status_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: default_sample_interval(),
            status_interval: default_status_interval(),
        }
    }
}

/// Thresholds for the fixed alerting rule set. A single threshold serves both
/// activation and clearing of each rule.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AlertsConfig {
    /// Heap usage ratio at which the warning alert activates.
    #[serde(default = "default_heap_warning_ratio")]
    pub heap_warning_ratio: f64,
    /// Heap usage ratio at which the critical alert activates.
    #[serde(default = "default_heap_critical_ratio")]
    pub heap_critical_ratio: f64,
    /// Collector time per sample interval, in milliseconds, at which the
    /// gc-time alert activates.
    #[serde(default = "default_gc_time_warning_ms")]
    pub gc_time_warning_ms: u64,
    /// Live thread count at which the thread-count alert activates.
    #[serde(default = "default_thread_count_warning")]
    pub thread_count_warning: u64,
}

fn default_heap_warning_ratio() -> f64 {
    0.80
}
fn default_heap_critical_ratio() -> f64 {
    0.90
}
fn default_gc_time_warning_ms() -> u64 {
    1000
}
fn default_thread_count_warning() -> u64 {
    1000
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            heap_warning_ratio: default_heap_warning_ratio(),
            heap_critical_ratio: default_heap_critical_ratio(),
            gc_time_warning_ms: default_gc_time_warning_ms(),
            thread_count_warning: default_thread_count_warning(),
        }
    }
}

/// Represents the final, validated server configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    /// Listener port for the line-oriented console protocol.
    #[serde(default = "default_line_port")]
    pub line_port: u16,
    /// Listener port for the message-oriented (JSON envelope) protocol.
    #[serde(default = "default_message_port")]
    pub message_port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub idle: IdleConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_line_port() -> u16 {
    3658
}
fn default_message_port() -> u16 {
    8563
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> usize {
    10000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            line_port: default_line_port(),
            message_port: default_message_port(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            limits: LimitsConfig::default(),
            idle: IdleConfig::default(),
            sampler: SamplerConfig::default(),
            alerts: AlertsConfig::default(),
        }
    }
}

impl Config {
    /// Loads and validates the configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        info!("Configuration loaded from '{}'.", path);
        Ok(config)
    }

    /// Rejects configurations the server cannot meaningfully run with.
    pub fn validate(&self) -> Result<()> {
        if self.line_port == self.message_port {
            return Err(anyhow!(
                "line_port and message_port must differ (both are {})",
                self.line_port
            ));
        }
        if self.limits.command_workers == 0 {
            return Err(anyhow!("limits.command_workers must be at least 1"));
        }
        if self.limits.max_line_len == 0 || self.limits.max_frame_len == 0 {
            return Err(anyhow!("frame length limits must be non-zero"));
        }
        if !(0.0..=1.0).contains(&self.alerts.heap_warning_ratio)
            || !(0.0..=1.0).contains(&self.alerts.heap_critical_ratio)
        {
            return Err(anyhow!("alert heap ratios must be within 0.0..=1.0"));
        }
        if self.alerts.heap_warning_ratio > self.alerts.heap_critical_ratio {
            return Err(anyhow!(
                "alerts.heap_warning_ratio must not exceed alerts.heap_critical_ratio"
            ));
        }
        Ok(())
    }
}
