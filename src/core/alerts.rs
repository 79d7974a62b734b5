// src/core/alerts.rs

//! Threshold alerting over sampled process health.
//!
//! A fixed rule set is evaluated against each sample. Every rule owns one
//! `AlertState`; a rule that is true while inactive activates and emits an
//! event, a rule that is false while active clears silently, and repeated
//! true evaluations while active emit nothing. The same threshold serves
//! activation and clearing.
//!
//! The engine is owned by the sampler task alone and needs no external
//! synchronization. Evaluation never fails: a rule whose inputs are missing
//! for a cycle is left untouched ("unknown").

use crate::config::AlertsConfig;

/// Severity attached to an emitted alert event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// One raised alert, delivered to the log and the notification hook.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub rule: &'static str,
    pub severity: AlertSeverity,
    /// The observed value that breached the rule.
    pub value: f64,
    pub message: String,
}

/// Derived inputs for one evaluation cycle. `None` fields mark readings that
/// could not be derived this cycle (provider fault, no previous snapshot).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleObservation {
    /// Heap usage as a fraction of the ceiling.
    pub heap_ratio: Option<f64>,
    /// Collector time spent since the previous sample, in milliseconds.
    pub gc_time_delta_ms: Option<u64>,
    /// Collections run since the previous sample.
    pub gc_count_delta: Option<u64>,
    pub thread_count: Option<u64>,
    pub deadlocked: Option<u64>,
}

/// Three-valued outcome of checking one rule against one observation.
#[derive(Debug, Clone, Copy, PartialEq)]
enum RuleVerdict {
    Breached(f64),
    Clear(f64),
    Unknown,
}

/// The live state of one named rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertState {
    pub rule: &'static str,
    pub active: bool,
    /// The most recent value the rule could be evaluated against.
    pub last_value: Option<f64>,
}

struct Rule {
    key: &'static str,
    severity: AlertSeverity,
    check: fn(&SampleObservation, &AlertsConfig) -> RuleVerdict,
    describe: fn(f64, &AlertsConfig) -> String,
}

fn ratio_verdict(value: Option<f64>, threshold: f64) -> RuleVerdict {
    match value {
        Some(v) if v >= threshold => RuleVerdict::Breached(v),
        Some(v) => RuleVerdict::Clear(v),
        None => RuleVerdict::Unknown,
    }
}

fn count_verdict(value: Option<u64>, threshold: u64) -> RuleVerdict {
    match value {
        Some(v) if v >= threshold => RuleVerdict::Breached(v as f64),
        Some(v) => RuleVerdict::Clear(v as f64),
        None => RuleVerdict::Unknown,
    }
}

static RULES: &[Rule] = &[
    Rule {
        key: "heap-warning",
        severity: AlertSeverity::Warning,
        check: |obs, cfg| ratio_verdict(obs.heap_ratio, cfg.heap_warning_ratio),
        describe: |v, cfg| {
            format!(
                "Heap usage at {:.1}% (threshold {:.1}%)",
                v * 100.0,
                cfg.heap_warning_ratio * 100.0
            )
        },
    },
    Rule {
        key: "heap-critical",
        severity: AlertSeverity::Critical,
        check: |obs, cfg| ratio_verdict(obs.heap_ratio, cfg.heap_critical_ratio),
        describe: |v, cfg| {
            format!(
                "Heap usage at {:.1}% (threshold {:.1}%)",
                v * 100.0,
                cfg.heap_critical_ratio * 100.0
            )
        },
    },
    Rule {
        key: "gc-time",
        severity: AlertSeverity::Warning,
        check: |obs, cfg| {
            count_verdict(obs.gc_time_delta_ms, cfg.gc_time_warning_ms.max(1))
        },
        describe: |v, cfg| {
            format!(
                "Collector time {}ms over the last interval (threshold {}ms)",
                v as u64, cfg.gc_time_warning_ms
            )
        },
    },
    Rule {
        key: "thread-count",
        severity: AlertSeverity::Warning,
        check: |obs, cfg| count_verdict(obs.thread_count, cfg.thread_count_warning),
        describe: |v, cfg| {
            format!(
                "Live thread count {} (threshold {})",
                v as u64, cfg.thread_count_warning
            )
        },
    },
    Rule {
        key: "deadlock",
        severity: AlertSeverity::Critical,
        check: |obs, _| count_verdict(obs.deadlocked, 1),
        describe: |v, _| format!("{} deadlocked thread(s) detected", v as u64),
    },
];

/// Evaluates the fixed rule set and tracks per-rule activation state.
pub struct AlertEngine {
    thresholds: AlertsConfig,
    states: Vec<AlertState>,
}

impl AlertEngine {
    pub fn new(thresholds: AlertsConfig) -> Self {
        let states = RULES
            .iter()
            .map(|rule| AlertState {
                rule: rule.key,
                active: false,
                last_value: None,
            })
            .collect();
        Self { thresholds, states }
    }

    /// Runs one evaluation cycle and returns the newly activated alerts.
    /// Clearing is silent; a rule already active emits nothing.
    pub fn evaluate(&mut self, obs: &SampleObservation) -> Vec<AlertEvent> {
        let mut events = Vec::new();
        for (rule, state) in RULES.iter().zip(self.states.iter_mut()) {
            match (rule.check)(obs, &self.thresholds) {
                RuleVerdict::Breached(value) => {
                    state.last_value = Some(value);
                    if !state.active {
                        state.active = true;
                        events.push(AlertEvent {
                            rule: rule.key,
                            severity: rule.severity,
                            value,
                            message: (rule.describe)(value, &self.thresholds),
                        });
                    }
                }
                RuleVerdict::Clear(value) => {
                    state.last_value = Some(value);
                    state.active = false;
                }
                RuleVerdict::Unknown => {}
            }
        }
        events
    }

    pub fn state(&self, rule: &str) -> Option<&AlertState> {
        self.states.iter().find(|s| s.rule == rule)
    }

    pub fn states(&self) -> &[AlertState] {
        &self.states
    }
}
