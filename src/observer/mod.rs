//! Read-only observation of a running simulation.
//!
//! Observers cannot mutate or steer the simulation: every hook receives a
//! shared reference and default implementations are no-ops, so the core
//! loops pay nothing for an observer that ignores them. Front ends (CLI,
//! plotting pipelines, tests) implement the subset they care about.

use crate::engine::Network;
use crate::orchestrator::EpochSummary;

/// One sleep step as seen by external logging/plotting consumers.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SleepStepRecord {
    pub step: usize,
    /// Mean NaN-clamped layer similarity, the replay controller's input.
    pub stability: f64,
    pub low_factor: f64,
    pub high_factor: f64,
    /// Per-layer similarity, NaN-clamped, in layer order.
    pub layer_sims: Vec<f32>,
}

pub trait SimObserver {
    fn on_cycle_start(&mut self, _net: &Network, _train: bool) {}
    fn on_wake_step(&mut self, _net: &Network, _quarter: usize, _step: usize) {}
    fn on_quarter(&mut self, _net: &Network, _quarter: usize) {}
    fn on_cycle_end(&mut self, _net: &Network, _train: bool) {}
    fn on_sleep_step(&mut self, _net: &Network, _record: &SleepStepRecord) {}
    /// Fired once per completed replay cycle with the running count.
    fn on_replay_trial(&mut self, _completed: u32) {}
    fn on_epoch(&mut self, _summary: &EpochSummary) {}
}

/// Observes nothing.
pub struct NullObserver;

impl SimObserver for NullObserver {}

/// Streams sleep-step records as JSON lines for external plotting.
#[cfg(feature = "serde")]
pub struct JsonlRecorder<W: std::io::Write> {
    out: W,
    /// Emit every n-th record; per-step output is rarely wanted at full rate.
    every: usize,
}

#[cfg(feature = "serde")]
impl<W: std::io::Write> JsonlRecorder<W> {
    pub fn new(out: W, every: usize) -> Self {
        Self {
            out,
            every: every.max(1),
        }
    }
}

#[cfg(feature = "serde")]
impl<W: std::io::Write> SimObserver for JsonlRecorder<W> {
    fn on_sleep_step(&mut self, _net: &Network, record: &SleepStepRecord) {
        if record.step % self.every != 0 {
            return;
        }
        if let Ok(line) = serde_json::to_string(record) {
            let _ = writeln!(self.out, "{line}");
        }
    }
}

/// Fans one event stream out to two observers.
pub struct Tee<'a, A: SimObserver, B: SimObserver> {
    pub first: &'a mut A,
    pub second: &'a mut B,
}

impl<A: SimObserver, B: SimObserver> SimObserver for Tee<'_, A, B> {
    fn on_cycle_start(&mut self, net: &Network, train: bool) {
        self.first.on_cycle_start(net, train);
        self.second.on_cycle_start(net, train);
    }
    fn on_wake_step(&mut self, net: &Network, quarter: usize, step: usize) {
        self.first.on_wake_step(net, quarter, step);
        self.second.on_wake_step(net, quarter, step);
    }
    fn on_quarter(&mut self, net: &Network, quarter: usize) {
        self.first.on_quarter(net, quarter);
        self.second.on_quarter(net, quarter);
    }
    fn on_cycle_end(&mut self, net: &Network, train: bool) {
        self.first.on_cycle_end(net, train);
        self.second.on_cycle_end(net, train);
    }
    fn on_sleep_step(&mut self, net: &Network, record: &SleepStepRecord) {
        self.first.on_sleep_step(net, record);
        self.second.on_sleep_step(net, record);
    }
    fn on_replay_trial(&mut self, completed: u32) {
        self.first.on_replay_trial(completed);
        self.second.on_replay_trial(completed);
    }
    fn on_epoch(&mut self, summary: &EpochSummary) {
        self.first.on_epoch(summary);
        self.second.on_epoch(summary);
    }
}
