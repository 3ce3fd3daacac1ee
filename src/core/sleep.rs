//! Sleep session controller.
//!
//! A session is long, cue-free settling: stimuli are cleared, every layer is
//! hidden, activations are randomized, and the network evolves from its own
//! recurrent dynamics under a slow inhibitory oscillation. Whenever the
//! oscillation lets the network lock into an attractor and then partially
//! releases it, the phase detector recognizes one replay event and the
//! session commits one contrastive weight update per pathway. A synaptic
//! depression ramp, independent of the replay machinery, drifts effective
//! transmission down over the session and is undone on waking.

use tracing::{debug, info};

use crate::circuit::Circuit;
use crate::engine::LayerRole;
use crate::observer::{SimObserver, SleepStepRecord};
use crate::phase::{PhaseAction, PhaseDetector, DEBOUNCE_LEN, MINUS_THRESHOLD, PLUS_THRESHOLD};
use crate::schedule::{OscillationSchedule, SCHEDULE_LEN};

/// Default session length in steps.
pub const SESSION_STEPS: usize = 30_000;
/// Gain amplification applied to the recurrent attractor drive for the
/// duration of a session.
pub const GAIN_BOOST: f32 = 2.0;
/// Synaptic-depression recovery / depression rates per step.
pub const SD_INCREMENT: f32 = 0.0007;
pub const SD_DECREMENT: f32 = 0.0005;
/// Stall recovery fires when stability drops to this level or below...
pub const STALL_STABILITY: f64 = 0.8;
/// ...after this warm-up window...
pub const STALL_WARMUP: usize = 200;
/// ...on the first this-many steps of every 50-step block.
pub const STALL_BLOCK: usize = 50;
pub const STALL_WINDOW: usize = 5;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SleepConfig {
    pub max_steps: usize,
    pub plus_threshold: f64,
    pub minus_threshold: f64,
    pub debounce: u32,
    /// Apply the inhibitory oscillation schedule.
    pub oscillation: bool,
    /// Ramp effective weights down over the session.
    pub synaptic_depression: bool,
    /// Run the replay phase detector and commit contrastive updates.
    pub learn: bool,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            max_steps: SESSION_STEPS,
            plus_threshold: PLUS_THRESHOLD,
            minus_threshold: MINUS_THRESHOLD,
            debounce: DEBOUNCE_LEN,
            oscillation: true,
            synaptic_depression: true,
            learn: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SleepOutcome {
    pub steps: usize,
    pub replay_trials: u32,
}

pub struct SleepController {
    cfg: SleepConfig,
}

impl SleepController {
    pub fn new(cfg: SleepConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &SleepConfig {
        &self.cfg
    }

    /// Run one full sleep session. Always leaves the circuit awake: gains
    /// and inhibitory baselines restored, peripheral layers back to Input,
    /// effective weights snapped to true weights. This holds even when the
    /// session ends mid-phase, in which case the partial accumulation is
    /// discarded without a weight update.
    pub fn run_session(&self, circ: &mut Circuit, obs: &mut dyn SimObserver) -> SleepOutcome {
        info!(steps = self.cfg.max_steps, "sleep session start");

        let schedule = OscillationSchedule::generate(SCHEDULE_LEN);

        // Free-running setup: no external drive anywhere, random seed state.
        for id in 0..circ.net.layers().len() {
            circ.net.set_layer_role(id, LayerRole::Hidden);
        }
        circ.net.clear_stimuli();
        circ.net.set_target_clamp(false);
        circ.net.randomize_activations();
        circ.net.save_inhib_baselines();

        if self.cfg.synaptic_depression {
            circ.net.init_synaptic_depression(SD_INCREMENT, SD_DECREMENT);
        }

        // Amplify the autonomous attractor drive.
        circ.set_ca3_recurrent_gain(GAIN_BOOST);
        circ.set_ca3_to_ca1_gain(GAIN_BOOST);
        circ.net.recompute_scaling();
        circ.net.reseed_net_input();

        let mut detector = PhaseDetector::new(
            self.cfg.plus_threshold,
            self.cfg.minus_threshold,
            self.cfg.debounce,
        );

        for step in 0..self.cfg.max_steps {
            // Keep effective weights current before activation flows.
            circ.net.commit_pending_weight_deltas();
            circ.net.step(true);

            let (low, high) = if self.cfg.oscillation {
                let (low, high) = schedule.factors(step % schedule.len());
                circ.net.reset_inhib_gains();
                for &ly in &circ.low_group {
                    circ.net.scale_layer_inhib(ly, low as f32);
                }
                for &ly in &circ.high_group {
                    circ.net.scale_layer_inhib(ly, high as f32);
                }
                (low, high)
            } else {
                (1.0, 1.0)
            };

            let stability = circ.net.mean_similarity();

            // Collapsed activity never recovers on its own; reinject noise
            // at the head of each 50-step block once past the warm-up.
            if step > STALL_WARMUP
                && stability <= STALL_STABILITY
                && step % STALL_BLOCK < STALL_WINDOW
            {
                circ.net.randomize_activations();
            }

            if self.cfg.learn {
                match detector.observe(stability) {
                    PhaseAction::None => {}
                    PhaseAction::BeginPlus => {
                        debug!(step, stability, "plus phase begins");
                        circ.net.begin_phase_accum();
                    }
                    PhaseAction::ExtendPlus | PhaseAction::ExtendMinus => {
                        circ.net.continue_phase_accum();
                    }
                    PhaseAction::BeginMinus { plus_len } => {
                        debug!(step, plus_len, "plus phase ends, minus phase begins");
                        circ.net.finalize_plus(plus_len);
                        circ.net.begin_phase_accum();
                    }
                    PhaseAction::CompleteCycle { minus_len } => {
                        circ.net.finalize_minus(minus_len);
                        circ.net.accumulate_weight_deltas(1.0);
                        debug!(
                            step,
                            minus_len,
                            trials = detector.replay_trials(),
                            "minus phase ends, replay update committed"
                        );
                        obs.on_replay_trial(detector.replay_trials());
                    }
                    PhaseAction::AbortCycle => {
                        debug!(step, stability, "plus phase aborted");
                    }
                }
            }

            let record = SleepStepRecord {
                step,
                stability,
                low_factor: low,
                high_factor: high,
                layer_sims: (0..circ.net.layers().len())
                    .map(|ly| {
                        let s = circ.net.similarity(ly);
                        if s.is_nan() {
                            0.0
                        } else {
                            s
                        }
                    })
                    .collect(),
            };
            obs.on_sleep_step(&circ.net, &record);
        }

        // Teardown: any partial phase is discarded (no update was issued for
        // it), then every gated pathway and inhibitory gain goes back to
        // baseline before waking.
        circ.set_per_to_ca1_gain(1.0);
        circ.set_ca1_to_per_gain(1.0);
        circ.set_per_to_dg_gain(1.0);
        circ.set_ca3_recurrent_gain(1.0);
        circ.set_ca3_to_ca1_gain(1.0);
        circ.net.recompute_scaling();
        circ.net.reseed_net_input();
        circ.net.reset_inhib_gains();

        back_to_wake(circ);

        let outcome = SleepOutcome {
            steps: self.cfg.max_steps,
            replay_trials: detector.replay_trials(),
        };
        info!(
            steps = outcome.steps,
            replay_trials = outcome.replay_trials,
            "sleep session end"
        );
        outcome
    }
}

/// Wake transition: effective weights snap back to true weights and the
/// peripheral layers become inputs again. Runs exactly once per session,
/// whatever happened inside it.
pub fn back_to_wake(circ: &mut Circuit) {
    circ.net.end_synaptic_depression();
    for &ly in &circ.peripheral {
        circ.net.set_layer_role(ly, LayerRole::Input);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineConfig, Network};
    use crate::observer::NullObserver;

    fn short_session(steps: usize) -> SleepConfig {
        SleepConfig {
            max_steps: steps,
            ..SleepConfig::default()
        }
    }

    struct StabilityProbe {
        stabilities: Vec<f64>,
        factors: Vec<(f64, f64)>,
    }

    impl SimObserver for StabilityProbe {
        fn on_sleep_step(&mut self, _net: &Network, record: &SleepStepRecord) {
            self.stabilities.push(record.stability);
            self.factors.push((record.low_factor, record.high_factor));
        }
    }

    #[test]
    fn stability_is_finite_every_step() {
        let mut circ = Circuit::build(EngineConfig::default()).unwrap();
        let mut probe = StabilityProbe {
            stabilities: Vec::new(),
            factors: Vec::new(),
        };
        SleepController::new(short_session(300)).run_session(&mut circ, &mut probe);
        assert_eq!(probe.stabilities.len(), 300);
        assert!(probe.stabilities.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn oscillation_factors_follow_the_schedule() {
        let mut circ = Circuit::build(EngineConfig::default()).unwrap();
        let mut probe = StabilityProbe {
            stabilities: Vec::new(),
            factors: Vec::new(),
        };
        SleepController::new(short_session(50)).run_session(&mut circ, &mut probe);
        let sched = OscillationSchedule::generate(50);
        for (i, &(lo, hi)) in probe.factors.iter().enumerate() {
            let (elo, ehi) = sched.factors(i);
            assert!((lo - elo).abs() < 1e-12 && (hi - ehi).abs() < 1e-12);
        }
    }

    #[test]
    fn session_restores_gains_roles_and_effective_weights() {
        let mut circ = Circuit::build(EngineConfig::default()).unwrap();
        let gi_before: Vec<f32> = circ
            .net
            .layers()
            .iter()
            .map(|l| l.inhib_gain())
            .collect();

        SleepController::new(short_session(200)).run_session(&mut circ, &mut NullObserver);

        for &p in circ
            .per_to_ca1
            .iter()
            .chain(&circ.ca1_to_per)
            .chain(&circ.per_to_dg)
        {
            assert_eq!(circ.net.pathway_gain(p), 1.0);
        }
        assert_eq!(circ.net.pathway_gain(circ.ca3_to_ca3), 1.0);
        assert_eq!(circ.net.pathway_gain(circ.ca3_to_ca1), 1.0);

        for (ly, &gi) in circ.net.layers().iter().zip(&gi_before) {
            assert_eq!(ly.inhib_gain(), gi, "inhib gain not restored: {}", ly.name());
        }

        for &ly in &circ.peripheral {
            assert_eq!(circ.net.layer(ly).role(), LayerRole::Input);
        }
        assert!(!circ.net.synaptic_depression_active());
        for pw in circ.net.pathways() {
            assert_eq!(pw.effective_weights(), pw.weights());
        }
    }

    #[test]
    fn disabling_learning_freezes_weights() {
        let mut circ = Circuit::build(EngineConfig::default()).unwrap();
        let before: Vec<Vec<f32>> = circ
            .net
            .pathways()
            .iter()
            .map(|p| p.weights().to_vec())
            .collect();
        let cfg = SleepConfig {
            learn: false,
            synaptic_depression: false,
            ..short_session(200)
        };
        SleepController::new(cfg).run_session(&mut circ, &mut NullObserver);
        for (pw, wts) in circ.net.pathways().iter().zip(&before) {
            assert_eq!(pw.weights(), &wts[..]);
        }
    }

    #[test]
    fn replay_count_matches_observer_notifications() {
        struct ReplayCount(u32);
        impl SimObserver for ReplayCount {
            fn on_replay_trial(&mut self, completed: u32) {
                self.0 = completed;
            }
        }
        let mut circ = Circuit::build(EngineConfig::default()).unwrap();
        let mut obs = ReplayCount(0);
        let outcome =
            SleepController::new(short_session(500)).run_session(&mut circ, &mut obs);
        assert_eq!(outcome.replay_trials, obs.0);
    }
}
