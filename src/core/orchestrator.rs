//! Run / epoch / trial sequencing.
//!
//! Each training trial hides one slot of a satellite (feature, class name
//! or code name), presents the rest, and lets an alpha cycle settle with the
//! hidden layer as the recall target. Epoch boundaries aggregate per-class
//! error statistics and run the held-out test sweep; once both the shared
//! and unique accuracies reach criterion, a single sleep session runs
//! before the run ends. Cancellation is polled only at trial
//! boundaries: a stop request lands after the in-flight alpha cycle or
//! sleep session, never inside one.

use tracing::info;

use crate::circuit::{Circuit, N_FEATURES};
use crate::engine::{BuildError, EngineConfig, LayerId, LayerRole};
use crate::observer::SimObserver;
use crate::prng::Prng;
use crate::satellites::{Satellite, SatelliteSet, TrialCursor, TRIALS_PER_EPOCH};
use crate::sleep::{SleepConfig, SleepController};
use crate::wake;

pub use crate::satellites::N_SATELLITES;

/// Fraction of training trials that hide a shared slot; the rest hide the
/// unique side.
const SHARED_TRIAL_P: f32 = 0.05;
/// Per-unit tolerance below which a recall difference counts as correct.
const ERROR_TOLERANCE: f32 = 0.5;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunConfig {
    pub max_runs: usize,
    pub max_epochs: usize,
    pub trials_per_epoch: usize,
    /// Consecutive zero-error epochs that end a run; 0 disables the check.
    pub n_zero_stop: usize,
    /// Test every this-many epochs; 0 disables testing (and sleep).
    pub test_interval: usize,
    /// Both class accuracies must reach this before sleep triggers.
    pub accuracy_criterion: f64,
    pub sleep_enabled: bool,
    pub seed: u64,
    pub engine: EngineConfig,
    pub sleep: SleepConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_runs: 30,
            max_epochs: 20,
            trials_per_epoch: TRIALS_PER_EPOCH,
            n_zero_stop: 1,
            test_interval: 1,
            accuracy_criterion: 0.8,
            sleep_enabled: true,
            seed: 1,
            engine: EngineConfig::default(),
            sleep: SleepConfig::default(),
        }
    }
}

/// Which slot of a satellite is hidden for a recall trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HiddenSlot {
    Feature(usize),
    ClassName,
    CodeName,
}

/// Whether the hidden slot carried shared or unique information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialKind {
    Shared,
    Unique,
}

/// Per-class accumulator over one epoch (or one test sweep).
#[derive(Debug, Clone, Default)]
struct ClassAccum {
    trials: usize,
    sum_sse: f64,
    sum_avg_sse: f64,
    sum_cos_diff: f64,
    errors: usize,
}

impl ClassAccum {
    fn add(&mut self, sse: f64, avg_sse: f64, cos_diff: f64) {
        self.trials += 1;
        self.sum_sse += sse;
        self.sum_avg_sse += avg_sse;
        self.sum_cos_diff += cos_diff;
        if sse != 0.0 {
            self.errors += 1;
        }
    }

    /// Epoch statistics, or None when the class saw no trials. A skipped
    /// class never satisfies the accuracy criterion and never divides by
    /// zero.
    fn summarize(&self) -> Option<ClassStats> {
        if self.trials == 0 {
            return None;
        }
        let n = self.trials as f64;
        let pct_err = self.errors as f64 / n;
        Some(ClassStats {
            trials: self.trials,
            sse: self.sum_sse / n,
            avg_sse: self.sum_avg_sse / n,
            pct_err,
            pct_cor: 1.0 - pct_err,
            cos_diff: self.sum_cos_diff / n,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassStats {
    pub trials: usize,
    pub sse: f64,
    pub avg_sse: f64,
    pub pct_err: f64,
    pub pct_cor: f64,
    pub cos_diff: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EpochSummary {
    pub run: usize,
    pub epoch: usize,
    pub shared: Option<ClassStats>,
    pub unique: Option<ClassStats>,
}

impl EpochSummary {
    /// True when both classes have statistics and both accuracies reach the
    /// criterion.
    pub fn reaches(&self, criterion: f64) -> bool {
        matches!(
            (&self.shared, &self.unique),
            (Some(sh), Some(un)) if sh.pct_cor >= criterion && un.pct_cor >= criterion
        )
    }

    /// True when both classes have statistics and both are error-free.
    pub fn zero_error(&self) -> bool {
        matches!(
            (&self.shared, &self.unique),
            (Some(sh), Some(un)) if sh.sse == 0.0 && un.sse == 0.0
        )
    }
}

pub struct Orchestrator {
    pub circuit: Circuit,
    cfg: RunConfig,
    sats: SatelliteSet,
    cursor: TrialCursor,
    rng: Prng,

    run: usize,
    epoch: usize,
    trial: usize,
    finished: bool,
    stop_requested: bool,

    train_shared: ClassAccum,
    train_unique: ClassAccum,
    zero_error_epochs: usize,
    replay_trials_total: u32,

    last_train: Option<EpochSummary>,
    last_test: Option<EpochSummary>,
}

impl Orchestrator {
    pub fn new(cfg: RunConfig) -> Result<Self, BuildError> {
        let mut engine_cfg = cfg.engine;
        engine_cfg.seed = cfg.seed;
        let circuit = Circuit::build(engine_cfg)?;
        let sats = SatelliteSet::generate();
        let cursor = TrialCursor::new(sats.len(), false);
        let rng = Prng::new(cfg.seed).fork(0x5EED);

        let mut orch = Self {
            circuit,
            cfg,
            sats,
            cursor,
            rng,
            run: 0,
            epoch: 0,
            trial: 0,
            finished: false,
            stop_requested: false,
            train_shared: ClassAccum::default(),
            train_unique: ClassAccum::default(),
            zero_error_epochs: 0,
            replay_trials_total: 0,
            last_train: None,
            last_test: None,
        };
        orch.init();
        Ok(orch)
    }

    /// Reset counters and weights for a fresh start of the current run.
    pub fn init(&mut self) {
        self.epoch = 0;
        self.trial = 0;
        self.stop_requested = false;
        self.train_shared = ClassAccum::default();
        self.train_unique = ClassAccum::default();
        self.zero_error_epochs = 0;
        self.circuit.net.reinit_weights();
        self.cursor.init(&mut self.rng);
    }

    pub fn config(&self) -> &RunConfig {
        &self.cfg
    }

    pub fn run_index(&self) -> usize {
        self.run
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn trial(&self) -> usize {
        self.trial
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn replay_trials_total(&self) -> u32 {
        self.replay_trials_total
    }

    pub fn last_train_summary(&self) -> Option<&EpochSummary> {
        self.last_train.as_ref()
    }

    pub fn last_test_summary(&self) -> Option<&EpochSummary> {
        self.last_test.as_ref()
    }

    /// Request cooperative cancellation. Takes effect at the next trial
    /// boundary.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// Run one training presentation, handling the epoch boundary it may
    /// land on.
    pub fn train_trial(&mut self, obs: &mut dyn SimObserver) {
        if self.finished {
            return;
        }

        let item = self.cursor.next_item(&mut self.rng);
        let sat = self.sats.get(item).clone();
        let (slot, kind) = self.choose_hidden(&sat);

        let target = self.slot_layer(slot);
        self.circuit.net.set_layer_role(target, LayerRole::Target);
        self.apply_satellite(&sat);

        wake::run_alpha_cycle(&mut self.circuit, true, obs);

        let (sse, avg_sse) = self.circuit.net.target_error(target, ERROR_TOLERANCE);
        let cos_diff = self.circuit.net.cos_diff(target);
        match kind {
            TrialKind::Shared => self.train_shared.add(sse, avg_sse, cos_diff),
            TrialKind::Unique => self.train_unique.add(sse, avg_sse, cos_diff),
        }

        self.circuit.net.set_layer_role(target, LayerRole::Input);
        self.circuit.net.clear_stimuli();

        self.trial += 1;
        if self.trial >= self.cfg.trials_per_epoch {
            self.finish_epoch(obs);
        }
    }

    /// Run training trials until the current epoch completes or a stop is
    /// requested.
    pub fn train_epoch(&mut self, obs: &mut dyn SimObserver) {
        let run = self.run;
        let epoch = self.epoch;
        while !self.finished && !self.stop_requested && self.run == run && self.epoch == epoch {
            self.train_trial(obs);
        }
        self.stop_requested = false;
    }

    /// Run training trials until the current run completes or a stop is
    /// requested.
    pub fn train_run(&mut self, obs: &mut dyn SimObserver) {
        let run = self.run;
        while !self.finished && !self.stop_requested && self.run == run {
            self.train_trial(obs);
        }
        self.stop_requested = false;
    }

    /// Run every remaining run to completion (or until stopped).
    pub fn train(&mut self, obs: &mut dyn SimObserver) {
        while !self.finished && !self.stop_requested {
            self.train_trial(obs);
        }
        self.stop_requested = false;
    }

    fn finish_epoch(&mut self, obs: &mut dyn SimObserver) {
        let summary = EpochSummary {
            run: self.run,
            epoch: self.epoch,
            shared: self.train_shared.summarize(),
            unique: self.train_unique.summarize(),
        };
        self.train_shared = ClassAccum::default();
        self.train_unique = ClassAccum::default();

        if summary.zero_error() {
            self.zero_error_epochs += 1;
        } else {
            self.zero_error_epochs = 0;
        }

        info!(
            run = self.run,
            epoch = self.epoch,
            shared_cor = summary.shared.map(|s| s.pct_cor),
            unique_cor = summary.unique.map(|s| s.pct_cor),
            "training epoch complete"
        );
        obs.on_epoch(&summary);
        self.last_train = Some(summary);

        self.epoch += 1;
        self.trial = 0;

        if self.cfg.test_interval > 0 && self.epoch % self.cfg.test_interval == 0 {
            let test = self.test_all(obs);
            if test.reaches(self.cfg.accuracy_criterion) {
                if self.cfg.sleep_enabled {
                    self.sleep_session(obs);
                    self.test_all(obs);
                }
                self.end_run();
                return;
            }
        }

        let learned = self.cfg.n_zero_stop > 0 && self.zero_error_epochs >= self.cfg.n_zero_stop;
        if learned || self.epoch >= self.cfg.max_epochs {
            self.end_run();
        }
    }

    fn end_run(&mut self) {
        info!(run = self.run, epochs = self.epoch, "run complete");
        self.run += 1;
        if self.run >= self.cfg.max_runs {
            self.finished = true;
            return;
        }
        // Fresh wiring for the next run, derived from the run index.
        self.rng = Prng::new(self.cfg.seed).fork(self.run as u64);
        self.init();
    }

    /// Sweep every hideable slot of every satellite in recognition mode and
    /// aggregate per-class statistics.
    pub fn test_all(&mut self, obs: &mut dyn SimObserver) -> EpochSummary {
        let mut shared = ClassAccum::default();
        let mut unique = ClassAccum::default();

        for slot_idx in 0..N_FEATURES + 2 {
            let slot = match slot_idx {
                i if i < N_FEATURES => HiddenSlot::Feature(i),
                i if i == N_FEATURES => HiddenSlot::ClassName,
                _ => HiddenSlot::CodeName,
            };
            for item in 0..self.sats.len() {
                let sat = self.sats.get(item).clone();
                let target = self.slot_layer(slot);
                self.circuit.net.set_layer_role(target, LayerRole::Target);
                self.apply_satellite(&sat);

                wake::run_alpha_cycle(&mut self.circuit, false, obs);

                let (sse, avg_sse) = self.circuit.net.target_error(target, ERROR_TOLERANCE);
                let cos_diff = self.circuit.net.cos_diff(target);
                match classify_hidden(&sat, slot) {
                    TrialKind::Shared => shared.add(sse, avg_sse, cos_diff),
                    TrialKind::Unique => unique.add(sse, avg_sse, cos_diff),
                }

                self.circuit.net.set_layer_role(target, LayerRole::Input);
                self.circuit.net.clear_stimuli();
            }
        }

        let summary = EpochSummary {
            run: self.run,
            epoch: self.epoch,
            shared: shared.summarize(),
            unique: unique.summarize(),
        };
        info!(
            run = self.run,
            epoch = self.epoch,
            shared_cor = summary.shared.map(|s| s.pct_cor),
            unique_cor = summary.unique.map(|s| s.pct_cor),
            "test sweep complete"
        );
        self.last_test = Some(summary.clone());
        summary
    }

    fn sleep_session(&mut self, obs: &mut dyn SimObserver) {
        let controller = SleepController::new(self.cfg.sleep.clone());
        let outcome = controller.run_session(&mut self.circuit, obs);
        self.replay_trials_total += outcome.replay_trials;
    }

    /// Pick which slot to hide for a training trial: rarely a shared slot,
    /// usually the unique slot or the code name (prototypes always hide the
    /// code name on unique trials).
    fn choose_hidden(&mut self, sat: &Satellite) -> (HiddenSlot, TrialKind) {
        if self.rng.next_f32() > 1.0 - SHARED_TRIAL_P {
            let mut candidates: Vec<HiddenSlot> = (0..N_FEATURES)
                .filter(|i| Some(*i) != sat.unique_slot)
                .map(HiddenSlot::Feature)
                .collect();
            candidates.push(HiddenSlot::ClassName);
            let pick = self.rng.range_usize(0, candidates.len());
            (candidates[pick], TrialKind::Shared)
        } else {
            match sat.unique_slot {
                None => (HiddenSlot::CodeName, TrialKind::Unique),
                Some(slot) => {
                    if self.rng.next_f32() > 0.5 {
                        (HiddenSlot::Feature(slot), TrialKind::Unique)
                    } else {
                        (HiddenSlot::CodeName, TrialKind::Unique)
                    }
                }
            }
        }
    }

    fn slot_layer(&self, slot: HiddenSlot) -> LayerId {
        match slot {
            HiddenSlot::Feature(i) => self.circuit.features[i],
            HiddenSlot::ClassName => self.circuit.class_name,
            HiddenSlot::CodeName => self.circuit.code_name,
        }
    }

    fn apply_satellite(&mut self, sat: &Satellite) {
        self.circuit.net.clear_stimuli();
        for (i, &ly) in self.circuit.features.iter().enumerate() {
            self.circuit.net.apply_stimulus(ly, &sat.feature_pattern(i));
        }
        self.circuit
            .net
            .apply_stimulus(self.circuit.class_name, &sat.class_pattern());
        self.circuit
            .net
            .apply_stimulus(self.circuit.code_name, &sat.code_pattern());
    }
}

/// A hidden slot is unique information when it is the satellite's deviating
/// slot or the code name; everything else is shared.
pub fn classify_hidden(sat: &Satellite, slot: HiddenSlot) -> TrialKind {
    match slot {
        HiddenSlot::CodeName => TrialKind::Unique,
        HiddenSlot::Feature(i) if sat.unique_slot == Some(i) => TrialKind::Unique,
        _ => TrialKind::Shared,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NullObserver;
    use crate::satellites::SatelliteSet;

    fn small_cfg() -> RunConfig {
        RunConfig {
            max_runs: 1,
            max_epochs: 1,
            trials_per_epoch: 4,
            test_interval: 0,
            sleep_enabled: false,
            n_zero_stop: 0,
            seed: 21,
            ..RunConfig::default()
        }
    }

    #[test]
    fn zero_trial_class_yields_no_stats() {
        let acc = ClassAccum::default();
        assert!(acc.summarize().is_none());

        let summary = EpochSummary {
            run: 0,
            epoch: 0,
            shared: None,
            unique: Some(ClassStats {
                trials: 3,
                sse: 0.0,
                avg_sse: 0.0,
                pct_err: 0.0,
                pct_cor: 1.0,
                cos_diff: 1.0,
            }),
        };
        // A skipped class can satisfy neither the criterion nor the
        // zero-error streak.
        assert!(!summary.reaches(0.8));
        assert!(!summary.zero_error());
    }

    #[test]
    fn class_accum_tracks_errors_and_means() {
        let mut acc = ClassAccum::default();
        acc.add(0.0, 0.0, 1.0);
        acc.add(2.0, 0.5, 0.5);
        let stats = acc.summarize().unwrap();
        assert_eq!(stats.trials, 2);
        assert!((stats.sse - 1.0).abs() < 1e-12);
        assert!((stats.pct_err - 0.5).abs() < 1e-12);
        assert!((stats.pct_cor - 0.5).abs() < 1e-12);
    }

    #[test]
    fn hidden_classification_matches_slot_kind() {
        let set = SatelliteSet::generate();
        let proto = set.iter().find(|s| s.is_prototype()).unwrap();
        let deviant = set.iter().find(|s| !s.is_prototype()).unwrap();
        let u = deviant.unique_slot.unwrap();

        assert_eq!(classify_hidden(proto, HiddenSlot::CodeName), TrialKind::Unique);
        assert_eq!(
            classify_hidden(proto, HiddenSlot::Feature(0)),
            TrialKind::Shared
        );
        assert_eq!(
            classify_hidden(deviant, HiddenSlot::Feature(u)),
            TrialKind::Unique
        );
        assert_eq!(
            classify_hidden(deviant, HiddenSlot::ClassName),
            TrialKind::Shared
        );
    }

    #[test]
    fn prototypes_never_hide_a_feature_on_unique_trials() {
        let mut orch = Orchestrator::new(small_cfg()).unwrap();
        let set = SatelliteSet::generate();
        let proto = set.iter().find(|s| s.is_prototype()).unwrap().clone();
        for _ in 0..200 {
            let (slot, kind) = orch.choose_hidden(&proto);
            if kind == TrialKind::Unique {
                assert_eq!(slot, HiddenSlot::CodeName);
            } else {
                assert_ne!(slot, HiddenSlot::CodeName);
            }
        }
    }

    #[test]
    fn shared_candidates_exclude_the_unique_slot() {
        let mut orch = Orchestrator::new(small_cfg()).unwrap();
        let set = SatelliteSet::generate();
        let deviant = set.iter().find(|s| !s.is_prototype()).unwrap().clone();
        let u = deviant.unique_slot.unwrap();
        for _ in 0..500 {
            let (slot, kind) = orch.choose_hidden(&deviant);
            if kind == TrialKind::Shared {
                assert_ne!(slot, HiddenSlot::Feature(u));
                assert_ne!(slot, HiddenSlot::CodeName);
            }
        }
    }

    #[test]
    fn epoch_boundary_advances_counters_and_restores_roles() {
        let mut orch = Orchestrator::new(small_cfg()).unwrap();
        orch.train_epoch(&mut NullObserver);
        // One run, one epoch: the whole simulation is done.
        assert!(orch.finished());
        assert!(orch.last_train_summary().is_some());
        for &ly in &orch.circuit.peripheral {
            assert_eq!(orch.circuit.net.layer(ly).role(), LayerRole::Input);
        }
    }

    #[test]
    fn stop_request_lands_on_a_trial_boundary() {
        let mut orch = Orchestrator::new(RunConfig {
            trials_per_epoch: 50,
            ..small_cfg()
        })
        .unwrap();
        orch.request_stop();
        orch.train(&mut NullObserver);
        // Stop observed before the epoch could finish.
        assert!(!orch.finished());
        assert_eq!(orch.epoch(), 0);
        assert!(orch.trial() <= 1);
    }

    #[test]
    fn test_sweep_covers_all_slots_and_satellites() {
        let mut orch = Orchestrator::new(small_cfg()).unwrap();
        let summary = orch.test_all(&mut NullObserver);
        let sh = summary.shared.unwrap();
        let un = summary.unique.unwrap();
        assert_eq!(sh.trials + un.trials, (N_FEATURES + 2) * N_SATELLITES);
        // Code name always counts unique; each deviant adds one more.
        assert_eq!(un.trials, N_SATELLITES + 12);
    }
}
