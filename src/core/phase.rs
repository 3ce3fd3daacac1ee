//! Replay phase detection over the network stability signal.
//!
//! During sleep the network drifts between attractors on its own. The
//! detector watches the mean layer similarity for the signature of one
//! replay event: a debounced run of near-perfect stability (plus phase),
//! a partial destabilization into an intermediate band (minus phase), and
//! a final collapse below the lower threshold, at which point one
//! contrastive weight update is due. A collapse straight out of the plus
//! phase aborts the cycle without any update.
//!
//! The detector never touches the network; it emits a [`PhaseAction`] per
//! observed stability value and the sleep controller maps actions onto
//! engine calls. Invariant: `plus_threshold > minus_threshold`.

/// Default upper stability threshold for entering a plus phase.
pub const PLUS_THRESHOLD: f64 = 0.9999938129217251 + 0.0000055;
/// Default lower stability threshold; crossing below it ends a cycle.
pub const MINUS_THRESHOLD: f64 = 0.9999938129217251 - 0.001;
/// Consecutive qualifying steps required before a plus phase begins.
pub const DEBOUNCE_LEN: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Settling,
    Plus,
    Minus,
}

/// What the controller must do in response to one stability observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseAction {
    None,
    /// Stability held above the plus threshold for the debounce length:
    /// start plus-phase accumulation from this step.
    BeginPlus,
    /// Still in the plus phase: add this step to the running sum.
    ExtendPlus,
    /// Stability entered the intermediate band: finalize the plus average
    /// over `plus_len` steps and start minus-phase accumulation.
    BeginMinus { plus_len: u32 },
    /// Still in the minus phase: add this step to the running sum.
    ExtendMinus,
    /// Stability collapsed below the minus threshold: finalize the minus
    /// average over `minus_len` steps and issue one contrastive update.
    CompleteCycle { minus_len: u32 },
    /// Stability collapsed straight out of the plus phase: discard the
    /// partial accumulation, no update.
    AbortCycle,
}

#[derive(Debug, Clone)]
pub struct PhaseDetector {
    plus_threshold: f64,
    minus_threshold: f64,
    debounce: u32,

    phase: Phase,
    stable_count: u32,
    plus_len: u32,
    minus_len: u32,
    replay_trials: u32,
}

impl PhaseDetector {
    pub fn new(plus_threshold: f64, minus_threshold: f64, debounce: u32) -> Self {
        debug_assert!(plus_threshold > minus_threshold);
        Self {
            plus_threshold,
            minus_threshold,
            debounce: debounce.max(1),
            phase: Phase::Settling,
            stable_count: 0,
            plus_len: 0,
            minus_len: 0,
            replay_trials: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Completed plus→minus cycles so far.
    pub fn replay_trials(&self) -> u32 {
        self.replay_trials
    }

    pub fn stable_count(&self) -> u32 {
        self.stable_count
    }

    /// Back to Settling with all counters cleared; the replay-trial count
    /// is preserved.
    pub fn reset(&mut self) {
        self.phase = Phase::Settling;
        self.stable_count = 0;
        self.plus_len = 0;
        self.minus_len = 0;
    }

    pub fn observe(&mut self, stability: f64) -> PhaseAction {
        match self.phase {
            Phase::Settling => {
                if stability >= self.plus_threshold {
                    self.stable_count += 1;
                    if self.stable_count == self.debounce {
                        self.stable_count = 0;
                        self.minus_len = 0;
                        self.plus_len = 1;
                        self.phase = Phase::Plus;
                        return PhaseAction::BeginPlus;
                    }
                } else {
                    self.stable_count = 0;
                }
                PhaseAction::None
            }
            Phase::Plus => {
                if stability >= self.plus_threshold {
                    self.plus_len += 1;
                    PhaseAction::ExtendPlus
                } else if stability >= self.minus_threshold {
                    let plus_len = self.plus_len;
                    self.plus_len = 0;
                    self.minus_len = 1;
                    self.phase = Phase::Minus;
                    PhaseAction::BeginMinus { plus_len }
                } else {
                    self.reset();
                    PhaseAction::AbortCycle
                }
            }
            Phase::Minus => {
                if stability >= self.minus_threshold {
                    self.minus_len += 1;
                    PhaseAction::ExtendMinus
                } else {
                    let minus_len = self.minus_len;
                    self.reset();
                    self.replay_trials += 1;
                    PhaseAction::CompleteCycle { minus_len }
                }
            }
        }
    }
}

impl Default for PhaseDetector {
    fn default() -> Self {
        Self::new(PLUS_THRESHOLD, MINUS_THRESHOLD, DEBOUNCE_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HIGH: f64 = 0.99999999; // above PLUS_THRESHOLD
    const BAND: f64 = 0.9995; // in [MINUS_THRESHOLD, PLUS_THRESHOLD)
    const LOW: f64 = 0.99; // below MINUS_THRESHOLD

    fn feed(det: &mut PhaseDetector, trace: &[f64]) -> Vec<PhaseAction> {
        trace.iter().map(|&s| det.observe(s)).collect()
    }

    #[test]
    fn thresholds_order_band_values() {
        assert!(HIGH >= PLUS_THRESHOLD);
        assert!(BAND < PLUS_THRESHOLD && BAND >= MINUS_THRESHOLD);
        assert!(LOW < MINUS_THRESHOLD);
    }

    #[test]
    fn plus_begins_on_fifth_qualifying_step_not_earlier() {
        let mut det = PhaseDetector::default();
        for _ in 0..4 {
            assert_eq!(det.observe(HIGH), PhaseAction::None);
            assert_eq!(det.phase(), Phase::Settling);
        }
        assert_eq!(det.observe(HIGH), PhaseAction::BeginPlus);
        assert_eq!(det.phase(), Phase::Plus);
    }

    #[test]
    fn disqualifying_step_resets_the_debounce_counter() {
        let mut det = PhaseDetector::default();
        feed(&mut det, &[HIGH, HIGH, HIGH, HIGH]);
        assert_eq!(det.observe(BAND), PhaseAction::None);
        assert_eq!(det.phase(), Phase::Settling);
        assert_eq!(det.stable_count(), 0);
        // The run must start over from scratch.
        let actions = feed(&mut det, &[HIGH, HIGH, HIGH, HIGH, HIGH]);
        assert_eq!(actions[4], PhaseAction::BeginPlus);
        assert!(actions[..4].iter().all(|a| *a == PhaseAction::None));
    }

    #[test]
    fn plus_to_minus_requires_the_intermediate_band() {
        let mut det = PhaseDetector::default();
        feed(&mut det, &[HIGH; 5]);
        assert_eq!(det.observe(HIGH), PhaseAction::ExtendPlus);
        assert_eq!(
            det.observe(BAND),
            PhaseAction::BeginMinus { plus_len: 2 }
        );
        assert_eq!(det.phase(), Phase::Minus);
    }

    #[test]
    fn plus_length_counts_entry_and_extensions() {
        let mut det = PhaseDetector::default();
        feed(&mut det, &[HIGH; 5]); // BeginPlus on the 5th (plus_len = 1)
        feed(&mut det, &[HIGH; 3]); // three extensions
        assert_eq!(
            det.observe(BAND),
            PhaseAction::BeginMinus { plus_len: 4 }
        );
    }

    #[test]
    fn minus_completion_counts_one_replay_trial() {
        let mut det = PhaseDetector::default();
        feed(&mut det, &[HIGH; 5]);
        det.observe(BAND); // into Minus, minus_len = 1
        assert_eq!(det.observe(BAND), PhaseAction::ExtendMinus);
        assert_eq!(
            det.observe(LOW),
            PhaseAction::CompleteCycle { minus_len: 2 }
        );
        assert_eq!(det.phase(), Phase::Settling);
        assert_eq!(det.replay_trials(), 1);
    }

    #[test]
    fn direct_collapse_from_plus_aborts_without_update() {
        let mut det = PhaseDetector::default();
        feed(&mut det, &[HIGH; 5]);
        assert_eq!(det.observe(LOW), PhaseAction::AbortCycle);
        assert_eq!(det.phase(), Phase::Settling);
        assert_eq!(det.replay_trials(), 0);
        assert_eq!(det.stable_count(), 0);
    }

    #[test]
    fn full_cycle_end_to_end_trace() {
        // Rise above T+ for 5 steps, hold the band for N, then collapse.
        let mut det = PhaseDetector::default();
        let mut trace = vec![BAND, LOW];
        trace.extend([HIGH; 5]);
        trace.extend([BAND; 7]);
        trace.push(LOW);
        let actions = feed(&mut det, &trace);
        let completes = actions
            .iter()
            .filter(|a| matches!(a, PhaseAction::CompleteCycle { .. }))
            .count();
        assert_eq!(completes, 1);
        assert_eq!(det.replay_trials(), 1);
        assert_eq!(
            *actions.last().unwrap(),
            PhaseAction::CompleteCycle { minus_len: 7 }
        );
    }

    #[test]
    fn aborted_trace_yields_no_cycles() {
        let mut det = PhaseDetector::default();
        let mut trace = vec![];
        trace.extend([HIGH; 5]);
        trace.push(LOW); // skip the band entirely
        trace.extend([HIGH; 5]);
        trace.push(LOW);
        let actions = feed(&mut det, &trace);
        assert!(actions
            .iter()
            .all(|a| !matches!(a, PhaseAction::CompleteCycle { .. })));
        assert_eq!(det.replay_trials(), 0);
    }

    #[test]
    fn detector_recycles_across_multiple_cycles() {
        let mut det = PhaseDetector::default();
        for _ in 0..3 {
            feed(&mut det, &[HIGH; 5]);
            feed(&mut det, &[BAND; 2]);
            det.observe(LOW);
        }
        assert_eq!(det.replay_trials(), 3);
    }
}
