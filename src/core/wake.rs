//! Waking alpha-cycle controller.
//!
//! One stimulus presentation settles over exactly 100 engine steps in 4
//! quarters of 25. Two pathway-gain knobs alternate what drives CA1: the
//! direct peripheral inputs or CA3 recall. In training mode the middle
//! quarters hand CA1 to CA3 so the hippocampal loop must reconstruct the
//! pattern; recognition (non-training) leaves both drives on throughout.
//! Every gain change invalidates the cached input scaling, so the
//! controller recomputes scaling and reseeds the net-input accumulators at
//! each boundary.

use crate::circuit::Circuit;
use crate::observer::SimObserver;

pub const QUARTER_STEPS: usize = 25;
pub const QUARTERS: usize = 4;
pub const CYCLE_STEPS: usize = QUARTER_STEPS * QUARTERS;

/// Run one alpha cycle. Stimuli must already be applied to the circuit.
///
/// In training mode this commits the previous presentation's weight deltas
/// before settling and accumulates a fresh contrastive delta at the end; in
/// recognition mode no weight state changes at all.
pub fn run_alpha_cycle(circ: &mut Circuit, train: bool, obs: &mut dyn SimObserver) {
    if train {
        circ.net.commit_pending_weight_deltas();
    }

    circ.set_per_to_ca1_gain(1.0);
    circ.set_ca3_to_ca1_gain(if train { 0.0 } else { 1.0 });
    circ.net.recompute_scaling();
    circ.net.reseed_net_input();
    circ.net.set_target_clamp(false);

    obs.on_cycle_start(&circ.net, train);

    for qtr in 0..QUARTERS {
        if qtr == QUARTERS - 1 {
            // Plus-phase quarter: target layers clamp to their patterns.
            circ.net.set_target_clamp(true);
        }
        for step in 0..QUARTER_STEPS {
            circ.net.step(false);
            obs.on_wake_step(&circ.net, qtr, step);
        }

        match qtr {
            0 => {
                // Quarters 2-3: CA1 driven by CA3 recall alone.
                if train {
                    circ.set_per_to_ca1_gain(0.0);
                    circ.set_ca3_to_ca1_gain(1.0);
                }
                circ.net.recompute_scaling();
                circ.net.reseed_net_input();
            }
            2 => {
                // Quarter 4: CA1 back to direct peripheral drive.
                if train {
                    circ.set_per_to_ca1_gain(1.0);
                    circ.set_ca3_to_ca1_gain(0.0);
                }
                circ.net.recompute_scaling();
                circ.net.reseed_net_input();
            }
            _ => {}
        }

        if qtr == 2 {
            circ.net.snapshot_minus_phase();
        } else if qtr == 3 {
            circ.net.snapshot_plus_phase();
        }
        obs.on_quarter(&circ.net, qtr);
    }

    circ.set_per_to_ca1_gain(1.0);
    circ.set_per_to_dg_gain(1.0);
    circ.set_ca3_to_ca1_gain(1.0);
    circ.net.set_target_clamp(false);

    if train {
        circ.net.accumulate_weight_deltas(1.0);
    }
    obs.on_cycle_end(&circ.net, train);
}
