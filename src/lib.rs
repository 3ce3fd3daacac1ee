//! # somnia
//!
//! Learning and sleep-dependent memory consolidation in a layered
//! hippocampal-cortical network.
//!
//! Waking presentations settle through a gated 100-step alpha cycle whose
//! pathway gains alternate between cortical input drive and hippocampal
//! recall; long cue-free sleep sessions run an oscillatory, stability-gated
//! replay controller that commits a contrastive weight update for every
//! plus/minus replay cycle the network completes on its own.
//!
//! ## Quick start
//!
//! ```no_run
//! use somnia::prelude::*;
//!
//! let cfg = RunConfig {
//!     max_runs: 1,
//!     seed: 42,
//!     ..RunConfig::default()
//! };
//! let mut sim = Orchestrator::new(cfg).expect("circuit construction");
//! sim.train(&mut NullObserver);
//! println!("replay trials: {}", sim.replay_trials_total());
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: rate-coded point-neuron substrate
//! - [`circuit`]: the hippocampal-cortical wiring with typed handles
//! - [`phase`]: debounced replay phase detection
//! - [`schedule`]: precomputed inhibition oscillation
//! - [`wake`]: the alpha-cycle controller
//! - [`sleep`]: the sleep-session controller
//! - [`satellites`]: the satellite category-learning task
//! - [`orchestrator`]: run/epoch/trial sequencing
//! - [`observer`]: read-only observation adapters

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/engine.rs"]
pub mod engine;

#[path = "core/circuit.rs"]
pub mod circuit;

#[path = "core/schedule.rs"]
pub mod schedule;

#[path = "core/phase.rs"]
pub mod phase;

#[path = "core/wake.rs"]
pub mod wake;

#[path = "core/sleep.rs"]
pub mod sleep;

#[path = "core/satellites.rs"]
pub mod satellites;

#[path = "core/orchestrator.rs"]
pub mod orchestrator;

pub mod observer;

/// Prelude module for convenient imports.
///
/// ```
/// use somnia::prelude::*;
/// ```
pub mod prelude {
    pub use crate::circuit::Circuit;
    pub use crate::engine::{
        BuildError, Diagnostics, EngineConfig, LayerId, LayerRole, Network, PathwayId,
    };
    pub use crate::observer::{NullObserver, SimObserver, SleepStepRecord};
    pub use crate::orchestrator::{
        ClassStats, EpochSummary, HiddenSlot, Orchestrator, RunConfig, TrialKind,
    };
    pub use crate::phase::{Phase, PhaseAction, PhaseDetector};
    pub use crate::schedule::OscillationSchedule;
    pub use crate::sleep::{SleepConfig, SleepController, SleepOutcome};
}
