//! Procedural satellite category-learning task.
//!
//! Fifteen satellites in three classes of five. Each class has a prototype
//! whose five feature slots all carry the class's shared codes; every other
//! satellite deviates from its prototype in exactly one slot, with a code
//! drawn from the unique range. The class name is common to a class, the
//! code name is unique per satellite. Feature codes 0..2 are shared and
//! codes 3..5 unique; what makes a recall trial "shared" or "unique" is
//! which kind of information the hidden slot carried.

use crate::circuit::{CLASS_UNITS, CODE_UNITS, FEATURE_UNITS, N_FEATURES};
use crate::prng::Prng;

pub const N_CLASSES: usize = 3;
pub const SATS_PER_CLASS: usize = 5;
pub const N_SATELLITES: usize = N_CLASSES * SATS_PER_CLASS;

/// Feature codes below this are shared (prototypical); the rest are unique.
pub const UNIQUE_CODE_BASE: usize = 3;

/// Default number of training presentations per epoch.
pub const TRIALS_PER_EPOCH: usize = 105;

#[derive(Debug, Clone)]
pub struct Satellite {
    /// Index within the full set; doubles as the code-name identity.
    pub index: usize,
    pub class: usize,
    /// Feature code per slot.
    pub features: [usize; N_FEATURES],
    /// The one deviating slot; `None` for class prototypes.
    pub unique_slot: Option<usize>,
}

impl Satellite {
    pub fn is_prototype(&self) -> bool {
        self.unique_slot.is_none()
    }

    pub fn feature_pattern(&self, slot: usize) -> Vec<f32> {
        one_hot(FEATURE_UNITS, self.features[slot])
    }

    pub fn class_pattern(&self) -> Vec<f32> {
        one_hot(CLASS_UNITS, self.class)
    }

    /// A dedicated block of units within the code-name layer.
    pub fn code_pattern(&self) -> Vec<f32> {
        let block = CODE_UNITS / N_SATELLITES;
        let mut p = vec![0.0; CODE_UNITS];
        let start = self.index * block;
        for u in &mut p[start..start + block] {
            *u = 1.0;
        }
        p
    }
}

#[derive(Debug, Clone)]
pub struct SatelliteSet {
    sats: Vec<Satellite>,
}

impl SatelliteSet {
    pub fn generate() -> Self {
        let mut sats = Vec::with_capacity(N_SATELLITES);
        for class in 0..N_CLASSES {
            for k in 0..SATS_PER_CLASS {
                let mut features = [class; N_FEATURES];
                let unique_slot = if k == 0 {
                    None
                } else {
                    let slot = k - 1;
                    features[slot] = UNIQUE_CODE_BASE + (class + k) % UNIQUE_CODE_BASE;
                    Some(slot)
                };
                sats.push(Satellite {
                    index: class * SATS_PER_CLASS + k,
                    class,
                    features,
                    unique_slot,
                });
            }
        }
        Self { sats }
    }

    pub fn len(&self) -> usize {
        self.sats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sats.is_empty()
    }

    pub fn get(&self, index: usize) -> &Satellite {
        &self.sats[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Satellite> {
        self.sats.iter()
    }
}

/// Run/epoch/trial iteration over the satellite set. Training draws from a
/// reshuffled permutation ring; testing walks the set in order.
#[derive(Debug, Clone)]
pub struct TrialCursor {
    order: Vec<usize>,
    pos: usize,
    sequential: bool,
}

impl TrialCursor {
    pub fn new(n_items: usize, sequential: bool) -> Self {
        Self {
            order: (0..n_items).collect(),
            pos: 0,
            sequential,
        }
    }

    /// Restart iteration; shuffled cursors get a fresh permutation.
    pub fn init(&mut self, rng: &mut Prng) {
        self.pos = 0;
        if !self.sequential {
            rng.shuffle(&mut self.order);
        }
    }

    /// Next item index, reshuffling at the end of each pass.
    pub fn next_item(&mut self, rng: &mut Prng) -> usize {
        if self.pos >= self.order.len() {
            self.init(rng);
        }
        let item = self.order[self.pos];
        self.pos += 1;
        item
    }
}

fn one_hot(len: usize, hot: usize) -> Vec<f32> {
    let mut p = vec![0.0; len];
    if hot < len {
        p[hot] = 1.0;
    }
    p
}
