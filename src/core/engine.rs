//! Rate-coded point-neuron substrate.
//!
//! A [`Network`] owns layers and directed weighted pathways and advances one
//! integration step per [`Network::step`] call. Controllers drive it through
//! a small surface: pathway gains, scaling recomputation, per-layer
//! similarity, weight-delta accumulate/commit, phase accumulation, stimulus
//! clamping and layer roles. The hot loop works exclusively on integer
//! handles resolved at build time; nothing in here resolves names per step.

use hashbrown::HashMap;

use crate::prng::Prng;

pub type LayerId = usize;
pub type PathwayId = usize;

/// How a layer participates in the current presentation.
///
/// `Input` layers are clamped to their applied stimulus, `Target` layers
/// clamp only during the plus-phase quarter of a wake cycle, `Hidden` layers
/// always settle freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LayerRole {
    Input,
    Hidden,
    Target,
}

/// Fatal network construction errors. These abort a run before any
/// controller executes.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("duplicate layer name: {0}")]
    DuplicateLayer(String),
    #[error("layer {0:?} has no units")]
    EmptyLayer(String),
    #[error("unknown layer id: {0}")]
    UnknownLayer(LayerId),
    #[error("connection probability {0} outside (0, 1]")]
    BadConnectivity(f32),
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    /// Integration rate for net input and activation.
    pub dt: f32,
    /// Logistic slope of the activation function.
    pub act_gain: f32,
    /// Activation threshold.
    pub act_thr: f32,
    /// Feedback inhibition strength; each layer's inhibitory gain multiplies
    /// this times the layer's mean activation.
    pub inhib: f32,
    /// Learning rate for contrastive weight deltas.
    pub lrate: f32,
    /// Initial weights are uniform in `0.5 ± wt_spread`.
    pub wt_spread: f32,
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dt: 0.3,
            act_gain: 6.0,
            act_thr: 0.25,
            inhib: 1.6,
            lrate: 0.04,
            wt_spread: 0.25,
            seed: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Layer {
    name: String,
    role: LayerRole,
    units: usize,

    act: Vec<f32>,
    prev_act: Vec<f32>,
    net: Vec<f32>,

    ext: Vec<f32>,
    has_ext: bool,

    // Inhibitory gain, with the value saved at sleep-session start so the
    // oscillation can reset before applying each step's factor.
    gi: f32,
    gi_baseline: f32,

    // Minus/plus phase activations and the running sum that produces them
    // during sleep replay.
    act_m: Vec<f32>,
    act_p: Vec<f32>,
    run_sum: Vec<f32>,

    // Cosine of this step's activation against the previous step's.
    // May be NaN when either vector is all-zero; consumers clamp.
    sim: f32,
}

impl Layer {
    fn new(name: String, units: usize) -> Self {
        Self {
            name,
            role: LayerRole::Input,
            units,
            act: vec![0.0; units],
            prev_act: vec![0.0; units],
            net: vec![0.0; units],
            ext: vec![0.0; units],
            has_ext: false,
            gi: 1.0,
            gi_baseline: 1.0,
            act_m: vec![0.0; units],
            act_p: vec![0.0; units],
            run_sum: vec![0.0; units],
            sim: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> LayerRole {
        self.role
    }

    pub fn units(&self) -> usize {
        self.units
    }

    pub fn activations(&self) -> &[f32] {
        &self.act
    }

    pub fn minus_phase(&self) -> &[f32] {
        &self.act_m
    }

    pub fn plus_phase(&self) -> &[f32] {
        &self.act_p
    }

    pub fn inhib_gain(&self) -> f32 {
        self.gi
    }
}

#[derive(Debug, Clone, Copy)]
struct SynDep {
    inc: f32,
    dec: f32,
}

#[derive(Debug, Clone)]
pub struct Pathway {
    send: LayerId,
    recv: LayerId,
    send_n: usize,
    recv_n: usize,

    /// Multiplier on this pathway's contribution to the receiver's input.
    gain: f32,
    /// Scaling factor derived from sender activity; recomputed on demand.
    g_scale: f32,

    // Row-major: wt[r * send_n + s].
    wt: Vec<f32>,
    eff_wt: Vec<f32>,
    dwt: Vec<f32>,

    // None = fully connected. Some(p) = uniform-random mask with
    // connection probability p, rebuilt on weight re-init.
    p_con: Option<f32>,
    mask: Vec<bool>,
}

impl Pathway {
    pub fn send(&self) -> LayerId {
        self.send
    }

    pub fn recv(&self) -> LayerId {
        self.recv
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn weights(&self) -> &[f32] {
        &self.wt
    }

    pub fn effective_weights(&self) -> &[f32] {
        &self.eff_wt
    }

    fn accumulate_input(&self, send_act: &[f32], out: &mut [f32]) {
        let scale = self.gain * self.g_scale;
        if scale == 0.0 {
            return;
        }
        for r in 0..self.recv_n {
            let row = r * self.send_n;
            let mut sum = 0.0f32;
            for s in 0..self.send_n {
                if self.mask[row + s] {
                    sum += self.eff_wt[row + s] * send_act[s];
                }
            }
            out[r] += scale * sum;
        }
    }

    fn rebuild(&mut self, rng: &mut Prng, spread: f32) {
        for i in 0..self.mask.len() {
            self.mask[i] = match self.p_con {
                None => true,
                Some(p) => rng.next_f32() < p,
            };
            let w = if self.mask[i] {
                (0.5 + rng.range_f32(-spread, spread)).clamp(0.0, 1.0)
            } else {
                0.0
            };
            self.wt[i] = w;
            self.eff_wt[i] = w;
            self.dwt[i] = 0.0;
        }
    }

    fn fan_in(&self) -> f32 {
        match self.p_con {
            None => self.send_n as f32,
            Some(p) => (p * self.send_n as f32).max(1.0),
        }
    }
}

pub struct Network {
    cfg: EngineConfig,
    layers: Vec<Layer>,
    pathways: Vec<Pathway>,
    names: HashMap<String, LayerId>,
    rng: Prng,

    /// Whether Target layers are clamped this step (plus-phase quarter).
    target_clamp: bool,
    syn_dep: Option<SynDep>,
    steps: u64,
}

#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub layers: usize,
    pub pathways: usize,
    pub units: usize,
    pub connections: usize,
    pub mean_act: f32,
}

impl Network {
    pub fn new(cfg: EngineConfig) -> Self {
        Self {
            rng: Prng::new(cfg.seed),
            cfg,
            layers: Vec::new(),
            pathways: Vec::new(),
            names: HashMap::new(),
            target_clamp: false,
            syn_dep: None,
            steps: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    // ---- construction -----------------------------------------------------

    pub fn add_layer(&mut self, name: &str, units: usize) -> Result<LayerId, BuildError> {
        if units == 0 {
            return Err(BuildError::EmptyLayer(name.to_string()));
        }
        if self.names.contains_key(name) {
            return Err(BuildError::DuplicateLayer(name.to_string()));
        }
        let id = self.layers.len();
        self.layers.push(Layer::new(name.to_string(), units));
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn connect_full(&mut self, send: LayerId, recv: LayerId) -> Result<PathwayId, BuildError> {
        self.connect(send, recv, None)
    }

    pub fn connect_random(
        &mut self,
        send: LayerId,
        recv: LayerId,
        p_con: f32,
    ) -> Result<PathwayId, BuildError> {
        if !(0.0..=1.0).contains(&p_con) || p_con == 0.0 {
            return Err(BuildError::BadConnectivity(p_con));
        }
        self.connect(send, recv, Some(p_con))
    }

    fn connect(
        &mut self,
        send: LayerId,
        recv: LayerId,
        p_con: Option<f32>,
    ) -> Result<PathwayId, BuildError> {
        let send_n = self
            .layers
            .get(send)
            .ok_or(BuildError::UnknownLayer(send))?
            .units;
        let recv_n = self
            .layers
            .get(recv)
            .ok_or(BuildError::UnknownLayer(recv))?
            .units;

        let n = send_n * recv_n;
        let mut pw = Pathway {
            send,
            recv,
            send_n,
            recv_n,
            gain: 1.0,
            g_scale: 1.0,
            wt: vec![0.0; n],
            eff_wt: vec![0.0; n],
            dwt: vec![0.0; n],
            p_con,
            mask: vec![false; n],
        };
        pw.rebuild(&mut self.rng, self.cfg.wt_spread);

        let id = self.pathways.len();
        self.pathways.push(pw);
        Ok(id)
    }

    pub fn layer_id(&self, name: &str) -> Option<LayerId> {
        self.names.get(name).copied()
    }

    /// Re-randomize all wiring and weights (used at run boundaries).
    pub fn reinit_weights(&mut self) {
        for pw in &mut self.pathways {
            pw.rebuild(&mut self.rng, self.cfg.wt_spread);
        }
        for ly in &mut self.layers {
            ly.act.fill(0.0);
            ly.prev_act.fill(0.0);
            ly.net.fill(0.0);
            ly.act_m.fill(0.0);
            ly.act_p.fill(0.0);
            ly.run_sum.fill(0.0);
            ly.sim = 0.0;
        }
        self.recompute_scaling();
    }

    // ---- accessors --------------------------------------------------------

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, id: LayerId) -> &Layer {
        &self.layers[id]
    }

    pub fn pathways(&self) -> &[Pathway] {
        &self.pathways
    }

    pub fn pathway(&self, id: PathwayId) -> &Pathway {
        &self.pathways[id]
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let units = self.layers.iter().map(|l| l.units).sum::<usize>();
        let connections = self
            .pathways
            .iter()
            .map(|p| p.mask.iter().filter(|m| **m).count())
            .sum::<usize>();
        let mean_act = if units == 0 {
            0.0
        } else {
            self.layers
                .iter()
                .map(|l| l.act.iter().sum::<f32>())
                .sum::<f32>()
                / units as f32
        };
        Diagnostics {
            layers: self.layers.len(),
            pathways: self.pathways.len(),
            units,
            connections,
            mean_act,
        }
    }

    // ---- gains and scaling ------------------------------------------------

    pub fn set_pathway_gain(&mut self, id: PathwayId, gain: f32) {
        self.pathways[id].gain = gain;
    }

    pub fn pathway_gain(&self, id: PathwayId) -> f32 {
        self.pathways[id].gain
    }

    /// Re-derive per-pathway scaling from current sender activity. Any gain
    /// change invalidates these factors; callers follow with
    /// [`Network::reseed_net_input`].
    pub fn recompute_scaling(&mut self) {
        for pw in &mut self.pathways {
            let send = &self.layers[pw.send];
            let avg = (send.act.iter().sum::<f32>() / send.units as f32).max(0.05);
            pw.g_scale = 1.0 / (pw.fan_in() * avg);
        }
    }

    /// Zero the integrated net-input accumulators.
    pub fn reseed_net_input(&mut self) {
        for ly in &mut self.layers {
            ly.net.fill(0.0);
        }
    }

    // ---- roles and stimuli ------------------------------------------------

    pub fn set_layer_role(&mut self, id: LayerId, role: LayerRole) {
        self.layers[id].role = role;
    }

    /// Whether Target layers clamp to their stimulus this step.
    pub fn set_target_clamp(&mut self, clamp: bool) {
        self.target_clamp = clamp;
    }

    /// Apply a stimulus pattern to a layer. Shorter patterns leave the tail
    /// at zero; longer patterns are truncated.
    pub fn apply_stimulus(&mut self, id: LayerId, pattern: &[f32]) {
        let ly = &mut self.layers[id];
        ly.ext.fill(0.0);
        let n = pattern.len().min(ly.units);
        ly.ext[..n].copy_from_slice(&pattern[..n]);
        ly.has_ext = true;
    }

    pub fn clear_stimuli(&mut self) {
        for ly in &mut self.layers {
            ly.ext.fill(0.0);
            ly.has_ext = false;
        }
    }

    // ---- inhibition -------------------------------------------------------

    pub fn set_layer_inhib_gain(&mut self, id: LayerId, gi: f32) {
        self.layers[id].gi = gi;
    }

    pub fn scale_layer_inhib(&mut self, id: LayerId, factor: f32) {
        self.layers[id].gi *= factor;
    }

    /// Record every layer's current inhibitory gain as the session baseline.
    pub fn save_inhib_baselines(&mut self) {
        for ly in &mut self.layers {
            ly.gi_baseline = ly.gi;
        }
    }

    /// Restore every layer's inhibitory gain to its saved baseline.
    pub fn reset_inhib_gains(&mut self) {
        for ly in &mut self.layers {
            ly.gi = ly.gi_baseline;
        }
    }

    // ---- stepping ---------------------------------------------------------

    /// Advance one integration step. `sleep` enables the synaptic-depression
    /// ramp (when armed); waking presentations pass `false`.
    pub fn step(&mut self, sleep: bool) {
        let mut raw: Vec<Vec<f32>> = self
            .layers
            .iter()
            .map(|l| vec![0.0f32; l.units])
            .collect();
        for pw in &self.pathways {
            let send_act = &self.layers[pw.send].act;
            pw.accumulate_input(send_act, &mut raw[pw.recv]);
        }

        let cfg = self.cfg;
        let target_clamp = self.target_clamp;

        for (li, ly) in self.layers.iter_mut().enumerate() {
            let clamped = ly.has_ext
                && (ly.role == LayerRole::Input || (ly.role == LayerRole::Target && target_clamp));

            ly.prev_act.copy_from_slice(&ly.act);

            if clamped {
                ly.act.copy_from_slice(&ly.ext);
            } else {
                let mean_act = ly.act.iter().sum::<f32>() / ly.units as f32;
                let inhib = ly.gi * cfg.inhib * mean_act;
                for u in 0..ly.units {
                    let n = &mut ly.net[u];
                    *n += cfg.dt * (raw[li][u] - *n);
                    let drive = cfg.act_gain * (*n - cfg.act_thr - inhib);
                    let target = 1.0 / (1.0 + (-drive).exp());
                    ly.act[u] = (ly.act[u] + cfg.dt * (target - ly.act[u])).clamp(0.0, 1.0);
                }
            }

            ly.sim = cosine(&ly.act, &ly.prev_act);
        }

        if sleep {
            if let Some(sd) = self.syn_dep {
                for pw in self.pathways.iter_mut() {
                    let send_act = &self.layers[pw.send].act;
                    for r in 0..pw.recv_n {
                        let row = r * pw.send_n;
                        for s in 0..pw.send_n {
                            let i = row + s;
                            if !pw.mask[i] {
                                continue;
                            }
                            let wt = pw.wt[i];
                            let eff = pw.eff_wt[i];
                            pw.eff_wt[i] =
                                (eff + sd.inc * (wt - eff) - sd.dec * send_act[s] * eff)
                                    .clamp(0.0, wt.max(0.0));
                        }
                    }
                }
            }
        }

        self.steps = self.steps.wrapping_add(1);
    }

    /// Per-layer similarity of this step's activation to the previous
    /// step's. May be NaN when a layer has lost all activity; callers clamp.
    pub fn similarity(&self, id: LayerId) -> f32 {
        self.layers[id].sim
    }

    /// Mean layer similarity with undefined values clamped to zero. This is
    /// the stability signal fed to the replay phase detector and is always
    /// finite.
    pub fn mean_similarity(&self) -> f64 {
        let mut sum = 0.0f64;
        for ly in &self.layers {
            let s = ly.sim;
            sum += if s.is_nan() { 0.0 } else { f64::from(s) };
        }
        sum / self.layers.len() as f64
    }

    /// Replace every unit's activation with max(0, U(0,1) - 0.5). Used to
    /// seed a sleep session and to recover from activity collapse.
    pub fn randomize_activations(&mut self) {
        for ly in self.layers.iter_mut() {
            for a in ly.act.iter_mut() {
                *a = (self.rng.next_f32() - 0.5).max(0.0);
            }
        }
    }

    // ---- phase snapshots and accumulation ---------------------------------

    /// Snapshot current activations as the minus phase (end of wake Q3).
    pub fn snapshot_minus_phase(&mut self) {
        for ly in &mut self.layers {
            ly.act_m.copy_from_slice(&ly.act);
        }
    }

    /// Snapshot current activations as the plus phase (end of wake Q4).
    pub fn snapshot_plus_phase(&mut self) {
        for ly in &mut self.layers {
            ly.act_p.copy_from_slice(&ly.act);
        }
    }

    /// Start a fresh running sum from this step's activations.
    pub fn begin_phase_accum(&mut self) {
        for ly in &mut self.layers {
            ly.run_sum.copy_from_slice(&ly.act);
        }
    }

    /// Add this step's activations to the running sum.
    pub fn continue_phase_accum(&mut self) {
        for ly in &mut self.layers {
            for (s, a) in ly.run_sum.iter_mut().zip(&ly.act) {
                *s += a;
            }
        }
    }

    /// Freeze the running sum as the plus-phase average over `n` steps.
    pub fn finalize_plus(&mut self, n: u32) {
        let n = n.max(1) as f32;
        for ly in &mut self.layers {
            for (p, s) in ly.act_p.iter_mut().zip(&ly.run_sum) {
                *p = s / n;
            }
        }
    }

    /// Freeze the running sum as the minus-phase average over `n` steps.
    pub fn finalize_minus(&mut self, n: u32) {
        let n = n.max(1) as f32;
        for ly in &mut self.layers {
            for (m, s) in ly.act_m.iter_mut().zip(&ly.run_sum) {
                *m = s / n;
            }
        }
    }

    // ---- learning ---------------------------------------------------------

    /// Contrastive Hebbian delta for every pathway:
    /// `dwt += lrate * (plus_r ⊗ plus_s - minus_r ⊗ minus_s)`.
    pub fn accumulate_weight_deltas(&mut self, lrate_scale: f32) {
        let lrate = self.cfg.lrate * lrate_scale;
        for pw in self.pathways.iter_mut() {
            let send = &self.layers[pw.send];
            let recv = &self.layers[pw.recv];
            for r in 0..pw.recv_n {
                let row = r * pw.send_n;
                for s in 0..pw.send_n {
                    let i = row + s;
                    if !pw.mask[i] {
                        continue;
                    }
                    pw.dwt[i] += lrate
                        * (recv.act_p[r] * send.act_p[s] - recv.act_m[r] * send.act_m[s]);
                }
            }
        }
    }

    /// Fold accumulated deltas into the true weights with soft bounding and
    /// clear them. Effective weights track the true weights unless a
    /// depression ramp is active.
    pub fn commit_pending_weight_deltas(&mut self) {
        let depressed = self.syn_dep.is_some();
        for pw in &mut self.pathways {
            for i in 0..pw.wt.len() {
                if !pw.mask[i] {
                    continue;
                }
                let d = pw.dwt[i];
                if d != 0.0 {
                    let w = pw.wt[i];
                    pw.wt[i] = (w + if d > 0.0 { d * (1.0 - w) } else { d * w }).clamp(0.0, 1.0);
                    pw.dwt[i] = 0.0;
                    if !depressed {
                        pw.eff_wt[i] = pw.wt[i];
                    }
                }
            }
        }
    }

    // ---- synaptic depression ----------------------------------------------

    /// Arm the effective-weight ramp for a sleep session.
    pub fn init_synaptic_depression(&mut self, inc: f32, dec: f32) {
        self.syn_dep = Some(SynDep { inc, dec });
        for pw in &mut self.pathways {
            pw.eff_wt.copy_from_slice(&pw.wt);
        }
    }

    /// Snap effective weights back to the true weights and disarm the ramp.
    pub fn end_synaptic_depression(&mut self) {
        self.syn_dep = None;
        for pw in &mut self.pathways {
            pw.eff_wt.copy_from_slice(&pw.wt);
        }
    }

    pub fn synaptic_depression_active(&self) -> bool {
        self.syn_dep.is_some()
    }

    // ---- statistics -------------------------------------------------------

    /// Sum squared error and mean squared error between the minus- and
    /// plus-phase activations of a layer, with a per-unit tolerance below
    /// which a difference counts as zero.
    pub fn target_error(&self, id: LayerId, tolerance: f32) -> (f64, f64) {
        let ly = &self.layers[id];
        let mut sse = 0.0f64;
        for (m, p) in ly.act_m.iter().zip(&ly.act_p) {
            let d = m - p;
            if d.abs() > tolerance {
                sse += f64::from(d) * f64::from(d);
            }
        }
        (sse, sse / ly.units as f64)
    }

    /// Cosine between minus- and plus-phase activations; 0 when undefined.
    pub fn cos_diff(&self, id: LayerId) -> f64 {
        let ly = &self.layers[id];
        let c = cosine(&ly.act_m, &ly.act_p);
        if c.is_nan() {
            0.0
        } else {
            f64::from(c)
        }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    dot / (na.sqrt() * nb.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_layer_net() -> (Network, LayerId, LayerId, PathwayId) {
        let mut net = Network::new(EngineConfig {
            seed: 11,
            ..EngineConfig::default()
        });
        let a = net.add_layer("A", 8).unwrap();
        let b = net.add_layer("B", 8).unwrap();
        let p = net.connect_full(a, b).unwrap();
        net.recompute_scaling();
        (net, a, b, p)
    }

    #[test]
    fn build_rejects_duplicates_and_empty_layers() {
        let mut net = Network::new(EngineConfig::default());
        net.add_layer("A", 4).unwrap();
        assert!(matches!(
            net.add_layer("A", 4),
            Err(BuildError::DuplicateLayer(_))
        ));
        assert!(matches!(
            net.add_layer("B", 0),
            Err(BuildError::EmptyLayer(_))
        ));
        assert!(matches!(
            net.connect_random(0, 0, 0.0),
            Err(BuildError::BadConnectivity(_))
        ));
        assert!(matches!(
            net.connect_full(0, 9),
            Err(BuildError::UnknownLayer(9))
        ));
    }

    #[test]
    fn input_clamp_overrides_dynamics() {
        let (mut net, a, _, _) = two_layer_net();
        let pattern = [1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        net.apply_stimulus(a, &pattern);
        net.step(false);
        assert_eq!(net.layer(a).activations(), &pattern);
    }

    #[test]
    fn target_clamps_only_in_plus_quarter() {
        let (mut net, a, _, _) = two_layer_net();
        net.set_layer_role(a, LayerRole::Target);
        let pattern = [1.0; 8];
        net.apply_stimulus(a, &pattern);

        net.step(false);
        assert_ne!(net.layer(a).activations(), &pattern);

        net.set_target_clamp(true);
        net.step(false);
        assert_eq!(net.layer(a).activations(), &pattern);
    }

    #[test]
    fn activations_stay_bounded() {
        let (mut net, a, _, _) = two_layer_net();
        net.apply_stimulus(a, &[1.0; 8]);
        for _ in 0..200 {
            net.step(false);
        }
        for ly in net.layers() {
            for &x in ly.activations() {
                assert!((0.0..=1.0).contains(&x), "activation out of range: {x}");
            }
        }
    }

    #[test]
    fn mean_similarity_is_always_finite() {
        let (mut net, _, _, _) = two_layer_net();
        // All-zero activations make per-layer cosine undefined.
        net.step(false);
        assert!(net.mean_similarity().is_finite());
        net.randomize_activations();
        for _ in 0..50 {
            net.step(false);
            assert!(net.mean_similarity().is_finite());
        }
    }

    #[test]
    fn commit_soft_bounds_weights() {
        let (mut net, a, b, p) = two_layer_net();
        net.snapshot_minus_phase(); // all-zero minus phase
        net.apply_stimulus(a, &[1.0; 8]);
        net.apply_stimulus(b, &[1.0; 8]);
        net.step(false);
        net.snapshot_plus_phase();
        // Strong repeated updates must never leave [0, 1].
        for _ in 0..100 {
            net.accumulate_weight_deltas(50.0);
            net.commit_pending_weight_deltas();
        }
        let wts = net.pathway(p).weights();
        assert!(wts.iter().all(|w| (0.0..=1.0).contains(w)));
        // Plus-only coactivity drives weights up, toward but never past 1.
        assert!(wts.iter().any(|&w| w > 0.9));
    }

    #[test]
    fn depression_ramps_down_and_wake_restores() {
        let (mut net, a, _, p) = two_layer_net();
        net.apply_stimulus(a, &[1.0; 8]);
        net.init_synaptic_depression(0.0007, 0.05);
        for _ in 0..100 {
            net.step(true);
        }
        let depressed = net
            .pathway(p)
            .effective_weights()
            .iter()
            .zip(net.pathway(p).weights())
            .any(|(e, w)| e < w);
        assert!(depressed, "effective weights should drift below true weights");

        net.end_synaptic_depression();
        assert_eq!(net.pathway(p).effective_weights(), net.pathway(p).weights());
    }

    #[test]
    fn phase_accumulation_averages_steps() {
        let (mut net, a, _, _) = two_layer_net();
        net.apply_stimulus(a, &[0.5; 8]);
        net.step(false);
        net.begin_phase_accum();
        net.continue_phase_accum();
        net.finalize_plus(2);
        for &p in net.layer(a).plus_phase() {
            assert!((p - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn target_error_respects_tolerance() {
        let (mut net, a, _, _) = two_layer_net();
        net.apply_stimulus(a, &[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        net.step(false);
        net.snapshot_plus_phase();
        net.snapshot_minus_phase();
        let (sse, _) = net.target_error(a, 0.5);
        assert_eq!(sse, 0.0);
    }

    #[test]
    fn reinit_rebuilds_sparse_mask() {
        let mut net = Network::new(EngineConfig {
            seed: 3,
            ..EngineConfig::default()
        });
        let a = net.add_layer("A", 30).unwrap();
        let b = net.add_layer("B", 30).unwrap();
        let p = net.connect_random(a, b, 0.1).unwrap();
        let before = net.diagnostics().connections;
        assert!(before > 0 && before < 30 * 30);
        net.reinit_weights();
        let after = net.diagnostics().connections;
        assert!(after > 0 && after < 30 * 30);
        let _ = p;
    }
}
