//! The hippocampal-cortical circuit for the satellite task.
//!
//! Five peripheral feature layers plus class-name and code-name layers feed
//! a DG / CA3 / CA1 hippocampal loop. All layer and pathway handles are
//! resolved once here; the controllers gate whole pathway groups through the
//! setters below and never look anything up by name.

use crate::engine::{BuildError, EngineConfig, LayerId, LayerRole, Network, PathwayId};

pub const N_FEATURES: usize = 5;
pub const FEATURE_UNITS: usize = 6;
pub const CLASS_UNITS: usize = 3;
pub const CODE_UNITS: usize = 90;

const DG_UNITS: usize = 225;
const CA3_UNITS: usize = 144;
const CA1_UNITS: usize = 100;

// Sparse wiring densities for the perforant-path style connections.
const PER_HIP_P_CON: f32 = 0.09;
const DG_CA3_P_CON: f32 = 0.05;

pub struct Circuit {
    pub net: Network,

    pub features: [LayerId; N_FEATURES],
    pub class_name: LayerId,
    pub code_name: LayerId,
    pub dg: LayerId,
    pub ca3: LayerId,
    pub ca1: LayerId,

    /// Features + class name + code name, in order.
    pub peripheral: Vec<LayerId>,
    /// Layers whose inhibition follows the low-amplitude oscillation.
    pub low_group: Vec<LayerId>,
    /// Layers whose inhibition follows the high-amplitude oscillation.
    pub high_group: Vec<LayerId>,

    pub per_to_dg: Vec<PathwayId>,
    pub per_to_ca3: Vec<PathwayId>,
    pub per_to_ca1: Vec<PathwayId>,
    pub ca1_to_per: Vec<PathwayId>,
    pub dg_to_ca3: PathwayId,
    pub ca3_to_ca3: PathwayId,
    pub ca3_to_ca1: PathwayId,
    pub code_to_code: PathwayId,
}

impl Circuit {
    pub fn build(cfg: EngineConfig) -> Result<Self, BuildError> {
        let mut net = Network::new(cfg);

        let features = [
            net.add_layer("F1", FEATURE_UNITS)?,
            net.add_layer("F2", FEATURE_UNITS)?,
            net.add_layer("F3", FEATURE_UNITS)?,
            net.add_layer("F4", FEATURE_UNITS)?,
            net.add_layer("F5", FEATURE_UNITS)?,
        ];
        let class_name = net.add_layer("ClassName", CLASS_UNITS)?;
        let code_name = net.add_layer("CodeName", CODE_UNITS)?;

        let dg = net.add_layer("DG", DG_UNITS)?;
        let ca3 = net.add_layer("CA3", CA3_UNITS)?;
        let ca1 = net.add_layer("CA1", CA1_UNITS)?;
        net.set_layer_role(dg, LayerRole::Hidden);
        net.set_layer_role(ca3, LayerRole::Hidden);
        net.set_layer_role(ca1, LayerRole::Hidden);

        let mut peripheral: Vec<LayerId> = features.to_vec();
        peripheral.push(class_name);
        peripheral.push(code_name);

        let mut per_to_dg = Vec::with_capacity(peripheral.len());
        let mut per_to_ca3 = Vec::with_capacity(peripheral.len());
        let mut per_to_ca1 = Vec::with_capacity(peripheral.len());
        let mut ca1_to_per = Vec::with_capacity(peripheral.len());
        for &ly in &peripheral {
            per_to_dg.push(net.connect_random(ly, dg, PER_HIP_P_CON)?);
            per_to_ca3.push(net.connect_random(ly, ca3, PER_HIP_P_CON)?);
            per_to_ca1.push(net.connect_full(ly, ca1)?);
            ca1_to_per.push(net.connect_full(ca1, ly)?);
        }

        let dg_to_ca3 = net.connect_random(dg, ca3, DG_CA3_P_CON)?;
        let ca3_to_ca3 = net.connect_full(ca3, ca3)?;
        let ca3_to_ca1 = net.connect_full(ca3, ca1)?;
        let code_to_code = net.connect_full(code_name, code_name)?;

        net.recompute_scaling();

        let low_group = vec![class_name, code_name, ca1];
        let mut high_group: Vec<LayerId> = features.to_vec();
        high_group.push(dg);
        high_group.push(ca3);

        Ok(Self {
            net,
            features,
            class_name,
            code_name,
            dg,
            ca3,
            ca1,
            peripheral,
            low_group,
            high_group,
            per_to_dg,
            per_to_ca3,
            per_to_ca1,
            ca1_to_per,
            dg_to_ca3,
            ca3_to_ca3,
            ca3_to_ca1,
            code_to_code,
        })
    }

    pub fn set_per_to_ca1_gain(&mut self, gain: f32) {
        for &p in &self.per_to_ca1 {
            self.net.set_pathway_gain(p, gain);
        }
    }

    pub fn set_ca1_to_per_gain(&mut self, gain: f32) {
        for &p in &self.ca1_to_per {
            self.net.set_pathway_gain(p, gain);
        }
    }

    pub fn set_per_to_dg_gain(&mut self, gain: f32) {
        for &p in &self.per_to_dg {
            self.net.set_pathway_gain(p, gain);
        }
    }

    pub fn set_ca3_to_ca1_gain(&mut self, gain: f32) {
        self.net.set_pathway_gain(self.ca3_to_ca1, gain);
    }

    pub fn set_ca3_recurrent_gain(&mut self, gain: f32) {
        self.net.set_pathway_gain(self.ca3_to_ca3, gain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_full_circuit() {
        let c = Circuit::build(EngineConfig::default()).unwrap();
        assert_eq!(c.net.layers().len(), 10);
        assert_eq!(c.peripheral.len(), 7);
        assert_eq!(c.low_group.len() + c.high_group.len(), 10);
        // 4 pathway groups over 7 peripherals, plus the 4 singletons.
        assert_eq!(c.net.pathways().len(), 7 * 4 + 4);
        assert_eq!(c.net.layer(c.dg).units(), DG_UNITS);
        for &ly in &c.peripheral {
            assert_eq!(c.net.layer(ly).role(), LayerRole::Input);
        }
        for ly in [c.dg, c.ca3, c.ca1] {
            assert_eq!(c.net.layer(ly).role(), LayerRole::Hidden);
        }
    }

    #[test]
    fn group_gain_setters_cover_their_pathways() {
        let mut c = Circuit::build(EngineConfig::default()).unwrap();
        c.set_per_to_ca1_gain(0.0);
        for &p in &c.per_to_ca1 {
            assert_eq!(c.net.pathway_gain(p), 0.0);
        }
        c.set_ca3_recurrent_gain(2.0);
        assert_eq!(c.net.pathway_gain(c.ca3_to_ca3), 2.0);
        // Untouched groups stay at baseline.
        for &p in &c.per_to_dg {
            assert_eq!(c.net.pathway_gain(p), 1.0);
        }
    }

    #[test]
    fn sparse_pathways_are_actually_sparse() {
        let c = Circuit::build(EngineConfig::default()).unwrap();
        let pw = c.net.pathway(c.dg_to_ca3);
        let conns = pw
            .weights()
            .iter()
            .filter(|w| **w != 0.0)
            .count();
        let total = DG_UNITS * CA3_UNITS;
        assert!(conns > 0 && conns < total / 5, "p=0.05 wiring, got {conns}/{total}");
    }
}
