//! Momentum assignment engines.
//!
//! Two engine generations exist side by side. Both evaluate a per-mode
//! regression forest supplied by the conditions, but they differ in what the
//! forest was trained to predict and in how the LUT address is packed:
//!
//! | variant | PT-LUT versions | forest target | address layout            |
//! |---------|-----------------|---------------|---------------------------|
//! | 2016    | `<= 5`          | 1/pT          | mode, dφ12 (9b), dφ23, θ  |
//! | 2017    | `> 5`           | log2(pT)      | mode, θ, dφ12 (7b), bend1 |
//!
//! [`PtEngineSelector`] owns one instance of each and tracks which is active.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Highest PT-LUT version served by the 2016 engine.
pub const PT_LUT_VERSION_2016_MAX: u32 = 5;

/// Upper clip of the assigned transverse momentum (GeV).
pub const PT_MAX: f32 = 1000.0;

// ---------------------------------------------------------------------------
// Forest
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    /// `features[feature] < cut` goes left
    Split {
        feature: usize,
        cut: f64,
        left: usize,
        right: usize,
    },
}

/// A regression tree stored as a node array, root at index 0.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    pub fn evaluate(&self, features: &[f64]) -> f64 {
        let mut idx = 0;
        // a well-formed tree never revisits a node
        for _ in 0..self.nodes.len() {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { value }) => return *value,
                Some(TreeNode::Split {
                    feature,
                    cut,
                    left,
                    right,
                }) => {
                    let x = features.get(*feature).copied().unwrap_or(0.0);
                    idx = if x < *cut { *left } else { *right };
                }
                None => break,
            }
        }
        0.0
    }
}

/// Boosted forests, one per track mode.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PtForest {
    pub trees_by_mode: BTreeMap<i32, Vec<RegressionTree>>,
}

impl PtForest {
    /// Summed response of the forest for `mode`, `None` if the mode has no trees.
    pub fn response(&self, mode: i32, features: &[f64]) -> Option<f64> {
        let trees = self.trees_by_mode.get(&mode).filter(|t| !t.is_empty())?;
        Some(trees.iter().map(|t| t.evaluate(features)).sum())
    }
}

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

/// Kinematic inputs of one track candidate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtFeatures {
    pub mode: i32,
    pub theta: i32,
    /// |Δφ| between consecutive stations with hits: 12, 23, 34
    pub dphi: [i32; 3],
    /// Sign of Δφ12, +1 or -1
    pub dphi_sign: i32,
    /// CLCT bend of the first station with a hit
    pub bend: i32,
}

impl PtFeatures {
    /// Flat feature vector in the order the forests are trained with.
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.theta as f64,
            self.dphi[0] as f64,
            self.dphi[1] as f64,
            self.dphi[2] as f64,
            self.dphi_sign as f64,
            self.bend as f64,
        ]
    }
}

fn clip_bits(value: i32, bits: u32) -> u32 {
    let max = (1u32 << bits) - 1;
    (value.max(0) as u32).min(max)
}

// ---------------------------------------------------------------------------
// Engines
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PtEngineVariant {
    Run2016,
    Run2017,
}

impl PtEngineVariant {
    pub fn for_pt_lut_version(pt_lut_version: u32) -> Self {
        if pt_lut_version <= PT_LUT_VERSION_2016_MAX {
            PtEngineVariant::Run2016
        } else {
            PtEngineVariant::Run2017
        }
    }
}

/// Common capability of both engine generations.
pub trait PtAssignmentEngine: Send + Sync {
    fn variant(&self) -> PtEngineVariant;

    /// Adopt a newly delivered forest.
    fn load(&mut self, forest: Arc<PtForest>);

    fn set_pt_lut_version(&mut self, version: u32);
    fn pt_lut_version(&self) -> u32;

    /// Address of this candidate in the hardware pT LUT.
    fn calculate_address(&self, features: &PtFeatures) -> u32;

    /// Transverse momentum in GeV, 0 when the forest cannot answer.
    fn assign(&self, features: &PtFeatures) -> f32;
}

#[derive(Clone, Debug, Default)]
struct EngineState {
    pt_lut_version: u32,
    forest: Option<Arc<PtForest>>,
}

impl EngineState {
    fn response(&self, features: &PtFeatures) -> Option<f64> {
        self.forest
            .as_ref()?
            .response(features.mode, &features.to_vec())
    }
}

#[derive(Clone, Debug, Default)]
pub struct PtAssignmentEngine2016 {
    state: EngineState,
}

impl PtAssignmentEngine2016 {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PtAssignmentEngine for PtAssignmentEngine2016 {
    fn variant(&self) -> PtEngineVariant {
        PtEngineVariant::Run2016
    }

    fn load(&mut self, forest: Arc<PtForest>) {
        self.state.forest = Some(forest);
    }

    fn set_pt_lut_version(&mut self, version: u32) {
        self.state.pt_lut_version = version;
    }

    fn pt_lut_version(&self) -> u32 {
        self.state.pt_lut_version
    }

    fn calculate_address(&self, features: &PtFeatures) -> u32 {
        let mode_inv = clip_bits(features.mode, 4).reverse_bits() >> 28;
        (mode_inv << 26)
            | (clip_bits(features.dphi[0], 9) << 17)
            | (clip_bits(features.dphi[1], 7) << 10)
            | (u32::from(features.dphi_sign < 0) << 9)
            | (clip_bits(features.theta >> 2, 5) << 4)
            | clip_bits(features.bend, 4)
    }

    fn assign(&self, features: &PtFeatures) -> f32 {
        match self.state.response(features) {
            Some(inv_pt) if inv_pt > 0.0 => ((1.0 / inv_pt) as f32).min(PT_MAX),
            _ => 0.0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PtAssignmentEngine2017 {
    state: EngineState,
}

impl PtAssignmentEngine2017 {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PtAssignmentEngine for PtAssignmentEngine2017 {
    fn variant(&self) -> PtEngineVariant {
        PtEngineVariant::Run2017
    }

    fn load(&mut self, forest: Arc<PtForest>) {
        self.state.forest = Some(forest);
    }

    fn set_pt_lut_version(&mut self, version: u32) {
        self.state.pt_lut_version = version;
    }

    fn pt_lut_version(&self) -> u32 {
        self.state.pt_lut_version
    }

    fn calculate_address(&self, features: &PtFeatures) -> u32 {
        (clip_bits(features.mode, 4) << 26)
            | (clip_bits(features.theta >> 2, 5) << 21)
            | (clip_bits(features.dphi[0], 7) << 14)
            | (clip_bits(features.dphi[1], 5) << 9)
            | (clip_bits(features.dphi[2], 5) << 4)
            | (u32::from(features.dphi_sign < 0) << 3)
            | clip_bits(features.bend, 3)
    }

    fn assign(&self, features: &PtFeatures) -> f32 {
        match self.state.response(features) {
            Some(log2_pt) => (2f64.powf(log2_pt) as f32).min(PT_MAX),
            None => 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// Both engines, constructed once, plus the currently active choice.
#[derive(Clone, Debug)]
pub struct PtEngineSelector {
    engine_2016: PtAssignmentEngine2016,
    engine_2017: PtAssignmentEngine2017,
    active: PtEngineVariant,
}

impl PtEngineSelector {
    /// Start with the engine matching the configured PT-LUT version.
    pub fn new(configured_pt_lut_version: u32) -> Self {
        Self {
            engine_2016: PtAssignmentEngine2016::new(),
            engine_2017: PtAssignmentEngine2017::new(),
            active: PtEngineVariant::for_pt_lut_version(configured_pt_lut_version),
        }
    }

    /// Activate the engine for `pt_lut_version` and tell it the version.
    pub fn select(&mut self, pt_lut_version: u32) -> PtEngineVariant {
        self.active = PtEngineVariant::for_pt_lut_version(pt_lut_version);
        self.active_mut().set_pt_lut_version(pt_lut_version);
        self.active
    }

    pub fn active_variant(&self) -> PtEngineVariant {
        self.active
    }

    pub fn active(&self) -> &dyn PtAssignmentEngine {
        self.engine(self.active)
    }

    pub fn active_mut(&mut self) -> &mut dyn PtAssignmentEngine {
        match self.active {
            PtEngineVariant::Run2016 => &mut self.engine_2016,
            PtEngineVariant::Run2017 => &mut self.engine_2017,
        }
    }

    pub fn engine(&self, variant: PtEngineVariant) -> &dyn PtAssignmentEngine {
        match variant {
            PtEngineVariant::Run2016 => &self.engine_2016,
            PtEngineVariant::Run2017 => &self.engine_2017,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// theta < 40 → leaf `low`, else leaf `high`
    fn stump(low: f64, high: f64) -> RegressionTree {
        RegressionTree {
            nodes: vec![
                TreeNode::Split {
                    feature: 0,
                    cut: 40.0,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { value: low },
                TreeNode::Leaf { value: high },
            ],
        }
    }

    fn forest(mode: i32, trees: Vec<RegressionTree>) -> Arc<PtForest> {
        let mut f = PtForest::default();
        f.trees_by_mode.insert(mode, trees);
        Arc::new(f)
    }

    fn features(mode: i32, theta: i32) -> PtFeatures {
        PtFeatures {
            mode,
            theta,
            dphi: [30, 10, 5],
            dphi_sign: 1,
            bend: 2,
        }
    }

    #[test]
    fn selection_is_pure_in_version() {
        for v in 0..=5 {
            assert_eq!(PtEngineVariant::for_pt_lut_version(v), PtEngineVariant::Run2016);
        }
        for v in [6, 7, 100, 888_888] {
            assert_eq!(PtEngineVariant::for_pt_lut_version(v), PtEngineVariant::Run2017);
        }
    }

    #[test]
    fn selector_switches_back_and_forth() {
        let mut sel = PtEngineSelector::new(7);
        assert_eq!(sel.active_variant(), PtEngineVariant::Run2017);
        assert_eq!(sel.select(3), PtEngineVariant::Run2016);
        assert_eq!(sel.active().pt_lut_version(), 3);
        assert_eq!(sel.select(7), PtEngineVariant::Run2017);
        assert_eq!(sel.select(5), PtEngineVariant::Run2016);
        // the idle engine keeps the version it was last given
        assert_eq!(sel.engine(PtEngineVariant::Run2017).pt_lut_version(), 7);
        assert_eq!(sel.active().variant(), PtEngineVariant::Run2016);
    }

    #[test]
    fn tree_walk() {
        let t = stump(1.0, 2.0);
        assert_eq!(t.evaluate(&[10.0]), 1.0);
        assert_eq!(t.evaluate(&[50.0]), 2.0);
        let broken = RegressionTree {
            nodes: vec![TreeNode::Split {
                feature: 0,
                cut: 0.0,
                left: 0,
                right: 0,
            }],
        };
        assert_eq!(broken.evaluate(&[1.0]), 0.0);
    }

    #[test]
    fn engines_interpret_response_differently() {
        let f = forest(15, vec![stump(0.05, 0.1), stump(0.05, 0.1)]);
        let mut e16 = PtAssignmentEngine2016::new();
        e16.load(f.clone());
        assert_abs_diff_eq!(e16.assign(&features(15, 20)), 10.0, epsilon = 1e-4);

        let f = forest(15, vec![stump(2.0, 1.0), stump(2.0, 1.0)]);
        let mut e17 = PtAssignmentEngine2017::new();
        e17.load(f);
        assert_abs_diff_eq!(e17.assign(&features(15, 20)), 16.0, epsilon = 1e-4);
        assert_abs_diff_eq!(e17.assign(&features(15, 60)), 4.0, epsilon = 1e-4);
    }

    #[test]
    fn unknown_mode_or_no_forest_gives_zero() {
        let mut e = PtAssignmentEngine2016::new();
        assert_eq!(e.assign(&features(15, 20)), 0.0);
        e.load(forest(15, vec![stump(0.1, 0.1)]));
        assert_eq!(e.assign(&features(3, 20)), 0.0);
    }

    #[test]
    fn addresses_fit_30_bits() {
        let big = PtFeatures {
            mode: 15,
            theta: 127,
            dphi: [4095, 4095, 4095],
            dphi_sign: -1,
            bend: 15,
        };
        assert!(PtAssignmentEngine2016::new().calculate_address(&big) < 1 << 30);
        assert!(PtAssignmentEngine2017::new().calculate_address(&big) < 1 << 30);
        assert_ne!(
            PtAssignmentEngine2016::new().calculate_address(&features(11, 40)),
            PtAssignmentEngine2017::new().calculate_address(&features(11, 40))
        );
    }
}
