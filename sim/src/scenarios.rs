//! Scenario definitions.
//!
//! A scenario is a run: gun settings plus a schedule of conditions epochs.
//! Each epoch starts at an event number and carries the firmware, PT-LUT and
//! PC-LUT versions delivered from then on. All scenarios are deterministic
//! given the same seed.

use crate::layout::{self, PHI_FP_PER_DEG};
use crate::muon_gun::{GunParams, BEND_K};
use emtf_core::event::{ConditionsRecord, EventSetup, GeometryRecord};
use emtf_core::lut::{lut_set_name, InMemoryLutStore, PcLutTables, PC_CHAMBERS, PC_STATIONS};
use emtf_core::pt_assign::{RegressionTree, TreeNode};
use emtf_core::types::{SectorCoord, NUM_SECTORS};
use emtf_core::{PtEngineVariant, PtForest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which pre-defined scenario to load.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
    /// 2016 data: old firmware, RPC/GEM off, 2016 pT engine
    Run2016,
    /// 2017 simulation: new firmware, 2017 pT engine
    Run2017,
    /// One data run crossing several conditions epochs, switching engines back and forth
    Mixed,
}

/// Conditions delivered from `first_event` on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionsEpoch {
    pub first_event: u64,
    pub fw_version: u32,
    pub pt_lut_version: u32,
    pub pc_lut_version: u32,
}

/// Conditions epochs of one run, sorted by `first_event`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSchedule {
    pub epochs: Vec<ConditionsEpoch>,
}

impl RunSchedule {
    /// Index of the epoch in force at `event_id`.
    pub fn epoch_index(&self, event_id: u64) -> usize {
        self.epochs
            .iter()
            .rposition(|e| e.first_event <= event_id)
            .unwrap_or(0)
    }

    /// One event setup per epoch. Each epoch gets its own cache id; forests
    /// are shared between epochs of the same engine generation.
    pub fn setups(&self, geometry: &GeometryRecord) -> Vec<EventSetup> {
        let forest_2016 = Arc::new(synthetic_forest(PtEngineVariant::Run2016));
        let forest_2017 = Arc::new(synthetic_forest(PtEngineVariant::Run2017));
        self.epochs
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let forest = match PtEngineVariant::for_pt_lut_version(e.pt_lut_version) {
                    PtEngineVariant::Run2016 => forest_2016.clone(),
                    PtEngineVariant::Run2017 => forest_2017.clone(),
                };
                EventSetup {
                    geometry: geometry.clone(),
                    conditions: ConditionsRecord {
                        cache_id: i as u64 + 1,
                        fw_version: e.fw_version,
                        pt_lut_version: e.pt_lut_version,
                        pc_lut_version: e.pc_lut_version,
                        forest,
                    },
                }
            })
            .collect()
    }
}

/// A fully configured simulation scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    pub run: u32,
    pub n_events: u64,
    pub is_real_data: bool,
    pub gun: GunParams,
    pub schedule: RunSchedule,
    pub geometry: GeometryRecord,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64, n_events: u64) -> Self {
        match kind {
            ScenarioKind::Run2016 => Self::run2016(seed, n_events),
            ScenarioKind::Run2017 => Self::run2017(seed, n_events),
            ScenarioKind::Mixed => Self::mixed(seed, n_events),
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 1: 2016 data
    // -----------------------------------------------------------------------
    fn run2016(seed: u64, n_events: u64) -> Self {
        Scenario {
            name: "run2016".into(),
            seed,
            run: 283_000,
            n_events,
            is_real_data: true,
            gun: GunParams::default(),
            schedule: RunSchedule {
                epochs: vec![epoch(0, 47_000, 5, 0)],
            },
            geometry: ideal_geometry(),
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 2: 2017 simulation
    // -----------------------------------------------------------------------
    fn run2017(seed: u64, n_events: u64) -> Self {
        Scenario {
            name: "run2017".into(),
            seed,
            run: 1,
            n_events,
            is_real_data: false,
            gun: GunParams {
                muons_per_event: 3,
                ..Default::default()
            },
            schedule: RunSchedule {
                epochs: vec![epoch(0, 60_000, 7, 2)],
            },
            geometry: ideal_geometry(),
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 3: conditions change mid-run
    // -----------------------------------------------------------------------
    fn mixed(seed: u64, n_events: u64) -> Self {
        let q = n_events / 4;
        Scenario {
            name: "mixed".into(),
            seed,
            run: 305_000,
            n_events,
            is_real_data: true,
            gun: GunParams {
                noise_per_event: 2.0,
                late_fraction: 0.05,
                ..Default::default()
            },
            schedule: RunSchedule {
                epochs: vec![
                    epoch(0, 47_000, 5, 0),
                    epoch(q, 60_000, 7, 1),
                    epoch(2 * q, 60_000, 4, 2),
                    epoch(3 * q, 61_000, 7, 2),
                ],
            },
            geometry: ideal_geometry(),
        }
    }
}

fn epoch(first_event: u64, fw_version: u32, pt_lut_version: u32, pc_lut_version: u32) -> ConditionsEpoch {
    ConditionsEpoch {
        first_event,
        fw_version,
        pt_lut_version,
        pc_lut_version,
    }
}

fn ideal_geometry() -> GeometryRecord {
    GeometryRecord {
        cache_id: 1,
        label: "ideal".into(),
    }
}

// ---------------------------------------------------------------------------
// Conversion tables
// ---------------------------------------------------------------------------

/// Conversion tables for every PC-LUT version the schedules use.
pub fn synthetic_lut_store() -> InMemoryLutStore {
    let mut store = InMemoryLutStore::new();
    for version in 0..3 {
        store.insert(lut_set_name(version), synthetic_lut_tables(version));
    }
    store
}

/// Tables matching the idealised layout: `ph_init` is the chamber's lower
/// edge in the unit's phi frame. Later versions add a small per-chamber
/// alignment correction.
pub fn synthetic_lut_tables(pc_lut_version: u32) -> PcLutTables {
    let n = NUM_SECTORS * PC_STATIONS * PC_CHAMBERS;
    let mut tables = PcLutTables {
        ph_init: vec![0; n],
        ph_disp: vec![1; n],
        th_init: vec![0; n],
    };
    for coord in SectorCoord::all() {
        for pc_station in 0..PC_STATIONS as i32 {
            for pc_chamber in 0..PC_CHAMBERS as i32 {
                let Some((station, ring, chamber)) =
                    layout::slot_chamber(coord.sector(), pc_station, pc_chamber)
                else {
                    continue;
                };
                let lo = layout::chamber_lo_deg(station, ring, chamber);
                let correction = match pc_lut_version {
                    0 => 0,
                    1 => chamber % 3 - 1,
                    _ => (chamber + coord.endcap()) % 2,
                };
                let i = (coord.index() * PC_STATIONS + pc_station as usize) * PC_CHAMBERS
                    + pc_chamber as usize;
                tables.ph_init[i] = layout::phi_to_fp(lo, coord.sector()) + correction;
            }
        }
    }
    tables
}

// ---------------------------------------------------------------------------
// Forests
// ---------------------------------------------------------------------------

const RAD_TO_PHI_FP: f64 = 180.0 / std::f64::consts::PI * PHI_FP_PER_DEG;

/// Bin edges on |Δφ| used by the synthetic trees.
const DPHI_EDGES: [f64; 18] = [
    1.0, 2.0, 3.0, 4.0, 6.0, 8.0, 12.0, 16.0, 24.0, 32.0, 48.0, 64.0, 96.0, 128.0, 192.0, 256.0,
    384.0, 512.0,
];

/// Modes with at least two stations.
const MULTI_STATION_MODES: [i32; 11] = [3, 5, 6, 7, 9, 10, 11, 12, 13, 14, 15];

/// |Δφ| between the first two stations of `mode` times pT, in phi units.
fn bend_scale(mode: i32) -> Option<f64> {
    let mut stations = (0usize..4).filter(|st| mode & (8 >> st) != 0);
    let a = stations.next()?;
    let b = stations.next()?;
    Some((BEND_K[b] - BEND_K[a]) * RAD_TO_PHI_FP)
}

/// Single-tree forests inverting the gun's bending model on Δφ of the first
/// station pair. The 2016 trees predict 1/pT, the 2017 trees log2(pT).
pub fn synthetic_forest(variant: PtEngineVariant) -> PtForest {
    let mut forest = PtForest::default();
    for mode in MULTI_STATION_MODES {
        let Some(scale) = bend_scale(mode) else {
            continue;
        };
        let pt_at = |dphi: f64| (scale / dphi).clamp(1.0, 1000.0);
        let tree = match variant {
            PtEngineVariant::Run2016 => binned_tree(1, &DPHI_EDGES, |d| 1.0 / pt_at(d)),
            PtEngineVariant::Run2017 => binned_tree(1, &DPHI_EDGES, |d| pt_at(d).log2()),
        };
        forest.trees_by_mode.insert(mode, vec![tree]);
    }
    forest
}

/// A chain of splits on one feature, one leaf per bin, valued at the bin centre.
fn binned_tree(feature: usize, edges: &[f64], value: impl Fn(f64) -> f64) -> RegressionTree {
    let mut nodes = Vec::with_capacity(2 * edges.len() + 1);
    let mut lo = 0.0;
    for &cut in edges {
        let at = nodes.len();
        nodes.push(TreeNode::Split {
            feature,
            cut,
            left: at + 1,
            right: at + 2,
        });
        nodes.push(TreeNode::Leaf {
            value: value(0.5 * (lo + cut)),
        });
        lo = cut;
    }
    nodes.push(TreeNode::Leaf {
        value: value(lo * 1.25),
    });
    RegressionTree { nodes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emtf_core::pt_assign::{
        PtAssignmentEngine, PtAssignmentEngine2016, PtAssignmentEngine2017, PtFeatures,
    };

    #[test]
    fn epoch_lookup() {
        let s = Scenario::build(ScenarioKind::Mixed, 1, 100);
        let idx: Vec<usize> = [0, 24, 25, 49, 50, 75, 99]
            .iter()
            .map(|&id| s.schedule.epoch_index(id))
            .collect();
        assert_eq!(idx, vec![0, 0, 1, 1, 2, 3, 3]);
    }

    #[test]
    fn setups_have_distinct_cache_ids() {
        let s = Scenario::build(ScenarioKind::Mixed, 1, 100);
        let setups = s.schedule.setups(&s.geometry);
        assert_eq!(setups.len(), 4);
        let ids: Vec<u64> = setups.iter().map(|e| e.conditions.cache_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        // epochs 0 and 2 share the 2016 forest
        assert!(Arc::ptr_eq(&setups[0].conditions.forest, &setups[2].conditions.forest));
    }

    #[test]
    fn lut_tables_cover_every_slot() {
        let t = synthetic_lut_tables(0);
        // sector 1 starts at 15°, chamber 3 of ME1/2 too
        assert_eq!(t.ph_init(0, 0, 3), 22 * 60);
        // the neighbor ME2/1 chamber starts 20° before the sector
        assert_eq!(t.ph_init(0, 5, 3), 2 * 60);
        assert_ne!(synthetic_lut_tables(1), t);
    }

    #[test]
    fn forests_invert_the_bending() {
        let features = |dphi0: i32| PtFeatures {
            mode: 12,
            theta: 40,
            dphi: [dphi0, 0, 0],
            dphi_sign: 1,
            bend: 0,
        };
        // st1-st2 scale is 0.15 rad × 3437.7 ≈ 516 units·GeV
        let mut e16 = PtAssignmentEngine2016::new();
        e16.load(Arc::new(synthetic_forest(PtEngineVariant::Run2016)));
        let mut e17 = PtAssignmentEngine2017::new();
        e17.load(Arc::new(synthetic_forest(PtEngineVariant::Run2017)));

        for (dphi0, pt) in [(100, 5.16), (20, 25.8)] {
            for got in [e16.assign(&features(dphi0)), e17.assign(&features(dphi0))] {
                let rel = (got as f64 - pt).abs() / pt;
                assert!(rel < 0.3, "dphi {dphi0}: got {got}, want ~{pt}");
            }
        }
        assert!(e16.assign(&features(200)) < e16.assign(&features(50)));
    }

    #[test]
    fn single_station_modes_have_no_trees() {
        let f = synthetic_forest(PtEngineVariant::Run2017);
        for mode in [1, 2, 4, 8] {
            assert!(!f.trees_by_mode.contains_key(&mode));
        }
        assert_eq!(f.trees_by_mode.len(), MULTI_STATION_MODES.len());
    }
}
