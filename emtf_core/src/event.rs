//! Event and setup records handed to the track finder.
//!
//! An [`Event`] carries the raw subsystem products keyed by input label; an
//! [`EventSetup`] carries the geometry and conditions records valid for it.
//! Both are produced by whatever drives the event loop (the simulator, a
//! replay log, or a real readout).

use crate::pt_assign::PtForest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Raw subsystem digis
// ---------------------------------------------------------------------------

/// Cathode strip chamber local charged track (LCT).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CscDigi {
    pub endcap: i32,
    pub station: i32,
    pub ring: i32,
    pub sector: i32,
    pub subsector: i32,
    pub chamber: i32,
    pub bx: i32,
    pub valid: bool,
    pub quality: i32,
    pub pattern: i32,
    pub keywire: i32,
    /// Half-strip number
    pub strip: i32,
    pub bend: i32,
}

/// RPC cluster after the concentrator, already in trigger coordinates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcDigi {
    pub endcap: i32,
    pub station: i32,
    pub ring: i32,
    pub sector: i32,
    pub subsector: i32,
    pub roll: i32,
    pub bx: i32,
    pub phi_int: i32,
    pub theta_int: i32,
    pub cluster_size: i32,
}

/// GEM pad cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GemDigi {
    pub endcap: i32,
    pub station: i32,
    pub ring: i32,
    pub chamber: i32,
    pub layer: i32,
    pub roll: i32,
    pub pad: i32,
    pub cluster_size: i32,
    pub bx: i32,
}

/// One labelled product of an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DigiCollection {
    Csc(Vec<CscDigi>),
    Rpc(Vec<RpcDigi>),
    Gem(Vec<GemDigi>),
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub run: u32,
    pub id: u64,
    /// False for simulated events
    pub is_real_data: bool,
    pub products: BTreeMap<String, DigiCollection>,
}

impl Event {
    pub fn new(run: u32, id: u64, is_real_data: bool) -> Self {
        Self {
            run,
            id,
            is_real_data,
            products: BTreeMap::new(),
        }
    }

    pub fn with_product(mut self, label: impl Into<String>, product: DigiCollection) -> Self {
        self.products.insert(label.into(), product);
        self
    }

    pub fn product(&self, label: &str) -> Option<&DigiCollection> {
        self.products.get(label)
    }
}

// ---------------------------------------------------------------------------
// EventSetup
// ---------------------------------------------------------------------------

/// Detector geometry record. `cache_id` changes whenever the content does.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometryRecord {
    pub cache_id: u64,
    pub label: String,
}

/// Run-dependent trigger conditions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConditionsRecord {
    pub cache_id: u64,
    pub fw_version: u32,
    pub pt_lut_version: u32,
    pub pc_lut_version: u32,
    pub forest: Arc<PtForest>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventSetup {
    pub geometry: GeometryRecord,
    pub conditions: ConditionsRecord,
}
