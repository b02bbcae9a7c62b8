//! Run conditions: firmware and LUT versions plus the trained pT forest.
//!
//! # Update policy
//! The track finder asks once per event whether conditions changed. Only then
//! does it read the three version numbers, and it stores them together in a
//! [`ConditionsSnapshot`]. Before the first event the snapshot holds sentinel
//! values that no real record carries, so the first event always reconfigures.

use crate::event::{ConditionsRecord, Event, EventSetup};
use crate::pt_assign::PtForest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const FW_VERSION_SENTINEL: u32 = 999_999;
pub const PT_LUT_VERSION_SENTINEL: u32 = 888_888;
pub const PC_LUT_VERSION_SENTINEL: u32 = 777_777;

/// Firmware version reported when the record does not set one.
pub const FW_VERSION_UNSET: u32 = 0;

/// Oldest firmware generation that reads out RPC and GEM inputs.
pub const FW_VERSION_RPC_GEM_MIN: u32 = 50_000;

/// The three version numbers in effect, always updated together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionsSnapshot {
    pub fw_version: u32,
    pub pt_lut_version: u32,
    pub pc_lut_version: u32,
}

impl ConditionsSnapshot {
    pub const UNINITIALIZED: Self = Self {
        fw_version: FW_VERSION_SENTINEL,
        pt_lut_version: PT_LUT_VERSION_SENTINEL,
        pc_lut_version: PC_LUT_VERSION_SENTINEL,
    };

    /// Read all three versions from the helper at once.
    pub fn from_helper(helper: &dyn ConditionHelper) -> Self {
        Self {
            fw_version: helper.fw_version(),
            pt_lut_version: helper.pt_lut_version(),
            pc_lut_version: helper.pc_lut_version(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        *self != Self::UNINITIALIZED
    }

    /// Firmware older than [`FW_VERSION_RPC_GEM_MIN`] never sees RPC or GEM hits.
    /// An unset version places no restriction.
    pub fn allows_rpc_gem(&self) -> bool {
        !(self.fw_version != FW_VERSION_UNSET && self.fw_version < FW_VERSION_RPC_GEM_MIN)
    }
}

impl Default for ConditionsSnapshot {
    fn default() -> Self {
        Self::UNINITIALIZED
    }
}

pub trait ConditionHelper: Send + Sync {
    /// Pick up the conditions valid for this event. Returns true if they changed.
    fn check_and_update_conditions(&mut self, event: &Event, setup: &EventSetup) -> bool;

    fn fw_version(&self) -> u32;
    fn pt_lut_version(&self) -> u32;
    fn pc_lut_version(&self) -> u32;

    /// Trained forest for the momentum engines.
    fn forest(&self) -> &Arc<PtForest>;
}

/// Tracks the conditions record by cache id.
#[derive(Clone, Debug, Default)]
pub struct CachedConditionHelper {
    record: Option<ConditionsRecord>,
    empty_forest: Arc<PtForest>,
}

impl CachedConditionHelper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self) -> Option<&ConditionsRecord> {
        self.record.as_ref()
    }
}

impl ConditionHelper for CachedConditionHelper {
    fn check_and_update_conditions(&mut self, event: &Event, setup: &EventSetup) -> bool {
        let current = self.record.as_ref().map(|r| r.cache_id);
        if current == Some(setup.conditions.cache_id) {
            return false;
        }
        tracing::debug!(
            run = event.run,
            event = event.id,
            cache_id = setup.conditions.cache_id,
            "conditions record changed"
        );
        self.record = Some(setup.conditions.clone());
        true
    }

    fn fw_version(&self) -> u32 {
        self.record
            .as_ref()
            .map_or(FW_VERSION_SENTINEL, |r| r.fw_version)
    }

    fn pt_lut_version(&self) -> u32 {
        self.record
            .as_ref()
            .map_or(PT_LUT_VERSION_SENTINEL, |r| r.pt_lut_version)
    }

    fn pc_lut_version(&self) -> u32 {
        self.record
            .as_ref()
            .map_or(PC_LUT_VERSION_SENTINEL, |r| r.pc_lut_version)
    }

    fn forest(&self) -> &Arc<PtForest> {
        self.record
            .as_ref()
            .map_or(&self.empty_forest, |r| &r.forest)
    }
}
