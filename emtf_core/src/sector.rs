//! Contract between the track finder and its sector processing units.
//!
//! A unit is configured once at construction, optionally re-tuned when the
//! conditions change, and then asked to process every event. Shared state it
//! needs while processing (geometry, conditions, conversion tables, the active
//! momentum engine) is lent to it through a [`SectorContext`] for the duration
//! of the call.

use crate::conditions::{ConditionHelper, ConditionsSnapshot};
use crate::config::TrackFinderConfig;
use crate::error::ConfigError;
use crate::geometry::GeometryTranslator;
use crate::lut::PrimitiveConversionLut;
use crate::pt_assign::PtAssignmentEngine;
use crate::types::{EmtfHitCollection, EmtfTrackCollection, SectorCoord, TriggerPrimitive};

/// Everything a unit receives at configuration time.
#[derive(Clone, Copy, Debug)]
pub struct SectorSetup<'a> {
    pub coord: SectorCoord,
    /// Flat index, always `coord.index()`
    pub sector_idx: usize,
    pub verbosity: i32,
    pub config: &'a TrackFinderConfig,
}

impl<'a> SectorSetup<'a> {
    pub fn new(coord: SectorCoord, config: &'a TrackFinderConfig) -> Self {
        Self {
            coord,
            sector_idx: coord.index(),
            verbosity: config.verbosity,
            config,
        }
    }
}

/// Read-only view of the shared collaborators, valid for one `process` call.
#[derive(Clone, Copy)]
pub struct SectorContext<'a> {
    pub geometry: &'a dyn GeometryTranslator,
    pub conditions: &'a dyn ConditionHelper,
    pub pc_lut: &'a PrimitiveConversionLut,
    pub pt_engine: &'a dyn PtAssignmentEngine,
    pub snapshot: ConditionsSnapshot,
}

pub trait SectorProcessor: Send {
    /// One-time setup. An error aborts track finder construction.
    fn configure(&mut self, setup: &SectorSetup<'_>) -> Result<(), ConfigError>;

    /// Apply firmware-specific settings. Called on real data only, after a
    /// conditions change.
    fn configure_by_fw_version(&mut self, _fw_version: u32) {}

    fn set_pt_lut_version(&mut self, pt_lut_version: u32);

    /// Receive every primitive of the event and append this unit's hits and
    /// tracks. Filtering by sector is the unit's job.
    fn process(
        &mut self,
        ctx: &SectorContext<'_>,
        event_id: u64,
        primitives: &[TriggerPrimitive],
        out_hits: &mut EmtfHitCollection,
        out_tracks: &mut EmtfTrackCollection,
    );
}
