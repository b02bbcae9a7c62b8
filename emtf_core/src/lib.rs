//! `emtf_core`: Endcap muon track finder orchestration.
//!
//! # Module layout
//! - [`types`] Sector grid, trigger primitives, output hits and tracks
//! - [`event`] Event products and setup records
//! - [`config`] Track finder configuration bundle
//! - [`error`] Configuration and LUT errors
//! - [`collector`] Subsystem digis → ordered trigger primitives
//! - [`conditions`] Condition helper contract and version snapshot
//! - [`geometry`] Geometry translator contract
//! - [`lut`] Primitive-conversion tables and their stores
//! - [`pt_assign`] Momentum engines (2016 / 2017) and their selector
//! - [`sector`] Sector processing unit contract
//! - [`track_finder`] Per-event orchestrator
//! - [`dump`] Firmware-simulator text dump

pub mod collector;
pub mod conditions;
pub mod config;
pub mod dump;
pub mod error;
pub mod event;
pub mod geometry;
pub mod lut;
pub mod pt_assign;
pub mod sector;
pub mod track_finder;
pub mod types;

pub use conditions::{CachedConditionHelper, ConditionHelper, ConditionsSnapshot};
pub use config::TrackFinderConfig;
pub use error::{ConfigError, LutError};
pub use event::{Event, EventSetup};
pub use geometry::{CachedGeometryTranslator, GeometryTranslator};
pub use pt_assign::{PtAssignmentEngine, PtEngineVariant, PtForest};
pub use sector::{SectorContext, SectorProcessor, SectorSetup};
pub use track_finder::{Collaborators, EventSummary, TrackFinder};
pub use types::{EmtfHit, EmtfTrack, SectorCoord, Subsystem, TriggerPrimitive};
