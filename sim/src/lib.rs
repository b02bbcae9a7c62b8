//! `sim`: Event simulator: muon gun, conditions schedules, a reference
//! sector unit, run metrics and replay.

pub mod layout;
pub mod metrics;
pub mod muon_gun;
pub mod replay;
pub mod runner;
pub mod scenarios;
pub mod sector_emulator;

pub use metrics::RunMetrics;
pub use muon_gun::{GunParams, Muon, MuonGun};
pub use replay::{load_event_log, save_event_log, EventLog};
pub use runner::RunDriver;
pub use scenarios::{RunSchedule, Scenario, ScenarioKind};
pub use sector_emulator::SimpleSectorProcessor;
