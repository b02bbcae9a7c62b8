//! Replay: serialize/deserialize generated runs for offline re-processing.

use crate::muon_gun::Muon;
use crate::scenarios::RunSchedule;
use emtf_core::event::{Event, EventSetup, GeometryRecord};
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// A full recorded run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLog {
    pub scenario_name: String,
    pub seed: u64,
    pub schedule: RunSchedule,
    pub geometry: GeometryRecord,
    /// All events in processing order
    pub events: Vec<Event>,
    /// Generator truth, one entry per event
    pub truth: Vec<Vec<Muon>>,
}

impl EventLog {
    /// Setups to pair with the recorded events, rebuilt from the schedule.
    pub fn setups(&self) -> Vec<EventSetup> {
        self.schedule.setups(&self.geometry)
    }
}

/// Save an event log to a JSON file.
pub fn save_event_log(log: &EventLog, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer(writer, log)?;
    Ok(())
}

/// Load an event log from a JSON file.
pub fn load_event_log(path: &Path) -> anyhow::Result<EventLog> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let log: EventLog = serde_json::from_reader(reader)?;
    anyhow::ensure!(
        log.truth.is_empty() || log.truth.len() == log.events.len(),
        "{}: {} events but {} truth entries",
        path.display(),
        log.events.len(),
        log.truth.len()
    );
    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::muon_gun::MuonGun;
    use crate::scenarios::{Scenario, ScenarioKind};
    use emtf_core::TrackFinderConfig;

    fn record(n: u64) -> EventLog {
        let s = Scenario::build(ScenarioKind::Mixed, 5, n);
        let mut gun = MuonGun::new(s.gun.clone(), &TrackFinderConfig::default(), s.seed);
        let (events, truth) = (0..n).map(|id| gun.generate(s.run, id, s.is_real_data)).unzip();
        EventLog {
            scenario_name: s.name,
            seed: s.seed,
            schedule: s.schedule,
            geometry: s.geometry,
            events,
            truth,
        }
    }

    #[test]
    fn saved_log_loads_back() {
        let log = record(8);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        save_event_log(&log, &path).unwrap();

        let back = load_event_log(&path).unwrap();
        assert_eq!(back.events, log.events);
        assert_eq!(back.truth.len(), log.truth.len());
        for (a, b) in back.truth.iter().flatten().zip(log.truth.iter().flatten()) {
            assert_eq!((a.id, a.charge, a.bx), (b.id, b.charge, b.bx));
            assert_abs_diff_eq!(a.pt, b.pt, epsilon = 1e-9);
        }
        assert_eq!(back.schedule, log.schedule);
        assert_eq!(back.setups().len(), 4);
    }

    #[test]
    fn mismatched_truth_is_rejected() {
        let mut log = record(3);
        log.truth.pop();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        save_event_log(&log, &path).unwrap();
        assert!(load_event_log(&path).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_event_log(Path::new("/nonexistent/run.json")).is_err());
    }
}
