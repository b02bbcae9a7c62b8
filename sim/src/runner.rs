//! Drives a track finder built on [`SimpleSectorProcessor`] through a run.

use crate::metrics::RunMetrics;
use crate::muon_gun::Muon;
use crate::scenarios::{synthetic_lut_store, RunSchedule};
use crate::sector_emulator::SimpleSectorProcessor;
use emtf_core::event::{EventSetup, GeometryRecord};
use emtf_core::types::{EmtfHitCollection, EmtfTrackCollection};
use emtf_core::{Collaborators, ConfigError, Event, EventSummary, TrackFinder, TrackFinderConfig};

pub struct RunDriver {
    track_finder: TrackFinder<SimpleSectorProcessor>,
    schedule: RunSchedule,
    setups: Vec<EventSetup>,
    hits: EmtfHitCollection,
    tracks: EmtfTrackCollection,
    pub metrics: RunMetrics,
}

impl RunDriver {
    pub fn new(
        config: TrackFinderConfig,
        schedule: RunSchedule,
        geometry: &GeometryRecord,
    ) -> Result<Self, ConfigError> {
        let store = synthetic_lut_store();
        let track_finder = TrackFinder::new(config, Collaborators::cached(Box::new(store)))?;
        let setups = schedule.setups(geometry);
        Ok(Self {
            track_finder,
            schedule,
            setups,
            hits: Vec::new(),
            tracks: Vec::new(),
            metrics: RunMetrics::default(),
        })
    }

    /// Process one event with the setup its epoch prescribes.
    pub fn process(&mut self, event: &Event, truth: &[Muon]) -> Option<EventSummary> {
        let setup = self.setups.get(self.schedule.epoch_index(event.id))?;
        let summary = self
            .track_finder
            .process(event, setup, &mut self.hits, &mut self.tracks);
        self.metrics.accumulate(&summary, truth, &self.tracks);
        Some(summary)
    }

    pub fn track_finder(&self) -> &TrackFinder<SimpleSectorProcessor> {
        &self.track_finder
    }

    /// Hits of the last processed event.
    pub fn hits(&self) -> &EmtfHitCollection {
        &self.hits
    }

    /// Tracks of the last processed event.
    pub fn tracks(&self) -> &EmtfTrackCollection {
        &self.tracks
    }
}
