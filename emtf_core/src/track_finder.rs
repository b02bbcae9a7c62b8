//! Track finder orchestrator: the full trigger cycle for one event.
//!
//! # Processing steps per event
//! 1. Clear the output collections
//! 2. Refresh the geometry translator
//! 3. Ask the condition helper whether conditions changed; if so:
//!    - read firmware, PC-LUT and PT-LUT versions together
//!    - disable RPC/GEM for firmware that never reads them out
//!    - reload the primitive-conversion LUT
//!    - select the momentum engine and load its forest
//! 4. Collect primitives from the enabled subsystems (CSC, RPC, GEM order)
//! 5. After a conditions change, re-tune every sector unit
//! 6. Run every sector unit on the full primitive sequence, grid order
//! 7. Optionally print the firmware-simulator dump

use crate::{
    collector::{CscTag, GemTag, RpcTag, SubsystemCollector},
    conditions::{CachedConditionHelper, ConditionHelper, ConditionsSnapshot},
    config::TrackFinderConfig,
    dump,
    error::ConfigError,
    event::{Event, EventSetup},
    geometry::{CachedGeometryTranslator, GeometryTranslator},
    lut::{LutStore, PrimitiveConversionLut},
    pt_assign::{PtEngineSelector, PtEngineVariant},
    sector::{SectorContext, SectorProcessor, SectorSetup},
    types::{
        EmtfHitCollection, EmtfTrackCollection, SectorCoord, Subsystem, TriggerPrimitive,
        TriggerPrimitiveCollection, NUM_SECTORS,
    },
};
use rayon::prelude::*;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;

/// External services the track finder owns for its whole lifetime.
pub struct Collaborators {
    pub geometry: Box<dyn GeometryTranslator>,
    pub conditions: Box<dyn ConditionHelper>,
    pub lut_store: Box<dyn LutStore>,
}

impl Collaborators {
    /// Cache-id driven geometry and conditions, tables from `lut_store`.
    pub fn cached(lut_store: Box<dyn LutStore>) -> Self {
        Self {
            geometry: Box::new(CachedGeometryTranslator::new()),
            conditions: Box::new(CachedConditionHelper::new()),
            lut_store,
        }
    }
}

/// What happened while processing one event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EventSummary {
    pub event_id: u64,
    pub new_conditions: bool,
    /// Subsystems whose inputs were read, in collection order
    pub collected: Vec<Subsystem>,
    pub n_primitives: usize,
    pub n_hits: usize,
    pub n_tracks: usize,
}

pub struct TrackFinder<P: SectorProcessor> {
    config: TrackFinderConfig,
    geometry: Box<dyn GeometryTranslator>,
    conditions: Box<dyn ConditionHelper>,
    pc_lut: PrimitiveConversionLut,
    pt_engines: PtEngineSelector,
    /// One unit per sector coordinate, position == `SectorCoord::index()`
    sector_processors: Vec<P>,
    collector: SubsystemCollector,
    snapshot: ConditionsSnapshot,
    use_csc: bool,
    use_rpc: bool,
    use_gem: bool,
    conditions_updates: u64,
}

impl<P: SectorProcessor + Default> TrackFinder<P> {
    pub fn new(config: TrackFinderConfig, collaborators: Collaborators) -> Result<Self, ConfigError> {
        Self::with_factory(config, collaborators, |_| P::default())
    }
}

impl<P: SectorProcessor> TrackFinder<P> {
    /// Validate the config, then build and configure every sector unit.
    /// The first error aborts construction.
    pub fn with_factory(
        config: TrackFinderConfig,
        collaborators: Collaborators,
        mut make_processor: impl FnMut(SectorCoord) -> P,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut sector_processors = Vec::with_capacity(NUM_SECTORS);
        for coord in SectorCoord::all() {
            let setup = SectorSetup::new(coord, &config);
            debug_assert_eq!(setup.sector_idx, sector_processors.len());
            let mut sp = make_processor(coord);
            sp.configure(&setup)?;
            sector_processors.push(sp);
        }
        tracing::debug!(n_sectors = sector_processors.len(), "sector processors configured");

        Ok(Self {
            pt_engines: PtEngineSelector::new(config.sp_pa_params16.pt_lut_version),
            geometry: collaborators.geometry,
            conditions: collaborators.conditions,
            pc_lut: PrimitiveConversionLut::new(collaborators.lut_store),
            sector_processors,
            collector: SubsystemCollector,
            snapshot: ConditionsSnapshot::UNINITIALIZED,
            use_csc: config.csc_enable,
            use_rpc: config.rpc_enable,
            use_gem: config.gem_enable,
            conditions_updates: 0,
            config,
        })
    }

    /// Process one event. `out_hits` and `out_tracks` are overwritten.
    pub fn process(
        &mut self,
        event: &Event,
        setup: &EventSetup,
        out_hits: &mut EmtfHitCollection,
        out_tracks: &mut EmtfTrackCollection,
    ) -> EventSummary {
        out_hits.clear();
        out_tracks.clear();

        self.geometry.check_and_update_geometry(setup);

        let new_conditions = self.conditions.check_and_update_conditions(event, setup);
        if new_conditions {
            self.update_conditions();
        }

        let (primitives, collected) = self.collect_primitives(event);
        if self.config.verbosity > 2 {
            let stdout = std::io::stdout();
            if let Err(err) = dump::write_primitives(&mut stdout.lock(), &primitives) {
                tracing::warn!("failed to print primitives: {err}");
            }
        }

        // every unit is re-tuned before any of them runs
        if new_conditions {
            for sp in &mut self.sector_processors {
                if event.is_real_data {
                    sp.configure_by_fw_version(self.snapshot.fw_version);
                }
                sp.set_pt_lut_version(self.snapshot.pt_lut_version);
            }
        }

        self.run_sectors(event.id, &primitives, out_hits, out_tracks);

        if self.config.verbosity > 0 {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            if let Err(err) = dump::write_dump(&mut lock, out_hits, out_tracks).and_then(|_| lock.flush()) {
                tracing::warn!("failed to print firmware dump: {err}");
            }
        }

        tracing::debug!(
            event = event.id,
            new_conditions,
            n_primitives = primitives.len(),
            n_hits = out_hits.len(),
            n_tracks = out_tracks.len(),
            "event processed"
        );

        EventSummary {
            event_id: event.id,
            new_conditions,
            collected,
            n_primitives: primitives.len(),
            n_hits: out_hits.len(),
            n_tracks: out_tracks.len(),
        }
    }

    fn update_conditions(&mut self) {
        let snapshot = ConditionsSnapshot::from_helper(&*self.conditions);
        self.snapshot = snapshot;

        // Re-derived on every change rather than latched off, so a later
        // epoch with newer firmware turns RPC/GEM back on.
        let rpc_gem_readout = snapshot.allows_rpc_gem();
        self.use_rpc = self.config.rpc_enable && rpc_gem_readout;
        self.use_gem = self.config.gem_enable && rpc_gem_readout;
        if !rpc_gem_readout && (self.config.rpc_enable || self.config.gem_enable) {
            tracing::info!(
                fw_version = snapshot.fw_version,
                "firmware has no RPC/GEM inputs, disabling them"
            );
        }

        self.pc_lut.read(snapshot.pc_lut_version);

        let variant = self.pt_engines.select(snapshot.pt_lut_version);
        let forest = Arc::clone(self.conditions.forest());
        self.pt_engines.active_mut().load(forest);

        self.conditions_updates += 1;
        tracing::info!(
            fw_version = snapshot.fw_version,
            pt_lut_version = snapshot.pt_lut_version,
            pc_lut_version = snapshot.pc_lut_version,
            engine = ?variant,
            "new conditions"
        );
    }

    fn collect_primitives(&self, event: &Event) -> (TriggerPrimitiveCollection, Vec<Subsystem>) {
        let mut primitives = TriggerPrimitiveCollection::new();
        let mut collected = Vec::with_capacity(Subsystem::ORDER.len());
        for subsystem in Subsystem::ORDER {
            if !self.is_enabled(subsystem) {
                continue;
            }
            let c = &self.collector;
            match subsystem {
                Subsystem::Csc => c.extract_primitives(CscTag, event, &self.config.csc_input, &mut primitives),
                Subsystem::Rpc => c.extract_primitives(RpcTag, event, &self.config.rpc_input, &mut primitives),
                Subsystem::Gem => c.extract_primitives(GemTag, event, &self.config.gem_input, &mut primitives),
            };
            collected.push(subsystem);
        }
        (primitives, collected)
    }

    fn run_sectors(
        &mut self,
        event_id: u64,
        primitives: &[TriggerPrimitive],
        out_hits: &mut EmtfHitCollection,
        out_tracks: &mut EmtfTrackCollection,
    ) {
        let ctx = SectorContext {
            geometry: &*self.geometry,
            conditions: &*self.conditions,
            pc_lut: &self.pc_lut,
            pt_engine: self.pt_engines.active(),
            snapshot: self.snapshot,
        };

        if self.config.parallel_sectors {
            // per-unit buffers, merged in grid order
            let outputs: Vec<(EmtfHitCollection, EmtfTrackCollection)> = self
                .sector_processors
                .par_iter_mut()
                .map(|sp| {
                    let mut hits = Vec::new();
                    let mut tracks = Vec::new();
                    sp.process(&ctx, event_id, primitives, &mut hits, &mut tracks);
                    (hits, tracks)
                })
                .collect();
            for (hits, tracks) in outputs {
                out_hits.extend(hits);
                out_tracks.extend(tracks);
            }
        } else {
            for sp in &mut self.sector_processors {
                sp.process(&ctx, event_id, primitives, out_hits, out_tracks);
            }
        }
    }

    pub fn config(&self) -> &TrackFinderConfig {
        &self.config
    }

    pub fn conditions_snapshot(&self) -> ConditionsSnapshot {
        self.snapshot
    }

    /// How many times the conditions branch has run.
    pub fn conditions_updates(&self) -> u64 {
        self.conditions_updates
    }

    pub fn active_pt_engine(&self) -> PtEngineVariant {
        self.pt_engines.active_variant()
    }

    pub fn pt_engines(&self) -> &PtEngineSelector {
        &self.pt_engines
    }

    pub fn pc_lut(&self) -> &PrimitiveConversionLut {
        &self.pc_lut
    }

    /// Whether primitives of `subsystem` are currently collected.
    pub fn is_enabled(&self, subsystem: Subsystem) -> bool {
        match subsystem {
            Subsystem::Csc => self.use_csc,
            Subsystem::Rpc => self.use_rpc,
            Subsystem::Gem => self.use_gem,
        }
    }

    pub fn sector_processors(&self) -> &[P] {
        &self.sector_processors
    }

    pub fn sector_processor(&self, coord: SectorCoord) -> &P {
        &self.sector_processors[coord.index()]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
