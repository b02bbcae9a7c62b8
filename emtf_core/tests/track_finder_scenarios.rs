use emtf_core::event::{
    ConditionsRecord, CscDigi, DigiCollection, GemDigi, GeometryRecord, RpcDigi,
};
use emtf_core::lut::{lut_set_name, InMemoryLutStore, PcLutTables};
use emtf_core::types::{EmtfHitCollection, EmtfTrackCollection};
use emtf_core::*;
use std::sync::Arc;

/// Records every call the track finder makes.
#[derive(Default)]
struct RecordingProcessor {
    sector_idx: usize,
    fw_versions: Vec<u32>,
    pt_lut_versions: Vec<u32>,
    seen: Vec<Vec<TriggerPrimitive>>,
    engines: Vec<PtEngineVariant>,
}

impl SectorProcessor for RecordingProcessor {
    fn configure(&mut self, setup: &SectorSetup<'_>) -> Result<(), ConfigError> {
        self.sector_idx = setup.sector_idx;
        Ok(())
    }

    fn configure_by_fw_version(&mut self, fw_version: u32) {
        self.fw_versions.push(fw_version);
    }

    fn set_pt_lut_version(&mut self, pt_lut_version: u32) {
        self.pt_lut_versions.push(pt_lut_version);
    }

    fn process(
        &mut self,
        ctx: &SectorContext<'_>,
        _event_id: u64,
        primitives: &[TriggerPrimitive],
        _out_hits: &mut EmtfHitCollection,
        _out_tracks: &mut EmtfTrackCollection,
    ) {
        self.seen.push(primitives.to_vec());
        self.engines.push(ctx.pt_engine.variant());
    }
}

fn config(rpc_enable: bool, gem_enable: bool) -> TrackFinderConfig {
    TrackFinderConfig {
        csc_enable: true,
        rpc_enable,
        gem_enable,
        ..Default::default()
    }
}

fn finder(config: TrackFinderConfig) -> TrackFinder<RecordingProcessor> {
    let mut store = InMemoryLutStore::new();
    for v in 0..3 {
        store.insert(lut_set_name(v), PcLutTables::default());
    }
    TrackFinder::new(config, Collaborators::cached(Box::new(store))).unwrap()
}

fn setup(cache_id: u64, fw_version: u32, pt_lut_version: u32) -> EventSetup {
    EventSetup {
        geometry: GeometryRecord {
            cache_id: 1,
            label: "run3".to_string(),
        },
        conditions: ConditionsRecord {
            cache_id,
            fw_version,
            pt_lut_version,
            pc_lut_version: 2,
            forest: Arc::new(PtForest::default()),
        },
    }
}

fn full_event(id: u64, is_real_data: bool) -> Event {
    let cfg = TrackFinderConfig::default();
    let csc = (1..=3)
        .map(|chamber| CscDigi {
            endcap: 1,
            station: 2,
            ring: 1,
            sector: 1,
            subsector: 0,
            chamber,
            bx: 6,
            valid: true,
            quality: 14,
            pattern: 9,
            keywire: 30,
            strip: 80,
            bend: 1,
        })
        .collect();
    let rpc = vec![RpcDigi {
        endcap: 1,
        station: 3,
        ring: 2,
        sector: 1,
        subsector: 2,
        roll: 1,
        bx: 0,
        phi_int: 900,
        theta_int: 70,
        cluster_size: 2,
    }];
    let gem = vec![GemDigi {
        endcap: 1,
        station: 1,
        ring: 1,
        chamber: 4,
        layer: 1,
        roll: 3,
        pad: 50,
        cluster_size: 1,
        bx: 0,
    }];
    Event::new(320_000, id, is_real_data)
        .with_product(cfg.csc_input, DigiCollection::Csc(csc))
        .with_product(cfg.rpc_input, DigiCollection::Rpc(rpc))
        .with_product(cfg.gem_input, DigiCollection::Gem(gem))
}

fn run(
    tf: &mut TrackFinder<RecordingProcessor>,
    event: &Event,
    setup: &EventSetup,
) -> EventSummary {
    let mut hits = Vec::new();
    let mut tracks = Vec::new();
    tf.process(event, setup, &mut hits, &mut tracks)
}

#[test]
fn csc_only_with_2016_engine() {
    let mut tf = finder(config(false, false));
    let summary = run(&mut tf, &full_event(1, false), &setup(1, 60_000, 3));

    assert_eq!(summary.collected, vec![Subsystem::Csc]);
    assert_eq!(summary.n_primitives, 3);
    assert_eq!(tf.active_pt_engine(), PtEngineVariant::Run2016);

    let first = &tf.sector_processors()[0].seen[0];
    assert!(!first.is_empty());
    assert!(first.iter().all(|p| p.subsystem == Subsystem::Csc));
    for sp in tf.sector_processors() {
        assert_eq!(sp.seen.len(), 1);
        assert_eq!(&sp.seen[0], first, "every unit gets the full sequence");
        assert_eq!(sp.engines, vec![PtEngineVariant::Run2016]);
    }
}

#[test]
fn old_firmware_disables_rpc_and_gem_until_conditions_change() {
    let mut tf = finder(config(true, true));

    let s1 = run(&mut tf, &full_event(1, false), &setup(1, 40_000, 7));
    assert_eq!(s1.collected, vec![Subsystem::Csc]);
    assert!(!tf.is_enabled(Subsystem::Rpc));
    assert!(!tf.is_enabled(Subsystem::Gem));

    // same conditions: still disabled
    let s2 = run(&mut tf, &full_event(2, false), &setup(1, 40_000, 7));
    assert!(!s2.new_conditions);
    assert_eq!(s2.collected, vec![Subsystem::Csc]);
    assert_eq!(s2.n_primitives, 3);

    // newer firmware restores the configured flags
    let s3 = run(&mut tf, &full_event(3, false), &setup(2, 60_000, 7));
    assert!(s3.new_conditions);
    assert_eq!(s3.collected, vec![Subsystem::Csc, Subsystem::Rpc, Subsystem::Gem]);
    assert_eq!(s3.n_primitives, 5);
}

#[test]
fn unset_firmware_version_keeps_configured_flags() {
    let mut tf = finder(config(true, false));
    let s = run(&mut tf, &full_event(1, false), &setup(1, 0, 7));
    assert_eq!(s.collected, vec![Subsystem::Csc, Subsystem::Rpc]);
}

#[test]
fn identical_conditions_update_once() {
    let mut tf = finder(config(true, false));
    let s1 = run(&mut tf, &full_event(1, false), &setup(5, 60_000, 7));
    let s2 = run(&mut tf, &full_event(2, false), &setup(5, 60_000, 7));

    assert!(s1.new_conditions);
    assert!(!s2.new_conditions);
    assert_eq!(tf.conditions_updates(), 1);
    for sp in tf.sector_processors() {
        assert_eq!(sp.pt_lut_versions, vec![7]);
        assert_eq!(sp.seen.len(), 2);
    }
    let snapshot = tf.conditions_snapshot();
    assert_eq!(
        (snapshot.fw_version, snapshot.pt_lut_version, snapshot.pc_lut_version),
        (60_000, 7, 2)
    );
}

#[test]
fn firmware_reconfiguration_only_on_real_data() {
    let mut tf = finder(config(true, false));
    run(&mut tf, &full_event(1, false), &setup(1, 60_000, 7));
    assert!(tf.sector_processors().iter().all(|sp| sp.fw_versions.is_empty()));

    run(&mut tf, &full_event(2, true), &setup(2, 61_000, 7));
    assert!(tf
        .sector_processors()
        .iter()
        .all(|sp| sp.fw_versions == vec![61_000]));
}

#[test]
fn engine_switches_back_within_a_run() {
    let mut tf = finder(config(true, false));
    let versions = [(1, 3), (2, 7), (3, 5), (4, 6)];
    for (cache_id, pt) in versions {
        run(&mut tf, &full_event(cache_id, false), &setup(cache_id, 60_000, pt));
    }
    let engines = &tf.sector_processors()[11].engines;
    assert_eq!(
        engines,
        &vec![
            PtEngineVariant::Run2016,
            PtEngineVariant::Run2017,
            PtEngineVariant::Run2016,
            PtEngineVariant::Run2017,
        ]
    );
}

#[test]
fn missing_inputs_still_visit_every_sector() {
    let mut tf = finder(config(true, true));
    let empty = Event::new(1, 1, false);
    let s = run(&mut tf, &empty, &setup(1, 60_000, 7));
    assert_eq!(s.n_primitives, 0);
    assert_eq!(s.collected, vec![Subsystem::Csc, Subsystem::Rpc, Subsystem::Gem]);
    assert!(tf.sector_processors().iter().all(|sp| sp.seen == vec![vec![]]));
    let indices: Vec<usize> = tf.sector_processors().iter().map(|sp| sp.sector_idx).collect();
    assert_eq!(indices, (0..12).collect::<Vec<_>>());
}

#[test]
fn collection_order_is_stable_across_runs() {
    let collect = || {
        let mut tf = finder(config(true, true));
        run(&mut tf, &full_event(1, false), &setup(1, 60_000, 7));
        tf.sector_processors()[0].seen[0].clone()
    };
    let a = collect();
    assert_eq!(a, collect());
    let order: Vec<Subsystem> = a.iter().map(|p| p.subsystem).collect();
    assert_eq!(
        order,
        vec![
            Subsystem::Csc,
            Subsystem::Csc,
            Subsystem::Csc,
            Subsystem::Rpc,
            Subsystem::Gem
        ]
    );
    let rank = |s: &Subsystem| Subsystem::ORDER.iter().position(|o| o == s);
    assert!(order.windows(2).all(|w| rank(&w[0]) <= rank(&w[1])));
}

#[test]
fn collected_subsystems_follow_the_fixed_order() {
    let mut tf = finder(config(true, true));
    let s = run(&mut tf, &full_event(1, false), &setup(1, 60_000, 7));
    assert_eq!(s.collected, Subsystem::ORDER.to_vec());
}
