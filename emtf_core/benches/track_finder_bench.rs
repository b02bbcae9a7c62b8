use criterion::{black_box, criterion_group, criterion_main, Criterion};
use emtf_core::event::{ConditionsRecord, CscDigi, DigiCollection, GeometryRecord};
use emtf_core::lut::{lut_set_name, InMemoryLutStore, PcLutTables};
use emtf_core::types::{EmtfHitCollection, EmtfTrackCollection};
use emtf_core::*;
use std::sync::Arc;

/// Converts its own sector's primitives to hits.
#[derive(Default)]
struct FilterProcessor {
    coord: Option<SectorCoord>,
}

impl SectorProcessor for FilterProcessor {
    fn configure(&mut self, setup: &SectorSetup<'_>) -> Result<(), ConfigError> {
        self.coord = Some(setup.coord);
        Ok(())
    }

    fn set_pt_lut_version(&mut self, _pt_lut_version: u32) {}

    fn process(
        &mut self,
        _ctx: &SectorContext<'_>,
        _event_id: u64,
        primitives: &[TriggerPrimitive],
        out_hits: &mut EmtfHitCollection,
        _out_tracks: &mut EmtfTrackCollection,
    ) {
        let coord = self.coord;
        out_hits.extend(
            primitives
                .iter()
                .filter(|p| p.coord() == coord)
                .map(|p| EmtfHit {
                    subsystem: Some(p.subsystem),
                    endcap: p.endcap,
                    sector: p.sector,
                    sector_idx: p.coord().map_or(0, |c| c.index()),
                    bx: p.bx,
                    ..Default::default()
                }),
        );
    }
}

fn make_event(n: usize) -> Event {
    let digis = (0..n)
        .map(|i| CscDigi {
            endcap: 1 + (i % 2) as i32,
            station: 1 + (i % 4) as i32,
            ring: 1,
            sector: 1 + (i % 6) as i32,
            subsector: 1,
            chamber: 1 + (i % 9) as i32,
            bx: 6,
            valid: true,
            quality: 15,
            pattern: 10,
            keywire: (i % 48) as i32,
            strip: (i % 160) as i32,
            bend: 0,
        })
        .collect();
    Event::new(1, 1, false).with_product(
        TrackFinderConfig::default().csc_input,
        DigiCollection::Csc(digis),
    )
}

fn make_setup() -> EventSetup {
    EventSetup {
        geometry: GeometryRecord {
            cache_id: 1,
            label: "bench".to_string(),
        },
        conditions: ConditionsRecord {
            cache_id: 1,
            fw_version: 60_000,
            pt_lut_version: 7,
            pc_lut_version: 1,
            forest: Arc::new(PtForest::default()),
        },
    }
}

fn bench_track_finder(c: &mut Criterion) {
    let mut group = c.benchmark_group("track_finder");
    let setup = make_setup();

    for parallel_sectors in [false, true] {
        for n in [10, 100, 1000] {
            let event = make_event(n);
            let config = TrackFinderConfig {
                parallel_sectors,
                ..Default::default()
            };
            let store = InMemoryLutStore::new().with_set(lut_set_name(1), PcLutTables::default());
            let mut tf: TrackFinder<FilterProcessor> =
                TrackFinder::new(config, Collaborators::cached(Box::new(store)))
                    .expect("default config is valid");
            let mut hits = Vec::new();
            let mut tracks = Vec::new();
            let label = if parallel_sectors { "parallel" } else { "sequential" };
            group.bench_function(format!("{label}_{n}_primitives"), |b| {
                b.iter(|| black_box(tf.process(&event, &setup, &mut hits, &mut tracks)));
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_track_finder);
criterion_main!(benches);
