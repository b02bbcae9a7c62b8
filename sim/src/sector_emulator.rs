//! Reference sector unit used by the simulator and the CLI.
//!
//! A deliberately small model of one sector processor:
//!
//! # Processing steps
//! 1. **Select** – keep primitives of this endcap that the unit reads: its own
//!    chambers and, when `include_neighbor` is set, the last chamber of the
//!    previous sector.
//! 2. **Convert** – shift the BX per subsystem, drop hits outside
//!    `[min_bx, max_bx]`, and compute fixed-point phi/theta from the
//!    primitive-conversion tables.
//! 3. **Build** – for every BX, gather the hits of the last `bx_window` BX and
//!    keep the first hit per station. The station pattern is the track mode.
//! 4. **Assign** – ask the active momentum engine for the LUT address and pT,
//!    and fill the GMT words.

use crate::layout::{self, PcSlot, GEM_ABS_ETA, GEM_PADS, GEM_ROLLS, HALF_STRIPS, PHI_FP_PER_DEG};
use emtf_core::lut::PcLutTables;
use emtf_core::pt_assign::PtFeatures;
use emtf_core::types::{EmtfHitCollection, EmtfTrackCollection, PtLutData};
use emtf_core::{
    ConfigError, EmtfHit, EmtfTrack, SectorContext, SectorCoord, SectorProcessor, SectorSetup,
    Subsystem, TriggerPrimitive,
};

/// Firmware versions below this run the 2016 track building.
pub const FW_VERSION_2017: u32 = 50_000;

/// GMT η unit.
const GMT_ETA_LSB: f64 = 0.010875;
/// GMT φ unit, in degrees.
const GMT_PHI_LSB_DEG: f64 = 0.625;

/// Settings that firmware versions can override.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrackBuildingFlags {
    pub use_single_hits: bool,
    pub use_second_earliest: bool,
    pub bug_gmt_phi: bool,
    pub promote_mode7: bool,
}

#[derive(Clone, Debug, Default)]
pub struct SimpleSectorProcessor {
    coord: Option<SectorCoord>,
    sector_idx: usize,
    verbosity: i32,
    min_bx: i32,
    max_bx: i32,
    bx_window: i32,
    /// Indexed like `Subsystem::ORDER`
    bx_shift: [i32; 3],
    include_neighbor: bool,
    max_tracks: usize,
    configured: TrackBuildingFlags,
    flags: TrackBuildingFlags,
    pt_lut_version: u32,
    fw_version: Option<u32>,
}

impl SimpleSectorProcessor {
    pub fn coord(&self) -> Option<SectorCoord> {
        self.coord
    }

    pub fn flags(&self) -> TrackBuildingFlags {
        self.flags
    }

    pub fn pt_lut_version(&self) -> u32 {
        self.pt_lut_version
    }

    /// Last firmware version applied, if any.
    pub fn fw_version(&self) -> Option<u32> {
        self.fw_version
    }

    fn shift(&self, subsystem: Subsystem) -> i32 {
        match subsystem {
            Subsystem::Csc => self.bx_shift[0],
            Subsystem::Rpc => self.bx_shift[1],
            Subsystem::Gem => self.bx_shift[2],
        }
    }

    // -----------------------------------------------------------------------
    // Conversion
    // -----------------------------------------------------------------------

    fn convert(&self, tables: &PcLutTables, p: &TriggerPrimitive) -> Option<EmtfHit> {
        let coord = self.coord?;
        if p.endcap != coord.endcap() {
            return None;
        }
        let bx = p.bx + self.shift(p.subsystem);
        if bx < self.min_bx || bx > self.max_bx {
            return None;
        }

        let slot = match p.subsystem {
            Subsystem::Csc => layout::pc_slot(coord.sector(), p.station, p.ring, p.chamber)?,
            Subsystem::Gem => layout::pc_slot(coord.sector(), 1, 1, p.chamber)?,
            Subsystem::Rpc => rpc_slot(coord.sector(), p)?,
        };
        if slot.neighbor && !self.include_neighbor {
            return None;
        }

        let es = self.sector_idx;
        let ph_init = tables.ph_init(es, slot.pc_station, slot.pc_chamber);
        let ph_disp = tables.ph_disp(es, slot.pc_station, slot.pc_chamber);
        let th_init = tables.th_init(es, slot.pc_station, slot.pc_chamber);

        let (phi_fp, theta_fp) = match p.subsystem {
            Subsystem::Csc => {
                let ring = if p.ring == 4 { 1 } else { p.ring };
                let width_fp = (layout::chamber_width_deg(p.station, ring) * PHI_FP_PER_DEG) as i32;
                (
                    ph_init + ph_disp * p.strip * width_fp / HALF_STRIPS,
                    th_init + p.wire * 8 / 7,
                )
            }
            Subsystem::Gem => {
                let width_fp = (layout::chamber_width_deg(1, 1) * PHI_FP_PER_DEG) as i32;
                let eta_roll = p.roll % 16;
                let abs_eta = GEM_ABS_ETA.0
                    + (eta_roll as f64 - 0.5) * (GEM_ABS_ETA.1 - GEM_ABS_ETA.0) / GEM_ROLLS as f64;
                (
                    ph_init + ph_disp * p.strip * width_fp / GEM_PADS,
                    th_init + layout::theta_to_fp(layout::eta_to_theta_deg(abs_eta)),
                )
            }
            Subsystem::Rpc => {
                // RPC phi is sector-local to the sector it was read out in
                let offset = if slot.neighbor {
                    -(60.0 * PHI_FP_PER_DEG) as i32
                } else {
                    0
                };
                (p.phi_fp + offset, p.theta_fp)
            }
        };

        Some(EmtfHit {
            subsystem: Some(p.subsystem),
            endcap: p.endcap,
            sector: p.sector,
            sector_idx: self.sector_idx,
            subsector: p.subsector,
            station: p.station,
            ring: p.ring,
            chamber: p.chamber,
            roll: p.roll,
            pc_sector: coord.sector(),
            pc_station: slot.pc_station,
            pc_chamber: slot.pc_chamber,
            bx,
            quality: p.quality,
            pattern: p.pattern,
            wire: p.wire,
            strip: p.strip,
            bend: p.bend,
            neighbor: slot.neighbor,
            phi_fp,
            theta_fp: theta_fp.clamp(0, 127),
        })
    }

    // -----------------------------------------------------------------------
    // Track building
    // -----------------------------------------------------------------------

    fn build_track(&self, ctx: &SectorContext<'_>, hits: &[&EmtfHit], bx: i32) -> Option<EmtfTrack> {
        let coord = self.coord?;

        // first hit per station, in conversion order
        let mut by_station: [Option<&EmtfHit>; 4] = [None; 4];
        for h in hits {
            let st = (h.station.clamp(1, 4) - 1) as usize;
            by_station[st].get_or_insert(*h);
        }
        let present: Vec<(usize, &EmtfHit)> = by_station
            .iter()
            .enumerate()
            .filter_map(|(st, h)| (*h).map(|h| (st, h)))
            .collect();

        let min_stations = if self.flags.use_single_hits { 1 } else { 2 };
        if present.len() < min_stations {
            return None;
        }

        let track_bx = {
            let mut bxs: Vec<i32> = present.iter().map(|(_, h)| h.bx).collect();
            bxs.sort_unstable();
            if self.flags.use_second_earliest && bxs.len() > 1 {
                bxs[1]
            } else {
                bxs[0]
            }
        };
        if track_bx != bx {
            return None;
        }

        let mode = present.iter().fold(0, |m, (st, _)| m | (8 >> st));
        let mut dphi = [0; 3];
        for (k, pair) in present.windows(2).enumerate() {
            dphi[k] = (pair[1].1.phi_fp - pair[0].1.phi_fp).abs();
        }
        let dphi_sign = match present.as_slice() {
            [(_, a), (_, b), ..] if b.phi_fp < a.phi_fp => -1,
            _ => 1,
        };
        let (_, first) = present[0];
        let features = PtFeatures {
            mode,
            theta: first.theta_fp,
            dphi,
            dphi_sign,
            bend: first.bend,
        };

        let pt = ctx.pt_engine.assign(&features);
        let address = ctx.pt_engine.calculate_address(&features);

        Some(EmtfTrack {
            endcap: coord.endcap(),
            sector: coord.sector(),
            sector_idx: self.sector_idx,
            bx,
            mode,
            pt_lut: PtLutData { address, mode },
            gmt_eta: gmt_eta(coord.endcap(), first.theta_fp),
            gmt_phi: self.gmt_phi(first.phi_fp),
            // positive muons bend towards lower phi
            gmt_charge: i32::from(dphi_sign > 0),
            gmt_quality: self.gmt_quality(mode, present.len()),
            pt,
        })
    }

    fn gmt_phi(&self, phi_fp: i32) -> i32 {
        let deg = phi_fp as f64 / PHI_FP_PER_DEG - layout::SECTOR_PHI_MARGIN_DEG;
        let phi = deg / GMT_PHI_LSB_DEG;
        if self.flags.bug_gmt_phi {
            phi.trunc() as i32
        } else {
            phi.round() as i32
        }
    }

    fn gmt_quality(&self, mode: i32, n_stations: usize) -> i32 {
        if mode == 7 && self.flags.promote_mode7 {
            return 12;
        }
        let has_st1 = mode & 8 != 0;
        match n_stations {
            4 => 15,
            3 if has_st1 => 14,
            3 => 11,
            2 if has_st1 => 8,
            2 => 4,
            _ => 0,
        }
    }
}

fn gmt_eta(endcap: i32, theta_fp: i32) -> i32 {
    let theta = layout::theta_from_fp(theta_fp).to_radians();
    let eta = -(theta / 2.0).tan().ln();
    let value = (eta / GMT_ETA_LSB).round() as i32;
    if endcap == 1 {
        value
    } else {
        -value
    }
}

/// RPC subsectors are 10° wide; subsector 6 of the previous sector is the
/// neighbor.
fn rpc_slot(unit_sector: i32, p: &TriggerPrimitive) -> Option<PcSlot> {
    let pc_station = match p.station {
        1 if p.subsector <= 3 => 0,
        1 => 1,
        st => st,
    };
    if p.sector == unit_sector {
        Some(PcSlot {
            pc_station,
            pc_chamber: p.subsector - 1,
            neighbor: false,
        })
    } else if layout::next_sector(p.sector) == unit_sector && p.subsector == 6 {
        Some(PcSlot {
            pc_station: layout::PC_NEIGHBOR_STATION,
            pc_chamber: p.station - 1,
            neighbor: true,
        })
    } else {
        None
    }
}

impl SectorProcessor for SimpleSectorProcessor {
    fn configure(&mut self, setup: &SectorSetup<'_>) -> Result<(), ConfigError> {
        let cfg = setup.config;
        let max_tracks = usize::try_from(cfg.sp_gc_params16.max_tracks)
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| ConfigError::Sector {
                coord: setup.coord,
                reason: format!("max_tracks must be positive, got {}", cfg.sp_gc_params16.max_tracks),
            })?;

        self.coord = Some(setup.coord);
        self.sector_idx = setup.sector_idx;
        self.verbosity = setup.verbosity;
        self.min_bx = cfg.min_bx;
        self.max_bx = cfg.max_bx;
        self.bx_window = cfg.bx_window.max(1);
        self.bx_shift = [
            cfg.csc_input_bx_shift,
            cfg.rpc_input_bx_shift,
            cfg.gem_input_bx_shift,
        ];
        self.include_neighbor = cfg.sp_pc_params16.include_neighbor;
        self.max_tracks = max_tracks;
        self.configured = TrackBuildingFlags {
            use_single_hits: cfg.sp_tb_params16.use_single_hits,
            use_second_earliest: cfg.sp_gc_params16.use_second_earliest,
            bug_gmt_phi: cfg.sp_pa_params16.bug_gmt_phi,
            promote_mode7: cfg.sp_pa_params16.promote_mode7,
        };
        self.flags = self.configured;
        self.pt_lut_version = cfg.sp_pa_params16.pt_lut_version;
        Ok(())
    }

    fn configure_by_fw_version(&mut self, fw_version: u32) {
        self.fw_version = Some(fw_version);
        self.flags = if fw_version < FW_VERSION_2017 {
            TrackBuildingFlags {
                use_single_hits: false,
                use_second_earliest: false,
                bug_gmt_phi: true,
                promote_mode7: false,
            }
        } else {
            self.configured
        };
    }

    fn set_pt_lut_version(&mut self, pt_lut_version: u32) {
        self.pt_lut_version = pt_lut_version;
    }

    fn process(
        &mut self,
        ctx: &SectorContext<'_>,
        event_id: u64,
        primitives: &[TriggerPrimitive],
        out_hits: &mut EmtfHitCollection,
        out_tracks: &mut EmtfTrackCollection,
    ) {
        let tables = ctx.pc_lut.tables();
        let first_hit = out_hits.len();
        out_hits.extend(primitives.iter().filter_map(|p| self.convert(tables, p)));
        let hits = &out_hits[first_hit..];

        let first_track = out_tracks.len();
        for bx in self.min_bx..=self.max_bx {
            if out_tracks.len() - first_track >= self.max_tracks {
                break;
            }
            let window: Vec<&EmtfHit> = hits
                .iter()
                .filter(|h| h.bx <= bx && h.bx > bx - self.bx_window)
                .collect();
            if let Some(track) = self.build_track(ctx, &window, bx) {
                out_tracks.push(track);
            }
        }

        if self.verbosity > 1 {
            tracing::debug!(
                event_id,
                sector = %self.coord.map_or_else(String::new, |c| c.to_string()),
                n_hits = hits.len(),
                n_tracks = out_tracks.len() - first_track,
                "sector processed"
            );
        }
    }
}
