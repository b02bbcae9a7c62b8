//! Muon gun: generates prompt muons and the trigger digis they leave behind.
//!
//! Each muon leaves the interaction point along (η, φ). At every station plane
//! it has been bent in φ by `charge * BEND_K[st] / pT`, and produces:
//! - a CSC digi with probability `p_detection`
//! - an RPC digi in the outer rings (not ME1/1, not ring 1 of ME2-4)
//! - a GEM pad in front of ME1/1 for 1.55 < |η| < 2.18
//!
//! Random CSC digis are sprinkled on top as noise. Everything is drawn from a
//! single seeded `ChaCha8Rng`, so a given seed always yields the same events.

use crate::layout::{
    self, GEM_ABS_ETA, GEM_PADS, GEM_ROLLS, HALF_STRIPS, MAX_KEYWIRE, STATION_Z,
};
use emtf_core::event::{CscDigi, DigiCollection, Event, GemDigi, RpcDigi};
use emtf_core::TrackFinderConfig;
use nalgebra::Vector3;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// φ bending accumulated at each station by a 1 GeV muon (rad).
pub const BEND_K: [f64; 4] = [0.30, 0.45, 0.50, 0.52];

/// CSC trigger primitives reach the track finder this many BX late.
pub const CSC_READOUT_BX: i32 = 6;

/// ME1/1a starts above this |η|.
const ME11A_ABS_ETA: f64 = 2.1;
/// RE2-4 switch from ring 2 to ring 3 at this radius (m).
const RPC_RING3_RADIUS: f64 = 5.0;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GunParams {
    pub muons_per_event: usize,
    pub min_pt: f64,
    pub max_pt: f64,
    pub min_abs_eta: f64,
    pub max_abs_eta: f64,
    /// Per-station CSC efficiency
    pub p_detection: f64,
    pub rpc_efficiency: f64,
    pub gem_efficiency: f64,
    /// Mean number of random CSC digis per event
    pub noise_per_event: f64,
    /// Fraction of muons arriving one BX late
    pub late_fraction: f64,
}

impl Default for GunParams {
    fn default() -> Self {
        Self {
            muons_per_event: 2,
            min_pt: 2.0,
            max_pt: 100.0,
            min_abs_eta: 1.25,
            max_abs_eta: 2.4,
            p_detection: 0.95,
            rpc_efficiency: 0.9,
            gem_efficiency: 0.9,
            noise_per_event: 0.5,
            late_fraction: 0.02,
        }
    }
}

/// Generator-level truth of one muon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Muon {
    pub id: u64,
    pub pt: f64,
    pub eta: f64,
    /// Azimuth at the vertex (rad)
    pub phi: f64,
    pub charge: i32,
    pub bx: i32,
}

impl Muon {
    pub fn endcap(&self) -> i32 {
        if self.eta >= 0.0 {
            1
        } else {
            2
        }
    }

    /// Polar angle folded into the endcap, in degrees.
    pub fn theta_deg(&self) -> f64 {
        layout::eta_to_theta_deg(self.eta.abs())
    }

    pub fn direction(&self) -> Vector3<f64> {
        let theta = 2.0 * (-self.eta).exp().atan();
        Vector3::new(
            theta.sin() * self.phi.cos(),
            theta.sin() * self.phi.sin(),
            theta.cos(),
        )
    }

    /// Where the straight line from the vertex crosses the station plane.
    pub fn crossing(&self, station: i32) -> Vector3<f64> {
        let d = self.direction();
        let z = STATION_Z[(station - 1) as usize] * d.z.signum();
        d * (z / d.z)
    }

    /// Bent azimuth at the station, in degrees.
    pub fn phi_at(&self, station: i32) -> f64 {
        let bend = self.charge as f64 * BEND_K[(station - 1) as usize] / self.pt;
        layout::wrap_deg((self.phi - bend).to_degrees())
    }

    /// Trigger sector the muon crosses at ME2.
    pub fn sector(&self) -> i32 {
        layout::sector_for(self.phi_at(2))
    }
}

/// Deterministic source of events.
pub struct MuonGun {
    pub params: GunParams,
    csc_label: String,
    rpc_label: String,
    gem_label: String,
    rng: ChaCha8Rng,
    next_id: u64,
}

impl MuonGun {
    /// Digis are stored under the input labels of `config`.
    pub fn new(params: GunParams, config: &TrackFinderConfig, seed: u64) -> Self {
        Self {
            params,
            csc_label: config.csc_input.clone(),
            rpc_label: config.rpc_input.clone(),
            gem_label: config.gem_input.clone(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_id: 0,
        }
    }

    /// One event with all three digi products, and the muons that made it.
    pub fn generate(&mut self, run: u32, event_id: u64, is_real_data: bool) -> (Event, Vec<Muon>) {
        let mut csc = Vec::new();
        let mut rpc = Vec::new();
        let mut gem = Vec::new();

        let muons: Vec<Muon> = (0..self.params.muons_per_event)
            .map(|_| self.shoot())
            .collect();
        for muon in &muons {
            self.digitize(muon, &mut csc, &mut rpc, &mut gem);
        }
        self.add_noise(&mut csc);

        tracing::trace!(
            event_id,
            n_csc = csc.len(),
            n_rpc = rpc.len(),
            n_gem = gem.len(),
            "generated event"
        );

        let event = Event::new(run, event_id, is_real_data)
            .with_product(self.csc_label.clone(), DigiCollection::Csc(csc))
            .with_product(self.rpc_label.clone(), DigiCollection::Rpc(rpc))
            .with_product(self.gem_label.clone(), DigiCollection::Gem(gem));
        (event, muons)
    }

    fn shoot(&mut self) -> Muon {
        let p = &self.params;
        // flat in 1/pT
        let inv_pt = self.rng.gen_range(1.0 / p.max_pt..=1.0 / p.min_pt);
        let abs_eta = self.rng.gen_range(p.min_abs_eta..=p.max_abs_eta);
        let eta = if self.rng.gen_bool(0.5) { abs_eta } else { -abs_eta };
        let phi = self.rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI);
        let charge = if self.rng.gen_bool(0.5) { 1 } else { -1 };
        let bx = i32::from(self.rng.gen_bool(p.late_fraction));

        let id = self.next_id;
        self.next_id += 1;
        Muon {
            id,
            pt: 1.0 / inv_pt,
            eta,
            phi,
            charge,
            bx,
        }
    }

    fn digitize(
        &mut self,
        muon: &Muon,
        csc: &mut Vec<CscDigi>,
        rpc: &mut Vec<RpcDigi>,
        gem: &mut Vec<GemDigi>,
    ) {
        let abs_eta = muon.eta.abs();
        let theta_fp = layout::theta_to_fp(muon.theta_deg());

        for station in 1..=4 {
            let phi_deg = muon.phi_at(station);
            let r = muon.crossing(station).xy().norm();
            let mut ring = layout::ring_for(station, r);

            let in_gem = station == 1 && ring == 1 && abs_eta > GEM_ABS_ETA.0 && abs_eta < GEM_ABS_ETA.1;
            if in_gem && self.rng.gen_bool(self.params.gem_efficiency) {
                gem.push(self.gem_digi(muon, phi_deg));
            }

            // ring 1 has no RPC coverage
            if ring != 1 && self.rng.gen_bool(self.params.rpc_efficiency) {
                let rpc_ring = if station == 1 || r < RPC_RING3_RADIUS { ring } else { 3 };
                rpc.push(self.rpc_digi(muon, station, rpc_ring, phi_deg, theta_fp, r));
            }

            if !self.rng.gen_bool(self.params.p_detection) {
                continue;
            }
            if station == 1 && ring == 1 && abs_eta > ME11A_ABS_ETA {
                ring = 4;
            }
            csc.push(self.csc_digi(muon, station, ring, phi_deg, theta_fp));
        }
    }

    fn csc_digi(
        &mut self,
        muon: &Muon,
        station: i32,
        ring: i32,
        phi_deg: f64,
        theta_fp: i32,
    ) -> CscDigi {
        let chamber = layout::chamber_for(station, ring, phi_deg);
        let frac = layout::wrap_deg(phi_deg - layout::chamber_lo_deg(station, ring, chamber))
            / layout::chamber_width_deg(station, ring);
        let bend = ((20.0 / muon.pt).round() as i32).min(15);
        CscDigi {
            endcap: muon.endcap(),
            station,
            ring,
            sector: layout::chamber_sector(station, ring, chamber),
            subsector: layout::subsector_for(station, ring, chamber),
            chamber,
            bx: muon.bx + CSC_READOUT_BX,
            valid: true,
            quality: self.rng.gen_range(11..=15),
            pattern: (10 - bend).max(2),
            keywire: (theta_fp * 7 / 8).min(MAX_KEYWIRE),
            strip: ((frac * HALF_STRIPS as f64) as i32).clamp(0, HALF_STRIPS - 1),
            bend,
        }
    }

    fn rpc_digi(
        &mut self,
        muon: &Muon,
        station: i32,
        ring: i32,
        phi_deg: f64,
        theta_fp: i32,
        r: f64,
    ) -> RpcDigi {
        let sector = layout::sector_for(phi_deg);
        let in_sector = layout::wrap_deg(phi_deg - layout::sector_start_deg(sector));
        RpcDigi {
            endcap: muon.endcap(),
            station,
            ring,
            sector,
            subsector: (in_sector / 10.0) as i32 + 1,
            roll: ((r * 10.0) as i32).rem_euclid(3) + 1,
            bx: muon.bx,
            phi_int: layout::phi_to_fp(phi_deg, sector),
            theta_int: theta_fp,
            cluster_size: self.rng.gen_range(1..=3),
        }
    }

    fn gem_digi(&mut self, muon: &Muon, phi_deg: f64) -> GemDigi {
        let chamber = layout::chamber_for(1, 1, phi_deg);
        let frac = layout::wrap_deg(phi_deg - layout::chamber_lo_deg(1, 1, chamber))
            / layout::chamber_width_deg(1, 1);
        let eta_frac = (muon.eta.abs() - GEM_ABS_ETA.0) / (GEM_ABS_ETA.1 - GEM_ABS_ETA.0);
        GemDigi {
            endcap: muon.endcap(),
            station: 1,
            ring: 1,
            chamber,
            layer: self.rng.gen_range(1..=2),
            roll: ((eta_frac * GEM_ROLLS as f64) as i32).clamp(0, GEM_ROLLS - 1) + 1,
            pad: ((frac * GEM_PADS as f64) as i32).clamp(0, GEM_PADS - 1),
            cluster_size: self.rng.gen_range(1..=2),
            bx: muon.bx,
        }
    }

    fn add_noise(&mut self, csc: &mut Vec<CscDigi>) {
        let mean = self.params.noise_per_event.max(0.0);
        let mut n = mean.floor() as usize;
        if self.rng.gen_bool(mean.fract()) {
            n += 1;
        }
        for _ in 0..n {
            let station = self.rng.gen_range(1..=4);
            let ring = if station == 1 {
                self.rng.gen_range(1..=3)
            } else {
                self.rng.gen_range(1..=2)
            };
            let chamber = self.rng.gen_range(1..=layout::chambers_in_ring(station, ring));
            csc.push(CscDigi {
                endcap: self.rng.gen_range(1..=2),
                station,
                ring,
                sector: layout::chamber_sector(station, ring, chamber),
                subsector: layout::subsector_for(station, ring, chamber),
                chamber,
                bx: CSC_READOUT_BX + self.rng.gen_range(-1..=1),
                valid: self.rng.gen_bool(0.9),
                quality: self.rng.gen_range(4..=8),
                pattern: self.rng.gen_range(2..=10),
                keywire: self.rng.gen_range(0..=MAX_KEYWIRE),
                strip: self.rng.gen_range(0..HALF_STRIPS),
                bend: self.rng.gen_range(0..=15),
            });
        }
    }
}
