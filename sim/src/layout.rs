//! Idealised endcap chamber layout shared by the muon gun and the emulator.
//!
//! Angles are in degrees. Sector `s` starts at `15 + 60 (s - 1)`. Rings with
//! 36 chambers are 10° wide (chamber 3 starts sector 1); rings 1 of stations
//! 2-4 have 18 chambers of 20° (chamber 2 starts sector 1).

/// Nominal z of each station (m).
pub const STATION_Z: [f64; 4] = [6.0, 8.3, 9.4, 10.3];

/// Sector-local phi origin sits this far before the sector start.
pub const SECTOR_PHI_MARGIN_DEG: f64 = 22.0;

/// Fixed-point phi unit: 1/60 degree.
pub const PHI_FP_PER_DEG: f64 = 60.0;

pub const THETA_MIN_DEG: f64 = 8.5;
pub const THETA_MAX_DEG: f64 = 45.0;

/// GE1/1 coverage in |η|, split into rolls of equal η.
pub const GEM_ABS_ETA: (f64, f64) = (1.55, 2.18);
pub const GEM_ROLLS: i32 = 8;
/// Pads across one GE1/1 chamber.
pub const GEM_PADS: i32 = 192;

/// Half-strips across one chamber.
pub const HALF_STRIPS: i32 = 160;
pub const MAX_KEYWIRE: i32 = 111;

pub fn sector_start_deg(sector: i32) -> f64 {
    15.0 + 60.0 * (sector - 1) as f64
}

pub fn wrap_deg(phi: f64) -> f64 {
    phi.rem_euclid(360.0)
}

/// Trigger sector 1..=6 containing `phi_deg`.
pub fn sector_for(phi_deg: f64) -> i32 {
    (wrap_deg(phi_deg - 15.0) / 60.0) as i32 + 1
}

/// Ring hit by a muon crossing `station` at radius `r` (m).
pub fn ring_for(station: i32, r: f64) -> i32 {
    match station {
        1 if r < 2.5 => 1,
        1 if r < 4.8 => 2,
        1 => 3,
        _ if r < 3.4 => 1,
        _ => 2,
    }
}

pub fn chambers_in_ring(station: i32, ring: i32) -> i32 {
    if station > 1 && ring == 1 {
        18
    } else {
        36
    }
}

pub fn chamber_width_deg(station: i32, ring: i32) -> f64 {
    360.0 / chambers_in_ring(station, ring) as f64
}

/// Lower phi edge of chamber 1 in every ring.
const FIRST_CHAMBER_LO_DEG: f64 = -5.0;

/// Global chamber number 1..=N at `phi_deg`.
pub fn chamber_for(station: i32, ring: i32, phi_deg: f64) -> i32 {
    let n = chambers_in_ring(station, ring);
    ((wrap_deg(phi_deg - FIRST_CHAMBER_LO_DEG) / chamber_width_deg(station, ring)) as i32).min(n - 1)
        + 1
}

pub fn chamber_lo_deg(station: i32, ring: i32, chamber: i32) -> f64 {
    FIRST_CHAMBER_LO_DEG + (chamber - 1) as f64 * chamber_width_deg(station, ring)
}

/// Position of a chamber inside its trigger sector, 0-based.
pub fn local_chamber(station: i32, ring: i32, chamber: i32) -> i32 {
    let n = chambers_in_ring(station, ring);
    let per_sector = n / 6;
    let first = if n == 18 { 2 } else { 3 };
    (chamber - first).rem_euclid(n) % per_sector
}

/// Trigger sector of a chamber.
pub fn chamber_sector(station: i32, ring: i32, chamber: i32) -> i32 {
    let n = chambers_in_ring(station, ring);
    let per_sector = n / 6;
    let first = if n == 18 { 2 } else { 3 };
    (chamber - first).rem_euclid(n) / per_sector + 1
}

/// ME1 subsector (1 or 2); 0 for other stations.
pub fn subsector_for(station: i32, ring: i32, chamber: i32) -> i32 {
    if station == 1 {
        local_chamber(station, ring, chamber) / 3 + 1
    } else {
        0
    }
}

/// The last chamber of a sector is shared with the next sector as a neighbor.
pub fn is_neighbor_chamber(station: i32, ring: i32, chamber: i32) -> bool {
    let per_sector = chambers_in_ring(station, ring) / 6;
    local_chamber(station, ring, chamber) == per_sector - 1
}

/// Sector on the other side of the neighbor boundary.
pub fn next_sector(sector: i32) -> i32 {
    sector % 6 + 1
}

pub fn prev_sector(sector: i32) -> i32 {
    (sector + 4) % 6 + 1
}

/// Global chamber number from its position inside a sector.
pub fn global_chamber(station: i32, ring: i32, sector: i32, local: i32) -> i32 {
    let n = chambers_in_ring(station, ring);
    let per_sector = n / 6;
    let first = if n == 18 { 2 } else { 3 };
    ((sector - 1) * per_sector + local + first - 1).rem_euclid(n) + 1
}

// ---------------------------------------------------------------------------
// Primitive-conversion slots
// ---------------------------------------------------------------------------

/// Neighbor chambers arrive on this converter station.
pub const PC_NEIGHBOR_STATION: i32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PcSlot {
    pub pc_station: i32,
    pub pc_chamber: i32,
    pub neighbor: bool,
}

/// Converter slot of a chamber in the unit serving `unit_sector`.
///
/// `None` when that unit does not read the chamber. Ring 4 (ME1/1a) shares
/// the slots of ring 1.
pub fn pc_slot(unit_sector: i32, station: i32, ring: i32, chamber: i32) -> Option<PcSlot> {
    let ring = if ring == 4 { 1 } else { ring };
    let sector = chamber_sector(station, ring, chamber);
    let local = local_chamber(station, ring, chamber);

    if sector == unit_sector {
        let (pc_station, pc_chamber) = if station == 1 {
            (local / 3, (ring - 1) * 3 + local % 3)
        } else if ring == 1 {
            (station, local)
        } else {
            (station, 3 + local)
        };
        return Some(PcSlot {
            pc_station,
            pc_chamber,
            neighbor: false,
        });
    }

    if next_sector(sector) == unit_sector && is_neighbor_chamber(station, ring, chamber) {
        let pc_chamber = if station == 1 {
            ring - 1
        } else {
            3 + (station - 2) * 2 + (ring - 1)
        };
        return Some(PcSlot {
            pc_station: PC_NEIGHBOR_STATION,
            pc_chamber,
            neighbor: true,
        });
    }
    None
}

/// Inverse of [`pc_slot`]: `(station, ring, chamber)` behind a converter slot.
pub fn slot_chamber(unit_sector: i32, pc_station: i32, pc_chamber: i32) -> Option<(i32, i32, i32)> {
    if !(0..9).contains(&pc_chamber) {
        return None;
    }
    let (sector, station, ring, local) = match pc_station {
        0 | 1 => (unit_sector, 1, pc_chamber / 3 + 1, pc_station * 3 + pc_chamber % 3),
        2..=4 if pc_chamber < 3 => (unit_sector, pc_station, 1, pc_chamber),
        2..=4 => (unit_sector, pc_station, 2, pc_chamber - 3),
        PC_NEIGHBOR_STATION => {
            let (station, ring) = if pc_chamber < 3 {
                (1, pc_chamber + 1)
            } else {
                (2 + (pc_chamber - 3) / 2, (pc_chamber - 3) % 2 + 1)
            };
            let last = chambers_in_ring(station, ring) / 6 - 1;
            (prev_sector(unit_sector), station, ring, last)
        }
        _ => return None,
    };
    Some((station, ring, global_chamber(station, ring, sector, local)))
}

pub fn eta_to_theta_deg(eta: f64) -> f64 {
    (2.0 * (-eta).exp().atan()).to_degrees()
}

pub fn theta_to_fp(theta_deg: f64) -> i32 {
    let fp = (theta_deg - THETA_MIN_DEG) * 128.0 / (THETA_MAX_DEG - THETA_MIN_DEG);
    (fp.round() as i32).clamp(0, 127)
}

pub fn theta_from_fp(theta_fp: i32) -> f64 {
    THETA_MIN_DEG + theta_fp as f64 * (THETA_MAX_DEG - THETA_MIN_DEG) / 128.0
}

/// Sector-local fixed-point phi.
pub fn phi_to_fp(phi_deg: f64, sector: i32) -> i32 {
    let local = wrap_deg(phi_deg - sector_start_deg(sector) + SECTOR_PHI_MARGIN_DEG);
    (local * PHI_FP_PER_DEG).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn sector_boundaries() {
        assert_eq!(sector_for(15.0), 1);
        assert_eq!(sector_for(74.9), 1);
        assert_eq!(sector_for(75.0), 2);
        assert_eq!(sector_for(10.0), 6);
        assert_eq!(sector_for(-30.0), 6);
    }

    #[test]
    fn chambers_map_to_sectors() {
        // 10° ring: chamber 3 spans 15..25
        assert_eq!(chamber_for(1, 2, 20.0), 3);
        assert_eq!(chamber_sector(1, 2, 3), 1);
        assert_eq!(local_chamber(1, 2, 3), 0);
        assert_eq!(chamber_sector(1, 2, 2), 6);
        assert!(is_neighbor_chamber(1, 2, 8));
        // 20° ring: chamber 2 spans 15..35
        assert_eq!(chamber_for(2, 1, 20.0), 2);
        assert_eq!(chamber_sector(2, 1, 2), 1);
        assert!(is_neighbor_chamber(2, 1, 4));
        assert_eq!(chamber_lo_deg(2, 1, 2), 15.0);
    }

    #[test]
    fn every_phi_lands_in_its_chamber_sector() {
        for i in 0..720 {
            let phi = i as f64 * 0.5 + 0.25;
            for (station, ring) in [(1, 1), (1, 2), (2, 1), (3, 2)] {
                let ch = chamber_for(station, ring, phi);
                assert_eq!(chamber_sector(station, ring, ch), sector_for(phi));
            }
        }
    }

    #[test]
    fn subsectors() {
        assert_eq!(subsector_for(1, 1, 3), 1);
        assert_eq!(subsector_for(1, 1, 6), 2);
        assert_eq!(subsector_for(2, 1, 3), 0);
    }

    #[test]
    fn slots_invert() {
        let rings = [(1, 1), (1, 2), (1, 3), (2, 1), (2, 2), (3, 1), (3, 2), (4, 1), (4, 2)];
        for unit in 1..=6 {
            let mut seen = std::collections::HashSet::new();
            for (station, ring) in rings {
                for chamber in 1..=chambers_in_ring(station, ring) {
                    let Some(slot) = pc_slot(unit, station, ring, chamber) else {
                        continue;
                    };
                    assert!(seen.insert((slot.pc_station, slot.pc_chamber)), "slot reused");
                    assert_eq!(
                        slot_chamber(unit, slot.pc_station, slot.pc_chamber),
                        Some((station, ring, chamber))
                    );
                }
            }
            // 2 × 9 ME1 slots, 3 × 9 ME2-4 slots, 9 neighbors
            assert_eq!(seen.len(), 54);
        }
    }

    #[test]
    fn neighbor_comes_from_previous_sector() {
        // last 10° ME1/2 chamber of sector 6 is 2
        let slot = pc_slot(1, 1, 2, 2).unwrap();
        assert!(slot.neighbor);
        assert_eq!((slot.pc_station, slot.pc_chamber), (PC_NEIGHBOR_STATION, 1));
        assert!(pc_slot(2, 1, 2, 2).is_none());
        assert_eq!(prev_sector(1), 6);
        assert_eq!(next_sector(6), 1);
    }

    #[test]
    fn fixed_point_conversions() {
        assert_eq!(theta_to_fp(8.5), 0);
        assert_eq!(theta_to_fp(60.0), 127);
        assert_eq!(phi_to_fp(15.0, 1), 22 * 60);
        assert_abs_diff_eq!(theta_from_fp(theta_to_fp(30.0)), 30.0, epsilon = 0.2);
    }
}
