//! Fundamental types shared by the orchestrator and the sector units.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Sector grid
// ---------------------------------------------------------------------------

pub const MIN_ENDCAP: i32 = 1;
pub const MAX_ENDCAP: i32 = 2;
pub const MIN_TRIGSECTOR: i32 = 1;
pub const MAX_TRIGSECTOR: i32 = 6;

/// Number of trigger sectors per endcap.
pub const SECTORS_PER_ENDCAP: usize = (MAX_TRIGSECTOR - MIN_TRIGSECTOR + 1) as usize;

/// Total number of sector processing units (2 endcaps × 6 sectors).
pub const NUM_SECTORS: usize = (MAX_ENDCAP - MIN_ENDCAP + 1) as usize * SECTORS_PER_ENDCAP;

/// An (endcap, trigger sector) pair addressing one processing unit.
///
/// Only valid pairs can be built, so [`SectorCoord::index`] is always in
/// `0..NUM_SECTORS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SectorCoord {
    endcap: i32,
    sector: i32,
}

impl SectorCoord {
    pub fn new(endcap: i32, sector: i32) -> Option<Self> {
        let valid = (MIN_ENDCAP..=MAX_ENDCAP).contains(&endcap)
            && (MIN_TRIGSECTOR..=MAX_TRIGSECTOR).contains(&sector);
        valid.then_some(Self { endcap, sector })
    }

    pub fn endcap(&self) -> i32 {
        self.endcap
    }

    pub fn sector(&self) -> i32 {
        self.sector
    }

    /// Flat index `es` used to route primitives and attribute outputs.
    ///
    /// This is the only place the mapping is computed.
    pub fn index(&self) -> usize {
        (self.endcap - MIN_ENDCAP) as usize * SECTORS_PER_ENDCAP
            + (self.sector - MIN_TRIGSECTOR) as usize
    }

    pub fn from_index(es: usize) -> Option<Self> {
        if es >= NUM_SECTORS {
            return None;
        }
        Some(Self {
            endcap: MIN_ENDCAP + (es / SECTORS_PER_ENDCAP) as i32,
            sector: MIN_TRIGSECTOR + (es % SECTORS_PER_ENDCAP) as i32,
        })
    }

    /// The full grid, endcap ascending then sector ascending.
    pub fn all() -> impl Iterator<Item = SectorCoord> {
        (MIN_ENDCAP..=MAX_ENDCAP).flat_map(|endcap| {
            (MIN_TRIGSECTOR..=MAX_TRIGSECTOR).map(move |sector| SectorCoord { endcap, sector })
        })
    }
}

impl fmt::Display for SectorCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = if self.endcap == 1 { '+' } else { '-' };
        write!(f, "ME{}{}", side, self.sector)
    }
}

// ---------------------------------------------------------------------------
// Subsystems
// ---------------------------------------------------------------------------

/// Detector subsystem a primitive originates from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Subsystem {
    Csc,
    Rpc,
    Gem,
}

impl Subsystem {
    /// Collection order. Sector units rely on it for tie-breaking.
    pub const ORDER: [Subsystem; 3] = [Subsystem::Csc, Subsystem::Rpc, Subsystem::Gem];
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Subsystem::Csc => "CSC",
            Subsystem::Rpc => "RPC",
            Subsystem::Gem => "GEM",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// TriggerPrimitive
// ---------------------------------------------------------------------------

/// A single detector stub as consumed by the sector units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPrimitive {
    pub subsystem: Subsystem,
    pub endcap: i32,
    pub sector: i32,
    pub subsector: i32,
    pub station: i32,
    pub ring: i32,
    pub chamber: i32,
    /// RPC/GEM roll, GEM layer packed as `layer * 16 + roll`
    pub roll: i32,
    /// Bunch crossing as read out (no input shift applied)
    pub bx: i32,
    pub quality: i32,
    pub pattern: i32,
    pub wire: i32,
    pub strip: i32,
    pub bend: i32,
    pub phi_fp: i32,
    pub theta_fp: i32,
    pub neighbor: bool,
}

impl TriggerPrimitive {
    /// Sector coordinate this primitive belongs to, if its address is valid.
    pub fn coord(&self) -> Option<SectorCoord> {
        SectorCoord::new(self.endcap, self.sector)
    }
}

impl fmt::Display for TriggerPrimitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} e:{} s:{} ss:{} st:{} r:{} ch:{} roll:{} bx:{} q:{} p:{} w:{} hs:{} bd:{} ph:{} th:{} nb:{}",
            self.subsystem,
            self.endcap,
            self.sector,
            self.subsector,
            self.station,
            self.ring,
            self.chamber,
            self.roll,
            self.bx,
            self.quality,
            self.pattern,
            self.wire,
            self.strip,
            self.bend,
            self.phi_fp,
            self.theta_fp,
            u8::from(self.neighbor),
        )
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// A converted hit as emitted by a sector unit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmtfHit {
    pub subsystem: Option<Subsystem>,
    pub endcap: i32,
    pub sector: i32,
    /// Flat sector index of the unit that produced this hit
    pub sector_idx: usize,
    pub subsector: i32,
    pub station: i32,
    pub ring: i32,
    pub chamber: i32,
    pub roll: i32,
    /// Sector, station and chamber numbering of the primitive-conversion unit
    pub pc_sector: i32,
    pub pc_station: i32,
    pub pc_chamber: i32,
    pub bx: i32,
    pub quality: i32,
    pub pattern: i32,
    pub wire: i32,
    pub strip: i32,
    pub bend: i32,
    pub neighbor: bool,
    pub phi_fp: i32,
    pub theta_fp: i32,
}

/// Momentum LUT address and the inputs it was built from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtLutData {
    pub address: u32,
    pub mode: i32,
}

/// A track candidate as emitted by a sector unit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EmtfTrack {
    pub endcap: i32,
    pub sector: i32,
    pub sector_idx: usize,
    pub bx: i32,
    /// Station bitmask: st1 = 8, st2 = 4, st3 = 2, st4 = 1
    pub mode: i32,
    pub pt_lut: PtLutData,
    pub gmt_eta: i32,
    pub gmt_phi: i32,
    pub gmt_charge: i32,
    pub gmt_quality: i32,
    pub pt: f32,
}

pub type EmtfHitCollection = Vec<EmtfHit>;
pub type EmtfTrackCollection = Vec<EmtfTrack>;
pub type TriggerPrimitiveCollection = Vec<TriggerPrimitive>;
