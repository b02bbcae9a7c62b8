//! Text dump of emulator input and output in the firmware simulator format.
//!
//! The layout is consumed by an external firmware simulator, so column order
//! and literal tokens must not change:
//!
//! ```text
//! ==== Endcap 1 Sector 1 Hits ====
//! bx e s ss st vf ql cp wg id bd hs
//! 1 1 1 1 1 1 15 10 40 3 0 100      <- CSC hit
//! 1 1 1 0 0 2 0 0 15 2 0 300        <- RPC hit
//! 12345                              <- end of one BX
//! ==== Endcap 1 Sector 1 Tracks ====
//! bx e s a mo et ph cr q pt
//! 0 1 1 123456 15 40 200 1 15 25.5
//! ```
//!
//! Hits are written for BX `-8..=12`. RPC hits are written 5 BX later than
//! CSC hits of the same crossing. GEM hits are not part of the format.
//! Track pT uses six significant digits with trailing zeros dropped, and
//! exponent form outside `1e-4..1e6` (`14.2857`, `1.23457e+06`).

use crate::types::{EmtfHit, EmtfTrack, SectorCoord, Subsystem, TriggerPrimitive};
use std::io::{self, Write};

/// First BX written for a sector.
pub const DUMP_FIRST_BX: i32 = -3 - 5;
/// One past the last BX written for a sector.
pub const DUMP_END_BX: i32 = 3 + 5 + 5;
/// RPC hits are supplied to the firmware simulator this many BX late.
pub const RPC_DUMP_BX_DELAY: i32 = 5;
/// Terminates every BX block.
pub const BX_SEPARATOR: &str = "12345";

/// Added to negative GMT η so the column is unsigned.
pub const GMT_ETA_OFFSET: i32 = 512;

/// Significant digits of floating-point columns.
const FLOAT_PRECISION: usize = 6;

const HIT_COLUMNS: &str = "bx e s ss st vf ql cp wg id bd hs";
const TRACK_COLUMNS: &str = "bx e s a mo et ph cr q pt";

fn endcap_code(endcap: i32) -> i32 {
    if endcap == 1 {
        1
    } else {
        2
    }
}

/// Line for a CSC hit, or `None` for other subsystems.
pub fn csc_hit_line(h: &EmtfHit) -> Option<String> {
    if h.subsystem != Some(Subsystem::Csc) {
        return None;
    }
    let station = if h.pc_station == 0 && h.subsector == 1 {
        1
    } else {
        h.pc_station
    };
    // ME1/1a strips follow the ME1/1b ones
    let strip = if h.station == 1 && h.ring == 4 {
        h.strip + 128
    } else {
        h.strip
    };
    Some(format!(
        "{} {} {} {} {} {} {} {} {} {} {} {}",
        1,
        endcap_code(h.endcap),
        h.pc_sector,
        h.subsector,
        station,
        1,
        h.quality,
        h.pattern,
        h.wire,
        h.pc_chamber + 1,
        h.bend,
        strip
    ))
}

/// Line for an RPC hit, or `None` for other subsystems.
///
/// RPC links are indexed by subsector (6 for the neighbor sector) and by a
/// chamber number running over stations and rings.
pub fn rpc_hit_line(h: &EmtfHit) -> Option<String> {
    if h.subsystem != Some(Subsystem::Rpc) {
        return None;
    }
    let rpc_sub = if h.neighbor { 6 } else { h.subsector - 1 };
    let rpc_chm = if h.station <= 2 {
        h.station - 1
    } else {
        2 + (h.station - 3) * 2 + (h.ring - 2)
    };
    Some(format!(
        "{} {} {} {} {} {} {} {} {} {} {} {}",
        1,
        endcap_code(h.endcap),
        h.pc_sector,
        0,
        rpc_sub,
        2,
        0,
        0,
        h.theta_fp >> 2,
        rpc_chm + 1,
        0,
        h.phi_fp >> 2
    ))
}

pub fn track_line(t: &EmtfTrack) -> String {
    let eta = if t.gmt_eta >= 0 {
        t.gmt_eta
    } else {
        t.gmt_eta + GMT_ETA_OFFSET
    };
    format!(
        "{} {} {} {} {} {} {} {} {} {}",
        t.bx,
        endcap_code(t.endcap),
        t.sector,
        t.pt_lut.address,
        t.mode,
        eta,
        t.gmt_phi,
        t.gmt_charge,
        t.gmt_quality,
        float_column(t.pt)
    )
}

/// Shortest `%g`-style rendering with [`FLOAT_PRECISION`] significant digits.
pub fn float_column(value: f32) -> String {
    let v = f64::from(value);
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // the exponent after rounding decides between fixed and exponent form
    let sci = format!("{:.*e}", FLOAT_PRECISION - 1, v);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);

    if exp < -4 || exp >= FLOAT_PRECISION as i32 {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exp.abs())
    } else {
        let decimals = (FLOAT_PRECISION as i32 - 1 - exp) as usize;
        trim_fraction(&format!("{v:.decimals$}")).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Hit line for dump BX `ibx`, if `h` belongs there.
fn hit_line_at(h: &EmtfHit, ibx: i32) -> Option<String> {
    match h.subsystem {
        Some(Subsystem::Csc) if h.bx == ibx => csc_hit_line(h),
        Some(Subsystem::Rpc) if h.bx + RPC_DUMP_BX_DELAY == ibx => rpc_hit_line(h),
        _ => None,
    }
}

/// Hits and tracks of one sector.
pub fn write_sector<W: Write>(
    w: &mut W,
    coord: SectorCoord,
    hits: &[EmtfHit],
    tracks: &[EmtfTrack],
) -> io::Result<()> {
    let es = coord.index();

    writeln!(w, "==== Endcap {} Sector {} Hits ====", coord.endcap(), coord.sector())?;
    writeln!(w, "{HIT_COLUMNS}")?;

    let sector_hits: Vec<&EmtfHit> = hits.iter().filter(|h| h.sector_idx == es).collect();
    if !sector_hits.is_empty() {
        for ibx in DUMP_FIRST_BX..DUMP_END_BX {
            for line in sector_hits.iter().filter_map(|h| hit_line_at(h, ibx)) {
                writeln!(w, "{line}")?;
            }
            writeln!(w, "{BX_SEPARATOR}")?;
        }
    }

    writeln!(w, "==== Endcap {} Sector {} Tracks ====", coord.endcap(), coord.sector())?;
    writeln!(w, "{TRACK_COLUMNS}")?;
    for t in tracks.iter().filter(|t| t.sector_idx == es) {
        writeln!(w, "{}", track_line(t))?;
    }
    Ok(())
}

/// All sectors in grid order.
pub fn write_dump<W: Write>(w: &mut W, hits: &[EmtfHit], tracks: &[EmtfTrack]) -> io::Result<()> {
    for coord in SectorCoord::all() {
        write_sector(w, coord, hits, tracks)?;
    }
    Ok(())
}

pub fn format_dump(hits: &[EmtfHit], tracks: &[EmtfTrack]) -> String {
    let mut buf = Vec::new();
    // writing into a Vec cannot fail
    let _ = write_dump(&mut buf, hits, tracks);
    String::from_utf8_lossy(&buf).into_owned()
}

/// Collected primitives, one per line.
pub fn write_primitives<W: Write>(w: &mut W, primitives: &[TriggerPrimitive]) -> io::Result<()> {
    writeln!(w, "Num of TriggerPrimitive: {}", primitives.len())?;
    for p in primitives {
        writeln!(w, "{p}")?;
    }
    Ok(())
}
