//! Subsystem collector: raw digis → ordered trigger primitives.
//!
//! Each subsystem is described by a zero-sized tag implementing
//! [`SubsystemTag`]. The collector appends the primitives of one subsystem
//! at a time, so the order of the combined sequence is exactly the order of
//! the `extract_primitives` calls followed by the digi order in the event.

use crate::event::{CscDigi, DigiCollection, Event, GemDigi, RpcDigi};
use crate::types::{Subsystem, TriggerPrimitive};

pub trait SubsystemTag {
    const SUBSYSTEM: Subsystem;
    type Digi;

    /// Digis of this subsystem stored under `label`, if present with the right type.
    fn digis<'e>(event: &'e Event, label: &str) -> Option<&'e [Self::Digi]>;

    /// `None` drops the digi (e.g. invalid LCTs).
    fn to_primitive(digi: &Self::Digi) -> Option<TriggerPrimitive>;
}

pub struct CscTag;
pub struct RpcTag;
pub struct GemTag;

impl SubsystemTag for CscTag {
    const SUBSYSTEM: Subsystem = Subsystem::Csc;
    type Digi = CscDigi;

    fn digis<'e>(event: &'e Event, label: &str) -> Option<&'e [CscDigi]> {
        match event.product(label)? {
            DigiCollection::Csc(d) => Some(d),
            _ => None,
        }
    }

    fn to_primitive(d: &CscDigi) -> Option<TriggerPrimitive> {
        if !d.valid {
            return None;
        }
        Some(TriggerPrimitive {
            subsystem: Subsystem::Csc,
            endcap: d.endcap,
            sector: d.sector,
            subsector: d.subsector,
            station: d.station,
            ring: d.ring,
            chamber: d.chamber,
            roll: 0,
            bx: d.bx,
            quality: d.quality,
            pattern: d.pattern,
            wire: d.keywire,
            strip: d.strip,
            bend: d.bend,
            phi_fp: 0,
            theta_fp: 0,
            neighbor: false,
        })
    }
}

impl SubsystemTag for RpcTag {
    const SUBSYSTEM: Subsystem = Subsystem::Rpc;
    type Digi = RpcDigi;

    fn digis<'e>(event: &'e Event, label: &str) -> Option<&'e [RpcDigi]> {
        match event.product(label)? {
            DigiCollection::Rpc(d) => Some(d),
            _ => None,
        }
    }

    fn to_primitive(d: &RpcDigi) -> Option<TriggerPrimitive> {
        Some(TriggerPrimitive {
            subsystem: Subsystem::Rpc,
            endcap: d.endcap,
            sector: d.sector,
            subsector: d.subsector,
            station: d.station,
            ring: d.ring,
            chamber: 0,
            roll: d.roll,
            bx: d.bx,
            quality: d.cluster_size,
            pattern: 0,
            wire: 0,
            strip: 0,
            bend: 0,
            phi_fp: d.phi_int,
            theta_fp: d.theta_int,
            neighbor: false,
        })
    }
}

impl SubsystemTag for GemTag {
    const SUBSYSTEM: Subsystem = Subsystem::Gem;
    type Digi = GemDigi;

    fn digis<'e>(event: &'e Event, label: &str) -> Option<&'e [GemDigi]> {
        match event.product(label)? {
            DigiCollection::Gem(d) => Some(d),
            _ => None,
        }
    }

    fn to_primitive(d: &GemDigi) -> Option<TriggerPrimitive> {
        // 36 chambers of 10°, chamber 3 opens trigger sector 1
        let offset = (d.chamber + 33).rem_euclid(36);
        Some(TriggerPrimitive {
            subsystem: Subsystem::Gem,
            endcap: d.endcap,
            sector: offset / 6 + 1,
            subsector: (offset % 6) / 3 + 1,
            station: d.station,
            ring: d.ring,
            chamber: d.chamber,
            roll: d.layer * 16 + d.roll,
            bx: d.bx,
            quality: d.cluster_size,
            pattern: 0,
            wire: 0,
            strip: d.pad,
            bend: 0,
            phi_fp: 0,
            theta_fp: 0,
            neighbor: false,
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SubsystemCollector;

impl SubsystemCollector {
    /// Append the primitives of subsystem `T` found under `label`.
    ///
    /// A missing or mistyped product contributes nothing. Returns the number
    /// of primitives appended.
    pub fn extract_primitives<T: SubsystemTag>(
        &self,
        _tag: T,
        event: &Event,
        label: &str,
        out: &mut Vec<TriggerPrimitive>,
    ) -> usize {
        let Some(digis) = T::digis(event, label) else {
            tracing::debug!(subsystem = %T::SUBSYSTEM, label, event = event.id, "input not found");
            return 0;
        };
        let before = out.len();
        out.extend(digis.iter().filter_map(T::to_primitive));
        out.len() - before
    }
}
