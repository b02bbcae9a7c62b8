//! Run metrics: trigger efficiency and pT resolution against generator truth.

use crate::muon_gun::Muon;
use emtf_core::{EmtfTrack, EventSummary, Subsystem};
use serde::{Deserialize, Serialize};

/// Accumulated statistics over a run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    pub n_events: u64,
    pub n_muons: u64,
    pub n_primitives: u64,
    pub n_hits: u64,
    pub n_tracks: u64,
    /// Muons with a track in their endcap, sector and BX
    pub n_matched: u64,
    /// Events where the track finder saw new conditions
    pub n_conditions_changes: u64,
    /// Events processed with RPC collection active
    pub n_rpc_events: u64,
    /// Sum of |pT_track - pT_true| / pT_true over matched muons with pT > 0
    pub sum_rel_pt_err: f64,
    pub n_pt_measured: u64,
}

impl RunMetrics {
    /// Fraction of muons matched to a track.
    pub fn efficiency(&self) -> f64 {
        if self.n_muons == 0 {
            0.0
        } else {
            self.n_matched as f64 / self.n_muons as f64
        }
    }

    pub fn mean_rel_pt_err(&self) -> f64 {
        if self.n_pt_measured == 0 {
            0.0
        } else {
            self.sum_rel_pt_err / self.n_pt_measured as f64
        }
    }

    /// Accumulate one processed event.
    pub fn accumulate(&mut self, summary: &EventSummary, truth: &[Muon], tracks: &[EmtfTrack]) {
        self.n_events += 1;
        self.n_primitives += summary.n_primitives as u64;
        self.n_hits += summary.n_hits as u64;
        self.n_tracks += summary.n_tracks as u64;
        self.n_conditions_changes += u64::from(summary.new_conditions);
        self.n_rpc_events += u64::from(summary.collected.contains(&Subsystem::Rpc));

        for muon in truth {
            self.n_muons += 1;
            let matched = tracks.iter().find(|t| {
                t.endcap == muon.endcap() && t.sector == muon.sector() && t.bx == muon.bx
            });
            let Some(track) = matched else {
                continue;
            };
            self.n_matched += 1;
            if track.pt > 0.0 {
                self.sum_rel_pt_err += (track.pt as f64 - muon.pt).abs() / muon.pt;
                self.n_pt_measured += 1;
            }
        }
    }
}
