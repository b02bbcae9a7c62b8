//! Track finder configuration.
//!
//! Every group mirrors one parameter set of the trigger emulator. The sector
//! sub-bundles (`sp_*_params16`) are not interpreted by the orchestrator; they
//! are validated here and handed verbatim to each sector unit.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Sector parameter groups
// ---------------------------------------------------------------------------

/// Primitive conversion: zone geometry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PcParams {
    pub zone_boundaries: Vec<i32>,
    pub zone_overlap: i32,
    pub include_neighbor: bool,
    pub duplicate_theta: bool,
    pub fix_zone_phi: bool,
    pub use_new_zones: bool,
    pub fix_me11_edges: bool,
}

impl Default for PcParams {
    fn default() -> Self {
        Self {
            zone_boundaries: vec![0, 41, 49, 87, 127],
            zone_overlap: 2,
            include_neighbor: true,
            duplicate_theta: true,
            fix_zone_phi: true,
            use_new_zones: false,
            fix_me11_edges: true,
        }
    }
}

/// Pattern recognition: pattern definitions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrParams {
    pub pattern_definitions: Vec<String>,
    pub sym_pattern_definitions: Vec<String>,
    pub use_symmetrical_patterns: bool,
}

impl Default for PrParams {
    fn default() -> Self {
        let pattern_definitions = [
            "4,15:15,7:7,7:7,7:7",
            "3,16:16,7:7,7:6,7:6",
            "3,14:14,7:7,8:7,8:7",
            "2,18:17,7:7,7:5,7:5",
            "2,13:12,7:7,10:7,10:7",
            "1,22:19,7:7,7:0,7:0",
            "1,11:8,7:7,14:7,14:7",
            "0,30:23,7:7,7:0,7:0",
            "0,7:0,7:7,14:7,14:7",
        ];
        let sym_pattern_definitions = [
            "4,15:15:15:15,7:7:7:7,7:7:7:7,7:7:7:7",
            "3,16:16:14:14,7:7:7:7,8:7:7:6,8:7:7:6",
            "2,18:17:13:12,7:7:7:7,10:7:7:4,10:7:7:4",
            "1,22:19:11:8,7:7:7:7,14:7:7:0,14:7:7:0",
            "0,30:23:7:0,7:7:7:7,14:7:7:0,14:7:7:0",
        ];
        Self {
            pattern_definitions: pattern_definitions.iter().map(|s| s.to_string()).collect(),
            sym_pattern_definitions: sym_pattern_definitions
                .iter()
                .map(|s| s.to_string())
                .collect(),
            use_symmetrical_patterns: true,
        }
    }
}

/// Time and theta matching.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TbParams {
    pub theta_window: i32,
    pub theta_window_rpc: i32,
    pub use_single_hits: bool,
    pub bug_st2_ph_diff: bool,
    pub bug_me11_dupes: bool,
}

impl Default for TbParams {
    fn default() -> Self {
        Self {
            theta_window: 8,
            theta_window_rpc: 8,
            use_single_hits: false,
            bug_st2_ph_diff: false,
            bug_me11_dupes: false,
        }
    }
}

/// Ghost cancellation and best-track selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GcParams {
    pub max_roads_per_zone: i32,
    pub max_tracks: i32,
    pub use_second_earliest: bool,
    pub bug_same_sector_pt0: bool,
}

impl Default for GcParams {
    fn default() -> Self {
        Self {
            max_roads_per_zone: 3,
            max_tracks: 3,
            use_second_earliest: true,
            bug_same_sector_pt0: false,
        }
    }
}

/// Momentum assignment behaviour, including firmware-compatibility quirks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaParams {
    pub pt_lut_version: u32,
    pub read_pt_lut_file: bool,
    pub fix_mode15_high_pt: bool,
    pub bug_9bit_dphi: bool,
    pub bug_mode7_clct: bool,
    pub bug_neg_pt: bool,
    pub bug_gmt_phi: bool,
    pub promote_mode7: bool,
}

impl Default for PaParams {
    fn default() -> Self {
        Self {
            pt_lut_version: 7,
            read_pt_lut_file: false,
            fix_mode15_high_pt: true,
            bug_9bit_dphi: false,
            bug_mode7_clct: false,
            bug_neg_pt: false,
            bug_gmt_phi: false,
            promote_mode7: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Configuration bundle for the whole track finder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackFinderConfig {
    /// 0 = quiet, >0 = firmware-simulator dump, >2 = also list primitives
    pub verbosity: i32,
    pub csc_input: String,
    pub rpc_input: String,
    pub gem_input: String,
    pub csc_enable: bool,
    pub rpc_enable: bool,
    pub gem_enable: bool,
    pub min_bx: i32,
    pub max_bx: i32,
    pub bx_window: i32,
    pub csc_input_bx_shift: i32,
    pub rpc_input_bx_shift: i32,
    pub gem_input_bx_shift: i32,
    /// Run the sector loop on the rayon pool. Output is identical either way.
    pub parallel_sectors: bool,
    pub sp_pc_params16: PcParams,
    pub sp_pr_params16: PrParams,
    pub sp_tb_params16: TbParams,
    pub sp_gc_params16: GcParams,
    pub sp_pa_params16: PaParams,
}

impl Default for TrackFinderConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            csc_input: "simCscTriggerPrimitiveDigis:MPCSORTED".to_string(),
            rpc_input: "simMuonRPCDigis".to_string(),
            gem_input: "simMuonGEMPadDigis".to_string(),
            csc_enable: true,
            rpc_enable: true,
            gem_enable: false,
            min_bx: -3,
            max_bx: 3,
            bx_window: 2,
            csc_input_bx_shift: -6,
            rpc_input_bx_shift: 0,
            gem_input_bx_shift: 0,
            parallel_sectors: false,
            sp_pc_params16: PcParams::default(),
            sp_pr_params16: PrParams::default(),
            sp_tb_params16: TbParams::default(),
            sp_gc_params16: GcParams::default(),
            sp_pa_params16: PaParams::default(),
        }
    }
}

impl TrackFinderConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Check everything a sector unit would otherwise trip over mid-run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_bx > self.max_bx {
            return Err(ConfigError::invalid(
                "min_bx",
                format!("min_bx {} is after max_bx {}", self.min_bx, self.max_bx),
            ));
        }
        if self.bx_window < 1 {
            return Err(ConfigError::invalid("bx_window", "must be at least 1"));
        }
        for (name, label, enabled) in [
            ("csc_input", &self.csc_input, self.csc_enable),
            ("rpc_input", &self.rpc_input, self.rpc_enable),
            ("gem_input", &self.gem_input, self.gem_enable),
        ] {
            if enabled && label.trim().is_empty() {
                return Err(ConfigError::invalid(name, "enabled subsystem needs an input label"));
            }
        }

        let pc = &self.sp_pc_params16;
        if pc.zone_boundaries.len() < 2 {
            return Err(ConfigError::invalid(
                "zone_boundaries",
                "need at least two boundaries",
            ));
        }
        if pc.zone_boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::invalid(
                "zone_boundaries",
                "must be strictly increasing",
            ));
        }
        if pc.zone_overlap < 0 {
            return Err(ConfigError::invalid("zone_overlap", "must not be negative"));
        }

        let pr = &self.sp_pr_params16;
        let patterns = if pr.use_symmetrical_patterns {
            ("sym_pattern_definitions", &pr.sym_pattern_definitions)
        } else {
            ("pattern_definitions", &pr.pattern_definitions)
        };
        if patterns.1.is_empty() {
            return Err(ConfigError::invalid(patterns.0, "no patterns defined"));
        }
        for def in patterns.1 {
            check_pattern_definition(def).map_err(|reason| ConfigError::invalid(patterns.0, reason))?;
        }

        let tb = &self.sp_tb_params16;
        if tb.theta_window < 0 || tb.theta_window_rpc < 0 {
            return Err(ConfigError::invalid("theta_window", "must not be negative"));
        }

        let gc = &self.sp_gc_params16;
        if gc.max_roads_per_zone < 1 {
            return Err(ConfigError::invalid("max_roads_per_zone", "must be at least 1"));
        }
        if gc.max_tracks < 1 {
            return Err(ConfigError::invalid("max_tracks", "must be at least 1"));
        }
        Ok(())
    }
}

/// `"straightness,a:b,c:d,e:f,g:h"`: a straightness followed by one
/// colon-separated window per station.
fn check_pattern_definition(def: &str) -> Result<(), String> {
    let mut fields = def.split(',');
    let straightness = fields.next().unwrap_or_default();
    straightness
        .trim()
        .parse::<i32>()
        .map_err(|_| format!("bad straightness in `{def}`"))?;

    let stations: Vec<&str> = fields.collect();
    if stations.len() != 4 {
        return Err(format!("`{def}` needs 4 station windows, found {}", stations.len()));
    }
    for window in stations {
        let bounds: Result<Vec<i32>, _> = window.split(':').map(|b| b.trim().parse::<i32>()).collect();
        match bounds {
            Ok(b) if b.len() >= 2 => {}
            _ => return Err(format!("bad station window `{window}` in `{def}`")),
        }
    }
    Ok(())
}
