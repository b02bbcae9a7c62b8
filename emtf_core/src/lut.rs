//! Primitive-conversion lookup tables, shared by all sector units.
//!
//! Tables are addressed per sector unit and per converter slot
//! `(pc_station, pc_chamber)`. They are reloaded whenever the conditions
//! select a different table set.

use crate::error::LutError;
use crate::types::NUM_SECTORS;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Converter stations per sector: ME1 sub 1, ME1 sub 2, ME2, ME3, ME4, neighbor.
pub const PC_STATIONS: usize = 6;
/// Converter chambers per station, including the neighbor chamber.
pub const PC_CHAMBERS: usize = 9;
pub const SLOTS_PER_SECTOR: usize = PC_STATIONS * PC_CHAMBERS;

/// Name of the table set used for a given PC-LUT version.
pub fn lut_set_name(pc_lut_version: u32) -> &'static str {
    match pc_lut_version {
        0 => "ph_lut_v1",
        1 => "ph_lut_v2",
        _ => "ph_lut_v3_data",
    }
}

/// One full set of conversion tables.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcLutTables {
    /// Chamber phi origin in the sector, per slot
    pub ph_init: Vec<i32>,
    /// Chamber phi orientation: +1 or -1, per slot
    pub ph_disp: Vec<i32>,
    /// Chamber theta origin, per slot
    pub th_init: Vec<i32>,
}

impl PcLutTables {
    fn slot(es: usize, pc_station: i32, pc_chamber: i32) -> Option<usize> {
        let st = usize::try_from(pc_station).ok().filter(|&s| s < PC_STATIONS)?;
        let ch = usize::try_from(pc_chamber).ok().filter(|&c| c < PC_CHAMBERS)?;
        (es < NUM_SECTORS).then_some(es * SLOTS_PER_SECTOR + st * PC_CHAMBERS + ch)
    }

    pub fn ph_init(&self, es: usize, pc_station: i32, pc_chamber: i32) -> i32 {
        Self::slot(es, pc_station, pc_chamber)
            .and_then(|i| self.ph_init.get(i).copied())
            .unwrap_or(0)
    }

    pub fn ph_disp(&self, es: usize, pc_station: i32, pc_chamber: i32) -> i32 {
        Self::slot(es, pc_station, pc_chamber)
            .and_then(|i| self.ph_disp.get(i).copied())
            .unwrap_or(1)
    }

    pub fn th_init(&self, es: usize, pc_station: i32, pc_chamber: i32) -> i32 {
        Self::slot(es, pc_station, pc_chamber)
            .and_then(|i| self.th_init.get(i).copied())
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// Where table sets come from.
pub trait LutStore: Send + Sync {
    fn load(&self, name: &str) -> Result<PcLutTables, LutError>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryLutStore {
    sets: HashMap<String, PcLutTables>,
}

impl InMemoryLutStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tables: PcLutTables) {
        self.sets.insert(name.into(), tables);
    }

    pub fn with_set(mut self, name: impl Into<String>, tables: PcLutTables) -> Self {
        self.insert(name, tables);
        self
    }
}

impl LutStore for InMemoryLutStore {
    fn load(&self, name: &str) -> Result<PcLutTables, LutError> {
        self.sets
            .get(name)
            .cloned()
            .ok_or_else(|| LutError::NotFound(name.to_string()))
    }
}

/// Reads `<dir>/<name>.json`.
#[derive(Clone, Debug)]
pub struct DirLutStore {
    dir: PathBuf,
}

impl DirLutStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl LutStore for DirLutStore {
    fn load(&self, name: &str) -> Result<PcLutTables, LutError> {
        let path = self.dir.join(format!("{name}.json"));
        if !path.exists() {
            return Err(LutError::NotFound(name.to_string()));
        }
        let text = std::fs::read_to_string(&path).map_err(|source| LutError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| LutError::Parse { path, source })
    }
}

// ---------------------------------------------------------------------------
// PrimitiveConversionLut
// ---------------------------------------------------------------------------

/// The tables currently in effect plus the store they are reloaded from.
pub struct PrimitiveConversionLut {
    store: Box<dyn LutStore>,
    version: Option<u32>,
    loaded_set: Option<&'static str>,
    tables: PcLutTables,
}

impl PrimitiveConversionLut {
    pub fn new(store: Box<dyn LutStore>) -> Self {
        Self {
            store,
            version: None,
            loaded_set: None,
            tables: PcLutTables::default(),
        }
    }

    /// Switch to the tables for `pc_lut_version`. Returns true if tables were
    /// (re)loaded. A store failure keeps the previous tables.
    pub fn read(&mut self, pc_lut_version: u32) -> bool {
        self.version = Some(pc_lut_version);
        let name = lut_set_name(pc_lut_version);
        if self.loaded_set == Some(name) {
            return false;
        }
        match self.store.load(name) {
            Ok(tables) => {
                tracing::info!(pc_lut_version, set = name, "loaded primitive-conversion LUT");
                self.tables = tables;
                self.loaded_set = Some(name);
                true
            }
            Err(err) => {
                tracing::warn!(
                    pc_lut_version,
                    set = name,
                    kept = self.loaded_set.unwrap_or("none"),
                    "keeping previous LUT: {err}"
                );
                false
            }
        }
    }

    pub fn version(&self) -> Option<u32> {
        self.version
    }

    pub fn loaded_set(&self) -> Option<&'static str> {
        self.loaded_set
    }

    pub fn tables(&self) -> &PcLutTables {
        &self.tables
    }
}

impl std::fmt::Debug for PrimitiveConversionLut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimitiveConversionLut")
            .field("version", &self.version)
            .field("loaded_set", &self.loaded_set)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(ph: i32) -> PcLutTables {
        PcLutTables {
            ph_init: vec![ph; NUM_SECTORS * SLOTS_PER_SECTOR],
            ph_disp: vec![1; NUM_SECTORS * SLOTS_PER_SECTOR],
            th_init: vec![0; NUM_SECTORS * SLOTS_PER_SECTOR],
        }
    }

    #[test]
    fn version_to_set_name() {
        assert_eq!(lut_set_name(0), "ph_lut_v1");
        assert_eq!(lut_set_name(1), "ph_lut_v2");
        assert_eq!(lut_set_name(2), "ph_lut_v3_data");
        assert_eq!(lut_set_name(777_777), "ph_lut_v3_data");
    }

    #[test]
    fn reload_only_on_set_change() {
        let store = InMemoryLutStore::new()
            .with_set("ph_lut_v2", tables(10))
            .with_set("ph_lut_v3_data", tables(20));
        let mut lut = PrimitiveConversionLut::new(Box::new(store));
        assert!(lut.read(1));
        assert_eq!(lut.tables().ph_init(0, 0, 0), 10);
        assert!(!lut.read(1));
        assert!(lut.read(2));
        // versions 2 and 3 share a set
        assert!(!lut.read(3));
        assert_eq!(lut.version(), Some(3));
        assert_eq!(lut.tables().ph_init(11, 5, 8), 20);
    }

    #[test]
    fn missing_set_keeps_previous_tables() {
        let store = InMemoryLutStore::new().with_set("ph_lut_v2", tables(10));
        let mut lut = PrimitiveConversionLut::new(Box::new(store));
        lut.read(1);
        assert!(!lut.read(0));
        assert_eq!(lut.loaded_set(), Some("ph_lut_v2"));
        assert_eq!(lut.tables().ph_init(3, 2, 2), 10);
    }

    #[test]
    fn out_of_range_slots_use_neutral_values() {
        let t = tables(5);
        assert_eq!(t.ph_init(NUM_SECTORS, 0, 0), 0);
        assert_eq!(t.ph_init(0, -1, 0), 0);
        assert_eq!(t.ph_disp(0, 0, PC_CHAMBERS as i32), 1);
    }

    #[test]
    fn dir_store_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ph_lut_v1.json");
        std::fs::write(&path, serde_json::to_string(&tables(7)).unwrap()).unwrap();
        let store = DirLutStore::new(dir.path());
        assert_eq!(store.load("ph_lut_v1").unwrap().ph_init(0, 0, 0), 7);
        assert!(matches!(store.load("ph_lut_v2"), Err(LutError::NotFound(_))));
    }
}
