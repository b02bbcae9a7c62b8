//! Geometry translation collaborator.
//!
//! The coordinate transforms themselves live outside this crate. The track
//! finder only needs to refresh the translator once per event.

use crate::event::{EventSetup, GeometryRecord};

pub trait GeometryTranslator: Send + Sync {
    /// Pick up the geometry valid for this event. Returns true if it changed.
    fn check_and_update_geometry(&mut self, setup: &EventSetup) -> bool;

    /// Geometry currently in use, `None` before the first event.
    fn record(&self) -> Option<&GeometryRecord>;
}

/// Keeps the last geometry record and swaps it when the cache id moves.
#[derive(Clone, Debug, Default)]
pub struct CachedGeometryTranslator {
    record: Option<GeometryRecord>,
}

impl CachedGeometryTranslator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GeometryTranslator for CachedGeometryTranslator {
    fn check_and_update_geometry(&mut self, setup: &EventSetup) -> bool {
        let current = self.record.as_ref().map(|r| r.cache_id);
        if current == Some(setup.geometry.cache_id) {
            return false;
        }
        tracing::debug!(
            cache_id = setup.geometry.cache_id,
            label = %setup.geometry.label,
            "geometry updated"
        );
        self.record = Some(setup.geometry.clone());
        true
    }

    fn record(&self) -> Option<&GeometryRecord> {
        self.record.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ConditionsRecord;
    use crate::pt_assign::PtForest;
    use std::sync::Arc;

    fn setup(geometry_id: u64) -> EventSetup {
        EventSetup {
            geometry: GeometryRecord {
                cache_id: geometry_id,
                label: format!("geom-{geometry_id}"),
            },
            conditions: ConditionsRecord {
                cache_id: 1,
                fw_version: 0,
                pt_lut_version: 7,
                pc_lut_version: 2,
                forest: Arc::new(PtForest::default()),
            },
        }
    }

    #[test]
    fn refreshes_only_on_cache_id_change() {
        let mut geom = CachedGeometryTranslator::new();
        assert!(geom.record().is_none());
        assert!(geom.check_and_update_geometry(&setup(3)));
        assert!(!geom.check_and_update_geometry(&setup(3)));
        assert!(geom.check_and_update_geometry(&setup(4)));
        assert_eq!(geom.record().map(|r| r.label.as_str()), Some("geom-4"));
    }
}
