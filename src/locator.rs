//! Reverse lookup from world-frame points to geometry identifiers.
//!
//! A locator snapshots the dictionary entries of one category (or of one
//! identifier pattern) and answers "which volume holds this point" by
//! running each candidate's world placement backwards and testing the
//! point against the volume shape. Candidate lists are small per category,
//! so a linear scan is enough; the last hit is retried first since point
//! queries tend to cluster spatially.

use std::cell::Cell;

use log::debug;
use nalgebra::Point3;

use crate::geom_id::GeomId;
use crate::mapping::{GeomInfo, MappingDict};

/// Point-location over the dictionary entries matching one identifier
/// pattern.
pub struct Locator<'a> {
    candidates: Vec<&'a GeomInfo>,
    last_hit: Cell<Option<usize>>,
}

impl<'a> Locator<'a> {
    /// A locator over every entry of one category type.
    pub fn for_type(dict: &'a MappingDict, type_id: u32) -> Self {
        let candidates: Vec<&GeomInfo> = dict.infos_with_type(type_id).collect();
        debug!(
            "locator for type {type_id}: {} candidate(s)",
            candidates.len()
        );
        Self {
            candidates,
            last_hit: Cell::new(None),
        }
    }

    /// A locator over every entry matching a wildcard pattern.
    pub fn for_pattern(dict: &'a MappingDict, pattern: &GeomId) -> Self {
        let candidates: Vec<&GeomInfo> = dict
            .infos_with_type(pattern.type_id())
            .filter(|info| pattern.matches(&info.id))
            .collect();
        Self {
            candidates,
            last_hit: Cell::new(None),
        }
    }

    /// The snapshotted candidate records, in identifier order.
    pub fn ginfos(&self) -> &[&'a GeomInfo] {
        &self.candidates
    }

    /// Finds the candidate whose volume contains the world-frame point.
    ///
    /// `tol` is the skin thickness forwarded to the shape test. Returns
    /// `None` when no candidate contains the point.
    pub fn locate(&self, point: &Point3<f64>, tol: f64) -> Option<&'a GeomId> {
        if let Some(i) = self.last_hit.get() {
            if self.hit(i, point, tol) {
                return Some(&self.candidates[i].id);
            }
        }
        for i in 0..self.candidates.len() {
            if self.hit(i, point, tol) {
                self.last_hit.set(Some(i));
                return Some(&self.candidates[i].id);
            }
        }
        None
    }

    fn hit(&self, i: usize, point: &Point3<f64>, tol: f64) -> bool {
        let info = self.candidates[i];
        let local = info.world_placement.to_child(point);
        info.shape.contains(&local, tol)
    }
}
