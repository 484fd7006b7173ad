//! Replication placement generators.
//!
//! A replication generator is a pure function from an item index to a
//! [`Placement`], used to express stacks and regular grids without
//! duplicating templates. Generators also report the replica sub-addresses
//! each item contributes to identifier synthesis (one index for a stack,
//! column and row for a grid). Determinism here is what makes geometry
//! identifiers reproducible between runs.

use nalgebra::Vector3;
use serde::Deserialize;

use crate::placement::Placement;
use crate::shape::Axis;

/// Common contract of every daughter placement source.
pub trait Replication {
    /// Number of placed items (1 for a single placement).
    fn number_of_items(&self) -> usize;

    /// The placement of item `item` in the mother frame.
    fn placement_at(&self, item: usize) -> Placement;

    /// The replica sub-addresses of item `item`, in the order the category
    /// schema consumes them. Empty for a single placement.
    fn index_map(&self, item: usize) -> Vec<u32>;
}

/// One explicitly placed daughter.
#[derive(Debug, Clone, PartialEq)]
pub struct SinglePlacement {
    placement: Placement,
}

impl SinglePlacement {
    pub fn new(placement: Placement) -> Self {
        Self { placement }
    }
}

impl Replication for SinglePlacement {
    fn number_of_items(&self) -> usize {
        1
    }

    fn placement_at(&self, _item: usize) -> Placement {
        self.placement.clone()
    }

    fn index_map(&self, _item: usize) -> Vec<u32> {
        Vec::new()
    }
}

/// A linear stack along one axis.
///
/// Items are packed in order with an inter-item clearance (`play`) so that
/// no two items overlap, and the whole envelope is centered on the mother
/// origin. Each item owns an inclusive position range that consumers can use
/// to place further volumes adjacent to the stack.
#[derive(Debug, Clone, PartialEq)]
pub struct StackPlacement {
    axis: Axis,
    play: f64,
    centers: Vec<f64>,       // item center offsets along the axis
    ranges: Vec<(f64, f64)>, // interval occupied by each item
}

impl StackPlacement {
    /// Packs items with the given full extents along `axis`, separated by
    /// `play`. The extents are listed in stacking order.
    pub fn new(axis: Axis, extents: Vec<f64>, play: f64) -> Self {
        let n = extents.len();
        let total: f64 = extents.iter().sum::<f64>() + play * n.saturating_sub(1) as f64;
        let mut centers = Vec::with_capacity(n);
        let mut ranges = Vec::with_capacity(n);
        let mut cursor = -0.5 * total;
        for w in &extents {
            centers.push(cursor + 0.5 * w);
            ranges.push((cursor, cursor + w));
            cursor += w + play;
        }
        Self {
            axis,
            play,
            centers,
            ranges,
        }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn play(&self) -> f64 {
        self.play
    }

    /// The inclusive position range owned by stacked item `item`.
    pub fn item_range(&self, item: usize) -> (f64, f64) {
        self.ranges[item]
    }

    fn axis_vector(&self, offset: f64) -> Vector3<f64> {
        match self.axis {
            Axis::X => Vector3::new(offset, 0.0, 0.0),
            Axis::Y => Vector3::new(0.0, offset, 0.0),
            Axis::Z => Vector3::new(0.0, 0.0, offset),
        }
    }
}

impl Replication for StackPlacement {
    fn number_of_items(&self) -> usize {
        self.centers.len()
    }

    fn placement_at(&self, item: usize) -> Placement {
        Placement::new(
            self.axis_vector(self.centers[item]),
            nalgebra::Rotation3::identity(),
        )
    }

    fn index_map(&self, item: usize) -> Vec<u32> {
        vec![item as u32]
    }
}

/// The plane a regular grid spans, named by its two axes in (column, row)
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridPlane {
    XY,
    XZ,
    YZ,
}

/// A regular 2-D grid of identical daughters.
///
/// Item `(column, row)` is the basic placement translated by
/// `(column * pitch.0, row * pitch.1)` along the plane axes; when centered,
/// the whole grid is shifted by `-0.5 * (n - 1) * pitch` per axis so its
/// envelope is centered on the basic placement. Item index and
/// `(column, row)` are interchangeable via `index = column + row * columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPlacement {
    basic: Placement,
    plane: GridPlane,
    columns: usize,
    rows: usize,
    pitch: (f64, f64),
    centered: bool,
}

impl GridPlacement {
    pub fn new(
        basic: Placement,
        plane: GridPlane,
        columns: usize,
        rows: usize,
        pitch: (f64, f64),
        centered: bool,
    ) -> Self {
        Self {
            basic,
            plane,
            columns,
            rows,
            pitch,
            centered,
        }
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn column_row(&self, item: usize) -> (usize, usize) {
        (item % self.columns, item / self.columns)
    }

    fn plane_offset(&self, u: f64, v: f64) -> Vector3<f64> {
        match self.plane {
            GridPlane::XY => Vector3::new(u, v, 0.0),
            GridPlane::XZ => Vector3::new(u, 0.0, v),
            GridPlane::YZ => Vector3::new(0.0, u, v),
        }
    }
}

impl Replication for GridPlacement {
    fn number_of_items(&self) -> usize {
        self.columns * self.rows
    }

    fn placement_at(&self, item: usize) -> Placement {
        let (col, row) = self.column_row(item);
        let mut u = col as f64 * self.pitch.0;
        let mut v = row as f64 * self.pitch.1;
        if self.centered {
            u -= 0.5 * (self.columns - 1) as f64 * self.pitch.0;
            v -= 0.5 * (self.rows - 1) as f64 * self.pitch.1;
        }
        Placement::new(
            self.basic.translation() + self.plane_offset(u, v),
            *self.basic.rotation(),
        )
    }

    fn index_map(&self, item: usize) -> Vec<u32> {
        let (col, row) = self.column_row(item);
        vec![col as u32, row as u32]
    }
}

/// A daughter's placement source: either one explicit placement or a
/// replication generator.
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementSource {
    Single(SinglePlacement),
    Stack(StackPlacement),
    Grid(GridPlacement),
}

impl Replication for PlacementSource {
    fn number_of_items(&self) -> usize {
        match self {
            PlacementSource::Single(p) => p.number_of_items(),
            PlacementSource::Stack(p) => p.number_of_items(),
            PlacementSource::Grid(p) => p.number_of_items(),
        }
    }

    fn placement_at(&self, item: usize) -> Placement {
        match self {
            PlacementSource::Single(p) => p.placement_at(item),
            PlacementSource::Stack(p) => p.placement_at(item),
            PlacementSource::Grid(p) => p.placement_at(item),
        }
    }

    fn index_map(&self, item: usize) -> Vec<u32> {
        match self {
            PlacementSource::Single(p) => p.index_map(item),
            PlacementSource::Stack(p) => p.index_map(item),
            PlacementSource::Grid(p) => p.index_map(item),
        }
    }
}
