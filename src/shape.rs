//! Minimal 3-D shape catalog.
//!
//! The mapping engine only needs two things from a shape: a point-in-volume
//! test for the spatial locator, and stackable bounds so that replication
//! generators can pack items without overlap. Shapes are centered on the
//! origin of their own frame; placements carry all positioning.

use serde::Deserialize;

use nalgebra::Point3;

/// A coordinate axis of the local frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Origin-centered solid used as the shape of a logical volume.
///
/// `x`, `y`, `z` are full extents (widths), matching the usual detector
/// description convention; `r` is a radius.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    Box { x: f64, y: f64, z: f64 },
    Cylinder { r: f64, z: f64 },
    Sphere { r: f64 },
}

impl Shape {
    pub fn name(&self) -> &'static str {
        match self {
            Shape::Box { .. } => "box",
            Shape::Cylinder { .. } => "cylinder",
            Shape::Sphere { .. } => "sphere",
        }
    }

    /// Tests whether a point in the shape's own frame lies inside it.
    ///
    /// `tol` is a skin thickness: points within half of it outside the
    /// mathematical surface still count as inside, so that surface hits
    /// survive floating-point round-off.
    pub fn contains(&self, p: &Point3<f64>, tol: f64) -> bool {
        let skin = 0.5 * tol.abs();
        match *self {
            Shape::Box { x, y, z } => {
                p.x.abs() <= 0.5 * x + skin
                    && p.y.abs() <= 0.5 * y + skin
                    && p.z.abs() <= 0.5 * z + skin
            }
            Shape::Cylinder { r, z } => {
                p.z.abs() <= 0.5 * z + skin && (p.x * p.x + p.y * p.y).sqrt() <= r + skin
            }
            Shape::Sphere { r } => p.coords.norm() <= r + skin,
        }
    }

    /// The stackable interval `(min, max)` occupied along `axis`.
    pub fn stackable_range(&self, axis: Axis) -> (f64, f64) {
        let half = match (self, axis) {
            (Shape::Box { x, .. }, Axis::X) => 0.5 * x,
            (Shape::Box { y, .. }, Axis::Y) => 0.5 * y,
            (Shape::Box { z, .. }, Axis::Z) => 0.5 * z,
            (Shape::Cylinder { r, .. }, Axis::X | Axis::Y) => *r,
            (Shape::Cylinder { z, .. }, Axis::Z) => 0.5 * z,
            (Shape::Sphere { r }, _) => *r,
        };
        (-half, half)
    }

    /// Full width along `axis`.
    pub fn width(&self, axis: Axis) -> f64 {
        let (min, max) = self.stackable_range(axis);
        max - min
    }
}
