//! Rigid-body placements: a rotation plus a translation locating a child
//! volume inside its mother's coordinate frame.
//!
//! Placements compose along arbitrary-depth volume paths and invert exactly
//! (within floating tolerance), which is what lets the mapper accumulate a
//! world-frame placement while walking the volume tree and the locator run
//! the transform backwards for point-in-volume tests.

use nalgebra::{Point3, Rotation3, Vector3};


/// A rigid-body transform locating a child frame within a mother frame.
///
/// The stored rotation maps child-frame coordinates to mother-frame
/// coordinates; a point `x` expressed in the child frame sits at
/// `rotation * x + translation` in the mother frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    translation: Vector3<f64>,
    rotation: Rotation3<f64>,
}

impl Placement {
    /// The identity placement (child frame coincides with the mother frame).
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: Rotation3::identity(),
        }
    }

    pub fn new(translation: Vector3<f64>, rotation: Rotation3<f64>) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// A placement with no rotation.
    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self {
            translation: Vector3::new(x, y, z),
            rotation: Rotation3::identity(),
        }
    }

    /// Builds a placement from a translation and ZYZ Euler angles in radians.
    ///
    /// The rotation is applied as `Rz(phi) * Ry(theta) * Rz(delta)`, the
    /// standard proper Euler convention for detector alignment.
    pub fn from_euler(x: f64, y: f64, z: f64, phi: f64, theta: f64, delta: f64) -> Self {
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), phi)
            * Rotation3::from_axis_angle(&Vector3::y_axis(), theta)
            * Rotation3::from_axis_angle(&Vector3::z_axis(), delta);
        Self {
            translation: Vector3::new(x, y, z),
            rotation,
        }
    }

    /// Same as [`Placement::from_euler`] with angles in degrees.
    pub fn from_euler_deg(x: f64, y: f64, z: f64, phi: f64, theta: f64, delta: f64) -> Self {
        Self::from_euler(
            x,
            y,
            z,
            phi.to_radians(),
            theta.to_radians(),
            delta.to_radians(),
        )
    }

    pub fn translation(&self) -> &Vector3<f64> {
        &self.translation
    }

    pub fn rotation(&self) -> &Rotation3<f64> {
        &self.rotation
    }

    /// Composes this placement with a child placement.
    ///
    /// If `self` places frame B in frame A and `child` places frame C in
    /// frame B, the result places frame C directly in frame A. Used by the
    /// mapper to accumulate world placements while descending the tree.
    pub fn compose(&self, child: &Placement) -> Placement {
        Placement {
            translation: self.translation + self.rotation * child.translation,
            rotation: self.rotation * child.rotation,
        }
    }

    /// Transforms a point from the child frame to the mother frame.
    pub fn to_mother(&self, child_pos: &Point3<f64>) -> Point3<f64> {
        self.rotation * child_pos + self.translation
    }

    /// Transforms a point from the mother frame to the child frame.
    pub fn to_child(&self, mother_pos: &Point3<f64>) -> Point3<f64> {
        self.rotation.inverse() * Point3::from(mother_pos.coords - self.translation)
    }

    /// Transforms a direction (no translation) from child to mother frame.
    pub fn direction_to_mother(&self, child_dir: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * child_dir
    }

    /// Transforms a direction (no translation) from mother to child frame.
    pub fn direction_to_child(&self, mother_dir: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse() * mother_dir
    }

    /// The inverse placement, locating the mother frame within the child's.
    pub fn inverse(&self) -> Placement {
        let inv_rot = self.rotation.inverse();
        Placement {
            translation: -(inv_rot * self.translation),
            rotation: inv_rot,
        }
    }

    /// Component-wise comparison within an absolute tolerance.
    pub fn approx_eq(&self, other: &Placement, tol: f64) -> bool {
        (self.translation - other.translation).norm() <= tol
            && (self.rotation.matrix() - other.rotation.matrix()).norm() <= tol
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::fmt::Display for Placement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = &self.translation;
        let (phi, theta, delta) = self.rotation.euler_angles();
        write!(
            f,
            "(x={:.6}, y={:.6}, z={:.6}; rpy={:.6},{:.6},{:.6})",
            t.x, t.y, t.z, phi, theta, delta
        )
    }
}
