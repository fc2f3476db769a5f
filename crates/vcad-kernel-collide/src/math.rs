//! Math aliases and machine kinematics.
//!
//! Thin wrappers around nalgebra, in the same spirit as the kernel math crate,
//! plus the mapping from a machine axis position to a rigid pose.

use nalgebra::{Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A rigid transform (rotation + translation).
pub type Pose = nalgebra::Isometry3<f64>;

/// Squared length below which a cross product is treated as degenerate.
pub const DEGENERATE_EPS: f64 = 1e-12;

/// Kinematic position of a 5-axis (XYZ + ABC) machine.
///
/// Linear axes are in mm, rotary axes in degrees. Rotary axes turn about the
/// machine origin: A about X, B about Y, C about Z.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MachinePosition {
    /// X offset in mm.
    pub x: f64,
    /// Y offset in mm.
    pub y: f64,
    /// Z offset in mm.
    pub z: f64,
    /// Rotation about X in degrees.
    #[serde(default)]
    pub a: f64,
    /// Rotation about Y in degrees.
    #[serde(default)]
    pub b: f64,
    /// Rotation about Z in degrees.
    #[serde(default)]
    pub c: f64,
}

impl MachinePosition {
    /// A pure linear position with all rotary axes at zero.
    pub fn linear(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            ..Self::default()
        }
    }

    /// The rigid pose for this position: `Rz(c)·Ry(b)·Rx(a)` then translate.
    pub fn pose(&self) -> Pose {
        let rx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), self.a.to_radians());
        let ry = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), self.b.to_radians());
        let rz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), self.c.to_radians());
        Pose::from_parts(Translation3::new(self.x, self.y, self.z), rz * ry * rx)
    }
}

/// Pick a unit vector that is not near-parallel to `n`.
///
/// Used to seed tangent bases; returns world X when `n` leans toward Y/Z and
/// world Y otherwise.
pub fn non_parallel_axis(n: &Vec3) -> Vec3 {
    if n.x.abs() < 0.9 {
        Vec3::x()
    } else {
        Vec3::y()
    }
}
