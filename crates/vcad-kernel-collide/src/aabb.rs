//! Axis-aligned bounding boxes.

use serde::{Deserialize, Serialize};

use crate::math::{Point3, Vec3};

/// Axis-aligned bounding box in 3D.
///
/// A non-empty box always satisfies `min[i] <= max[i]`. The value returned by
/// [`Aabb::empty`] is inverted on purpose and only meant to be grown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Point3,
    /// Maximum corner.
    pub max: Point3,
}

impl Aabb {
    /// Create an AABB from two corners, sorting them per axis.
    pub fn new(a: Point3, b: Point3) -> Self {
        Self {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Create an empty (inverted) AABB suitable for expansion.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Bounds of a set of points. Empty input gives [`Aabb::empty`].
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3>) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.include_point(p);
        }
        aabb
    }

    /// True if no point has been included yet.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand this AABB to include a point.
    pub fn include_point(&mut self, p: &Point3) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    /// Expand this AABB to include another.
    pub fn include_aabb(&mut self, other: &Aabb) {
        if other.is_empty() {
            return;
        }
        self.include_point(&other.min);
        self.include_point(&other.max);
    }

    /// Union of two boxes.
    pub fn merged(&self, other: &Aabb) -> Aabb {
        let mut out = *self;
        out.include_aabb(other);
        out
    }

    /// Test if two AABBs overlap (touching counts as overlap).
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Whether `p` lies inside or on the boundary.
    pub fn contains_point(&self, p: &Point3) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    /// Whether `other` lies entirely inside this box.
    pub fn contains_aabb(&self, other: &Aabb) -> bool {
        other.is_empty() || (self.contains_point(&other.min) && self.contains_point(&other.max))
    }

    /// Grow by `tol` on every side.
    pub fn expanded(&self, tol: f64) -> Aabb {
        let d = Vec3::repeat(tol);
        Aabb {
            min: self.min - d,
            max: self.max + d,
        }
    }

    /// Box center.
    pub fn center(&self) -> Point3 {
        nalgebra::center(&self.min, &self.max)
    }

    /// Full extents along each axis.
    pub fn extents(&self) -> Vec3 {
        self.max - self.min
    }

    /// Index of the longest axis (0 = X, 1 = Y, 2 = Z).
    pub fn longest_axis(&self) -> usize {
        let e = self.extents();
        if e.x >= e.y && e.x >= e.z {
            0
        } else if e.y >= e.z {
            1
        } else {
            2
        }
    }

    /// Squared distance from `p` to the box (zero inside).
    pub fn distance_squared(&self, p: &Point3) -> f64 {
        let mut d = 0.0;
        for i in 0..3 {
            let v = p[i];
            if v < self.min[i] {
                d += (self.min[i] - v).powi(2);
            } else if v > self.max[i] {
                d += (v - self.max[i]).powi(2);
            }
        }
        d
    }

    /// Slab test; returns the entry parameter if the ray hits within `[0, t_max]`.
    pub fn ray_entry(&self, origin: &Point3, dir: &Vec3, t_max: f64) -> Option<f64> {
        let mut t0 = 0.0_f64;
        let mut t1 = t_max;
        for i in 0..3 {
            if dir[i].abs() < 1e-15 {
                if origin[i] < self.min[i] || origin[i] > self.max[i] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir[i];
            let mut near = (self.min[i] - origin[i]) * inv;
            let mut far = (self.max[i] - origin[i]) * inv;
            if near > far {
                std::mem::swap(&mut near, &mut far);
            }
            t0 = t0.max(near);
            t1 = t1.min(far);
            if t0 > t1 {
                return None;
            }
        }
        Some(t0)
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}
