//! Narrow phase: triangle/triangle contact.
//!
//! Hit detection is a plane separating-axis rejection on the first
//! triangle's normal followed by an exact edge-crossing confirmation. The
//! reported contact is deliberately approximate:
//!
//! - the point is the mean of all six vertices, not the clipped overlap;
//! - the depth is the smallest absolute distance from the other triangle's
//!   vertices to the first triangle's plane.
//!
//! Callers rely on this placement, so it is kept even though hit detection
//! itself is exact (see [`triangles_intersect`]).

use crate::geometry::{plane_distance, ray_triangle};
use crate::math::{Point3, Vec3};
use crate::mesh::Triangle;

/// Approximate contact between two triangles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleContact {
    /// Mean of the six vertices.
    pub point: Point3,
    /// Unit normal of the first triangle.
    pub normal: Vec3,
    /// Smallest plane distance of the other triangle's vertices (>= 0).
    pub depth: f64,
}

/// Contact between `first` and `other`, if they intersect.
///
/// Degenerate triangles never produce a contact.
pub fn triangle_contact(first: &Triangle<'_>, other: &Triangle<'_>) -> Option<TriangleContact> {
    if first.is_degenerate() || other.is_degenerate() {
        return None;
    }
    if !first.aabb().overlaps(&other.aabb()) {
        return None;
    }

    let normal = first.normal();
    let origin = first.v[0];
    let d = other.v.map(|v| plane_distance(v, origin, &normal));
    if d.iter().all(|&x| x > 0.0) || d.iter().all(|&x| x < 0.0) {
        return None;
    }

    if !triangles_intersect(first, other) {
        return None;
    }

    let sum = first
        .v
        .iter()
        .chain(other.v.iter())
        .fold(Vec3::zeros(), |acc, v| acc + v.coords);
    let depth = d.iter().map(|x| x.abs()).fold(f64::INFINITY, f64::min);

    Some(TriangleContact {
        point: Point3::from(sum / 6.0),
        normal,
        depth,
    })
}

/// Whether two non-degenerate triangles intersect.
///
/// Tests every edge of each triangle as a segment against the other
/// triangle. Exact for triangles in general position; coplanar overlap is
/// not reported.
pub fn triangles_intersect(a: &Triangle<'_>, b: &Triangle<'_>) -> bool {
    edges_cross(a, b) || edges_cross(b, a)
}

fn edges_cross(edges_of: &Triangle<'_>, against: &Triangle<'_>) -> bool {
    (0..3).any(|i| {
        let p = edges_of.v[i];
        let q = edges_of.v[(i + 1) % 3];
        let dir = q - p;
        ray_triangle(p, &dir, against.v[0], against.v[1], against.v[2])
            .is_some_and(|t| t <= 1.0)
    })
}
