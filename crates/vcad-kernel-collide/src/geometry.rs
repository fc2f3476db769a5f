//! Triangle-level geometric primitives.
//!
//! All functions are total: degenerate triangles produce a documented
//! fallback instead of NaN.

use crate::math::{Point3, Vec3, DEGENERATE_EPS};

/// Twice-area threshold below which a triangle is considered degenerate.
pub const DEGENERATE_AREA: f64 = 1e-12;

/// Unnormalized normal `(b - a) × (c - a)`.
#[inline]
pub fn triangle_cross(a: &Point3, b: &Point3, c: &Point3) -> Vec3 {
    (b - a).cross(&(c - a))
}

/// Triangle area.
pub fn triangle_area(a: &Point3, b: &Point3, c: &Point3) -> f64 {
    0.5 * triangle_cross(a, b, c).norm()
}

/// Whether the triangle has (near) zero area.
pub fn is_degenerate(a: &Point3, b: &Point3, c: &Point3) -> bool {
    triangle_cross(a, b, c).norm() < DEGENERATE_AREA
}

/// Unit triangle normal (counter-clockwise winding).
///
/// Degenerate triangles return `+Z`.
pub fn triangle_normal(a: &Point3, b: &Point3, c: &Point3) -> Vec3 {
    let n = triangle_cross(a, b, c);
    let len_sq = n.norm_squared();
    if len_sq < DEGENERATE_EPS {
        Vec3::z()
    } else {
        n / len_sq.sqrt()
    }
}

/// Triangle centroid.
pub fn centroid(a: &Point3, b: &Point3, c: &Point3) -> Point3 {
    Point3::from((a.coords + b.coords + c.coords) / 3.0)
}

/// Closest point on triangle `abc` to `p`.
///
/// Voronoi-region walk (Ericson, *Real-Time Collision Detection* 5.1.5).
/// A degenerate triangle still yields a point on one of its edges.
pub fn closest_point_on_triangle(p: &Point3, a: &Point3, b: &Point3, c: &Point3) -> Point3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let denom = d1 - d3;
        if denom.abs() > DEGENERATE_EPS {
            return a + ab * (d1 / denom);
        }
        return *a;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let denom = d2 - d6;
        if denom.abs() > DEGENERATE_EPS {
            return a + ac * (d2 / denom);
        }
        return *a;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let denom = (d4 - d3) + (d5 - d6);
        if denom.abs() > DEGENERATE_EPS {
            return b + (c - b) * ((d4 - d3) / denom);
        }
        return *b;
    }

    let sum = va + vb + vc;
    if sum.abs() < DEGENERATE_EPS {
        return *a;
    }
    let v = vb / sum;
    let w = vc / sum;
    a + ab * v + ac * w
}

/// Unsigned distance from `p` to triangle `abc`.
pub fn point_triangle_distance(p: &Point3, a: &Point3, b: &Point3, c: &Point3) -> f64 {
    (p - closest_point_on_triangle(p, a, b, c)).norm()
}

/// Signed distance from `p` to the plane through `origin` with unit `normal`.
#[inline]
pub fn plane_distance(p: &Point3, origin: &Point3, normal: &Vec3) -> f64 {
    (p - origin).dot(normal)
}

/// Ray/triangle intersection (Möller–Trumbore).
///
/// Returns the ray parameter `t > eps` of the hit, if any. Hits exactly on
/// an edge are accepted.
pub fn ray_triangle(
    origin: &Point3,
    dir: &Vec3,
    a: &Point3,
    b: &Point3,
    c: &Point3,
) -> Option<f64> {
    const EPS: f64 = 1e-12;
    let e1 = b - a;
    let e2 = c - a;
    let h = dir.cross(&e2);
    let det = e1.dot(&h);
    if det.abs() < EPS {
        return None;
    }
    let inv = 1.0 / det;
    let s = origin - a;
    let u = inv * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(&e1);
    let v = inv * dir.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = inv * e2.dot(&q);
    (t > 1e-9).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_tri() -> (Point3, Point3, Point3) {
        (
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        )
    }

    #[test]
    fn test_triangle_normal_ccw() {
        let (a, b, c) = unit_tri();
        assert_relative_eq!(triangle_normal(&a, &b, &c), Vec3::z());
        assert_relative_eq!(triangle_normal(&a, &c, &b), -Vec3::z());
    }

    #[test]
    fn test_degenerate_normal_falls_back() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(2.0, 0.0, 0.0);
        let n = triangle_normal(&a, &b, &c);
        assert!(n.iter().all(|v| v.is_finite()));
        assert_eq!(n, Vec3::z());
        assert!(is_degenerate(&a, &b, &c));
    }

    #[test]
    fn test_closest_point_regions() {
        let (a, b, c) = unit_tri();
        // Face interior
        let p = closest_point_on_triangle(&Point3::new(0.2, 0.2, 5.0), &a, &b, &c);
        assert_relative_eq!(p, Point3::new(0.2, 0.2, 0.0));
        // Vertex region
        let p = closest_point_on_triangle(&Point3::new(-1.0, -1.0, 0.0), &a, &b, &c);
        assert_relative_eq!(p, a);
        // Edge region (hypotenuse)
        let p = closest_point_on_triangle(&Point3::new(1.0, 1.0, 0.0), &a, &b, &c);
        assert_relative_eq!(p, Point3::new(0.5, 0.5, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_point_triangle_distance() {
        let (a, b, c) = unit_tri();
        let d = point_triangle_distance(&Point3::new(0.25, 0.25, -2.0), &a, &b, &c);
        assert_relative_eq!(d, 2.0);
    }

    #[test]
    fn test_closest_point_degenerate_is_finite() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let p = closest_point_on_triangle(&Point3::new(1.0, 1.0, 1.0), &a, &a, &a);
        assert_eq!(p, a);
    }

    #[test]
    fn test_ray_triangle_hit_and_miss() {
        let (a, b, c) = unit_tri();
        let t = ray_triangle(&Point3::new(0.2, 0.2, 1.0), &-Vec3::z(), &a, &b, &c);
        assert_relative_eq!(t.unwrap(), 1.0);
        assert!(ray_triangle(&Point3::new(2.0, 2.0, 1.0), &-Vec3::z(), &a, &b, &c).is_none());
        // Pointing away
        assert!(ray_triangle(&Point3::new(0.2, 0.2, 1.0), &Vec3::z(), &a, &b, &c).is_none());
    }
}
