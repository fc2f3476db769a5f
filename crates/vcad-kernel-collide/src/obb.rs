//! Oriented bounding boxes and OBB-trees for tool-assembly shapes.
//!
//! Tool components are rigid, so their OBB-tree is built once in the
//! component's local frame and re-posed for every query instead of being
//! rebuilt.

use nalgebra::{Matrix3, SymmetricEigen};
use serde::{Deserialize, Serialize};

use crate::aabb::Aabb;
use crate::math::{Point3, Pose, Vec3};
use crate::mesh::TriMesh;
use crate::tree::{BoundingTree, BoundingVolume, TreeNode};

/// An OBB-tree.
pub type ObbTree = BoundingTree<Obb>;

/// A node of an OBB-tree.
pub type ObbNode = TreeNode<Obb>;

/// Padding added to fitted half extents to absorb rounding in the projection.
const FIT_PADDING: f64 = 1e-9;

/// An oriented bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obb {
    /// Box center.
    pub center: Point3,
    /// Orthonormal right-handed axes, stored as matrix columns.
    pub axes: Matrix3<f64>,
    /// Half extent along each axis (all >= 0).
    pub half_extents: Vec3,
}

impl Obb {
    /// An OBB with world-aligned axes covering `aabb`.
    pub fn from_aabb(aabb: &Aabb) -> Self {
        Self {
            center: aabb.center(),
            axes: Matrix3::identity(),
            half_extents: aabb.extents() * 0.5,
        }
    }

    /// Fit an OBB to a point set using the principal axes of its covariance.
    ///
    /// Falls back to world axes when the covariance is zero or non-finite.
    /// Flat or collinear input still gets a valid frame; the box is simply
    /// thin along the unused axes.
    pub fn fit(points: &[Point3]) -> Self {
        if points.is_empty() {
            return Self {
                center: Point3::origin(),
                axes: Matrix3::identity(),
                half_extents: Vec3::zeros(),
            };
        }
        let n = points.len() as f64;
        let mean = points.iter().fold(Vec3::zeros(), |acc, p| acc + p.coords) / n;
        let mut cov = Matrix3::zeros();
        for p in points {
            let d = p.coords - mean;
            cov += d * d.transpose();
        }
        cov /= n;

        let axes = principal_axes(&cov).unwrap_or_else(Matrix3::identity);
        Self::fit_with_axes(points, axes)
    }

    /// Tightest box with the given axes around a point set.
    pub fn fit_with_axes(points: &[Point3], axes: Matrix3<f64>) -> Self {
        let mut lo = Vec3::repeat(f64::INFINITY);
        let mut hi = Vec3::repeat(f64::NEG_INFINITY);
        for p in points {
            let local = axes.transpose() * p.coords;
            lo = lo.inf(&local);
            hi = hi.sup(&local);
        }
        let mid = (lo + hi) * 0.5;
        Self {
            center: Point3::from(axes * mid),
            axes,
            half_extents: (hi - lo) * 0.5 + Vec3::repeat(FIT_PADDING),
        }
    }

    /// This box moved by a rigid pose.
    pub fn transformed(&self, pose: &Pose) -> Self {
        let rot = pose.rotation.to_rotation_matrix();
        Self {
            center: pose * self.center,
            axes: rot.matrix() * self.axes,
            half_extents: self.half_extents,
        }
    }

    /// Axis `i` as a vector.
    pub fn axis(&self, i: usize) -> Vec3 {
        self.axes.column(i).into_owned()
    }

    /// The eight corners.
    pub fn corners(&self) -> [Point3; 8] {
        let mut out = [Point3::origin(); 8];
        for (k, corner) in out.iter_mut().enumerate() {
            let sx = if k & 1 == 0 { -1.0 } else { 1.0 };
            let sy = if k & 2 == 0 { -1.0 } else { 1.0 };
            let sz = if k & 4 == 0 { -1.0 } else { 1.0 };
            *corner = self.center
                + self.axis(0) * (sx * self.half_extents.x)
                + self.axis(1) * (sy * self.half_extents.y)
                + self.axis(2) * (sz * self.half_extents.z);
        }
        out
    }

    /// World-aligned bounds of this box.
    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(&self.corners())
    }

    /// Separating-axis test against another OBB (15 candidate axes).
    ///
    /// Touching boxes count as overlapping.
    pub fn intersects(&self, other: &Obb) -> bool {
        // Guards the cross-product axes when edges are near parallel.
        const EPS: f64 = 1e-9;
        let a = &self.half_extents;
        let b = &other.half_extents;

        // Rotation expressing `other` in `self`'s frame.
        let r = self.axes.transpose() * other.axes;
        let t = self.axes.transpose() * (other.center - self.center);
        let abs_r = r.map(|v| v.abs() + EPS);

        for i in 0..3 {
            let ra = a[i];
            let rb = b[0] * abs_r[(i, 0)] + b[1] * abs_r[(i, 1)] + b[2] * abs_r[(i, 2)];
            if t[i].abs() > ra + rb {
                return false;
            }
        }

        for j in 0..3 {
            let ra = a[0] * abs_r[(0, j)] + a[1] * abs_r[(1, j)] + a[2] * abs_r[(2, j)];
            let rb = b[j];
            let tj = t[0] * r[(0, j)] + t[1] * r[(1, j)] + t[2] * r[(2, j)];
            if tj.abs() > ra + rb {
                return false;
            }
        }

        for i in 0..3 {
            let i1 = (i + 1) % 3;
            let i2 = (i + 2) % 3;
            for j in 0..3 {
                let j1 = (j + 1) % 3;
                let j2 = (j + 2) % 3;
                let ra = a[i1] * abs_r[(i2, j)] + a[i2] * abs_r[(i1, j)];
                let rb = b[j1] * abs_r[(i, j2)] + b[j2] * abs_r[(i, j1)];
                let tl = t[i2] * r[(i1, j)] - t[i1] * r[(i2, j)];
                if tl.abs() > ra + rb {
                    return false;
                }
            }
        }

        true
    }

    /// Whether `p` lies inside or on the box (with a small tolerance).
    pub fn contains_point(&self, p: &Point3) -> bool {
        let local = self.axes.transpose() * (p - self.center);
        (0..3).all(|i| local[i].abs() <= self.half_extents[i] + 1e-9)
    }
}

/// Eigenvectors of a covariance matrix as a right-handed orthonormal frame,
/// largest variance first. `None` if the decomposition is unusable.
fn principal_axes(cov: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    if cov.iter().any(|v| !v.is_finite()) || cov.trace() < 1e-18 {
        return None;
    }
    let eig = SymmetricEigen::new(*cov);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&i, &j| eig.eigenvalues[j].total_cmp(&eig.eigenvalues[i]));

    let e0 = eig.eigenvectors.column(order[0]).into_owned();
    let e1 = eig.eigenvectors.column(order[1]).into_owned();
    let e0 = e0.try_normalize(1e-12)?;
    let e2 = e0.cross(&e1).try_normalize(1e-12)?;
    let e1 = e2.cross(&e0);
    Some(Matrix3::from_columns(&[e0, e1, e2]))
}

impl BoundingVolume for Obb {
    fn enclose(mesh: &TriMesh, triangles: &[u32]) -> Self {
        let points: Vec<Point3> = triangles
            .iter()
            .flat_map(|&t| mesh.triangle(t).v.map(|v| *v))
            .collect();
        Obb::fit(&points)
    }

    fn split_direction(&self) -> Vec3 {
        let h = &self.half_extents;
        let i = if h.x >= h.y && h.x >= h.z {
            0
        } else if h.y >= h.z {
            1
        } else {
            2
        };
        self.axis(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollisionConfig;
    use crate::math::MachinePosition;
    use approx::assert_relative_eq;

    fn unit_obb_at(x: f64, y: f64, z: f64) -> Obb {
        Obb::from_aabb(&Aabb::new(
            Point3::new(x - 0.5, y - 0.5, z - 0.5),
            Point3::new(x + 0.5, y + 0.5, z + 0.5),
        ))
    }

    #[test]
    fn test_fit_contains_all_points() {
        let mesh = TriMesh::cylinder(3.0, 0.0, 40.0, 24).unwrap();
        let obb = Obb::fit(mesh.vertices());
        for v in mesh.vertices() {
            assert!(obb.contains_point(v));
        }
        // Principal axis of a tall cylinder is Z.
        assert_relative_eq!(obb.axis(0).z.abs(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_fit_degenerate_points() {
        let p = Point3::new(1.0, 2.0, 3.0);
        let obb = Obb::fit(&[p, p, p]);
        assert!(obb.half_extents.iter().all(|v| v.is_finite()));
        assert!(obb.contains_point(&p));
    }

    #[test]
    fn test_sat_separated_and_overlapping() {
        let a = unit_obb_at(0.0, 0.0, 0.0);
        assert!(a.intersects(&unit_obb_at(0.9, 0.0, 0.0)));
        assert!(!a.intersects(&unit_obb_at(1.1, 0.0, 0.0)));
    }

    #[test]
    fn test_sat_rotated() {
        let a = unit_obb_at(0.0, 0.0, 0.0);
        // A unit box rotated 45° about Z reaches sqrt(0.5) ≈ 0.707 along X.
        let pose = MachinePosition {
            x: 1.2,
            c: 45.0,
            ..MachinePosition::default()
        }
        .pose();
        let b = unit_obb_at(0.0, 0.0, 0.0).transformed(&pose);
        assert!(a.intersects(&b));

        let pose = MachinePosition {
            x: 1.3,
            c: 45.0,
            ..MachinePosition::default()
        }
        .pose();
        let b = unit_obb_at(0.0, 0.0, 0.0).transformed(&pose);
        assert!(!a.intersects(&b));
    }

    #[test]
    fn test_obb_tree_nodes_contain_triangles() {
        let mesh = TriMesh::cylinder(3.0, 0.0, 40.0, 32).unwrap();
        let tree = ObbTree::build(&mesh, &CollisionConfig::default());
        for (i, node) in tree.nodes().iter().enumerate() {
            for t in tree.triangles_under(i as u32) {
                for v in mesh.triangle(t).v {
                    assert!(node.bounds().contains_point(v));
                }
            }
        }
    }

    #[test]
    fn test_posed_obb_contains_posed_vertices() {
        let mesh = TriMesh::cuboid(Point3::origin(), Point3::new(1.0, 2.0, 3.0)).unwrap();
        let obb = Obb::fit(mesh.vertices());
        let pose = MachinePosition {
            x: 4.0,
            y: -2.0,
            z: 1.0,
            a: 30.0,
            b: -15.0,
            c: 60.0,
        }
        .pose();
        let posed = obb.transformed(&pose);
        for v in mesh.vertices() {
            assert!(posed.contains_point(&(pose * v)));
        }
    }
}
