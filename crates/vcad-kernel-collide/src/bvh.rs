//! Axis-aligned bounding volume hierarchy over mesh triangles.
//!
//! The tree itself is a [`BoundingTree`] of [`Aabb`]s; this module adds the
//! mesh queries used by the collision engine: box overlap, nearest point,
//! ray casting and the parity-based inside test behind signed distance.

use crate::aabb::Aabb;
use crate::geometry::{closest_point_on_triangle, ray_triangle};
use crate::math::{Point3, Vec3};
use crate::mesh::TriMesh;
use crate::tree::{BoundingTree, BoundingVolume, TreeNode};

/// An axis-aligned bounding volume hierarchy.
pub type Bvh = BoundingTree<Aabb>;

/// A node of an axis-aligned BVH.
pub type BvhNode = TreeNode<Aabb>;

impl BoundingVolume for Aabb {
    fn enclose(mesh: &TriMesh, triangles: &[u32]) -> Self {
        if triangles.is_empty() {
            // Keep min <= max even for an empty mesh.
            return Aabb::new(Point3::origin(), Point3::origin());
        }
        let mut bounds = Aabb::empty();
        for &t in triangles {
            for v in mesh.triangle(t).v {
                bounds.include_point(v);
            }
        }
        bounds
    }

    fn split_direction(&self) -> Vec3 {
        let mut dir = Vec3::zeros();
        dir[self.longest_axis()] = 1.0;
        dir
    }
}

/// Closest point on a mesh to a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestHit {
    /// Closest point on the surface.
    pub point: Point3,
    /// Distance from the query point.
    pub distance: f64,
    /// Triangle the point lies on.
    pub triangle: u32,
}

/// A ray hit against a mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Ray parameter.
    pub t: f64,
    /// Hit position.
    pub point: Point3,
    /// Triangle hit.
    pub triangle: u32,
}

impl Bvh {
    /// Triangles whose bounds overlap `query`, in traversal order.
    pub fn query_aabb(&self, mesh: &TriMesh, query: &Aabb) -> Vec<u32> {
        debug_assert_eq!(mesh.id(), self.mesh_id);
        let mut out = Vec::new();
        let mut stack = vec![0u32];
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i as usize];
            if !node.bounds().overlaps(query) {
                continue;
            }
            match node {
                TreeNode::Leaf { triangles, .. } => out.extend(
                    triangles
                        .iter()
                        .copied()
                        .filter(|&t| mesh.triangle(t).aabb().overlaps(query)),
                ),
                TreeNode::Internal { left, right, .. } => {
                    stack.push(*right);
                    stack.push(*left);
                }
            }
        }
        out
    }

    /// Closest point on the mesh to `p`. `None` for an empty mesh.
    pub fn nearest(&self, mesh: &TriMesh, p: &Point3) -> Option<NearestHit> {
        debug_assert_eq!(mesh.id(), self.mesh_id);
        let mut best: Option<NearestHit> = None;
        let mut best_sq = f64::INFINITY;
        let mut stack = vec![0u32];

        while let Some(i) = stack.pop() {
            let node = &self.nodes[i as usize];
            if node.bounds().distance_squared(p) > best_sq {
                continue;
            }
            match node {
                TreeNode::Leaf { triangles, .. } => {
                    for &t in triangles {
                        let tri = mesh.triangle(t);
                        let q = closest_point_on_triangle(p, tri.v[0], tri.v[1], tri.v[2]);
                        let d_sq = (q - p).norm_squared();
                        if d_sq < best_sq {
                            best_sq = d_sq;
                            best = Some(NearestHit {
                                point: q,
                                distance: d_sq.sqrt(),
                                triangle: t,
                            });
                        }
                    }
                }
                TreeNode::Internal { left, right, .. } => {
                    // Visit the nearer child first.
                    let dl = self.nodes[*left as usize].bounds().distance_squared(p);
                    let dr = self.nodes[*right as usize].bounds().distance_squared(p);
                    if dl <= dr {
                        stack.push(*right);
                        stack.push(*left);
                    } else {
                        stack.push(*left);
                        stack.push(*right);
                    }
                }
            }
        }
        best
    }

    /// Unsigned distance from `p` to the mesh (infinite for an empty mesh).
    pub fn distance(&self, mesh: &TriMesh, p: &Point3) -> f64 {
        self.nearest(mesh, p).map_or(f64::INFINITY, |h| h.distance)
    }

    /// Closest ray hit within `[0, t_max]`.
    pub fn ray_cast(&self, mesh: &TriMesh, origin: &Point3, dir: &Vec3, t_max: f64) -> Option<RayHit> {
        debug_assert_eq!(mesh.id(), self.mesh_id);
        let mut best: Option<RayHit> = None;
        let mut best_t = t_max;
        let mut stack = vec![0u32];

        while let Some(i) = stack.pop() {
            let node = &self.nodes[i as usize];
            if node.bounds().ray_entry(origin, dir, best_t).is_none() {
                continue;
            }
            match node {
                TreeNode::Leaf { triangles, .. } => {
                    for &t in triangles {
                        let tri = mesh.triangle(t);
                        if let Some(hit_t) = ray_triangle(origin, dir, tri.v[0], tri.v[1], tri.v[2]) {
                            if hit_t <= best_t {
                                best_t = hit_t;
                                best = Some(RayHit {
                                    t: hit_t,
                                    point: origin + dir * hit_t,
                                    triangle: t,
                                });
                            }
                        }
                    }
                }
                TreeNode::Internal { left, right, .. } => {
                    stack.push(*right);
                    stack.push(*left);
                }
            }
        }
        best
    }

    /// Number of triangles crossed by the ray from `origin` along `dir`.
    pub fn ray_crossings(&self, mesh: &TriMesh, origin: &Point3, dir: &Vec3) -> usize {
        debug_assert_eq!(mesh.id(), self.mesh_id);
        let mut count = 0;
        let mut stack = vec![0u32];
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i as usize];
            if node.bounds().ray_entry(origin, dir, f64::INFINITY).is_none() {
                continue;
            }
            match node {
                TreeNode::Leaf { triangles, .. } => {
                    count += triangles
                        .iter()
                        .filter(|&&t| {
                            let tri = mesh.triangle(t);
                            ray_triangle(origin, dir, tri.v[0], tri.v[1], tri.v[2]).is_some()
                        })
                        .count();
                }
                TreeNode::Internal { left, right, .. } => {
                    stack.push(*right);
                    stack.push(*left);
                }
            }
        }
        count
    }

    /// Inside test for a closed mesh by ray-casting parity.
    ///
    /// Three skewed rays vote so that a ray grazing an edge or vertex
    /// cannot flip the answer on its own.
    pub fn contains_point(&self, mesh: &TriMesh, p: &Point3) -> bool {
        if !self.root_bounds().contains_point(p) {
            return false;
        }
        const DIRS: [[f64; 3]; 3] = [
            [0.577_215_66, 0.267_949_19, 0.771_642_35],
            [-0.381_966_01, 0.809_016_99, 0.447_213_59],
            [0.123_456_79, -0.707_106_78, -0.696_364_24],
        ];
        let inside_votes = DIRS
            .iter()
            .filter(|d| {
                let dir = Vec3::new(d[0], d[1], d[2]);
                self.ray_crossings(mesh, p, &dir) % 2 == 1
            })
            .count();
        inside_votes >= 2
    }

    /// Signed distance to a closed mesh: negative inside, positive outside.
    pub fn signed_distance(&self, mesh: &TriMesh, p: &Point3) -> f64 {
        let d = self.distance(mesh, p);
        if self.contains_point(mesh, p) {
            -d
        } else {
            d
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollisionConfig;
    use approx::assert_relative_eq;

    fn unit_box() -> TriMesh {
        TriMesh::cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap()
    }

    fn grid_mesh(n: usize) -> TriMesh {
        let mut verts = Vec::new();
        let mut idx = Vec::new();
        for j in 0..=n {
            for i in 0..=n {
                let (x, y) = (i as f64, j as f64);
                verts.push(Point3::new(x, y, (x * 0.3).sin() + (y * 0.2).cos()));
            }
        }
        let row = (n + 1) as u32;
        for j in 0..n as u32 {
            for i in 0..n as u32 {
                let a = j * row + i;
                idx.extend_from_slice(&[a, a + 1, a + row + 1, a, a + row + 1, a + row]);
            }
        }
        TriMesh::new(verts, &idx).unwrap()
    }

    #[test]
    fn test_root_contains_every_vertex() {
        let mesh = grid_mesh(20);
        let bvh = Bvh::build(&mesh, &CollisionConfig::default());
        for v in mesh.vertices() {
            assert!(bvh.root_bounds().contains_point(v));
        }
    }

    #[test]
    fn test_every_node_contains_its_triangles() {
        let mesh = grid_mesh(12);
        let bvh = Bvh::build(&mesh, &CollisionConfig::default());
        for (i, node) in bvh.nodes().iter().enumerate() {
            let bounds = node.bounds();
            assert!(bounds.min.x <= bounds.max.x);
            for t in bvh.triangles_under(i as u32) {
                assert!(bounds.contains_aabb(&mesh.triangle(t).aabb()));
            }
        }
    }

    #[test]
    fn test_leaves_respect_leaf_size_and_cover_mesh() {
        let mesh = grid_mesh(10);
        let bvh = Bvh::build(&mesh, &CollisionConfig::default());
        let mut all: Vec<u32> = Vec::new();
        for node in bvh.nodes() {
            if let TreeNode::Leaf { triangles, .. } = node {
                assert!(triangles.len() <= 4);
                all.extend(triangles);
            }
        }
        all.sort_unstable();
        assert_eq!(all, (0..mesh.triangle_count() as u32).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_mesh_gives_empty_leaf() {
        let mesh = TriMesh::new(Vec::new(), &[]).unwrap();
        let bvh = Bvh::build(&mesh, &CollisionConfig::default());
        assert_eq!(bvh.nodes().len(), 1);
        assert!(matches!(bvh.root(), TreeNode::Leaf { triangles, .. } if triangles.is_empty()));
        assert!(bvh.nearest(&mesh, &Point3::origin()).is_none());
    }

    #[test]
    fn test_coincident_centroids_respect_depth_cap() {
        // Many copies of the same triangle: every centroid coincides.
        let verts = vec![
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let idx: Vec<u32> = (0..500).flat_map(|_| [0, 1, 2]).collect();
        let mesh = TriMesh::new(verts, &idx).unwrap();
        let bvh = Bvh::build_with(&mesh, 1, 3);
        assert!(bvh.depth() <= 3);
        assert_eq!(bvh.triangles_under(0).len(), 500);
    }

    #[test]
    fn test_nearest_matches_brute_force() {
        let mesh = grid_mesh(8);
        let bvh = Bvh::build(&mesh, &CollisionConfig::default());
        let p = Point3::new(3.3, 4.1, 5.0);
        let brute = mesh
            .triangles()
            .map(|t| (closest_point_on_triangle(&p, t.v[0], t.v[1], t.v[2]) - p).norm())
            .fold(f64::INFINITY, f64::min);
        assert_relative_eq!(bvh.distance(&mesh, &p), brute, epsilon = 1e-12);
    }

    #[test]
    fn test_ray_cast_box() {
        let mesh = unit_box();
        let bvh = Bvh::build(&mesh, &CollisionConfig::default());
        let hit = bvh
            .ray_cast(&mesh, &Point3::new(0.5, 0.5, 5.0), &-Vec3::z(), f64::INFINITY)
            .unwrap();
        assert_relative_eq!(hit.t, 4.0);
        assert_relative_eq!(hit.point.z, 1.0);
    }

    #[test]
    fn test_signed_distance_sign() {
        let mesh = unit_box();
        let bvh = Bvh::build(&mesh, &CollisionConfig::default());
        assert_relative_eq!(bvh.signed_distance(&mesh, &Point3::new(0.5, 0.5, 0.75)), -0.25);
        assert_relative_eq!(bvh.signed_distance(&mesh, &Point3::new(0.5, 0.5, 3.0)), 2.0);
        assert!(bvh.contains_point(&mesh, &Point3::new(0.1, 0.9, 0.5)));
        assert!(!bvh.contains_point(&mesh, &Point3::new(1.5, 0.5, 0.5)));
    }

    #[test]
    fn test_query_aabb() {
        let mesh = grid_mesh(10);
        let bvh = Bvh::build(&mesh, &CollisionConfig::default());
        let q = Aabb::new(Point3::new(2.1, 2.1, -10.0), Point3::new(2.9, 2.9, 10.0));
        let hits = bvh.query_aabb(&mesh, &q);
        let brute: Vec<u32> = mesh
            .triangles()
            .filter(|t| t.aabb().overlaps(&q))
            .map(|t| t.index)
            .collect();
        let mut sorted = hits.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, brute);
    }
}
