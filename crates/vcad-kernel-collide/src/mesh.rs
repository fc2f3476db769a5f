//! Indexed triangle meshes.
//!
//! A [`TriMesh`] is immutable once built. Posing it for a query produces a
//! new mesh with a new [`MeshId`]; the source is never touched.

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::aabb::Aabb;
use crate::error::CollideError;
use crate::geometry::{is_degenerate, triangle_area, triangle_normal};
use crate::math::{Point3, Pose, Vec3};

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a mesh's vertex/index data.
///
/// Used as the key of the BVH cache. Two meshes only share an id if one is a
/// clone of the other, in which case their data is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MeshId(u64);

impl MeshId {
    fn next() -> Self {
        Self(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Read-only view of one triangle of a mesh.
#[derive(Debug, Clone, Copy)]
pub struct Triangle<'a> {
    /// Triangle index within the mesh.
    pub index: u32,
    /// The three vertices, counter-clockwise seen from outside.
    pub v: [&'a Point3; 3],
}

impl Triangle<'_> {
    /// Unit normal (`+Z` if degenerate).
    pub fn normal(&self) -> Vec3 {
        triangle_normal(self.v[0], self.v[1], self.v[2])
    }

    /// Area.
    pub fn area(&self) -> f64 {
        triangle_area(self.v[0], self.v[1], self.v[2])
    }

    /// Whether the triangle has (near) zero area.
    pub fn is_degenerate(&self) -> bool {
        is_degenerate(self.v[0], self.v[1], self.v[2])
    }

    /// Tight bounds.
    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(self.v)
    }

    /// Centroid.
    pub fn centroid(&self) -> Point3 {
        crate::geometry::centroid(self.v[0], self.v[1], self.v[2])
    }
}

/// An indexed triangle mesh.
#[derive(Debug, Clone)]
pub struct TriMesh {
    id: MeshId,
    vertices: Vec<Point3>,
    indices: Vec<[u32; 3]>,
}

impl TriMesh {
    /// Build a mesh from vertex positions and a flat index buffer.
    ///
    /// Fails fast if the index buffer is not made of triples, references a
    /// missing vertex, or if any coordinate is non-finite.
    pub fn new(vertices: Vec<Point3>, indices: &[u32]) -> Result<Self, CollideError> {
        if indices.len() % 3 != 0 {
            return Err(CollideError::IndicesNotTriangles(indices.len()));
        }
        if let Some(i) = vertices.iter().position(|v| !v.coords.iter().all(|c| c.is_finite())) {
            return Err(CollideError::NonFiniteVertex(i));
        }
        let n = vertices.len();
        let mut tris = Vec::with_capacity(indices.len() / 3);
        for (t, chunk) in indices.chunks_exact(3).enumerate() {
            for &index in chunk {
                if index as usize >= n {
                    return Err(CollideError::IndexOutOfRange {
                        triangle: t,
                        index,
                        vertex_count: n,
                    });
                }
            }
            tris.push([chunk[0], chunk[1], chunk[2]]);
        }
        Ok(Self {
            id: MeshId::next(),
            vertices,
            indices: tris,
        })
    }

    /// Build from flat interleaved `x, y, z` coordinates.
    pub fn from_flat(coords: &[f64], indices: &[u32]) -> Result<Self, CollideError> {
        if coords.len() % 3 != 0 {
            return Err(CollideError::InvalidPrimitive(format!(
                "coordinate count {} is not a multiple of 3",
                coords.len()
            )));
        }
        let vertices = coords
            .chunks_exact(3)
            .map(|c| Point3::new(c[0], c[1], c[2]))
            .collect();
        Self::new(vertices, indices)
    }

    /// Axis-aligned box mesh with outward-facing triangles.
    pub fn cuboid(min: Point3, max: Point3) -> Result<Self, CollideError> {
        let b = Aabb::new(min, max);
        let e = b.extents();
        if e.x <= 0.0 || e.y <= 0.0 || e.z <= 0.0 {
            return Err(CollideError::InvalidPrimitive(format!(
                "cuboid has zero extent: {e:?}"
            )));
        }
        let (lo, hi) = (b.min, b.max);
        let vertices = vec![
            Point3::new(lo.x, lo.y, lo.z),
            Point3::new(hi.x, lo.y, lo.z),
            Point3::new(hi.x, hi.y, lo.z),
            Point3::new(lo.x, hi.y, lo.z),
            Point3::new(lo.x, lo.y, hi.z),
            Point3::new(hi.x, lo.y, hi.z),
            Point3::new(hi.x, hi.y, hi.z),
            Point3::new(lo.x, hi.y, hi.z),
        ];
        #[rustfmt::skip]
        let indices = [
            0, 2, 1, 0, 3, 2, // bottom
            4, 5, 6, 4, 6, 7, // top
            0, 1, 5, 0, 5, 4, // front (-Y)
            2, 3, 7, 2, 7, 6, // back (+Y)
            1, 2, 6, 1, 6, 5, // right (+X)
            3, 0, 4, 3, 4, 7, // left (-X)
        ];
        Self::new(vertices, &indices)
    }

    /// Closed cylinder along +Z from `z0` to `z1`, centered on the Z axis.
    pub fn cylinder(radius: f64, z0: f64, z1: f64, segments: u32) -> Result<Self, CollideError> {
        if radius <= 0.0 || z1 <= z0 || segments < 3 {
            return Err(CollideError::InvalidPrimitive(format!(
                "cylinder r={radius} z=[{z0}, {z1}] segments={segments}"
            )));
        }
        let mut vertices = Vec::with_capacity(2 * segments as usize + 2);
        for z in [z0, z1] {
            for i in 0..segments {
                let a = TAU * f64::from(i) / f64::from(segments);
                vertices.push(Point3::new(radius * a.cos(), radius * a.sin(), z));
            }
        }
        let bottom_center = 2 * segments;
        let top_center = bottom_center + 1;
        vertices.push(Point3::new(0.0, 0.0, z0));
        vertices.push(Point3::new(0.0, 0.0, z1));

        let mut indices = Vec::with_capacity(12 * segments as usize);
        for i in 0..segments {
            let j = (i + 1) % segments;
            let (b0, b1) = (i, j);
            let (t0, t1) = (i + segments, j + segments);
            indices.extend_from_slice(&[b0, b1, t1, b0, t1, t0]);
            indices.extend_from_slice(&[bottom_center, b1, b0]);
            indices.extend_from_slice(&[top_center, t0, t1]);
        }
        Self::new(vertices, &indices)
    }

    /// Identity of this mesh's data.
    pub fn id(&self) -> MeshId {
        self.id
    }

    /// Vertex positions.
    pub fn vertices(&self) -> &[Point3] {
        &self.vertices
    }

    /// Triangle index triples.
    pub fn indices(&self) -> &[[u32; 3]] {
        &self.indices
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    /// True if the mesh has no triangles.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// View of triangle `t`.
    ///
    /// # Panics
    ///
    /// Panics if `t` is out of range.
    pub fn triangle(&self, t: u32) -> Triangle<'_> {
        let [a, b, c] = self.indices[t as usize];
        Triangle {
            index: t,
            v: [
                &self.vertices[a as usize],
                &self.vertices[b as usize],
                &self.vertices[c as usize],
            ],
        }
    }

    /// Iterate over all triangles.
    pub fn triangles(&self) -> impl Iterator<Item = Triangle<'_>> + '_ {
        (0..self.indices.len() as u32).map(move |t| self.triangle(t))
    }

    /// Bounds of all vertices.
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(&self.vertices)
    }

    /// A posed copy with a fresh id. The source mesh is unchanged.
    pub fn transformed(&self, pose: &Pose) -> TriMesh {
        TriMesh {
            id: MeshId::next(),
            vertices: self.vertices.iter().map(|v| pose * v).collect(),
            indices: self.indices.clone(),
        }
    }
}

impl PartialEq for TriMesh {
    fn eq(&self, other: &Self) -> bool {
        self.vertices == other.vertices && self.indices == other.indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rejects_out_of_range_index() {
        let verts = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        let err = TriMesh::new(verts, &[0, 1, 2]).unwrap_err();
        assert_eq!(
            err,
            CollideError::IndexOutOfRange {
                triangle: 0,
                index: 2,
                vertex_count: 2
            }
        );
    }

    #[test]
    fn test_rejects_partial_triangle() {
        let verts = vec![Point3::origin(); 3];
        assert_eq!(
            TriMesh::new(verts, &[0, 1]).unwrap_err(),
            CollideError::IndicesNotTriangles(2)
        );
    }

    #[test]
    fn test_rejects_nan_vertex() {
        let verts = vec![Point3::origin(), Point3::new(f64::NAN, 0.0, 0.0)];
        assert_eq!(
            TriMesh::new(verts, &[]).unwrap_err(),
            CollideError::NonFiniteVertex(1)
        );
    }

    #[test]
    fn test_cuboid_normals_point_outward() {
        let mesh = TriMesh::cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        assert_eq!(mesh.triangle_count(), 12);
        let center = Point3::new(0.5, 0.5, 0.5);
        for tri in mesh.triangles() {
            assert!((tri.centroid() - center).dot(&tri.normal()) > 0.0);
        }
    }

    #[test]
    fn test_cylinder_normals_point_outward() {
        let mesh = TriMesh::cylinder(2.0, 0.0, 10.0, 16).unwrap();
        let center = Point3::new(0.0, 0.0, 5.0);
        for tri in mesh.triangles() {
            assert!((tri.centroid() - center).dot(&tri.normal()) > 0.0);
        }
        let b = mesh.bounds();
        assert_relative_eq!(b.max.z, 10.0);
        assert_relative_eq!(b.max.x, 2.0);
    }

    #[test]
    fn test_transformed_is_a_copy() {
        let mesh = TriMesh::cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let moved = mesh.transformed(&Pose::translation(5.0, 0.0, 0.0));
        assert_ne!(mesh.id(), moved.id());
        assert_relative_eq!(mesh.bounds().min.x, 0.0);
        assert_relative_eq!(moved.bounds().min.x, 5.0);
    }

    #[test]
    fn test_clone_keeps_identity() {
        let mesh = TriMesh::cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        assert_eq!(mesh.clone().id(), mesh.id());
    }
}
