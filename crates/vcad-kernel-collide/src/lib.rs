#![warn(missing_docs)]

//! Tool assembly collision detection for vcad CAM.
//!
//! This crate checks a machine tool (cutter, holder, spindle, collet) against
//! a workpiece and its fixtures at a given machine position, and checks
//! toolpaths for gouges against a target surface.
//!
//! # Pipeline
//!
//! - [`TriMesh`] - immutable indexed triangle meshes, validated on construction
//! - [`Bvh`] / [`ObbTree`] - arena-based bounding volume trees, cached per mesh in [`BvhCache`]
//! - [`broad`] - simultaneous tree traversal producing candidate triangle pairs
//! - [`narrow`] - triangle/triangle contact
//! - [`CollisionEngine`] - per-component orchestration and safety margin
//! - [`gouge`] - gouge detection and Z-lift correction
//!
//! # Example
//!
//! ```
//! use vcad_kernel_collide::{
//!     CollisionEngine, MachinePosition, Point3, ToolAssembly, ToolDimensions, TriMesh,
//! };
//!
//! let tool = ToolAssembly::from_dimensions(&ToolDimensions::default()).unwrap();
//! let stock = TriMesh::cuboid(Point3::new(-50.0, -50.0, -20.0), Point3::new(50.0, 50.0, 0.0)).unwrap();
//!
//! let mut engine = CollisionEngine::default();
//! let result = engine.check_tool_assembly(&tool, &stock, &[], &MachinePosition::linear(0.0, 0.0, 5.0));
//! assert!(!result.has_collision);
//! assert!((result.safety_margin - 5.0).abs() < 1e-9);
//! ```

mod aabb;
pub mod broad;
mod bvh;
mod cache;
mod config;
mod engine;
mod error;
pub mod geometry;
pub mod gouge;
mod math;
mod mesh;
pub mod narrow;
mod obb;
mod tool;
mod tree;

pub use aabb::Aabb;
pub use bvh::{Bvh, BvhNode, NearestHit, RayHit};
pub use cache::BvhCache;
pub use config::CollisionConfig;
pub use engine::{Collision, CollisionEngine, CollisionResult, ContactSample, Target};
pub use error::CollideError;
pub use gouge::{
    check_gouge, correct_gouges, safe_z, Gouge, GougeReport, MeshSurface, MoveType,
    SurfaceEvaluator, SurfaceSample, ToolpathPoint,
};
pub use math::{non_parallel_axis, MachinePosition, Point3, Pose, Vec3, DEGENERATE_EPS};
pub use mesh::{MeshId, TriMesh, Triangle};
pub use obb::{Obb, ObbNode, ObbTree};
pub use tool::{ToolAssembly, ToolComponent, ToolDimensions, ToolGeometry};
pub use tree::{BoundingTree, BoundingVolume, TreeNode};
