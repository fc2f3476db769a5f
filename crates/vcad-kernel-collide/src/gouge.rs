//! Gouge detection and correction against a surface.
//!
//! A toolpath point gouges when the tool, placed at that point, cuts below
//! the target surface. Detection compares the tool-center distance along the
//! surface normal with the nominal corner radius. Correction lifts the point
//! to a safe Z found by sweeping the cutter profile over a radial sample grid.

use std::f64::consts::TAU;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::bvh::Bvh;
use crate::config::CollisionConfig;
use crate::math::{Point3, Vec3};
use crate::mesh::TriMesh;
use crate::tool::ToolGeometry;

/// Kind of toolpath move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveType {
    /// Rapid positioning, not cutting.
    Rapid,
    /// Feed move, cutting.
    Feed,
}

/// One toolpath point (tool tip position).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolpathPoint {
    /// X in mm.
    pub x: f64,
    /// Y in mm.
    pub y: f64,
    /// Z in mm.
    pub z: f64,
    /// Move kind.
    #[serde(rename = "type")]
    pub move_type: MoveType,
}

impl ToolpathPoint {
    /// A feed point.
    pub fn feed(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            move_type: MoveType::Feed,
        }
    }

    /// A rapid point.
    pub fn rapid(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            move_type: MoveType::Rapid,
        }
    }

    /// Tip position.
    pub fn position(&self) -> Point3 {
        Point3::new(self.x, self.y, self.z)
    }
}

/// Closest point on a surface with its unit normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSample {
    /// Point on the surface.
    pub point: Point3,
    /// Unit normal at the point, pointing to the side the tool works from.
    pub normal: Vec3,
}

/// Surface queries needed for gouge checking.
pub trait SurfaceEvaluator {
    /// Closest surface point to `p`. `None` if the surface is empty.
    fn closest_point(&self, p: &Point3) -> Option<SurfaceSample>;

    /// Highest surface Z above `(x, y)`. `None` off the surface.
    fn height_at(&self, x: f64, y: f64) -> Option<f64>;
}

/// A triangle mesh used as a gouge-check surface.
///
/// Normals follow the mesh winding.
#[derive(Debug, Clone)]
pub struct MeshSurface {
    mesh: TriMesh,
    bvh: Bvh,
}

impl MeshSurface {
    /// Wrap a mesh, building its BVH.
    pub fn new(mesh: TriMesh, config: &CollisionConfig) -> Self {
        let bvh = Bvh::build(&mesh, config);
        Self { mesh, bvh }
    }

    /// The underlying mesh.
    pub fn mesh(&self) -> &TriMesh {
        &self.mesh
    }
}

impl SurfaceEvaluator for MeshSurface {
    fn closest_point(&self, p: &Point3) -> Option<SurfaceSample> {
        let hit = self.bvh.nearest(&self.mesh, p)?;
        Some(SurfaceSample {
            point: hit.point,
            normal: self.mesh.triangle(hit.triangle).normal(),
        })
    }

    fn height_at(&self, x: f64, y: f64) -> Option<f64> {
        let bounds = self.bvh.root_bounds();
        let top = bounds.max.z + 1.0;
        let span = top - bounds.min.z + 1.0;
        let origin = Point3::new(x, y, top);
        self.bvh
            .ray_cast(&self.mesh, &origin, &-Vec3::z(), span)
            .map(|hit| hit.point.z)
    }
}

/// A gouging toolpath point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gouge {
    /// Index of the point in the toolpath.
    pub index: usize,
    /// Tip position as given.
    pub position: [f64; 3],
    /// Signed deviation from nominal; negative means the tool is too deep.
    pub deviation: f64,
    /// How far the point must rise: `safe_z - z`.
    pub gouge_depth: f64,
    /// Lowest Z at which the tool clears the surface by the tolerance.
    pub safe_z: f64,
}

/// Result of a gouge check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GougeReport {
    /// Whether any point gouges.
    pub has_gouge: bool,
    /// True if the check could not run (no surface available).
    pub skipped: bool,
    /// Gouging points in toolpath order.
    pub gouges: Vec<Gouge>,
    /// Largest gouge depth (0 if none).
    pub max_gouge_depth: f64,
}

impl GougeReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Lowest tip Z at `(x, y)` for which the cutter profile stays at least
/// `tolerance` above the surface over the whole sample grid.
///
/// `None` if no grid sample lands on the surface.
pub fn safe_z(
    surface: &dyn SurfaceEvaluator,
    tool: &ToolGeometry,
    x: f64,
    y: f64,
    tolerance: f64,
    config: &CollisionConfig,
) -> Option<f64> {
    let radius = tool.radius();
    let rings = config.gouge_rings.max(1);
    let spokes = config.gouge_radial_samples.max(3);

    let mut best: Option<f64> = None;
    let mut sample = |dx: f64, dy: f64, r: f64| {
        let (Some(h), Some(surface_z)) = (tool.profile_height(r), surface.height_at(x + dx, y + dy))
        else {
            return;
        };
        let z = surface_z - h;
        best = Some(best.map_or(z, |b: f64| b.max(z)));
    };

    sample(0.0, 0.0, 0.0);
    for ring in 1..=rings {
        let r = radius * ring as f64 / rings as f64;
        for k in 0..spokes {
            let a = TAU * k as f64 / spokes as f64;
            sample(r * a.cos(), r * a.sin(), r);
        }
    }
    best.map(|z| z + tolerance)
}

/// Check every feed point of a toolpath for gouges.
///
/// Without a surface the check is skipped, never failed.
pub fn check_gouge(
    toolpath: &[ToolpathPoint],
    surface: Option<&dyn SurfaceEvaluator>,
    tool: &ToolGeometry,
    tolerance: f64,
    config: &CollisionConfig,
) -> GougeReport {
    let Some(surface) = surface else {
        warn!("gouge check skipped: no surface evaluator");
        return GougeReport::skipped();
    };

    let rc = tool.corner_radius;
    let mut report = GougeReport::default();

    for (index, point) in toolpath.iter().enumerate() {
        if point.move_type == MoveType::Rapid {
            continue;
        }
        let tip = point.position();
        let center = tip + Vec3::z() * rc;
        let Some(sample) = surface.closest_point(&center) else {
            continue;
        };
        let deviation = (center - sample.point).dot(&sample.normal) - rc;
        let safe = safe_z(surface, tool, point.x, point.y, tolerance, config);

        let too_deep = deviation < -tolerance;
        let below_safe = safe.is_some_and(|s| point.z < s - tolerance);
        if !too_deep && !below_safe {
            continue;
        }

        // The grid can sit below the true contact height on slopes, so a
        // normal-deviation gouge always lifts at least by the deviation.
        let lift = point.z - deviation + tolerance;
        let safe_z = match safe {
            Some(s) if too_deep => s.max(lift),
            Some(s) => s,
            None => lift,
        };
        let gouge_depth = safe_z - point.z;
        report.max_gouge_depth = report.max_gouge_depth.max(gouge_depth);
        report.gouges.push(Gouge {
            index,
            position: [point.x, point.y, point.z],
            deviation,
            gouge_depth,
            safe_z,
        });
    }

    report.has_gouge = !report.gouges.is_empty();
    debug!(
        "gouge check: {} points, {} gouges, max depth {:.4}",
        toolpath.len(),
        report.gouges.len(),
        report.max_gouge_depth
    );
    report
}

/// Copy of `toolpath` with every gouging point raised to its safe Z.
///
/// Only Z changes, and only upward.
pub fn correct_gouges(toolpath: &[ToolpathPoint], report: &GougeReport) -> Vec<ToolpathPoint> {
    let mut out = toolpath.to_vec();
    for gouge in &report.gouges {
        if let Some(point) = out.get_mut(gouge.index) {
            point.z = point.z.max(gouge.safe_z);
        }
    }
    out
}
