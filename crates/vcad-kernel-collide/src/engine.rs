//! Tool assembly collision engine.
//!
//! For every component of a tool assembly the engine poses the component at
//! the machine position, runs the broad phase (posed OBB-tree against the
//! target's AABB-BVH) and the narrow phase against the workpiece and each
//! fixture, and measures how close the component comes to the workpiece.

use std::collections::BTreeSet;
use std::fmt;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::broad::obb_tree_pairs;
use crate::bvh::Bvh;
use crate::cache::BvhCache;
use crate::config::CollisionConfig;
use crate::gouge::{self, GougeReport, SurfaceEvaluator, ToolpathPoint};
use crate::math::{MachinePosition, Point3, Pose, Vec3};
use crate::mesh::{MeshId, TriMesh};
use crate::narrow::triangle_contact;
use crate::obb::ObbTree;
use crate::tool::{ToolAssembly, ToolComponent, ToolGeometry};

/// What a tool component hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// The workpiece.
    Workpiece,
    /// Fixture by index in the fixture list.
    Fixture(usize),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Workpiece => f.write_str("workpiece"),
            Target::Fixture(i) => write!(f, "fixture{i}"),
        }
    }
}

/// One narrow-phase hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactSample {
    /// Approximate contact position.
    pub position: Point3,
    /// Unit normal pointing out of the target.
    pub normal: Vec3,
    /// Penetration depth (>= tolerance).
    pub depth: f64,
}

/// Collision of one component with one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collision {
    /// Colliding component.
    pub component: ToolComponent,
    /// What it hit.
    pub target: Target,
    /// Individual hits.
    pub contacts: Vec<ContactSample>,
    /// Deepest hit.
    pub depth: f64,
    /// Whether this collision must stop the machine.
    pub critical: bool,
}

impl Collision {
    /// The deepest contact sample.
    pub fn deepest(&self) -> Option<&ContactSample> {
        self.contacts
            .iter()
            .max_by(|a, b| a.depth.total_cmp(&b.depth))
    }
}

/// Result of checking a tool assembly at one machine position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionResult {
    /// Whether any collision was found.
    pub has_collision: bool,
    /// Collisions, ordered by component then target.
    pub collisions: Vec<Collision>,
    /// Smallest vertex-to-workpiece distance over all components (infinite
    /// when the assembly has no meshes).
    pub safety_margin: f64,
    /// Components that had a mesh and were checked.
    pub checked_components: Vec<ToolComponent>,
}

impl CollisionResult {
    /// Whether any collision is critical.
    pub fn has_critical(&self) -> bool {
        self.collisions.iter().any(|c| c.critical)
    }
}

/// Collision and gouge checking with cached acceleration structures.
///
/// Holds the BVH cache, so keep one engine alive across queries.
pub struct CollisionEngine {
    config: CollisionConfig,
    cache: BvhCache,
    surface: Option<Box<dyn SurfaceEvaluator + Send + Sync>>,
}

impl fmt::Debug for CollisionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollisionEngine")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("surface", &self.surface.is_some())
            .finish()
    }
}

impl Default for CollisionEngine {
    fn default() -> Self {
        Self::new(CollisionConfig::default())
    }
}

impl CollisionEngine {
    /// Create an engine with the given settings.
    pub fn new(config: CollisionConfig) -> Self {
        let cache = BvhCache::new(&config);
        Self {
            config,
            cache,
            surface: None,
        }
    }

    /// Attach the surface used for gouge checks.
    pub fn with_surface(mut self, surface: Box<dyn SurfaceEvaluator + Send + Sync>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Current settings.
    pub fn config(&self) -> &CollisionConfig {
        &self.config
    }

    /// The BVH cache.
    pub fn cache(&self) -> &BvhCache {
        &self.cache
    }

    /// Drop all cached trees.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Check every component of `assembly` at `position` against the
    /// workpiece and fixtures.
    ///
    /// Components without a mesh are skipped. A component wholly inside a
    /// target counts as a hit at its deepest vertex. Cached trees for meshes
    /// not used by this call are evicted.
    pub fn check_tool_assembly(
        &mut self,
        assembly: &ToolAssembly,
        workpiece: &TriMesh,
        fixtures: &[TriMesh],
        position: &MachinePosition,
    ) -> CollisionResult {
        let pose = position.pose();
        let workpiece_bvh = self.cache.get_or_build(workpiece);
        let mut targets: Vec<&TriMesh> = vec![workpiece];
        targets.extend(fixtures.iter());
        self.cache.prebuild_parallel(&targets);

        let mut collisions = Vec::new();
        let mut checked_components = Vec::new();
        let mut safety_margin = f64::INFINITY;

        for (component, mesh) in assembly.components() {
            checked_components.push(component);
            let tree = self.cache.get_or_build_obb(mesh);
            let posed = mesh.transformed(&pose);

            let target_list = std::iter::once((Target::Workpiece, workpiece))
                .chain(fixtures.iter().enumerate().map(|(i, f)| (Target::Fixture(i), f)));
            for (target, target_mesh) in target_list {
                let bvh = self.cache.get_or_build(target_mesh);
                let mut contacts = self.narrow_phase(&tree, &pose, &posed, target_mesh, &bvh);
                if contacts.is_empty() {
                    // No surface crossing, but the component may sit wholly inside.
                    contacts.extend(self.enclosed_contact(&posed, target_mesh, &bvh));
                }
                if contacts.is_empty() {
                    continue;
                }
                let depth = contacts.iter().map(|c| c.depth).fold(0.0, f64::max);
                let critical =
                    component != ToolComponent::Cutter || depth > self.config.critical_depth;
                trace!(
                    "{component} hits {target}: {} contacts, depth {depth:.4}",
                    contacts.len()
                );
                collisions.push(Collision {
                    component,
                    target,
                    contacts,
                    depth,
                    critical,
                });
            }

            let margin = component_margin(&posed, workpiece, &workpiece_bvh);
            safety_margin = safety_margin.min(margin);
        }

        let in_use: BTreeSet<MeshId> = targets
            .iter()
            .map(|m| m.id())
            .chain(assembly.components().map(|(_, m)| m.id()))
            .collect();
        self.cache.retain(&in_use);

        debug!(
            "checked {} components at ({:.3}, {:.3}, {:.3}): {} collisions, margin {:.4}",
            checked_components.len(),
            position.x,
            position.y,
            position.z,
            collisions.len(),
            safety_margin
        );

        CollisionResult {
            has_collision: !collisions.is_empty(),
            collisions,
            safety_margin,
            checked_components,
        }
    }

    fn narrow_phase(
        &self,
        tree: &ObbTree,
        pose: &Pose,
        posed: &TriMesh,
        target: &TriMesh,
        bvh: &Bvh,
    ) -> Vec<ContactSample> {
        let mut out = Vec::new();
        let mut degenerate = 0usize;
        for (tool_tri, target_tri) in obb_tree_pairs(tree, pose, bvh) {
            let a = target.triangle(target_tri);
            let b = posed.triangle(tool_tri);
            if a.is_degenerate() || b.is_degenerate() {
                degenerate += 1;
                continue;
            }
            let Some(hit) = triangle_contact(&a, &b) else {
                continue;
            };
            if hit.depth < self.config.tolerance {
                continue;
            }
            out.push(ContactSample {
                position: hit.point,
                normal: hit.normal,
                depth: hit.depth,
            });
        }
        if degenerate > 0 {
            warn!("skipped {degenerate} candidate pairs with degenerate triangles");
        }
        out
    }

    /// Gouge check against the attached surface; skipped if none is attached.
    pub fn check_gouge(
        &self,
        toolpath: &[ToolpathPoint],
        tool: &ToolGeometry,
        tolerance: f64,
    ) -> GougeReport {
        gouge::check_gouge(
            toolpath,
            self.surface_ref(),
            tool,
            tolerance,
            &self.config,
        )
    }

    /// Toolpath with gouging points lifted to their safe Z.
    pub fn correct_gouges(
        &self,
        toolpath: &[ToolpathPoint],
        tool: &ToolGeometry,
        tolerance: f64,
    ) -> Vec<ToolpathPoint> {
        let report = self.check_gouge(toolpath, tool, tolerance);
        gouge::correct_gouges(toolpath, &report)
    }

    /// Contact at the deepest component vertex inside a closed target.
    fn enclosed_contact(
        &self,
        posed: &TriMesh,
        target: &TriMesh,
        bvh: &Bvh,
    ) -> Option<ContactSample> {
        let (vertex, hit) = posed
            .vertices()
            .iter()
            .filter(|v| bvh.contains_point(target, v))
            .filter_map(|v| bvh.nearest(target, v).map(|hit| (*v, hit)))
            .max_by(|a, b| a.1.distance.total_cmp(&b.1.distance))?;
        if hit.distance < self.config.tolerance {
            return None;
        }
        Some(ContactSample {
            position: vertex,
            normal: target.triangle(hit.triangle).normal(),
            depth: hit.distance,
        })
    }

    fn surface_ref(&self) -> Option<&dyn SurfaceEvaluator> {
        self.surface
            .as_deref()
            .map(|s| s as &dyn SurfaceEvaluator)
    }
}

/// Smallest distance from any of the posed component's vertices to the workpiece.
fn component_margin(posed: &TriMesh, workpiece: &TriMesh, bvh: &Bvh) -> f64 {
    posed
        .vertices()
        .iter()
        .map(|v| bvh.distance(workpiece, v))
        .fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gouge::MeshSurface;
    use crate::tool::ToolDimensions;
    use approx::assert_relative_eq;

    fn boxed(min: [f64; 3], max: [f64; 3]) -> TriMesh {
        TriMesh::cuboid(
            Point3::new(min[0], min[1], min[2]),
            Point3::new(max[0], max[1], max[2]),
        )
        .unwrap()
    }

    fn box_tool(min: [f64; 3], max: [f64; 3]) -> ToolAssembly {
        ToolAssembly::new(ToolGeometry::flat(1.0)).with_component(ToolComponent::Cutter, boxed(min, max))
    }

    #[test]
    fn test_separated_boxes_report_margin() {
        let mut engine = CollisionEngine::default();
        let tool = box_tool([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let workpiece = boxed([2.0, 0.0, 0.0], [3.0, 1.0, 1.0]);

        let result = engine.check_tool_assembly(&tool, &workpiece, &[], &MachinePosition::default());
        assert!(!result.has_collision);
        assert!(result.collisions.is_empty());
        assert_relative_eq!(result.safety_margin, 1.0, epsilon = 1e-12);
        assert_eq!(result.checked_components, vec![ToolComponent::Cutter]);
    }

    #[test]
    fn test_overlapping_boxes_collide() {
        let mut engine = CollisionEngine::default();
        let tool = box_tool([0.25, 0.25, 0.5], [0.75, 0.75, 1.5]);
        let workpiece = boxed([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);

        let result = engine.check_tool_assembly(&tool, &workpiece, &[], &MachinePosition::default());
        assert!(result.has_collision);
        assert_eq!(result.collisions.len(), 1);
        let c = &result.collisions[0];
        assert_eq!(c.component, ToolComponent::Cutter);
        assert_eq!(c.target, Target::Workpiece);
        assert_relative_eq!(c.depth, 0.5, epsilon = 1e-9);
        assert!(c.critical);
        for s in &c.contacts {
            assert!(s.depth >= engine.config().tolerance);
            assert_relative_eq!(s.normal, Vec3::z(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_component_inside_workpiece_collides() {
        let mut engine = CollisionEngine::default();
        let tool = box_tool([0.4, 0.4, 0.4], [0.6, 0.6, 0.6]);
        let workpiece = boxed([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);

        let result = engine.check_tool_assembly(&tool, &workpiece, &[], &MachinePosition::default());
        assert!(result.has_collision);
        assert!(result.has_critical());
        let c = &result.collisions[0];
        assert_eq!(c.target, Target::Workpiece);
        assert_relative_eq!(c.depth, 0.4, epsilon = 1e-9);
        assert_relative_eq!(c.contacts[0].normal.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_machine_position_moves_tool() {
        let mut engine = CollisionEngine::default();
        let tool = box_tool([0.25, 0.25, 0.5], [0.75, 0.75, 1.5]);
        let workpiece = boxed([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);

        let result =
            engine.check_tool_assembly(&tool, &workpiece, &[], &MachinePosition::linear(0.0, 0.0, 2.0));
        assert!(!result.has_collision);
        assert_relative_eq!(result.safety_margin, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_fixture_hits_are_reported_separately() {
        let mut engine = CollisionEngine::default();
        let tool = box_tool([0.25, 0.25, 0.5], [0.75, 0.75, 1.5]);
        let workpiece = boxed([10.0, 0.0, 0.0], [11.0, 1.0, 1.0]);
        let fixtures = vec![
            boxed([-5.0, -5.0, -5.0], [-4.0, -4.0, -4.0]),
            boxed([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]),
        ];

        let result =
            engine.check_tool_assembly(&tool, &workpiece, &fixtures, &MachinePosition::default());
        assert!(result.has_collision);
        assert_eq!(result.collisions.len(), 1);
        assert_eq!(result.collisions[0].target, Target::Fixture(1));
        assert!(result.safety_margin > 9.0);
    }

    #[test]
    fn test_shallow_cutter_hit_is_not_critical() {
        let config = CollisionConfig {
            critical_depth: 1.0,
            ..CollisionConfig::default()
        };
        let mut engine = CollisionEngine::new(config);
        let tool = box_tool([0.25, 0.25, 0.5], [0.75, 0.75, 1.5]);
        let workpiece = boxed([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let result = engine.check_tool_assembly(&tool, &workpiece, &[], &MachinePosition::default());
        assert!(result.has_collision);
        assert!(!result.has_critical());
    }

    #[test]
    fn test_holder_collision_is_critical() {
        let mut engine = CollisionEngine::default();
        let tool = ToolAssembly::from_dimensions(&ToolDimensions {
            collet_diameter: 0.0,
            spindle_diameter: 0.0,
            ..ToolDimensions::default()
        })
        .unwrap();
        // The holder (r = 20, from z = 25) reaches into a block starting at
        // x = 5; the cutter (r = 3) stays clear of it.
        let workpiece = boxed([5.0, -30.0, -50.0], [60.0, 30.0, 30.0]);
        let result = engine.check_tool_assembly(&tool, &workpiece, &[], &MachinePosition::default());
        assert!(result.has_collision);
        let holder = result
            .collisions
            .iter()
            .find(|c| c.component == ToolComponent::Holder)
            .unwrap();
        assert!(holder.critical);
        assert!(result
            .collisions
            .iter()
            .all(|c| c.component != ToolComponent::Cutter));
    }

    #[test]
    fn test_missing_components_skipped() {
        let mut engine = CollisionEngine::default();
        let tool = ToolAssembly::new(ToolGeometry::flat(6.0));
        let workpiece = boxed([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let result = engine.check_tool_assembly(&tool, &workpiece, &[], &MachinePosition::default());
        assert!(!result.has_collision);
        assert!(result.checked_components.is_empty());
        assert!(result.safety_margin.is_infinite());
    }

    #[test]
    fn test_repeated_checks_are_deterministic_and_cached() {
        let mut engine = CollisionEngine::default();
        let tool = ToolAssembly::from_dimensions(&ToolDimensions::default()).unwrap();
        let workpiece = boxed([-20.0, -20.0, -20.0], [20.0, 20.0, 2.0]);
        let pos = MachinePosition {
            x: 1.0,
            y: -2.0,
            z: 0.0,
            a: 10.0,
            b: 5.0,
            c: 30.0,
        };
        let first = engine.check_tool_assembly(&tool, &workpiece, &[], &pos);
        let cached = engine.cache().len();
        let second = engine.check_tool_assembly(&tool, &workpiece, &[], &pos);
        assert_eq!(first, second);
        assert_eq!(engine.cache().len(), cached);
        assert!(first.has_collision);
    }

    #[test]
    fn test_cache_follows_current_meshes() {
        let mut engine = CollisionEngine::default();
        let tool = box_tool([0.0, 0.0, 5.0], [1.0, 1.0, 6.0]);
        let fixture = boxed([10.0, 0.0, 0.0], [11.0, 1.0, 1.0]);
        for step in 0..5 {
            let top = 1.0 + step as f64 * 0.1;
            let workpiece = boxed([0.0, 0.0, 0.0], [1.0, 1.0, top]);
            let fixtures = [fixture.clone()];
            engine.check_tool_assembly(&tool, &workpiece, &fixtures, &MachinePosition::default());
            // Workpiece and fixture only; earlier workpieces are gone.
            assert_eq!(engine.cache().len(), 2);
            assert!(engine.cache().get(workpiece.id()).is_some());
        }
    }

    #[test]
    fn test_engine_gouge_uses_attached_surface() {
        let plate = boxed([-50.0, -50.0, -10.0], [50.0, 50.0, 0.0]);
        let surface = MeshSurface::new(plate, &CollisionConfig::default());
        let engine = CollisionEngine::default().with_surface(Box::new(surface));
        let tool = ToolGeometry::flat(6.0);
        let path = vec![ToolpathPoint::feed(1.0, 2.0, -0.5)];

        let report = engine.check_gouge(&path, &tool, 0.01);
        assert!(report.has_gouge);
        let fixed = engine.correct_gouges(&path, &tool, 0.01);
        assert_relative_eq!(fixed[0].z, 0.01, epsilon = 1e-9);

        let bare = CollisionEngine::default();
        assert!(bare.check_gouge(&path, &tool, 0.01).skipped);
    }
}
