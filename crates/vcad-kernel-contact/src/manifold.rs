//! Contact manifolds built from collision results.
//!
//! A manifold holds one oriented contact point per colliding
//! component/target pair. It is rebuilt from scratch every step; only the
//! per-id age counter survives from one step to the next.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};
use vcad_kernel_collide::{non_parallel_axis, Collision, CollisionResult, Point3, Vec3};

/// An oriented contact between a tool component (body A) and a target (body B).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactPoint {
    /// Stable id, `"{component}:{target}"`, used for warm-start lookup.
    pub id: String,
    /// Tool component name.
    pub body_a: String,
    /// Target name.
    pub body_b: String,
    /// Contact position.
    pub position: Point3,
    /// Unit normal pointing from body B toward body A.
    pub normal: Vec3,
    /// First unit tangent.
    pub tangent1: Vec3,
    /// Second unit tangent; `(tangent1, tangent2, normal)` is right-handed.
    pub tangent2: Vec3,
    /// Penetration depth (>= 0).
    pub depth: f64,
    /// Velocity of body A relative to body B.
    pub relative_velocity: Vec3,
    /// Consecutive steps this contact id has existed before this one.
    pub lifetime: u32,
}

/// Unit normal and tangent basis for a contact normal.
///
/// The tangents come from crossing with a seed axis that is not near-parallel
/// to the normal. A zero or non-finite normal falls back to `+Z`.
pub fn tangent_basis(normal: &Vec3) -> (Vec3, Vec3, Vec3) {
    let n = if normal.iter().all(|v| v.is_finite()) {
        normal.try_normalize(1e-12).unwrap_or_else(Vec3::z)
    } else {
        Vec3::z()
    };
    let up = non_parallel_axis(&n);
    let t1 = up
        .cross(&n)
        .try_normalize(1e-12)
        .unwrap_or_else(|| n.cross(&Vec3::y()).normalize());
    let t2 = n.cross(&t1);
    (n, t1, t2)
}

/// The contact points of one step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactManifold {
    /// Step counter of the builder that produced this manifold.
    pub step: u64,
    /// Contact points in collision order.
    pub points: Vec<ContactPoint>,
}

impl ContactManifold {
    /// Number of contact points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if there are no contacts.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Contact point by id.
    pub fn get(&self, id: &str) -> Option<&ContactPoint> {
        self.points.iter().find(|p| p.id == id)
    }
}

/// Builds manifolds and tracks contact ages across steps.
#[derive(Debug, Clone, Default)]
pub struct ManifoldBuilder {
    step: u64,
    lifetimes: HashMap<String, u32>,
}

impl ManifoldBuilder {
    /// A builder with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of manifolds built since creation or the last reset.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Forget all contact history.
    pub fn reset(&mut self) {
        self.step = 0;
        self.lifetimes.clear();
    }

    /// Manifold for a collision result with both bodies at rest.
    pub fn build(&mut self, result: &CollisionResult) -> ContactManifold {
        self.build_with_velocity(result, Vec3::zeros())
    }

    /// Manifold for a collision result where the tool moves with
    /// `relative_velocity` relative to the targets.
    pub fn build_with_velocity(
        &mut self,
        result: &CollisionResult,
        relative_velocity: Vec3,
    ) -> ContactManifold {
        let mut lifetimes = HashMap::with_capacity(result.collisions.len());
        let mut points = Vec::with_capacity(result.collisions.len());

        for collision in &result.collisions {
            let Some(mut point) = contact_from_collision(collision, relative_velocity) else {
                continue;
            };
            point.lifetime = self.lifetimes.get(&point.id).map_or(0, |age| age + 1);
            lifetimes.insert(point.id.clone(), point.lifetime);
            points.push(point);
        }

        self.lifetimes = lifetimes;
        self.step += 1;
        debug!("manifold step {}: {} contacts", self.step, points.len());
        ContactManifold {
            step: self.step,
            points,
        }
    }
}

/// Contact point at the deepest sample of a collision.
fn contact_from_collision(collision: &Collision, relative_velocity: Vec3) -> Option<ContactPoint> {
    let sample = collision.deepest()?;
    let (normal, tangent1, tangent2) = tangent_basis(&sample.normal);
    let body_a = collision.component.to_string();
    let body_b = collision.target.to_string();
    Some(ContactPoint {
        id: format!("{body_a}:{body_b}"),
        body_a,
        body_b,
        position: sample.position,
        normal,
        tangent1,
        tangent2,
        depth: collision.depth.max(0.0),
        relative_velocity,
        lifetime: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use vcad_kernel_collide::{ContactSample, Target, ToolComponent};

    fn result_with(component: ToolComponent, target: Target, normal: Vec3) -> CollisionResult {
        CollisionResult {
            has_collision: true,
            collisions: vec![Collision {
                component,
                target,
                contacts: vec![
                    ContactSample {
                        position: Point3::new(0.0, 0.0, 1.0),
                        normal,
                        depth: 0.2,
                    },
                    ContactSample {
                        position: Point3::new(0.5, 0.5, 1.0),
                        normal,
                        depth: 0.5,
                    },
                ],
                depth: 0.5,
                critical: true,
            }],
            safety_margin: 0.0,
            checked_components: vec![component],
        }
    }

    #[test]
    fn test_tangent_basis_is_orthonormal_right_handed() {
        for n in [
            Vec3::z(),
            Vec3::x(),
            -Vec3::y(),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(0.95, 0.1, -0.2),
        ] {
            let (n, t1, t2) = tangent_basis(&n);
            assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(t1.norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(t2.norm(), 1.0, epsilon = 1e-12);
            assert!(n.dot(&t1).abs() < 1e-12);
            assert!(n.dot(&t2).abs() < 1e-12);
            assert!(t1.dot(&t2).abs() < 1e-12);
            assert_relative_eq!(t1.cross(&t2), n, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_tangent_basis_degenerate_normal() {
        let (n, t1, t2) = tangent_basis(&Vec3::zeros());
        assert_eq!(n, Vec3::z());
        assert!(t1.iter().chain(t2.iter()).all(|v| v.is_finite()));

        let (n, _, _) = tangent_basis(&Vec3::new(f64::NAN, 0.0, 1.0));
        assert_eq!(n, Vec3::z());
    }

    #[test]
    fn test_contact_uses_deepest_sample() {
        let mut builder = ManifoldBuilder::new();
        let m = builder.build(&result_with(ToolComponent::Cutter, Target::Workpiece, Vec3::z()));
        assert_eq!(m.len(), 1);
        let p = &m.points[0];
        assert_eq!(p.id, "cutter:workpiece");
        assert_eq!(p.body_a, "cutter");
        assert_eq!(p.body_b, "workpiece");
        assert_eq!(p.position, Point3::new(0.5, 0.5, 1.0));
        assert_relative_eq!(p.depth, 0.5);
        assert_eq!(p.lifetime, 0);
    }

    #[test]
    fn test_lifetime_tracks_persistence() {
        let mut builder = ManifoldBuilder::new();
        let hit = result_with(ToolComponent::Holder, Target::Fixture(2), Vec3::x());
        let empty = CollisionResult {
            has_collision: false,
            collisions: vec![],
            safety_margin: 1.0,
            checked_components: vec![],
        };

        assert_eq!(builder.build(&hit).points[0].lifetime, 0);
        assert_eq!(builder.build(&hit).points[0].lifetime, 1);
        let m = builder.build(&hit);
        assert_eq!(m.get("holder:fixture2").unwrap().lifetime, 2);
        assert_eq!(m.step, 3);

        // A gap resets the age; the manifold is replaced, not merged.
        assert!(builder.build(&empty).is_empty());
        assert_eq!(builder.build(&hit).points[0].lifetime, 0);

        builder.reset();
        assert_eq!(builder.step(), 0);
    }
}
