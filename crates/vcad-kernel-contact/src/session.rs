//! Per-simulation contact state.

use log::debug;
use serde::{Deserialize, Serialize};
use vcad_kernel_collide::{CollisionResult, Vec3};

use crate::constraint::{contact_constraints, Constraint, ContactMaterial, JointLimit};
use crate::error::ContactError;
use crate::manifold::{ContactManifold, ManifoldBuilder};
use crate::response::{compute_position_corrections, PositionCorrection};
use crate::solver::{ConstraintImpulse, ConstraintSolver, SolverConfig};

/// Everything one step produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactStep {
    /// Contacts of this step.
    pub manifold: ContactManifold,
    /// Constraints after solving, contacts first then joint limits.
    pub constraints: Vec<Constraint>,
    /// One impulse per constraint.
    pub impulses: Vec<ConstraintImpulse>,
    /// Position corrections for constraints that need one.
    pub corrections: Vec<PositionCorrection>,
}

/// Contact resolution state for one simulation.
///
/// Independent sessions share nothing. The warm-start cache and contact
/// ages persist between steps until [`ContactSession::reset`].
#[derive(Debug, Clone)]
pub struct ContactSession {
    material: ContactMaterial,
    joint_limits: Vec<JointLimit>,
    builder: ManifoldBuilder,
    solver: ConstraintSolver,
}

impl Default for ContactSession {
    fn default() -> Self {
        Self {
            material: ContactMaterial::default(),
            joint_limits: Vec::new(),
            builder: ManifoldBuilder::new(),
            solver: ConstraintSolver::default(),
        }
    }
}

impl ContactSession {
    /// A session with validated settings.
    pub fn new(config: SolverConfig, material: ContactMaterial) -> Result<Self, ContactError> {
        config.validate()?;
        material.validate()?;
        Ok(Self {
            material,
            joint_limits: Vec::new(),
            builder: ManifoldBuilder::new(),
            solver: ConstraintSolver::new(config),
        })
    }

    /// Add joint travel limits checked on every step.
    pub fn with_joint_limits(mut self, limits: Vec<JointLimit>) -> Self {
        self.joint_limits = limits;
        self
    }

    /// Joint limits checked on every step.
    pub fn joint_limits(&self) -> &[JointLimit] {
        &self.joint_limits
    }

    /// The solver (and through it the warm-start cache).
    pub fn solver(&self) -> &ConstraintSolver {
        &self.solver
    }

    /// Forget contact ages and cached impulses.
    pub fn reset(&mut self) {
        self.builder.reset();
        self.solver.reset();
    }

    /// Resolve one step.
    ///
    /// `joint_values` pairs joint names with their current values; joints
    /// without a configured limit are ignored.
    pub fn step(
        &mut self,
        result: &CollisionResult,
        relative_velocity: Vec3,
        joint_values: &[(&str, f64)],
        dt: f64,
    ) -> ContactStep {
        let manifold = self.builder.build_with_velocity(result, relative_velocity);
        let mut constraints = contact_constraints(&manifold, &self.material);
        constraints.extend(self.joint_constraints(joint_values));

        let impulses = self.solver.solve(&mut constraints, dt);
        let corrections = compute_position_corrections(&constraints, self.solver.config());
        debug!(
            "contact step {}: {} constraints, {} corrections",
            manifold.step,
            constraints.len(),
            corrections.len()
        );
        ContactStep {
            manifold,
            constraints,
            impulses,
            corrections,
        }
    }

    fn joint_constraints<'a>(
        &'a self,
        joint_values: &'a [(&str, f64)],
    ) -> impl Iterator<Item = Constraint> + 'a {
        self.joint_limits.iter().filter_map(move |limit| {
            let (_, value) = joint_values.iter().find(|(name, _)| *name == limit.joint)?;
            limit.check(*value).map(Constraint::JointLimit)
        })
    }
}
