#![warn(missing_docs)]

//! Contact resolution for vcad machine simulation.
//!
//! Turns collision results from `vcad-kernel-collide` into oriented contact
//! manifolds, builds contact and joint-limit constraints, and resolves them
//! with a warm-started sequential impulse solver.
//!
//! # Example
//!
//! ```
//! use vcad_kernel_contact::{ContactSession, JointLimit};
//! use vcad_kernel_collide::{CollisionResult, Vec3};
//!
//! let mut session = ContactSession::default()
//!     .with_joint_limits(vec![JointLimit::new("A", -120.0, 120.0).unwrap()]);
//!
//! let clear = CollisionResult {
//!     has_collision: false,
//!     collisions: vec![],
//!     safety_margin: 10.0,
//!     checked_components: vec![],
//! };
//! let step = session.step(&clear, Vec3::zeros(), &[("A", 130.0)], 1.0 / 60.0);
//! assert_eq!(step.impulses.len(), 1);
//! assert_eq!(step.corrections.len(), 1);
//! ```

mod constraint;
mod error;
mod manifold;
mod response;
mod session;
mod solver;

pub use constraint::{
    contact_constraints, Constraint, ContactConstraint, ContactMaterial, JointLimit,
    JointLimitConstraint, LimitType, DEFAULT_DAMPING, DEFAULT_STIFFNESS,
};
pub use error::ContactError;
pub use manifold::{tangent_basis, ContactManifold, ContactPoint, ManifoldBuilder};
pub use response::{
    apply_collision_response, compute_position_corrections, mass_weighted_response,
    PositionCorrection,
};
pub use session::{ContactSession, ContactStep};
pub use solver::{
    CachedImpulse, ConstraintImpulse, ConstraintSolver, SolverConfig, SolverPhase, WarmStartCache,
};
