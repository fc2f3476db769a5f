//! Position corrections and velocity response.

use serde::{Deserialize, Serialize};
use vcad_kernel_collide::Vec3;

use crate::constraint::{Constraint, ContactConstraint, LimitType};
use crate::solver::SolverConfig;

/// A positional fix for one constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PositionCorrection {
    /// Split push-apart for a contact.
    Contact {
        /// Constraint id.
        id: String,
        /// Translation for body A (`+normal * penetration / 2`).
        body_a: Vec3,
        /// Translation for body B (`-normal * penetration / 2`).
        body_b: Vec3,
    },
    /// Joint value correction toward the violated bound.
    JointLimit {
        /// Constraint id.
        id: String,
        /// Joint name.
        joint: String,
        /// Violated bound; the correction moves back inside it.
        limit_type: LimitType,
        /// Correction magnitude, `error * baumgarte`.
        correction: f64,
    },
}

/// Corrections for every active constraint that needs one.
///
/// Contacts within `penetration_tolerance` produce nothing.
pub fn compute_position_corrections(
    constraints: &[Constraint],
    config: &SolverConfig,
) -> Vec<PositionCorrection> {
    constraints
        .iter()
        .filter(|c| c.is_active())
        .filter_map(|c| match c {
            Constraint::Contact(c) if c.penetration > config.penetration_tolerance => {
                let half = c.normal * (c.penetration * 0.5);
                Some(PositionCorrection::Contact {
                    id: c.id.clone(),
                    body_a: half,
                    body_b: -half,
                })
            }
            Constraint::Contact(_) => None,
            Constraint::JointLimit(j) => Some(PositionCorrection::JointLimit {
                id: j.id.clone(),
                joint: j.joint.clone(),
                limit_type: j.limit_type,
                correction: j.error * config.baumgarte,
            }),
        })
        .collect()
}

/// Restitution impulse on body A for a contact, treating both bodies as
/// unit masses.
///
/// `None` when the bodies are already separating along the normal. Body B
/// receives the negated impulse.
pub fn apply_collision_response(
    contact: &ContactConstraint,
    vel_a: &Vec3,
    vel_b: &Vec3,
) -> Option<Vec3> {
    let normal_vel = (vel_a - vel_b).dot(&contact.normal);
    if normal_vel >= 0.0 {
        return None;
    }
    let j = -(1.0 + contact.material.restitution) * normal_vel;
    Some(contact.normal * j)
}

/// Restitution impulse on body A with explicit inverse masses.
///
/// A zero inverse mass is an immovable body. `None` when separating or when
/// both bodies are immovable.
pub fn mass_weighted_response(
    contact: &ContactConstraint,
    vel_a: &Vec3,
    vel_b: &Vec3,
    inv_mass_a: f64,
    inv_mass_b: f64,
) -> Option<Vec3> {
    let normal_vel = (vel_a - vel_b).dot(&contact.normal);
    let inv_sum = inv_mass_a + inv_mass_b;
    if normal_vel >= 0.0 || inv_sum <= 0.0 {
        return None;
    }
    let j = -(1.0 + contact.material.restitution) * normal_vel / inv_sum;
    Some(contact.normal * j)
}
