//! Contact and joint-limit constraints.

use std::fmt;

use serde::{Deserialize, Serialize};
use vcad_kernel_collide::Vec3;

use crate::error::ContactError;
use crate::manifold::{ContactManifold, ContactPoint};

/// Default penalty stiffness for contacts and joint limits.
pub const DEFAULT_STIFFNESS: f64 = 1000.0;

/// Default penalty damping for contacts.
pub const DEFAULT_DAMPING: f64 = 100.0;

/// Penalty and friction coefficients for contacts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactMaterial {
    /// Penalty stiffness.
    pub stiffness: f64,
    /// Penalty damping.
    pub damping: f64,
    /// Static friction coefficient; bounds both tangent impulses.
    pub friction_static: f64,
    /// Dynamic friction coefficient.
    pub friction_dynamic: f64,
    /// Coefficient of restitution in `[0, 1]`.
    pub restitution: f64,
}

impl Default for ContactMaterial {
    fn default() -> Self {
        Self {
            stiffness: DEFAULT_STIFFNESS,
            damping: DEFAULT_DAMPING,
            friction_static: 0.5,
            friction_dynamic: 0.4,
            restitution: 0.1,
        }
    }
}

impl ContactMaterial {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ContactError> {
        let non_negative = [
            ("stiffness", self.stiffness),
            ("damping", self.damping),
            ("friction_static", self.friction_static),
            ("friction_dynamic", self.friction_dynamic),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(ContactError::Config(format!(
                    "{name} must be finite and >= 0, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.restitution) {
            return Err(ContactError::Config(format!(
                "restitution must be in [0, 1], got {}",
                self.restitution
            )));
        }
        Ok(())
    }
}

/// A penalty contact constraint with friction, derived from one contact point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactConstraint {
    /// Contact id (warm-start key).
    pub id: String,
    /// Tool component name.
    pub body_a: String,
    /// Target name.
    pub body_b: String,
    /// Unit normal from body B toward body A.
    pub normal: Vec3,
    /// First tangent.
    pub tangent1: Vec3,
    /// Second tangent.
    pub tangent2: Vec3,
    /// Penetration depth.
    pub penetration: f64,
    /// Velocity of body A relative to body B.
    pub relative_velocity: Vec3,
    /// Material coefficients.
    pub material: ContactMaterial,
    /// Accumulated normal impulse (>= 0).
    pub normal_impulse: f64,
    /// Accumulated impulse along `tangent1`.
    pub tangent_impulse1: f64,
    /// Accumulated impulse along `tangent2`.
    pub tangent_impulse2: f64,
    /// Inactive constraints are skipped by the solver.
    pub active: bool,
}

impl ContactConstraint {
    /// Constraint for a contact point with zeroed accumulators.
    pub fn from_contact(contact: &ContactPoint, material: &ContactMaterial) -> Self {
        Self {
            id: contact.id.clone(),
            body_a: contact.body_a.clone(),
            body_b: contact.body_b.clone(),
            normal: contact.normal,
            tangent1: contact.tangent1,
            tangent2: contact.tangent2,
            penetration: contact.depth,
            relative_velocity: contact.relative_velocity,
            material: *material,
            normal_impulse: 0.0,
            tangent_impulse1: 0.0,
            tangent_impulse2: 0.0,
            active: true,
        }
    }

    /// Largest tangent impulse magnitude allowed by the current normal impulse.
    pub fn friction_limit(&self) -> f64 {
        (self.material.friction_static * self.normal_impulse).max(0.0)
    }

    /// Clamp the tangent accumulators into the friction box.
    pub(crate) fn clamp_friction(&mut self) {
        let limit = self.friction_limit();
        self.tangent_impulse1 = self.tangent_impulse1.clamp(-limit, limit);
        self.tangent_impulse2 = self.tangent_impulse2.clamp(-limit, limit);
    }

    /// Total accumulated impulse as a vector.
    pub fn impulse(&self) -> Vec3 {
        self.normal * self.normal_impulse
            + self.tangent1 * self.tangent_impulse1
            + self.tangent2 * self.tangent_impulse2
    }
}

/// Which bound of a joint is violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitType {
    /// Value below the lower bound.
    LowerLimit,
    /// Value above the upper bound.
    UpperLimit,
}

impl LimitType {
    /// Serialized name.
    pub fn as_str(self) -> &'static str {
        match self {
            LimitType::LowerLimit => "lower_limit",
            LimitType::UpperLimit => "upper_limit",
        }
    }

    /// Sign of the restoring direction: `+1` pushes up, `-1` pushes down.
    pub fn direction(self) -> f64 {
        match self {
            LimitType::LowerLimit => 1.0,
            LimitType::UpperLimit => -1.0,
        }
    }
}

impl fmt::Display for LimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Travel limits of one machine joint (mm or degrees).
///
/// Deserializing checks `lower <= upper` like [`JointLimit::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "JointLimitDef")]
pub struct JointLimit {
    /// Joint name, e.g. `"A"` or `"Z"`.
    pub joint: String,
    /// Lower bound.
    pub lower: f64,
    /// Upper bound.
    pub upper: f64,
    /// Penalty stiffness of the limit.
    pub stiffness: f64,
}

fn default_stiffness() -> f64 {
    DEFAULT_STIFFNESS
}

#[derive(Deserialize)]
struct JointLimitDef {
    joint: String,
    lower: f64,
    upper: f64,
    #[serde(default = "default_stiffness")]
    stiffness: f64,
}

impl TryFrom<JointLimitDef> for JointLimit {
    type Error = ContactError;

    fn try_from(def: JointLimitDef) -> Result<Self, Self::Error> {
        let mut limit = JointLimit::new(def.joint, def.lower, def.upper)?;
        limit.stiffness = def.stiffness;
        Ok(limit)
    }
}

impl JointLimit {
    /// Limits `[lower, upper]` for `joint`.
    pub fn new(joint: impl Into<String>, lower: f64, upper: f64) -> Result<Self, ContactError> {
        let joint = joint.into();
        if !(lower <= upper) {
            return Err(ContactError::InvalidLimit { joint, lower, upper });
        }
        Ok(Self {
            joint,
            lower,
            upper,
            stiffness: DEFAULT_STIFFNESS,
        })
    }

    /// A constraint if `value` lies outside the limits.
    pub fn check(&self, value: f64) -> Option<JointLimitConstraint> {
        let (limit_type, limit, error) = if value > self.upper {
            (LimitType::UpperLimit, self.upper, value - self.upper)
        } else if value < self.lower {
            (LimitType::LowerLimit, self.lower, self.lower - value)
        } else {
            return None;
        };
        Some(JointLimitConstraint {
            id: format!("{}:{}", self.joint, limit_type),
            joint: self.joint.clone(),
            limit_type,
            value,
            limit,
            error,
            stiffness: self.stiffness,
            impulse: 0.0,
            active: true,
        })
    }

    /// `value` clamped into the limits.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.lower).min(self.upper)
    }
}

/// A violated joint limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointLimitConstraint {
    /// Constraint id, `"{joint}:{limit_type}"`.
    pub id: String,
    /// Joint name.
    pub joint: String,
    /// Violated bound.
    pub limit_type: LimitType,
    /// Joint value that violated the bound.
    pub value: f64,
    /// The violated bound.
    pub limit: f64,
    /// Violation magnitude (> 0).
    pub error: f64,
    /// Penalty stiffness.
    pub stiffness: f64,
    /// Accumulated signed impulse along the restoring direction.
    pub impulse: f64,
    /// Inactive constraints are skipped by the solver.
    pub active: bool,
}

/// Any constraint the solver handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    /// Contact between a tool component and a target.
    Contact(ContactConstraint),
    /// Joint travel limit.
    JointLimit(JointLimitConstraint),
}

impl Constraint {
    /// Warm-start key.
    pub fn id(&self) -> &str {
        match self {
            Constraint::Contact(c) => &c.id,
            Constraint::JointLimit(j) => &j.id,
        }
    }

    /// Whether the solver processes this constraint.
    pub fn is_active(&self) -> bool {
        match self {
            Constraint::Contact(c) => c.active,
            Constraint::JointLimit(j) => j.active,
        }
    }
}

/// One contact constraint per manifold point, in manifold order.
pub fn contact_constraints(manifold: &ContactManifold, material: &ContactMaterial) -> Vec<Constraint> {
    manifold
        .points
        .iter()
        .map(|p| Constraint::Contact(ContactConstraint::from_contact(p, material)))
        .collect()
}
