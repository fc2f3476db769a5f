//! Sequential impulse constraint solver.
//!
//! Each solve runs `Idle → WarmStart → Iterate × N → Capture`:
//!
//! 1. **WarmStart** seeds each constraint's accumulators from the cache at
//!    `warm_start_decay` times the cached value.
//! 2. **Iterate** visits the active constraints in order, Gauss–Seidel style:
//!    constraint `k` sees the accumulators already updated by `0..k` in the
//!    same sweep.
//! 3. **Capture** writes every constraint's accumulators back to the cache,
//!    replacing entries with the same id.
//!
//! The solver has no failure mode. It always runs its fixed iteration budget
//! and returns.

use std::collections::HashMap;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use vcad_kernel_collide::Vec3;

use crate::constraint::{Constraint, ContactConstraint, JointLimitConstraint};
use crate::error::ContactError;

/// Solver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Gauss–Seidel sweeps per solve.
    pub iterations: usize,
    /// Baumgarte position-correction factor.
    pub baumgarte: f64,
    /// Seed accumulators from the previous solve.
    pub warm_start: bool,
    /// Factor applied to cached impulses when seeding.
    pub warm_start_decay: f64,
    /// Penetration below which no position correction is emitted.
    pub penetration_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            baumgarte: 0.2,
            warm_start: true,
            warm_start_decay: 0.9,
            penetration_tolerance: 0.001,
        }
    }
}

impl SolverConfig {
    /// Parse from TOML text; missing keys take their defaults.
    pub fn from_toml(text: &str) -> Result<Self, ContactError> {
        let config: Self = toml::from_str(text).map_err(|e| ContactError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ContactError> {
        if !(0.0..=1.0).contains(&self.baumgarte) {
            return Err(ContactError::Config(format!(
                "baumgarte must be in [0, 1], got {}",
                self.baumgarte
            )));
        }
        if !(0.0..=1.0).contains(&self.warm_start_decay) {
            return Err(ContactError::Config(format!(
                "warm_start_decay must be in [0, 1], got {}",
                self.warm_start_decay
            )));
        }
        if !(self.penetration_tolerance >= 0.0 && self.penetration_tolerance.is_finite()) {
            return Err(ContactError::Config(format!(
                "penetration_tolerance must be finite and >= 0, got {}",
                self.penetration_tolerance
            )));
        }
        Ok(())
    }
}

/// Where the solver is in its per-call state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverPhase {
    /// No solve has run since construction or reset.
    Idle,
    /// Seeding accumulators from the cache.
    WarmStart,
    /// Running Gauss–Seidel sweeps.
    Iterate,
    /// Writing accumulators back to the cache; a finished solve stays here.
    Capture,
}

/// Accumulated impulses remembered for one constraint id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedImpulse {
    /// Normal impulse (contacts) or limit impulse (joint limits).
    pub normal: f64,
    /// First tangent impulse.
    pub tangent1: f64,
    /// Second tangent impulse.
    pub tangent2: f64,
}

impl CachedImpulse {
    fn scaled(self, factor: f64) -> Self {
        Self {
            normal: self.normal * factor,
            tangent1: self.tangent1 * factor,
            tangent2: self.tangent2 * factor,
        }
    }
}

/// Last accumulated impulses by constraint id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WarmStartCache {
    entries: HashMap<String, CachedImpulse>,
}

impl WarmStartCache {
    /// Cached impulses for `id`.
    pub fn get(&self, id: &str) -> Option<CachedImpulse> {
        self.entries.get(id).copied()
    }

    /// Store impulses for `id`, replacing any previous entry.
    pub fn insert(&mut self, id: impl Into<String>, impulse: CachedImpulse) {
        self.entries.insert(id.into(), impulse);
    }

    /// Number of cached ids.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Resolved impulse of one constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintImpulse {
    /// Contact impulse.
    Contact {
        /// Constraint id.
        id: String,
        /// Accumulated normal impulse (>= 0).
        normal: f64,
        /// Accumulated tangent impulses.
        tangent: [f64; 2],
        /// Total impulse vector on body A.
        impulse: Vec3,
    },
    /// Joint limit impulse.
    JointLimit {
        /// Constraint id.
        id: String,
        /// Accumulated signed impulse.
        impulse: f64,
        /// Position correction, `error * baumgarte`.
        correction: f64,
    },
}

impl ConstraintImpulse {
    /// Constraint id.
    pub fn id(&self) -> &str {
        match self {
            ConstraintImpulse::Contact { id, .. } | ConstraintImpulse::JointLimit { id, .. } => id,
        }
    }
}

/// Sequential impulse solver with a warm-start cache.
///
/// One solve may run at a time per solver; the cache is owned by the solver
/// and survives until [`ConstraintSolver::reset`].
#[derive(Debug, Clone)]
pub struct ConstraintSolver {
    config: SolverConfig,
    cache: WarmStartCache,
    phase: SolverPhase,
}

impl Default for ConstraintSolver {
    fn default() -> Self {
        Self::new(SolverConfig::default())
    }
}

impl ConstraintSolver {
    /// A solver with an empty cache.
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            cache: WarmStartCache::default(),
            phase: SolverPhase::Idle,
        }
    }

    /// Settings.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Phase reached by the last call.
    pub fn phase(&self) -> SolverPhase {
        self.phase
    }

    /// The warm-start cache.
    pub fn cache(&self) -> &WarmStartCache {
        &self.cache
    }

    /// Clear the warm-start cache and return to idle.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.phase = SolverPhase::Idle;
    }

    /// The accumulators `id` would be seeded with on the next solve.
    pub fn warm_start_seed(&self, id: &str) -> Option<CachedImpulse> {
        if !self.config.warm_start {
            return None;
        }
        self.cache
            .get(id)
            .map(|c| c.scaled(self.config.warm_start_decay))
    }

    /// Solve `constraints` for one step of length `dt`, updating their
    /// accumulators in place. Returns one impulse per constraint, in order.
    pub fn solve(&mut self, constraints: &mut [Constraint], dt: f64) -> Vec<ConstraintImpulse> {
        if self.config.warm_start {
            self.enter(SolverPhase::WarmStart);
            let mut seeded = 0;
            for constraint in constraints.iter_mut() {
                if let Some(seed) = self.warm_start_seed(constraint.id()) {
                    apply_seed(constraint, seed);
                    seeded += 1;
                }
            }
            trace!("warm-started {seeded} of {} constraints", constraints.len());
        }

        self.enter(SolverPhase::Iterate);
        if dt > 0.0 && dt.is_finite() {
            for _ in 0..self.config.iterations {
                for constraint in constraints.iter_mut() {
                    match constraint {
                        Constraint::Contact(c) if c.active => {
                            solve_contact(c, dt, self.config.baumgarte)
                        }
                        Constraint::JointLimit(j) if j.active => solve_joint_limit(j, dt),
                        _ => {}
                    }
                }
            }
        } else {
            warn!("solver skipped iterations: invalid time step {dt}");
        }

        self.enter(SolverPhase::Capture);
        for constraint in constraints.iter() {
            self.cache.insert(constraint.id(), snapshot(constraint));
        }

        let impulses: Vec<ConstraintImpulse> = constraints
            .iter()
            .map(|c| self.impulse_of(c))
            .collect();
        debug!(
            "solved {} constraints in {} iterations",
            impulses.len(),
            self.config.iterations
        );
        impulses
    }

    fn enter(&mut self, phase: SolverPhase) {
        trace!("solver phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    fn impulse_of(&self, constraint: &Constraint) -> ConstraintImpulse {
        match constraint {
            Constraint::Contact(c) => ConstraintImpulse::Contact {
                id: c.id.clone(),
                normal: c.normal_impulse,
                tangent: [c.tangent_impulse1, c.tangent_impulse2],
                impulse: c.impulse(),
            },
            Constraint::JointLimit(j) => ConstraintImpulse::JointLimit {
                id: j.id.clone(),
                impulse: j.impulse,
                correction: j.error * self.config.baumgarte,
            },
        }
    }
}

fn apply_seed(constraint: &mut Constraint, seed: CachedImpulse) {
    match constraint {
        Constraint::Contact(c) => {
            c.normal_impulse = seed.normal.max(0.0);
            c.tangent_impulse1 = seed.tangent1;
            c.tangent_impulse2 = seed.tangent2;
            c.clamp_friction();
        }
        Constraint::JointLimit(j) => j.impulse = seed.normal,
    }
}

fn snapshot(constraint: &Constraint) -> CachedImpulse {
    match constraint {
        Constraint::Contact(c) => CachedImpulse {
            normal: c.normal_impulse,
            tangent1: c.tangent_impulse1,
            tangent2: c.tangent_impulse2,
        },
        Constraint::JointLimit(j) => CachedImpulse {
            normal: j.impulse,
            ..CachedImpulse::default()
        },
    }
}

/// Penalty normal impulse with Baumgarte term, then box friction.
fn solve_contact(c: &mut ContactConstraint, dt: f64, baumgarte: f64) {
    let pen = c.penetration.max(0.0);
    let delta = c.material.stiffness * pen * dt + c.material.damping * (baumgarte * pen / dt) * dt;
    c.normal_impulse = (c.normal_impulse + delta).max(0.0);

    // Unit effective mass: slip left after the impulse already applied.
    let vt1 = c.relative_velocity.dot(&c.tangent1) + c.tangent_impulse1;
    let vt2 = c.relative_velocity.dot(&c.tangent2) + c.tangent_impulse2;
    c.tangent_impulse1 -= vt1;
    c.tangent_impulse2 -= vt2;
    c.clamp_friction();
}

fn solve_joint_limit(j: &mut JointLimitConstraint, dt: f64) {
    j.impulse += j.limit_type.direction() * j.stiffness * j.error * dt;
}
