use std::collections::HashMap;

use nalgebra::Vector3;

use super::narrow_phase::Contact;
use super::rigid_body::RigidBody;
use crate::utils::constants::{
    BAUMGARTE_FACTOR, MIN_VELOCITY_ITERATIONS, PENETRATION_SLOP, RESTITUTION_THRESHOLD,
    VELOCITY_ITERATIONS,
};

const MAX_WARM_START_IMPULSE: f32 = 1000.0;
const MOTION_THRESHOLD: f32 = 0.01;

/// Tuning knobs of the sequential impulse solver.
#[derive(Debug, Clone, Copy)]
pub struct SolverSettings {
    pub velocity_iterations: usize,
    pub min_velocity_iterations: usize,
    pub baumgarte: f32,
    pub penetration_slop: f32,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            velocity_iterations: VELOCITY_ITERATIONS,
            min_velocity_iterations: MIN_VELOCITY_ITERATIONS,
            baumgarte: BAUMGARTE_FACTOR,
            penetration_slop: PENETRATION_SLOP,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct AccumulatedImpulses {
    normal: f32,
    tangent1: f32,
    tangent2: f32,
}

struct ContactConstraint {
    contact: Contact,
    r_a: Vector3<f32>,
    r_b: Vector3<f32>,
    normal_mass: f32,
    tangent_mass1: f32,
    tangent_mass2: f32,
    bias: f32,
    friction: f32,
    impulses: AccumulatedImpulses,
}

/// Sequential impulse contact solver with cross-frame warm starting.
///
/// Accumulated impulses are cached per collider pair at the end of each step
/// and re-applied at the start of the next, so persistent contacts converge
/// in few iterations. The accumulated normal impulse is clamped non-negative
/// and the tangent impulses to the friction cone `|t| <= mu * n`.
pub struct ContactSolver {
    constraints: Vec<ContactConstraint>,
    warm_cache: HashMap<(u32, u32), AccumulatedImpulses>,
    settings: SolverSettings,
}

impl ContactSolver {
    pub fn new(settings: SolverSettings) -> Self {
        Self {
            constraints: Vec::new(),
            warm_cache: HashMap::new(),
            settings,
        }
    }

    fn valid_contact(contact: &Contact) -> bool {
        let n = contact.normal.norm();
        if !(0.999..=1.001).contains(&n) {
            return false;
        }
        if contact.tangent1.norm() < 0.999 || contact.tangent2.norm() < 0.999 {
            return false;
        }
        contact.penetration.is_finite()
    }

    /// Build constraints for this step's manifold and compute effective
    /// masses and biases against the current body velocities.
    pub fn initialize(&mut self, contacts: &[Contact], bodies: &[RigidBody], dt: f32) {
        self.constraints.clear();
        self.constraints.reserve(contacts.len());

        for contact in contacts {
            if !Self::valid_contact(contact) {
                continue;
            }
            if contact.body_a == contact.body_b {
                continue;
            }

            let body_a = &bodies[contact.body_a];
            let body_b = &bodies[contact.body_b];

            let r_a = contact.point_a - body_a.position;
            let r_b = contact.point_b - body_b.position;

            // Effective mass along the normal.
            let normal_mass = {
                let rn_a = r_a.cross(&contact.normal);
                let rn_b = r_b.cross(&contact.normal);
                let k = body_a.inverse_mass
                    + body_b.inverse_mass
                    + rn_a.dot(&(body_a.world_inverse_inertia * rn_a))
                    + rn_b.dot(&(body_b.world_inverse_inertia * rn_b));
                if k > 0.0 {
                    1.0 / k
                } else {
                    0.0
                }
            };

            // Effective masses along the two tangents.
            let tangent_mass = |t: &Vector3<f32>| {
                let rt_a = r_a.cross(t);
                let rt_b = r_b.cross(t);
                let k = body_a.inverse_mass
                    + body_b.inverse_mass
                    + rt_a.dot(&(body_a.world_inverse_inertia * rt_a))
                    + rt_b.dot(&(body_b.world_inverse_inertia * rt_b));
                if k > 0.0 {
                    1.0 / k
                } else {
                    0.0
                }
            };
            let tangent_mass1 = tangent_mass(&contact.tangent1);
            let tangent_mass2 = tangent_mass(&contact.tangent2);

            // Restitution only above the approach-speed threshold, so slow
            // resting contacts do not jitter.
            let restitution =
                0.5 * (body_a.material.restitution + body_b.material.restitution);
            let relative = body_b.velocity_at(&r_b) - body_a.velocity_at(&r_a);
            let normal_velocity = relative.dot(&contact.normal);
            let mut bias = 0.0;
            if normal_velocity < RESTITUTION_THRESHOLD {
                bias += restitution * normal_velocity;
            }

            // Baumgarte term: a separating velocity proportional to the
            // penetration beyond the slop.
            let correction = contact.penetration - self.settings.penetration_slop;
            if correction > 0.0 {
                bias -= (self.settings.baumgarte / dt) * correction;
            }

            let friction = 0.5 * (body_a.material.friction + body_b.material.friction);

            let impulses = self
                .warm_cache
                .get(&(contact.collider_a, contact.collider_b))
                .copied()
                .unwrap_or_default();

            self.constraints.push(ContactConstraint {
                contact: *contact,
                r_a,
                r_b,
                normal_mass,
                tangent_mass1,
                tangent_mass2,
                bias,
                friction,
                impulses,
            });
        }
    }

    /// Re-apply last frame's accumulated impulses.
    pub fn warm_start(&mut self, bodies: &mut [RigidBody]) {
        for constraint in &self.constraints {
            let mut p = constraint.impulses.normal * constraint.contact.normal
                + constraint.impulses.tangent1 * constraint.contact.tangent1
                + constraint.impulses.tangent2 * constraint.contact.tangent2;

            let magnitude = p.norm();
            if magnitude > MAX_WARM_START_IMPULSE {
                p *= MAX_WARM_START_IMPULSE / magnitude;
            }

            apply_pair_impulse(
                bodies,
                constraint.contact.body_a,
                constraint.contact.body_b,
                &p,
                &constraint.r_a,
                &constraint.r_b,
            );
        }
    }

    /// Run the velocity iterations, early-exiting once impulses settle but
    /// never before the minimum iteration count.
    pub fn solve(&mut self, bodies: &mut [RigidBody]) {
        for iteration in 0..self.settings.velocity_iterations {
            let still_moving = self.solve_once(bodies);
            if !still_moving && iteration + 1 >= self.settings.min_velocity_iterations {
                break;
            }
        }
    }

    fn solve_once(&mut self, bodies: &mut [RigidBody]) -> bool {
        let mut significant = false;

        for constraint in &mut self.constraints {
            let ia = constraint.contact.body_a;
            let ib = constraint.contact.body_b;
            let normal = constraint.contact.normal;

            // Normal constraint.
            {
                let relative = bodies[ib].velocity_at(&constraint.r_b)
                    - bodies[ia].velocity_at(&constraint.r_a);
                let normal_velocity = relative.dot(&normal);
                let lambda = -constraint.normal_mass * (normal_velocity + constraint.bias);

                let old = constraint.impulses.normal;
                constraint.impulses.normal = (old + lambda).max(0.0);
                let delta = constraint.impulses.normal - old;

                apply_pair_impulse(
                    bodies,
                    ia,
                    ib,
                    &(delta * normal),
                    &constraint.r_a,
                    &constraint.r_b,
                );
                if delta.abs() > MOTION_THRESHOLD {
                    significant = true;
                }
            }

            let max_friction = constraint.friction * constraint.impulses.normal;

            // First tangent direction.
            {
                let relative = bodies[ib].velocity_at(&constraint.r_b)
                    - bodies[ia].velocity_at(&constraint.r_a);
                let lambda =
                    -constraint.tangent_mass1 * relative.dot(&constraint.contact.tangent1);

                let old = constraint.impulses.tangent1;
                constraint.impulses.tangent1 =
                    (old + lambda).clamp(-max_friction, max_friction);
                let delta = constraint.impulses.tangent1 - old;

                apply_pair_impulse(
                    bodies,
                    ia,
                    ib,
                    &(delta * constraint.contact.tangent1),
                    &constraint.r_a,
                    &constraint.r_b,
                );
                if delta.abs() > MOTION_THRESHOLD {
                    significant = true;
                }
            }

            // Second tangent direction.
            {
                let relative = bodies[ib].velocity_at(&constraint.r_b)
                    - bodies[ia].velocity_at(&constraint.r_a);
                let lambda =
                    -constraint.tangent_mass2 * relative.dot(&constraint.contact.tangent2);

                let old = constraint.impulses.tangent2;
                constraint.impulses.tangent2 =
                    (old + lambda).clamp(-max_friction, max_friction);
                let delta = constraint.impulses.tangent2 - old;

                apply_pair_impulse(
                    bodies,
                    ia,
                    ib,
                    &(delta * constraint.contact.tangent2),
                    &constraint.r_a,
                    &constraint.r_b,
                );
                if delta.abs() > MOTION_THRESHOLD {
                    significant = true;
                }
            }
        }

        significant
    }

    /// Store this step's accumulated impulses for next frame's warm start.
    /// Pairs without a contact this step are dropped from the cache.
    pub fn finish(&mut self) {
        self.warm_cache.clear();
        for constraint in &self.constraints {
            self.warm_cache.insert(
                (constraint.contact.collider_a, constraint.contact.collider_b),
                constraint.impulses,
            );
        }
    }

    /// Accumulated normal impulses of the live constraints, for diagnostics
    /// and invariant checks.
    pub fn normal_impulses(&self) -> impl Iterator<Item = f32> + '_ {
        self.constraints.iter().map(|c| c.impulses.normal)
    }
}

/// Apply `impulse` to B and its opposite to A, at the cached contact offsets.
fn apply_pair_impulse(
    bodies: &mut [RigidBody],
    a: usize,
    b: usize,
    impulse: &Vector3<f32>,
    r_a: &Vector3<f32>,
    r_b: &Vector3<f32>,
) {
    bodies[a].apply_impulse(&-impulse, r_a);
    bodies[b].apply_impulse(impulse, r_b);
}
