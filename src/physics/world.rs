use nalgebra::{UnitQuaternion, Vector3};
use rayon::prelude::*;

use super::aabb::Aabb;
use super::broad_phase::AabbTree;
use super::collider::{Collider, ColliderShape};
use super::narrow_phase::{self, Contact, ShapePose};
use super::rigid_body::RigidBody;
use super::solver::{ContactSolver, SolverSettings};
use crate::utils::constants::{
    AABB_MARGIN, GRAVITY, SLEEP_ANGULAR_THRESHOLD, SLEEP_LINEAR_THRESHOLD,
};
use crate::utils::errors::{Result, SimError};

/// Global physics parameters.
#[derive(Debug, Clone, Copy)]
pub struct PhysicsSettings {
    pub gravity: Vector3<f32>,
    pub broad_phase_margin: f32,
    pub enable_collisions: bool,
    pub solver: SolverSettings,
    pub sleep_linear_threshold: f32,
    pub sleep_angular_threshold: f32,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            gravity: Vector3::new(0.0, 0.0, -GRAVITY),
            broad_phase_margin: AABB_MARGIN,
            enable_collisions: true,
            solver: SolverSettings::default(),
            sleep_linear_threshold: SLEEP_LINEAR_THRESHOLD,
            sleep_angular_threshold: SLEEP_ANGULAR_THRESHOLD,
        }
    }
}

/// Report of a swap-erase: the element previously stored at `moved_from`
/// now lives at `moved_to`. Callers holding indices must rewrite them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapErase {
    pub moved_from: usize,
    pub moved_to: usize,
}

/// Owner of all rigid bodies and colliders, the broad-phase tree over them,
/// and the per-step contact pipeline.
pub struct PhysicsWorld {
    pub settings: PhysicsSettings,
    bodies: Vec<RigidBody>,
    colliders: Vec<Collider>,
    tree: AabbTree,
    solver: ContactSolver,
    contacts: Vec<Contact>,
}

impl PhysicsWorld {
    pub fn new(settings: PhysicsSettings) -> Self {
        Self {
            settings,
            bodies: Vec::new(),
            colliders: Vec::new(),
            tree: AabbTree::with_margin(settings.broad_phase_margin),
            solver: ContactSolver::new(settings.solver),
            contacts: Vec::new(),
        }
    }

    pub fn add_body(&mut self, body: RigidBody) -> usize {
        self.bodies.push(body);
        self.bodies.len() - 1
    }

    pub fn body(&self, index: usize) -> Option<&RigidBody> {
        self.bodies.get(index)
    }

    pub fn body_mut(&mut self, index: usize) -> Option<&mut RigidBody> {
        self.bodies.get_mut(index)
    }

    pub fn bodies(&self) -> &[RigidBody] {
        &self.bodies
    }

    pub fn collider(&self, index: usize) -> Option<&Collider> {
        self.colliders.get(index)
    }

    /// Attach a collider to a body and insert its broad-phase leaf.
    pub fn add_collider(
        &mut self,
        shape: ColliderShape,
        body: usize,
        local_center: Vector3<f32>,
    ) -> Result<usize> {
        shape.validate()?;
        if body >= self.bodies.len() {
            return Err(SimError::validation("collider references missing body"));
        }

        let mut collider = Collider::new(shape, body, local_center);
        let pose = &self.bodies[body];
        let tight = collider.tight_aabb(&pose.position, &pose.orientation);

        let index = self.colliders.len() as u32;
        let node = self.tree.insert(&tight, index);
        collider.node = Some(node);
        self.colliders.push(collider);
        Ok(index as usize)
    }

    /// Remove a collider by swap-erase. The displaced tail collider (if any)
    /// keeps its broad-phase leaf, which is retargeted to the new index.
    pub fn remove_collider(&mut self, index: usize) -> Result<Option<SwapErase>> {
        if index >= self.colliders.len() {
            return Err(SimError::liveness("collider index out of range"));
        }

        if let Some(node) = self.colliders[index].node {
            self.tree.remove(node);
        }
        self.colliders.swap_remove(index);

        if index < self.colliders.len() {
            if let Some(node) = self.colliders[index].node {
                self.tree.set_leaf_collider(node, index as u32);
            }
            return Ok(Some(SwapErase {
                moved_from: self.colliders.len(),
                moved_to: index,
            }));
        }
        Ok(None)
    }

    /// Remove a body (and its colliders) by swap-erase. Colliders of the
    /// displaced tail body are retargeted to the new body index.
    pub fn remove_body(&mut self, index: usize) -> Result<Option<SwapErase>> {
        if index >= self.bodies.len() {
            return Err(SimError::liveness("body index out of range"));
        }

        // Drop colliders owned by this body first.
        let mut c = 0;
        while c < self.colliders.len() {
            if self.colliders[c].body == index {
                self.remove_collider(c)?;
            } else {
                c += 1;
            }
        }

        self.bodies.swap_remove(index);

        if index < self.bodies.len() {
            let moved_from = self.bodies.len();
            for collider in &mut self.colliders {
                if collider.body == moved_from {
                    collider.body = index;
                }
            }
            return Ok(Some(SwapErase {
                moved_from,
                moved_to: index,
            }));
        }
        Ok(None)
    }

    fn shape_pose(&self, collider_index: usize) -> ShapePose<'_> {
        let collider = &self.colliders[collider_index];
        let body = &self.bodies[collider.body];
        ShapePose {
            collider,
            position: body.position,
            orientation: body.orientation,
        }
    }

    /// Contacts produced by the most recent step.
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Advance the contact and integration pipeline by one fixed step.
    pub fn step(&mut self, dt: f32) -> Result<()> {
        if dt < 0.0 {
            return Err(SimError::validation("time step must be non-negative"));
        }
        if dt == 0.0 {
            self.contacts.clear();
            return Ok(());
        }

        if self.settings.enable_collisions {
            self.refit_broad_phase();
            self.run_narrow_phase();

            self.solver.initialize(&self.contacts, &self.bodies, dt);
            self.solver.warm_start(&mut self.bodies);
            self.solver.solve(&mut self.bodies);
            self.solver.finish();
        } else {
            self.contacts.clear();
        }

        self.integrate(dt);
        self.update_sleep_state();

        for body in &mut self.bodies {
            body.clear_accumulators();
        }

        Ok(())
    }

    /// Refresh fat AABBs for leaves whose bodies moved.
    fn refit_broad_phase(&mut self) {
        // Tight bounds are independent per collider; compute them in
        // parallel, then apply tree updates serially.
        let tight: Vec<Option<Aabb>> = self
            .colliders
            .par_iter()
            .map(|collider| {
                let body = &self.bodies[collider.body];
                if body.is_static || !body.active {
                    return None;
                }
                Some(collider.tight_aabb(&body.position, &body.orientation))
            })
            .collect();

        for (collider, tight) in self.colliders.iter().zip(tight) {
            if let (Some(node), Some(tight)) = (collider.node, tight) {
                self.tree.update(node, &tight);
            }
        }
    }

    /// Broad-phase pair enumeration plus GJK/EPA per pair.
    fn run_narrow_phase(&mut self) {
        self.contacts.clear();

        let pairs: Vec<(u32, u32)> = self.tree.pairs().to_vec();
        for (a, b) in pairs {
            let (a, b) = (a as usize, b as usize);
            let body_a = self.colliders[a].body;
            let body_b = self.colliders[b].body;

            if body_a == body_b {
                continue;
            }
            let a_static = self.bodies[body_a].inverse_mass == 0.0;
            let b_static = self.bodies[body_b].inverse_mass == 0.0;
            if a_static && b_static {
                continue;
            }
            // Skip pairs where nothing is awake to respond.
            if !self.bodies[body_a].active && !self.bodies[body_b].active {
                continue;
            }

            let pose_a = self.shape_pose(a);
            let pose_b = self.shape_pose(b);
            if let Some(mut contact) = narrow_phase::detect(&pose_a, &pose_b) {
                contact.body_a = body_a;
                contact.body_b = body_b;
                contact.collider_a = a as u32;
                contact.collider_b = b as u32;
                self.contacts.push(contact);

                // Contact wakes both participants.
                if !a_static {
                    self.bodies[body_a].active = true;
                }
                if !b_static {
                    self.bodies[body_b].active = true;
                }
            }
        }
    }

    fn integrate(&mut self, dt: f32) {
        let gravity = self.settings.gravity;
        self.bodies
            .par_iter_mut()
            .for_each(|body| body.integrate(dt, &gravity));
    }

    /// Deactivate bodies below the sleep thresholds and zero their motion.
    fn update_sleep_state(&mut self) {
        for body in &mut self.bodies {
            if body.is_static || !body.active {
                continue;
            }
            if body.linear_velocity.norm() < self.settings.sleep_linear_threshold
                && body.angular_velocity.norm() < self.settings.sleep_angular_threshold
            {
                body.active = false;
                body.linear_velocity = Vector3::zeros();
                body.angular_velocity = Vector3::zeros();
            }
        }
    }

    /// Nearest collider hit by a world-space ray.
    pub fn raycast(&self, origin: &Vector3<f32>, dir: &Vector3<f32>) -> Option<(usize, f32)> {
        self.tree
            .raycast(origin, dir, |collider| {
                self.collider_ray_hit(collider as usize, origin, dir)
            })
            .map(|(collider, t)| (collider as usize, t))
    }

    /// Exact (sphere, box) or bounding (hull) ray parameter for a collider.
    fn collider_ray_hit(
        &self,
        index: usize,
        origin: &Vector3<f32>,
        dir: &Vector3<f32>,
    ) -> Option<f32> {
        let collider = &self.colliders[index];
        let body = &self.bodies[collider.body];

        match &collider.shape {
            ColliderShape::Sphere { radius } => {
                let center =
                    body.orientation.transform_vector(&collider.local_center) + body.position;
                ray_sphere(origin, dir, &center, *radius)
            }
            ColliderShape::Box { half_extents } => {
                let local_origin = body
                    .orientation
                    .inverse_transform_vector(&(origin - body.position))
                    - collider.local_center;
                let local_dir = body.orientation.inverse_transform_vector(dir);
                let aabb = Aabb::new(-half_extents, *half_extents);
                aabb.ray_intersect(&local_origin, &local_dir).map(|(t, _)| t)
            }
            ColliderShape::ConvexHull { points } => {
                let local_origin = body
                    .orientation
                    .inverse_transform_vector(&(origin - body.position))
                    - collider.local_center;
                let local_dir = body.orientation.inverse_transform_vector(dir);
                let aabb = Aabb::from_points(points.iter());
                aabb.ray_intersect(&local_origin, &local_dir).map(|(t, _)| t)
            }
        }
    }

    /// First collider whose fat leaf contains `point`.
    pub fn pick(&self, point: &Vector3<f32>) -> Option<usize> {
        self.tree.pick(point).map(|c| c as usize)
    }

    /// Read back a body pose, used by the transform publish step.
    pub fn pose(&self, body: usize) -> Option<(Vector3<f32>, UnitQuaternion<f32>)> {
        self.bodies.get(body).map(|b| (b.position, b.orientation))
    }
}

fn ray_sphere(
    origin: &Vector3<f32>,
    dir: &Vector3<f32>,
    center: &Vector3<f32>,
    radius: f32,
) -> Option<f32> {
    let m = origin - center;
    let a = dir.dot(dir);
    if a < 1e-12 {
        return None;
    }
    let b = m.dot(dir);
    let c = m.dot(&m) - radius * radius;

    let discriminant = b * b - a * c;
    if discriminant < 0.0 {
        return None;
    }
    let t = (-b - discriminant.sqrt()) / a;
    if t < 0.0 {
        None
    } else {
        Some(t)
    }
}
