use nalgebra::{Matrix3, UnitQuaternion, Vector3};

use crate::utils::errors::{Result, SimError};

/// Surface material used by the contact solver. Pair values are averaged.
#[derive(Debug, Clone, Copy)]
pub struct Material {
    pub friction: f32,
    pub restitution: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            friction: 0.7,
            restitution: 0.2,
        }
    }
}

/// A single rigid body: pose, twist, mass properties, and per-step force
/// accumulators. Angular velocity is stored in the world frame; the drone
/// layer converts to body rates at its sync boundary.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub position: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
    pub linear_velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,

    pub mass: f32,
    pub inverse_mass: f32,
    pub local_inverse_inertia: Matrix3<f32>,
    pub world_inverse_inertia: Matrix3<f32>,

    force: Vector3<f32>,
    torque: Vector3<f32>,

    pub material: Material,
    pub active: bool,
    pub is_static: bool,
}

impl RigidBody {
    /// A dynamic body with the given mass and local inertia tensor.
    pub fn new_dynamic(mass: f32, local_inertia: Matrix3<f32>) -> Result<Self> {
        if !(mass.is_finite() && mass > 0.0) {
            return Err(SimError::validation("mass must be positive and finite"));
        }
        let local_inverse_inertia = local_inertia
            .try_inverse()
            .ok_or_else(|| SimError::numeric("inertia tensor is singular"))?;

        let mut body = Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            mass,
            inverse_mass: 1.0 / mass,
            local_inverse_inertia,
            world_inverse_inertia: local_inverse_inertia,
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
            material: Material::default(),
            active: true,
            is_static: false,
        };
        body.update_world_inertia();
        Ok(body)
    }

    /// An immovable body: zero inverse mass and inertia, inactive.
    pub fn new_static() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            mass: 0.0,
            inverse_mass: 0.0,
            local_inverse_inertia: Matrix3::zeros(),
            world_inverse_inertia: Matrix3::zeros(),
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
            material: Material::default(),
            active: false,
            is_static: true,
        }
    }

    #[inline]
    pub fn rotation(&self) -> Matrix3<f32> {
        self.orientation.to_rotation_matrix().into_inner()
    }

    /// Apply a world-frame force through the center of mass.
    pub fn apply_central_force(&mut self, force: Vector3<f32>) {
        if self.is_static {
            return;
        }
        self.force += force;
        self.active = true;
    }

    /// Apply a world-frame torque.
    pub fn apply_torque(&mut self, torque: Vector3<f32>) {
        if self.is_static {
            return;
        }
        self.torque += torque;
        self.active = true;
    }

    /// Apply a world-frame force at a world-space point.
    pub fn apply_force_at_point(&mut self, force: Vector3<f32>, point: Vector3<f32>) {
        if self.is_static {
            return;
        }
        self.force += force;
        self.torque += (point - self.position).cross(&force);
        self.active = true;
    }

    /// Instantaneous velocity change from an impulse at offset `r` from the
    /// center of mass (both world frame).
    pub fn apply_impulse(&mut self, impulse: &Vector3<f32>, r: &Vector3<f32>) {
        if self.is_static {
            return;
        }
        self.linear_velocity += self.inverse_mass * impulse;
        self.angular_velocity += self.world_inverse_inertia * r.cross(impulse);
    }

    /// Velocity of the material point at world offset `r` from the center.
    #[inline]
    pub fn velocity_at(&self, r: &Vector3<f32>) -> Vector3<f32> {
        self.linear_velocity + self.angular_velocity.cross(r)
    }

    pub fn update_world_inertia(&mut self) {
        let r = self.rotation();
        self.world_inverse_inertia = r * self.local_inverse_inertia * r.transpose();
    }

    /// Semi-implicit Euler step. Gravity enters here as a uniform
    /// acceleration so that force accumulators only carry external wrenches.
    pub fn integrate(&mut self, dt: f32, gravity: &Vector3<f32>) {
        if self.is_static || !self.active {
            return;
        }

        self.linear_velocity += (self.inverse_mass * self.force + gravity) * dt;
        self.angular_velocity += self.world_inverse_inertia * (self.torque * dt);

        self.position += self.linear_velocity * dt;

        let angular_speed = self.angular_velocity.norm();
        if angular_speed > 1e-8 {
            let rotation = UnitQuaternion::from_scaled_axis(self.angular_velocity * dt);
            self.orientation = rotation * self.orientation;
        }
        self.orientation = UnitQuaternion::new_normalize(self.orientation.into_inner());

        self.update_world_inertia();
    }

    #[inline]
    pub fn force(&self) -> &Vector3<f32> {
        &self.force
    }

    #[inline]
    pub fn torque(&self) -> &Vector3<f32> {
        &self.torque
    }

    pub fn clear_accumulators(&mut self) {
        self.force = Vector3::zeros();
        self.torque = Vector3::zeros();
    }
}
