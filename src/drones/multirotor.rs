use nalgebra::{DVector, Matrix3, Quaternion, Vector3, Vector4};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use super::allocation::ControlAllocation;
use super::params::QuadParams;
use super::types::{ControlInput, ControlMode, DroneState};
use crate::utils::errors::{Result, SimError};
use crate::utils::math::{ensure_finite3, quat_derivative, quat_to_rotation};
use crate::utils::rng::seeded_rng;

/// Time derivative of the drone state, plus the world-frame wrench the
/// rotors exert on the airframe (without gravity).
#[derive(Debug, Clone)]
pub struct StateDerivative {
    pub position_dot: Vector3<f32>,
    pub velocity_dot: Vector3<f32>,
    pub orientation_dot: Quaternion<f32>,
    pub body_rates_dot: Vector3<f32>,
    pub rotor_accelerations: Vec<f32>,
    pub force_world: Vector3<f32>,
    pub moment_world: Vector3<f32>,
}

/// Multirotor flight dynamics: rotor aerodynamics, first-order motor
/// response, and the per-mode command resolution down to rotor speeds.
pub struct Multirotor {
    params: QuadParams,
    allocation: ControlAllocation,
    inertia: Matrix3<f32>,
    inverse_inertia: Matrix3<f32>,
    mode: ControlMode,
    noise_rng: ChaCha8Rng,
}

impl Multirotor {
    pub fn new(params: QuadParams, mode: ControlMode) -> Result<Self> {
        Self::with_seed(params, mode, 0)
    }

    pub fn with_seed(params: QuadParams, mode: ControlMode, seed: u64) -> Result<Self> {
        params.validate()?;
        let allocation = ControlAllocation::new(&params)?;

        let inertia = params.inertia.inertia_matrix();
        let inverse_inertia = inertia
            .try_inverse()
            .ok_or_else(|| SimError::numeric("inertia matrix is singular"))?;

        Ok(Self {
            params,
            allocation,
            inertia,
            inverse_inertia,
            mode,
            noise_rng: seeded_rng(seed, "motor_noise"),
        })
    }

    #[inline]
    pub fn params(&self) -> &QuadParams {
        &self.params
    }

    #[inline]
    pub fn n_rotors(&self) -> usize {
        self.params.geometry.n_rotors()
    }

    #[inline]
    pub fn control_mode(&self) -> ControlMode {
        self.mode
    }

    pub fn set_control_mode(&mut self, mode: ControlMode) {
        self.mode = mode;
    }

    /// State checks shared by every entry point: dimensions, finiteness,
    /// quaternion norm, and rotor speed bounds.
    pub fn validate_state(&self, state: &DroneState) -> Result<()> {
        if state.rotor_speeds.len() != self.n_rotors() {
            return Err(SimError::validation(format!(
                "expected {} rotor speeds, got {}",
                self.n_rotors(),
                state.rotor_speeds.len()
            )));
        }

        let norm = state.orientation.norm();
        if (norm - 1.0).abs() > 1e-3 {
            return Err(SimError::validation(format!(
                "orientation quaternion not normalized (norm {})",
                norm
            )));
        }

        ensure_finite3(&state.position, "position")?;
        ensure_finite3(&state.velocity, "velocity")?;
        ensure_finite3(&state.body_rates, "body rates")?;
        ensure_finite3(&state.wind, "wind")?;

        let min = self.params.motor.rotor_speed_min;
        let max = self.params.motor.rotor_speed_max;
        for (i, speed) in state.rotor_speeds.iter().enumerate() {
            if !speed.is_finite() {
                return Err(SimError::validation(format!(
                    "non-finite rotor speed at index {}",
                    i
                )));
            }
            // Allow a whisker of slack for accumulated float error.
            if *speed < min - 1e-3 || *speed > max + 1e-3 {
                return Err(SimError::validation(format!(
                    "rotor {} speed {} outside [{}, {}]",
                    i, speed, min, max
                )));
            }
        }
        Ok(())
    }

    pub fn validate_control(&self, control: &ControlInput) -> Result<()> {
        if control.mode != self.mode {
            return Err(SimError::validation(format!(
                "control mode {:?} does not match configured mode {:?}",
                control.mode, self.mode
            )));
        }
        control.validate(self.n_rotors())
    }

    fn clamp_speeds(&self, speeds: &mut [f32]) {
        let min = self.params.motor.rotor_speed_min;
        let max = self.params.motor.rotor_speed_max;
        for speed in speeds {
            *speed = speed.clamp(min, max);
        }
    }

    /// Per-rotor force magnitudes to rotor speeds: `sign(f) sqrt(|f|/k_eta)`.
    fn speeds_from_forces(&self, forces: &DVector<f32>) -> Vec<f32> {
        forces
            .iter()
            .map(|f| (f.abs() / self.params.rotor.k_eta).sqrt().copysign(*f))
            .collect()
    }

    fn speeds_from_wrench(&self, thrust: f32, moment: &Vector3<f32>) -> Vec<f32> {
        let wrench = Vector4::new(thrust, moment.x, moment.y, moment.z);
        let forces = self.allocation.forces_from_wrench(&wrench);
        self.speeds_from_forces(&forces)
    }

    /// Attitude PD plus gyroscopic compensation.
    fn moment_from_attitude_error(
        &self,
        attitude_error: &Vector3<f32>,
        body_rates: &Vector3<f32>,
    ) -> Vector3<f32> {
        let gains = &self.params.gains;
        self.inertia * (-gains.kp_att * attitude_error - gains.kd_att * body_rates)
            + body_rates.cross(&(self.inertia * body_rates))
    }

    /// Resolve the control input to commanded rotor speeds for this mode.
    pub fn commanded_rotor_speeds(
        &self,
        state: &DroneState,
        control: &ControlInput,
    ) -> Result<Vec<f32>> {
        self.validate_state(state)?;
        self.validate_control(control)?;

        let mut speeds = match control.mode {
            ControlMode::MotorSpeeds => control.motor_speeds.clone(),

            ControlMode::MotorThrusts => {
                let forces = DVector::from_column_slice(&control.motor_thrusts);
                self.speeds_from_forces(&forces)
            }

            ControlMode::CollectiveThrustBodyRates => {
                let rate_error = state.body_rates - control.body_rates;
                let rates_dot_cmd = -self.params.gains.k_w * rate_error;
                let moment = self.inertia * rates_dot_cmd;
                self.speeds_from_wrench(control.collective_thrust, &moment)
            }

            ControlMode::CollectiveThrustBodyMoments => {
                self.speeds_from_wrench(control.collective_thrust, &control.body_moments)
            }

            ControlMode::CollectiveThrustAttitude => {
                let r = quat_to_rotation(&state.orientation);
                let r_des = quat_to_rotation(&control.target_attitude);
                let error =
                    0.5 * (r_des.transpose() * r - r.transpose() * r_des);
                let attitude_error = crate::utils::math::vee(&error);
                let moment = self.moment_from_attitude_error(&attitude_error, &state.body_rates);
                self.speeds_from_wrench(control.collective_thrust, &moment)
            }

            ControlMode::Velocity => {
                let velocity_error = state.velocity - control.target_velocity;
                let accel_cmd = -self.params.gains.kp_vel * velocity_error;
                let force_des = self.params.inertia.mass
                    * (accel_cmd + Vector3::new(0.0, 0.0, crate::utils::constants::GRAVITY));
                self.speeds_from_desired_force(state, &force_des)?
            }

            ControlMode::Acceleration => {
                let force_des = self.params.inertia.mass * control.target_acceleration;
                self.speeds_from_desired_force(state, &force_des)?
            }
        };

        self.clamp_speeds(&mut speeds);
        Ok(speeds)
    }

    /// Shared tail of the velocity and acceleration modes: align body z with
    /// the desired force, thrust from its projection, PD attitude moments.
    fn speeds_from_desired_force(
        &self,
        state: &DroneState,
        force_des: &Vector3<f32>,
    ) -> Result<Vec<f32>> {
        let r = quat_to_rotation(&state.orientation);
        let b3 = r.column(2).into_owned();
        let thrust = force_des.dot(&b3);

        let norm = force_des.norm();
        if norm < 1e-6 {
            return Err(SimError::numeric(
                "desired force is degenerate, cannot derive attitude",
            ));
        }

        let b3_des = force_des / norm;
        let c1_des = Vector3::new(1.0, 0.0, 0.0);
        let b2_des = b3_des.cross(&c1_des);
        let b2_norm = b2_des.norm();
        if b2_norm < 1e-6 {
            return Err(SimError::numeric("desired force is parallel to body x"));
        }
        let b2_des = b2_des / b2_norm;
        let b1_des = b2_des.cross(&b3_des);

        let r_des = Matrix3::from_columns(&[b1_des, b2_des, b3_des]);
        let error = 0.5 * (r_des.transpose() * r - r.transpose() * r_des);
        let attitude_error = crate::utils::math::vee(&error);
        let moment = self.moment_from_attitude_error(&attitude_error, &state.body_rates);

        Ok(self.speeds_from_wrench(thrust, &moment))
    }

    /// Aggregate rotor thrust, induced drag, flapping moments, reaction
    /// torques, and parasitic frame drag into a body-frame wrench.
    pub fn body_wrench(
        &self,
        body_rates: &Vector3<f32>,
        rotor_speeds: &[f32],
        body_airspeed: &Vector3<f32>,
    ) -> (Vector3<f32>, Vector3<f32>) {
        let rotor = &self.params.rotor;
        let aero = &self.params.aero;
        let z_unit = Vector3::new(0.0, 0.0, 1.0);

        let mut total_force = Vector3::zeros();
        let mut total_moment = Vector3::zeros();

        for (i, position) in self.params.geometry.rotor_positions.iter().enumerate() {
            let omega = rotor_speeds[i];
            let direction = self.params.geometry.rotor_directions[i];
            let local_airspeed = body_airspeed + body_rates.cross(position);

            let mut rotor_force = Vector3::new(0.0, 0.0, rotor.k_eta * omega * omega);

            if aero.enable_aerodynamics {
                // Induced drag at the hub.
                rotor_force -= omega * (rotor.rotor_drag_matrix() * local_airspeed);

                // Blade flapping tilts the thrust vector; the moment acts at
                // the hub.
                total_moment -= rotor.k_flap * omega * local_airspeed.cross(&z_unit);

                // Translational lift from in-plane airspeed.
                let planar = local_airspeed.x * local_airspeed.x
                    + local_airspeed.y * local_airspeed.y;
                rotor_force.z += rotor.k_h * planar;
            }

            total_force += rotor_force;
            total_moment += position.cross(&rotor_force);
            total_moment.z += direction * rotor.k_m * omega * omega;
        }

        if aero.enable_aerodynamics {
            let airspeed_magnitude = body_airspeed.norm();
            total_force -= airspeed_magnitude * (aero.drag_matrix() * body_airspeed);
        }

        (total_force, total_moment)
    }

    /// Full state derivative under the given commanded rotor speeds.
    pub fn state_derivatives(
        &self,
        state: &DroneState,
        cmd_rotor_speeds: &[f32],
    ) -> StateDerivative {
        let r = quat_to_rotation(&state.orientation);
        let body_airspeed = r.transpose() * (state.velocity - state.wind);

        let (force_body, moment_body) =
            self.body_wrench(&state.body_rates, &state.rotor_speeds, &body_airspeed);

        let force_world = r * force_body;
        let moment_world = r * moment_body;

        let gravity = Vector3::new(0.0, 0.0, -crate::utils::constants::GRAVITY);
        let velocity_dot = force_world / self.params.inertia.mass + gravity;

        let w = state.body_rates;
        let body_rates_dot =
            self.inverse_inertia * (moment_body - w.cross(&(self.inertia * w)));

        let tau_inv = 1.0 / self.params.motor.tau_m;
        let rotor_accelerations = state
            .rotor_speeds
            .iter()
            .zip(cmd_rotor_speeds)
            .map(|(current, cmd)| tau_inv * (cmd - current))
            .collect();

        StateDerivative {
            position_dot: state.velocity,
            velocity_dot,
            orientation_dot: quat_derivative(&state.orientation, &state.body_rates),
            body_rates_dot,
            rotor_accelerations,
            force_world,
            moment_world,
        }
    }

    /// Linear and angular acceleration under a control input, for sensor
    /// models.
    pub fn accelerations(
        &self,
        state: &DroneState,
        control: &ControlInput,
    ) -> Result<(Vector3<f32>, Vector3<f32>)> {
        let cmd = self.commanded_rotor_speeds(state, control)?;
        let derivative = self.state_derivatives(state, &cmd);
        Ok((derivative.velocity_dot, derivative.body_rates_dot))
    }

    /// One Euler step of the internal drone state. Returns the next state
    /// and the world-frame wrench to hand to the rigid body.
    pub fn step(
        &mut self,
        state: &DroneState,
        control: &ControlInput,
        dt: f32,
    ) -> Result<(DroneState, Vector3<f32>, Vector3<f32>)> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(SimError::validation("time step must be positive"));
        }

        let cmd_rotor_speeds = self.commanded_rotor_speeds(state, control)?;
        let derivative = self.state_derivatives(state, &cmd_rotor_speeds);

        let mut next = state.clone();
        next.position += derivative.position_dot * dt;
        next.velocity += derivative.velocity_dot * dt;
        next.body_rates += derivative.body_rates_dot * dt;
        for (speed, accel) in next
            .rotor_speeds
            .iter_mut()
            .zip(&derivative.rotor_accelerations)
        {
            *speed += accel * dt;
        }

        next.orientation = state.orientation + derivative.orientation_dot * dt;
        if next.orientation.norm() < 1e-6 {
            return Err(SimError::numeric("orientation collapsed to zero"));
        }
        next.orientation = next.orientation.normalize();

        // Per-step variance scales with dt.
        let noise_std = self.params.motor.motor_noise_std;
        if noise_std > 0.0 {
            let scale = noise_std * dt.sqrt();
            for speed in &mut next.rotor_speeds {
                let sample: f32 = self.noise_rng.sample(StandardNormal);
                *speed += sample * scale;
            }
        }

        self.clamp_speeds(&mut next.rotor_speeds);

        self.validate_state(&next)?;
        Ok((next, derivative.force_world, derivative.moment_world))
    }
}
