use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3, Vector4};

use super::allocation::ControlAllocation;
use super::params::QuadParams;
use super::types::{ControlInput, ControlMode, DroneState, FlatOutput};
use crate::utils::constants::GRAVITY;
use crate::utils::errors::{Result, SimError};
use crate::utils::math::{quat_to_rotation, validate_rotation, vee};

/// SE(3) geometric tracking controller.
///
/// Maps desired flat outputs plus the current state to a command at the
/// configured abstraction level: thrust and attitude, thrust and moments,
/// rotor thrusts, or raw rotor speeds via the allocation matrix.
pub struct Se3Controller {
    params: QuadParams,
    allocation: ControlAllocation,
    inertia: Matrix3<f32>,
}

impl Se3Controller {
    pub fn new(params: QuadParams) -> Result<Self> {
        params.validate()?;
        let allocation = ControlAllocation::new(&params)?;
        let inertia = params.inertia.inertia_matrix();
        Ok(Self {
            params,
            allocation,
            inertia,
        })
    }

    /// Desired world-frame force from the position/velocity errors, the
    /// acceleration feedforward, and gravity compensation.
    fn desired_force(&self, state: &DroneState, flat: &FlatOutput) -> Vector3<f32> {
        let gains = &self.params.gains;
        let position_error = state.position - flat.position;
        let velocity_error = state.velocity - flat.velocity;

        self.params.inertia.mass
            * (-gains.kp_pos.component_mul(&position_error)
                - gains.kd_pos.component_mul(&velocity_error)
                + flat.acceleration
                + Vector3::new(0.0, 0.0, GRAVITY))
    }

    /// Desired attitude: body z along the desired force, body x as close to
    /// the yaw heading as the tilt allows.
    fn desired_rotation(force_des: &Vector3<f32>, yaw_des: f32) -> Result<Matrix3<f32>> {
        let norm = force_des.norm();
        if norm < 1e-6 {
            return Err(SimError::numeric("desired force vanishes"));
        }
        let b3_des = force_des / norm;

        let c1_des = Vector3::new(yaw_des.cos(), yaw_des.sin(), 0.0);
        let b2_des = b3_des.cross(&c1_des);
        let b2_norm = b2_des.norm();
        if b2_norm < 1e-6 {
            return Err(SimError::numeric(
                "desired thrust direction is parallel to the heading",
            ));
        }
        let b2_des = b2_des / b2_norm;
        let b1_des = b2_des.cross(&b3_des);

        let r_des = Matrix3::from_columns(&[b1_des, b2_des, b3_des]);
        validate_rotation(&r_des)?;
        Ok(r_des)
    }

    /// `e_R = 0.5 vee(R_des^T R - R^T R_des)`.
    fn attitude_error(r: &Matrix3<f32>, r_des: &Matrix3<f32>) -> Vector3<f32> {
        let skew = 0.5 * (r_des.transpose() * r - r.transpose() * r_des);
        vee(&skew)
    }

    /// Attitude PD with yaw-rate feedforward and gyroscopic compensation.
    fn command_moments(
        &self,
        attitude_error: &Vector3<f32>,
        body_rates: &Vector3<f32>,
        body_rates_des: &Vector3<f32>,
    ) -> Vector3<f32> {
        let gains = &self.params.gains;
        let rate_error = body_rates - body_rates_des;
        self.inertia * (-gains.kp_att * attitude_error - gains.kd_att * rate_error)
            + body_rates.cross(&(self.inertia * body_rates))
    }

    fn validate_inputs(&self, state: &DroneState, flat: &FlatOutput) -> Result<()> {
        flat.validate()?;
        let norm = state.orientation.norm();
        if (norm - 1.0).abs() > 1e-3 {
            return Err(SimError::validation(format!(
                "state quaternion not normalized (norm {})",
                norm
            )));
        }
        Ok(())
    }

    /// Compute the command for `mode` given the current state and setpoint.
    pub fn compute(
        &self,
        mode: ControlMode,
        state: &DroneState,
        flat: &FlatOutput,
    ) -> Result<ControlInput> {
        self.validate_inputs(state, flat)?;

        let force_des = self.desired_force(state, flat);
        let r = quat_to_rotation(&state.orientation);
        let b3 = r.column(2).into_owned();
        let thrust = force_des.dot(&b3);

        match mode {
            ControlMode::Velocity => Ok(ControlInput::velocity(flat.velocity)),

            ControlMode::Acceleration => {
                // The dynamics layer multiplies by mass only; fold gravity
                // compensation into the commanded acceleration.
                Ok(ControlInput::acceleration(
                    force_des / self.params.inertia.mass,
                ))
            }

            ControlMode::CollectiveThrustAttitude => {
                let r_des = Self::desired_rotation(&force_des, flat.yaw)?;
                let q_des = UnitQuaternion::from_rotation_matrix(
                    &Rotation3::from_matrix_unchecked(r_des),
                );
                Ok(ControlInput::collective_thrust_attitude(
                    thrust,
                    q_des.into_inner(),
                ))
            }

            ControlMode::CollectiveThrustBodyRates => {
                let r_des = Self::desired_rotation(&force_des, flat.yaw)?;
                let attitude_error = Self::attitude_error(&r, &r_des);
                // Outer-loop rates: attitude P plus the yaw-rate feedforward.
                let rates = -self.params.gains.kp_att.sqrt() * attitude_error
                    + Vector3::new(0.0, 0.0, flat.yaw_rate);
                Ok(ControlInput::collective_thrust_body_rates(thrust, rates))
            }

            ControlMode::CollectiveThrustBodyMoments => {
                let r_des = Self::desired_rotation(&force_des, flat.yaw)?;
                let attitude_error = Self::attitude_error(&r, &r_des);
                let rates_des = Vector3::new(0.0, 0.0, flat.yaw_rate);
                let moments =
                    self.command_moments(&attitude_error, &state.body_rates, &rates_des);
                Ok(ControlInput::collective_thrust_body_moments(thrust, moments))
            }

            ControlMode::MotorThrusts => {
                let forces = self.rotor_forces(state, flat, &force_des, thrust, &r)?;
                Ok(ControlInput::motor_thrusts(forces))
            }

            ControlMode::MotorSpeeds => {
                let forces = self.rotor_forces(state, flat, &force_des, thrust, &r)?;
                let min = self.params.motor.rotor_speed_min;
                let max = self.params.motor.rotor_speed_max;
                let speeds = forces
                    .iter()
                    .map(|f| {
                        (f.abs() / self.params.rotor.k_eta)
                            .sqrt()
                            .copysign(*f)
                            .clamp(min, max)
                    })
                    .collect();
                Ok(ControlInput::motor_speeds(speeds))
            }
        }
    }

    /// Shared tail for the per-rotor modes: moments from the attitude error,
    /// then through the allocation inverse.
    fn rotor_forces(
        &self,
        state: &DroneState,
        flat: &FlatOutput,
        force_des: &Vector3<f32>,
        thrust: f32,
        r: &Matrix3<f32>,
    ) -> Result<Vec<f32>> {
        let r_des = Self::desired_rotation(force_des, flat.yaw)?;
        let attitude_error = Self::attitude_error(r, &r_des);
        let rates_des = Vector3::new(0.0, 0.0, flat.yaw_rate);
        let moments = self.command_moments(&attitude_error, &state.body_rates, &rates_des);

        let wrench = Vector4::new(thrust, moments.x, moments.y, moments.z);
        let forces = self.allocation.forces_from_wrench(&wrench);
        Ok(forces.iter().copied().collect())
    }
}
