use nalgebra::{Quaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::utils::errors::{Result, SimError};
use crate::utils::math::{ensure_finite3, is_finite_quat};

/// Control abstraction levels, highest-rate first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlMode {
    /// Direct rotor speed commands.
    MotorSpeeds,
    /// Per-rotor thrust commands.
    MotorThrusts,
    /// Collective thrust plus desired body rates.
    CollectiveThrustBodyRates,
    /// Collective thrust plus desired body moments.
    CollectiveThrustBodyMoments,
    /// Collective thrust plus a target attitude.
    CollectiveThrustAttitude,
    /// World-frame velocity command.
    Velocity,
    /// World-frame acceleration command (gravity-compensated by the caller).
    Acceleration,
}

/// Complete internal state of one vehicle.
///
/// The quaternion is stored (x, y, z, w); `body_rates` are body-frame
/// angular rates; `wind` is the world-frame wind evaluated at the vehicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroneState {
    pub position: Vector3<f32>,
    pub velocity: Vector3<f32>,
    pub orientation: Quaternion<f32>,
    pub body_rates: Vector3<f32>,
    pub wind: Vector3<f32>,
    pub rotor_speeds: Vec<f32>,
}

impl DroneState {
    pub fn at_rest(position: Vector3<f32>, n_rotors: usize) -> Self {
        Self {
            position,
            velocity: Vector3::zeros(),
            orientation: Quaternion::new(1.0, 0.0, 0.0, 0.0),
            body_rates: Vector3::zeros(),
            wind: Vector3::zeros(),
            rotor_speeds: vec![0.0; n_rotors],
        }
    }

    /// At rest with all rotors at a common speed (e.g. the hover speed).
    pub fn hovering(position: Vector3<f32>, n_rotors: usize, rotor_speed: f32) -> Self {
        Self {
            rotor_speeds: vec![rotor_speed; n_rotors],
            ..Self::at_rest(position, n_rotors)
        }
    }

    /// Overwrite the kinematic state from the rigid-body side. Velocity is
    /// world frame, rates are body frame; rotor speeds and wind are left
    /// untouched.
    pub fn sync_from_physics(
        &mut self,
        position: Vector3<f32>,
        orientation: Quaternion<f32>,
        velocity: Vector3<f32>,
        body_rates: Vector3<f32>,
    ) {
        self.position = position;
        self.orientation = orientation;
        self.velocity = velocity;
        self.body_rates = body_rates;
    }

    /// Dual of [`Self::sync_from_physics`].
    pub fn physics_state(
        &self,
    ) -> (Vector3<f32>, Quaternion<f32>, Vector3<f32>, Vector3<f32>) {
        (
            self.position,
            self.orientation,
            self.velocity,
            self.body_rates,
        )
    }
}

/// Desired flat outputs handed to the controller each tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FlatOutput {
    pub position: Vector3<f32>,
    pub velocity: Vector3<f32>,
    pub acceleration: Vector3<f32>,
    pub jerk: Vector3<f32>,
    pub snap: Vector3<f32>,
    pub yaw: f32,
    pub yaw_rate: f32,
    pub yaw_acceleration: f32,
}

impl Default for FlatOutput {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            acceleration: Vector3::zeros(),
            jerk: Vector3::zeros(),
            snap: Vector3::zeros(),
            yaw: 0.0,
            yaw_rate: 0.0,
            yaw_acceleration: 0.0,
        }
    }
}

impl FlatOutput {
    pub fn validate(&self) -> Result<()> {
        ensure_finite3(&self.position, "flat output position")?;
        ensure_finite3(&self.velocity, "flat output velocity")?;
        ensure_finite3(&self.acceleration, "flat output acceleration")?;
        ensure_finite3(&self.jerk, "flat output jerk")?;
        ensure_finite3(&self.snap, "flat output snap")?;
        if !self.yaw.is_finite() || !self.yaw_rate.is_finite() || !self.yaw_acceleration.is_finite()
        {
            return Err(SimError::validation("flat output yaw terms are not finite"));
        }
        Ok(())
    }
}

/// Command for one step; which fields are meaningful depends on `mode`.
#[derive(Debug, Clone)]
pub struct ControlInput {
    pub mode: ControlMode,
    pub motor_speeds: Vec<f32>,
    pub motor_thrusts: Vec<f32>,
    pub collective_thrust: f32,
    pub body_rates: Vector3<f32>,
    pub body_moments: Vector3<f32>,
    pub target_attitude: Quaternion<f32>,
    pub target_velocity: Vector3<f32>,
    pub target_acceleration: Vector3<f32>,
}

impl ControlInput {
    fn empty(mode: ControlMode) -> Self {
        Self {
            mode,
            motor_speeds: Vec::new(),
            motor_thrusts: Vec::new(),
            collective_thrust: 0.0,
            body_rates: Vector3::zeros(),
            body_moments: Vector3::zeros(),
            target_attitude: Quaternion::new(1.0, 0.0, 0.0, 0.0),
            target_velocity: Vector3::zeros(),
            target_acceleration: Vector3::zeros(),
        }
    }

    pub fn motor_speeds(speeds: Vec<f32>) -> Self {
        Self {
            motor_speeds: speeds,
            ..Self::empty(ControlMode::MotorSpeeds)
        }
    }

    pub fn motor_thrusts(thrusts: Vec<f32>) -> Self {
        Self {
            motor_thrusts: thrusts,
            ..Self::empty(ControlMode::MotorThrusts)
        }
    }

    pub fn collective_thrust_body_rates(thrust: f32, rates: Vector3<f32>) -> Self {
        Self {
            collective_thrust: thrust,
            body_rates: rates,
            ..Self::empty(ControlMode::CollectiveThrustBodyRates)
        }
    }

    pub fn collective_thrust_body_moments(thrust: f32, moments: Vector3<f32>) -> Self {
        Self {
            collective_thrust: thrust,
            body_moments: moments,
            ..Self::empty(ControlMode::CollectiveThrustBodyMoments)
        }
    }

    pub fn collective_thrust_attitude(thrust: f32, attitude: Quaternion<f32>) -> Self {
        Self {
            collective_thrust: thrust,
            target_attitude: attitude,
            ..Self::empty(ControlMode::CollectiveThrustAttitude)
        }
    }

    pub fn velocity(target: Vector3<f32>) -> Self {
        Self {
            target_velocity: target,
            ..Self::empty(ControlMode::Velocity)
        }
    }

    pub fn acceleration(target: Vector3<f32>) -> Self {
        Self {
            target_acceleration: target,
            ..Self::empty(ControlMode::Acceleration)
        }
    }

    /// Mode-specific finiteness and dimension checks.
    pub fn validate(&self, n_rotors: usize) -> Result<()> {
        match self.mode {
            ControlMode::MotorSpeeds => {
                if self.motor_speeds.len() != n_rotors {
                    return Err(SimError::validation(format!(
                        "expected {} motor speeds, got {}",
                        n_rotors,
                        self.motor_speeds.len()
                    )));
                }
                if self.motor_speeds.iter().any(|s| !s.is_finite()) {
                    return Err(SimError::validation("non-finite motor speed"));
                }
            }
            ControlMode::MotorThrusts => {
                if self.motor_thrusts.len() != n_rotors {
                    return Err(SimError::validation(format!(
                        "expected {} motor thrusts, got {}",
                        n_rotors,
                        self.motor_thrusts.len()
                    )));
                }
                if self.motor_thrusts.iter().any(|t| !t.is_finite()) {
                    return Err(SimError::validation("non-finite motor thrust"));
                }
            }
            ControlMode::CollectiveThrustBodyRates => {
                if !self.collective_thrust.is_finite() {
                    return Err(SimError::validation("non-finite collective thrust"));
                }
                ensure_finite3(&self.body_rates, "body rates")?;
            }
            ControlMode::CollectiveThrustBodyMoments => {
                if !self.collective_thrust.is_finite() {
                    return Err(SimError::validation("non-finite collective thrust"));
                }
                ensure_finite3(&self.body_moments, "body moments")?;
            }
            ControlMode::CollectiveThrustAttitude => {
                if !self.collective_thrust.is_finite() {
                    return Err(SimError::validation("non-finite collective thrust"));
                }
                if !is_finite_quat(&self.target_attitude) {
                    return Err(SimError::validation("non-finite target attitude"));
                }
                let norm = self.target_attitude.norm();
                if (norm - 1.0).abs() > 1e-3 {
                    return Err(SimError::validation(format!(
                        "target attitude quaternion not normalized (norm {})",
                        norm
                    )));
                }
            }
            ControlMode::Velocity => {
                ensure_finite3(&self.target_velocity, "target velocity")?;
            }
            ControlMode::Acceleration => {
                ensure_finite3(&self.target_acceleration, "target acceleration")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_validation_catches_dimension() {
        let input = ControlInput::motor_speeds(vec![100.0, 100.0]);
        assert!(input.validate(4).is_err());
        let input = ControlInput::motor_speeds(vec![100.0; 4]);
        assert!(input.validate(4).is_ok());
    }

    #[test]
    fn test_control_validation_catches_nan() {
        let input = ControlInput::collective_thrust_body_moments(
            f32::NAN,
            Vector3::zeros(),
        );
        assert!(input.validate(4).is_err());
    }

    #[test]
    fn test_attitude_mode_requires_unit_quaternion() {
        let bad = ControlInput::collective_thrust_attitude(
            5.0,
            Quaternion::new(2.0, 0.0, 0.0, 0.0),
        );
        assert!(bad.validate(4).is_err());

        let good = ControlInput::collective_thrust_attitude(
            5.0,
            Quaternion::new(1.0, 0.0, 0.0, 0.0),
        );
        assert!(good.validate(4).is_ok());
    }

    #[test]
    fn test_flat_output_validation() {
        let mut flat = FlatOutput::default();
        assert!(flat.validate().is_ok());
        flat.acceleration.x = f32::INFINITY;
        assert!(flat.validate().is_err());
    }
}
