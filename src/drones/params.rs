use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::utils::constants::GRAVITY;
use crate::utils::errors::{Result, SimError};

/// Mass and inertia of the airframe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InertiaProperties {
    /// Total mass [kg].
    pub mass: f32,
    /// Diagonal inertia terms [Ixx, Iyy, Izz] in kg m^2.
    pub principal_inertia: Vector3<f32>,
    /// Off-diagonal terms [Ixy, Iyz, Ixz] in kg m^2; zero for symmetric frames.
    pub product_inertia: Vector3<f32>,
}

impl InertiaProperties {
    pub fn inertia_matrix(&self) -> Matrix3<f32> {
        let p = &self.principal_inertia;
        let q = &self.product_inertia;
        Matrix3::new(
            p.x, q.x, q.z, //
            q.x, p.y, q.y, //
            q.z, q.y, p.z,
        )
    }

    pub fn weight(&self) -> Vector3<f32> {
        Vector3::new(0.0, 0.0, -self.mass * GRAVITY)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.mass.is_finite() && self.mass > 0.0) {
            return Err(SimError::validation("mass must be positive"));
        }
        if self.principal_inertia.x <= 0.0
            || self.principal_inertia.y <= 0.0
            || self.principal_inertia.z <= 0.0
        {
            return Err(SimError::validation(
                "principal moments of inertia must be positive",
            ));
        }
        Ok(())
    }
}

/// Rotor placement and spin directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometricProperties {
    /// Rotor hub positions relative to the center of mass, body frame [m].
    pub rotor_positions: Vec<Vector3<f32>>,
    /// +1 for counter-clockwise, -1 for clockwise (seen from above).
    pub rotor_directions: Vec<f32>,
}

impl GeometricProperties {
    #[inline]
    pub fn n_rotors(&self) -> usize {
        self.rotor_positions.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.rotor_positions.is_empty() {
            return Err(SimError::validation("at least one rotor required"));
        }
        if self.rotor_positions.len() != self.rotor_directions.len() {
            return Err(SimError::validation(
                "rotor position and direction counts differ",
            ));
        }
        for d in &self.rotor_directions {
            if *d != 1.0 && *d != -1.0 {
                return Err(SimError::validation("rotor direction must be +1 or -1"));
            }
        }
        Ok(())
    }
}

/// Per-rotor aerodynamic coefficients, shared across the rotor set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RotorProperties {
    /// Thrust coefficient: T = k_eta * omega^2 [N/(rad/s)^2].
    pub k_eta: f32,
    /// Reaction torque coefficient: M = k_m * omega^2 [Nm/(rad/s)^2].
    pub k_m: f32,
    /// Induced drag coefficient, in-plane [kg/rad].
    pub k_d: f32,
    /// Induced inflow coefficient, along the rotor axis [kg/rad].
    pub k_z: f32,
    /// Translational lift coefficient [kg/m].
    pub k_h: f32,
    /// Blade flapping moment coefficient [kg m/rad].
    pub k_flap: f32,
}

impl RotorProperties {
    #[inline]
    pub fn torque_thrust_ratio(&self) -> f32 {
        self.k_m / self.k_eta
    }

    /// diag(k_d, k_d, k_z), applied to the hub airspeed.
    pub fn rotor_drag_matrix(&self) -> Matrix3<f32> {
        Matrix3::from_diagonal(&Vector3::new(self.k_d, self.k_d, self.k_z))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.k_eta.is_finite() && self.k_eta > 1e-9) {
            return Err(SimError::validation("thrust coefficient too small"));
        }
        if !self.k_m.is_finite() {
            return Err(SimError::validation("torque coefficient must be finite"));
        }
        Ok(())
    }
}

/// Frame-level aerodynamics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AeroProperties {
    /// Parasitic drag per body axis [N/(m/s)^2].
    pub parasitic_drag: Vector3<f32>,
    /// Disable to fly in vacuum (thrust and reaction torque only).
    pub enable_aerodynamics: bool,
}

impl AeroProperties {
    pub fn drag_matrix(&self) -> Matrix3<f32> {
        Matrix3::from_diagonal(&self.parasitic_drag)
    }
}

/// First-order motor response and speed limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MotorProperties {
    /// Motor time constant [s].
    pub tau_m: f32,
    /// Minimum rotor speed [rad/s].
    pub rotor_speed_min: f32,
    /// Maximum rotor speed [rad/s].
    pub rotor_speed_max: f32,
    /// Standard deviation of per-step speed noise [rad/s]; zero disables.
    pub motor_noise_std: f32,
}

impl MotorProperties {
    pub fn validate(&self) -> Result<()> {
        if !(self.tau_m.is_finite() && self.tau_m > 0.0) {
            return Err(SimError::validation("motor time constant must be positive"));
        }
        if self.rotor_speed_min < 0.0 {
            return Err(SimError::validation("minimum rotor speed must not be negative"));
        }
        if self.rotor_speed_max <= self.rotor_speed_min {
            return Err(SimError::validation(
                "maximum rotor speed must exceed the minimum",
            ));
        }
        Ok(())
    }
}

/// Gains of the cascaded controller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ControlGains {
    /// Position proportional gains, per world axis.
    pub kp_pos: Vector3<f32>,
    /// Velocity (position-derivative) gains, per world axis.
    pub kd_pos: Vector3<f32>,
    /// Attitude proportional gain.
    pub kp_att: f32,
    /// Attitude derivative gain.
    pub kd_att: f32,
    /// Velocity-mode proportional gain, applied uniformly to all axes.
    pub kp_vel: f32,
    /// Body-rate proportional gain for the rate mode.
    pub k_w: f32,
}

impl Default for ControlGains {
    fn default() -> Self {
        Self {
            kp_pos: Vector3::new(6.5, 6.5, 15.0),
            kd_pos: Vector3::new(4.0, 4.0, 9.0),
            kp_att: 544.0,
            kd_att: 46.64,
            kp_vel: 0.65,
            k_w: 20.0,
        }
    }
}

impl ControlGains {
    pub fn validate(&self) -> Result<()> {
        let positive3 = |v: &Vector3<f32>| v.x > 0.0 && v.y > 0.0 && v.z > 0.0;
        if !positive3(&self.kp_pos) || !positive3(&self.kd_pos) {
            return Err(SimError::validation("position gains must be positive"));
        }
        if self.kp_att <= 0.0 || self.kd_att <= 0.0 || self.kp_vel <= 0.0 || self.k_w <= 0.0 {
            return Err(SimError::validation(
                "attitude and velocity gains must be positive",
            ));
        }
        Ok(())
    }
}

/// Everything that defines one quadrotor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuadParams {
    pub inertia: InertiaProperties,
    pub geometry: GeometricProperties,
    pub rotor: RotorProperties,
    pub aero: AeroProperties,
    pub motor: MotorProperties,
    pub gains: ControlGains,
}

impl QuadParams {
    pub fn validate(&self) -> Result<()> {
        self.inertia.validate()?;
        self.geometry.validate()?;
        self.rotor.validate()?;
        self.motor.validate()?;
        self.gains.validate()
    }

    /// Rotor speed that balances weight with all rotors level.
    pub fn hover_rotor_speed(&self) -> f32 {
        (self.inertia.mass * GRAVITY / (self.geometry.n_rotors() as f32 * self.rotor.k_eta))
            .sqrt()
    }

    /// The AscTec Hummingbird test vehicle: a 500 g X-configuration quad.
    pub fn hummingbird() -> Self {
        let arm = 0.17_f32 * std::f32::consts::FRAC_1_SQRT_2;
        Self {
            inertia: InertiaProperties {
                mass: 0.5,
                principal_inertia: Vector3::new(3.65e-3, 3.68e-3, 7.03e-3),
                product_inertia: Vector3::zeros(),
            },
            geometry: GeometricProperties {
                rotor_positions: vec![
                    Vector3::new(arm, arm, 0.0),
                    Vector3::new(-arm, arm, 0.0),
                    Vector3::new(-arm, -arm, 0.0),
                    Vector3::new(arm, -arm, 0.0),
                ],
                rotor_directions: vec![1.0, -1.0, 1.0, -1.0],
            },
            rotor: RotorProperties {
                k_eta: 5.57e-6,
                k_m: 1.36e-7,
                k_d: 1.19e-4,
                k_z: 2.32e-4,
                k_h: 3.39e-3,
                k_flap: 0.0,
            },
            aero: AeroProperties {
                parasitic_drag: Vector3::new(0.5e-2, 0.5e-2, 1e-2),
                enable_aerodynamics: true,
            },
            motor: MotorProperties {
                tau_m: 0.005,
                rotor_speed_min: 0.0,
                rotor_speed_max: 1500.0,
                motor_noise_std: 0.0,
            },
            gains: ControlGains::default(),
        }
    }
}
