use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::physics::{PhysicsSettings, SolverSettings};
use crate::utils::constants::{
    AABB_MARGIN, BAUMGARTE_FACTOR, GRAVITY, MIN_VELOCITY_ITERATIONS, PENETRATION_SLOP,
    SLEEP_ANGULAR_THRESHOLD, SLEEP_LINEAR_THRESHOLD, VELOCITY_ITERATIONS,
};
use crate::utils::errors::{Result, SimError};

/// World-level configuration, loadable from YAML.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    pub gravity: Vector3<f32>,
    pub air_density: f32,
    pub enable_collisions: bool,
    pub broad_phase_margin: f32,
    pub solver_iterations: usize,
    pub min_solver_iterations: usize,
    pub baumgarte: f32,
    pub penetration_slop: f32,
    pub sleep_linear_threshold: f32,
    pub sleep_angular_threshold: f32,
    /// Master seed for noise, gusts, and chaotic trajectories.
    pub seed: u64,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            gravity: Vector3::new(0.0, 0.0, -GRAVITY),
            air_density: 1.225,
            enable_collisions: true,
            broad_phase_margin: AABB_MARGIN,
            solver_iterations: VELOCITY_ITERATIONS,
            min_solver_iterations: MIN_VELOCITY_ITERATIONS,
            baumgarte: BAUMGARTE_FACTOR,
            penetration_slop: PENETRATION_SLOP,
            sleep_linear_threshold: SLEEP_LINEAR_THRESHOLD,
            sleep_angular_threshold: SLEEP_ANGULAR_THRESHOLD,
            seed: 0,
        }
    }
}

impl WorldSettings {
    pub fn validate(&self) -> Result<()> {
        if self.broad_phase_margin <= 0.0 {
            return Err(SimError::validation("broad-phase margin must be positive"));
        }
        if self.solver_iterations == 0 {
            return Err(SimError::validation("solver needs at least one iteration"));
        }
        if self.penetration_slop < 0.0 {
            return Err(SimError::validation("penetration slop must not be negative"));
        }
        Ok(())
    }

    pub(crate) fn physics_settings(&self) -> PhysicsSettings {
        PhysicsSettings {
            gravity: self.gravity,
            broad_phase_margin: self.broad_phase_margin,
            enable_collisions: self.enable_collisions,
            solver: SolverSettings {
                velocity_iterations: self.solver_iterations,
                min_velocity_iterations: self.min_solver_iterations,
                baumgarte: self.baumgarte,
                penetration_slop: self.penetration_slop,
            },
            sleep_linear_threshold: self.sleep_linear_threshold,
            sleep_angular_threshold: self.sleep_angular_threshold,
        }
    }
}
