use nalgebra::{DMatrix, DVector, Vector4};

use super::params::QuadParams;
use crate::utils::errors::{Result, SimError};

const INVERSE_TOLERANCE: f32 = 1e-4;

/// The 4 x n control-allocation matrix and its (pseudo-)inverse.
///
/// Rows map per-rotor forces to (collective thrust, roll, pitch, yaw
/// moments): row 0 is all ones, row 1 the rotor y offsets, row 2 the negated
/// x offsets, and row 3 the spin direction scaled by the torque/thrust
/// ratio. The inverse maps a commanded wrench back to rotor forces.
#[derive(Debug, Clone)]
pub struct ControlAllocation {
    forces_to_wrench: DMatrix<f32>,
    wrench_to_forces: DMatrix<f32>,
}

impl ControlAllocation {
    pub fn new(params: &QuadParams) -> Result<Self> {
        params.geometry.validate()?;
        params.rotor.validate()?;

        let n = params.geometry.n_rotors();
        let k = params.rotor.torque_thrust_ratio();

        let forces_to_wrench = DMatrix::from_fn(4, n, |row, i| {
            let position = &params.geometry.rotor_positions[i];
            match row {
                0 => 1.0,
                1 => position.y,
                2 => -position.x,
                _ => params.geometry.rotor_directions[i] * k,
            }
        });

        let wrench_to_forces = if n == 4 {
            forces_to_wrench
                .clone()
                .try_inverse()
                .ok_or_else(|| SimError::numeric("control allocation matrix is singular"))?
        } else {
            forces_to_wrench
                .clone()
                .pseudo_inverse(1e-7)
                .map_err(|_| SimError::numeric("control allocation pseudo-inverse failed"))?
        };

        let allocation = Self {
            forces_to_wrench,
            wrench_to_forces,
        };
        allocation.check_inverse()?;
        Ok(allocation)
    }

    /// `A * A^-1` must reproduce the identity to within tolerance.
    fn check_inverse(&self) -> Result<()> {
        let product = &self.forces_to_wrench * &self.wrench_to_forces;
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                if (product[(i, j)] - expected).abs() > INVERSE_TOLERANCE {
                    return Err(SimError::numeric(format!(
                        "control allocation inverse check failed at ({}, {}): {}",
                        i,
                        j,
                        product[(i, j)]
                    )));
                }
            }
        }
        Ok(())
    }

    #[inline]
    pub fn n_rotors(&self) -> usize {
        self.forces_to_wrench.ncols()
    }

    /// Map per-rotor forces to (thrust, roll, pitch, yaw).
    pub fn wrench_from_forces(&self, forces: &DVector<f32>) -> Vector4<f32> {
        let wrench = &self.forces_to_wrench * forces;
        Vector4::new(wrench[0], wrench[1], wrench[2], wrench[3])
    }

    /// Map a commanded (thrust, roll, pitch, yaw) to per-rotor forces.
    pub fn forces_from_wrench(&self, wrench: &Vector4<f32>) -> DVector<f32> {
        &self.wrench_to_forces * DVector::from_column_slice(wrench.as_slice())
    }

    pub fn matrix(&self) -> &DMatrix<f32> {
        &self.forces_to_wrench
    }

    pub fn inverse(&self) -> &DMatrix<f32> {
        &self.wrench_to_forces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drones::params::QuadParams;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_hummingbird_allocation_identity() {
        let allocation = ControlAllocation::new(&QuadParams::hummingbird()).unwrap();
        let product = allocation.matrix() * allocation.inverse();
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(product[(i, j)], expected, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_wrench_roundtrip() {
        let allocation = ControlAllocation::new(&QuadParams::hummingbird()).unwrap();
        let wrench = Vector4::new(4.9, 0.02, -0.015, 0.001);
        let forces = allocation.forces_from_wrench(&wrench);
        let recovered = allocation.wrench_from_forces(&forces);
        for i in 0..4 {
            assert_relative_eq!(recovered[i], wrench[i], epsilon = 1e-4);
        }
    }

    #[test]
    fn test_equal_forces_make_pure_thrust() {
        let allocation = ControlAllocation::new(&QuadParams::hummingbird()).unwrap();
        let forces = DVector::from_element(4, 1.25);
        let wrench = allocation.wrench_from_forces(&forces);
        assert_relative_eq!(wrench[0], 5.0, epsilon = 1e-5);
        assert_relative_eq!(wrench[1], 0.0, epsilon = 1e-5);
        assert_relative_eq!(wrench[2], 0.0, epsilon = 1e-5);
        assert_relative_eq!(wrench[3], 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_colinear_rotors_are_singular() {
        let mut params = QuadParams::hummingbird();
        // All rotors on the x axis with the same spin: no yaw or roll authority.
        params.geometry.rotor_positions = vec![
            Vector3::new(0.1, 0.0, 0.0),
            Vector3::new(0.2, 0.0, 0.0),
            Vector3::new(-0.1, 0.0, 0.0),
            Vector3::new(-0.2, 0.0, 0.0),
        ];
        params.geometry.rotor_directions = vec![1.0, 1.0, 1.0, 1.0];
        assert!(ControlAllocation::new(&params).is_err());
    }
}
