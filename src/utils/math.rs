use nalgebra::{Matrix3, Quaternion, UnitQuaternion, Vector3};

use crate::utils::errors::{Result, SimError};

/// Map a vector to its skew-symmetric cross-product matrix.
#[inline]
pub fn hat(v: &Vector3<f32>) -> Matrix3<f32> {
    Matrix3::new(
        0.0, -v.z, v.y, //
        v.z, 0.0, -v.x, //
        -v.y, v.x, 0.0,
    )
}

/// Inverse of [`hat`]: extract the vector from a skew-symmetric matrix.
#[inline]
pub fn vee(m: &Matrix3<f32>) -> Vector3<f32> {
    Vector3::new(m[(2, 1)], m[(0, 2)], m[(1, 0)])
}

/// Rotation matrix (body to world) from a possibly drifted quaternion.
#[inline]
pub fn quat_to_rotation(q: &Quaternion<f32>) -> Matrix3<f32> {
    UnitQuaternion::from_quaternion(*q)
        .to_rotation_matrix()
        .into_inner()
}

/// Quaternion kinematics: `q_dot = 0.5 * G(q)^T * omega` with body-frame
/// rates, plus a gradient step against `|q|^2 - 1` to suppress norm drift
/// before the post-integration renormalization.
pub fn quat_derivative(q: &Quaternion<f32>, omega: &Vector3<f32>) -> Quaternion<f32> {
    let (qx, qy, qz, qw) = (q.i, q.j, q.k, q.w);
    let (wx, wy, wz) = (omega.x, omega.y, omega.z);

    let mut dw = 0.5 * (-wx * qx - wy * qy - wz * qz);
    let mut dx = 0.5 * (wx * qw + wz * qy - wy * qz);
    let mut dy = 0.5 * (wy * qw - wz * qx + wx * qz);
    let mut dz = 0.5 * (wz * qw + wy * qx - wx * qy);

    let norm_error = (qx * qx + qy * qy + qz * qz + qw * qw) - 1.0;
    dx -= norm_error * 2.0 * qx;
    dy -= norm_error * 2.0 * qy;
    dz -= norm_error * 2.0 * qz;
    dw -= norm_error * 2.0 * qw;

    Quaternion::new(dw, dx, dy, dz)
}

/// Check that a matrix is a proper rotation: orthogonal and determinant one.
pub fn validate_rotation(r: &Matrix3<f32>) -> Result<()> {
    const ORTHOGONALITY_TOLERANCE: f32 = 1e-6;
    const DETERMINANT_TOLERANCE: f32 = 1e-6;

    let rrt = r * r.transpose();
    for i in 0..3 {
        for j in 0..3 {
            let expected = if i == j { 1.0 } else { 0.0 };
            if (rrt[(i, j)] - expected).abs() > ORTHOGONALITY_TOLERANCE {
                return Err(SimError::validation("rotation matrix is not orthogonal"));
            }
        }
    }

    if (r.determinant() - 1.0).abs() > DETERMINANT_TOLERANCE {
        return Err(SimError::validation("rotation matrix determinant is not 1"));
    }

    Ok(())
}

#[inline]
pub fn is_finite3(v: &Vector3<f32>) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

#[inline]
pub fn is_finite_quat(q: &Quaternion<f32>) -> bool {
    q.i.is_finite() && q.j.is_finite() && q.k.is_finite() && q.w.is_finite()
}

/// Validate a vector is finite, naming it in the error message.
pub fn ensure_finite3(v: &Vector3<f32>, name: &str) -> Result<()> {
    if is_finite3(v) {
        Ok(())
    } else {
        Err(SimError::validation(format!(
            "{} contains non-finite values",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_3;

    #[test]
    fn test_hat_vee_roundtrip() {
        let v = Vector3::new(0.3, -1.2, 2.5);
        let recovered = vee(&hat(&v));
        assert_relative_eq!(recovered.x, v.x, epsilon = 1e-7);
        assert_relative_eq!(recovered.y, v.y, epsilon = 1e-7);
        assert_relative_eq!(recovered.z, v.z, epsilon = 1e-7);
    }

    #[test]
    fn test_hat_matches_cross_product() {
        let a = Vector3::new(1.0, 2.0, 3.0);
        let b = Vector3::new(-0.5, 0.25, 4.0);
        let via_hat = hat(&a) * b;
        let direct = a.cross(&b);
        assert_relative_eq!((via_hat - direct).norm(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_quat_rotation_roundtrip() {
        let q = UnitQuaternion::from_euler_angles(0.4, -0.2, FRAC_PI_3);
        let r = quat_to_rotation(&q.into_inner());
        let back = UnitQuaternion::from_rotation_matrix(&nalgebra::Rotation3::from_matrix_unchecked(r));
        assert!(q.angle_to(&back) < 1e-5);
    }

    #[test]
    fn test_quat_derivative_preserves_norm_at_unit() {
        // At a unit quaternion, d/dt |q|^2 = 2 q . q_dot = 0.
        let q = UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3).into_inner();
        let omega = Vector3::new(0.7, -0.3, 1.1);
        let dq = quat_derivative(&q, &omega);
        let dot = q.i * dq.i + q.j * dq.j + q.k * dq.k + q.w * dq.w;
        assert_relative_eq!(dot, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_quat_derivative_corrects_drift() {
        // An inflated quaternion gets pulled back toward the unit sphere.
        let q = Quaternion::new(1.01, 0.0, 0.0, 0.0);
        let dq = quat_derivative(&q, &Vector3::zeros());
        assert!(dq.w < 0.0);
    }

    #[test]
    fn test_validate_rotation_accepts_identity() {
        assert!(validate_rotation(&Matrix3::identity()).is_ok());
    }

    #[test]
    fn test_validate_rotation_rejects_scaled() {
        let scaled = Matrix3::identity() * 1.5;
        assert!(validate_rotation(&scaled).is_err());
    }

    #[test]
    fn test_validate_rotation_rejects_reflection() {
        let mut reflection = Matrix3::identity();
        reflection[(2, 2)] = -1.0;
        assert!(validate_rotation(&reflection).is_err());
    }
}
