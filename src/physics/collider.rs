use nalgebra::{Matrix3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use super::aabb::Aabb;
use crate::utils::errors::{Result, SimError};

/// Convex collision shape, expressed in the collider's local frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ColliderShape {
    Box { half_extents: Vector3<f32> },
    Sphere { radius: f32 },
    ConvexHull { points: Vec<Vector3<f32>> },
}

impl ColliderShape {
    pub fn validate(&self) -> Result<()> {
        match self {
            ColliderShape::Box { half_extents } => {
                if half_extents.x <= 0.0 || half_extents.y <= 0.0 || half_extents.z <= 0.0 {
                    return Err(SimError::validation("box half extents must be positive"));
                }
            }
            ColliderShape::Sphere { radius } => {
                if *radius <= 0.0 {
                    return Err(SimError::validation("sphere radius must be positive"));
                }
            }
            ColliderShape::ConvexHull { points } => {
                if points.len() < 4 {
                    return Err(SimError::validation(
                        "convex hull needs at least four points",
                    ));
                }
            }
        }
        Ok(())
    }

    /// The vertex of the shape most extreme in `direction` (local frame).
    pub fn support(&self, direction: &Vector3<f32>) -> Vector3<f32> {
        match self {
            ColliderShape::Box { half_extents } => Vector3::new(
                if direction.x > 0.0 {
                    half_extents.x
                } else {
                    -half_extents.x
                },
                if direction.y > 0.0 {
                    half_extents.y
                } else {
                    -half_extents.y
                },
                if direction.z > 0.0 {
                    half_extents.z
                } else {
                    -half_extents.z
                },
            ),
            ColliderShape::Sphere { radius } => {
                let norm = direction.norm();
                if norm > 1e-12 {
                    direction * (radius / norm)
                } else {
                    Vector3::new(*radius, 0.0, 0.0)
                }
            }
            ColliderShape::ConvexHull { points } => {
                let mut best = points[0];
                let mut best_dot = best.dot(direction);
                for p in &points[1..] {
                    let d = p.dot(direction);
                    if d > best_dot {
                        best_dot = d;
                        best = *p;
                    }
                }
                best
            }
        }
    }

    pub fn volume(&self) -> f32 {
        match self {
            ColliderShape::Box { half_extents } => {
                8.0 * half_extents.x * half_extents.y * half_extents.z
            }
            ColliderShape::Sphere { radius } => {
                (4.0 / 3.0) * std::f32::consts::PI * radius.powi(3)
            }
            ColliderShape::ConvexHull { points } => {
                // Bounding-box estimate; hull colliders carry explicit mass.
                Aabb::from_points(points.iter()).volume()
            }
        }
    }

    /// Local inertia tensor for the given mass.
    pub fn local_inertia(&self, mass: f32) -> Matrix3<f32> {
        match self {
            ColliderShape::Box { half_extents } => {
                let x2 = half_extents.x * half_extents.x;
                let y2 = half_extents.y * half_extents.y;
                let z2 = half_extents.z * half_extents.z;
                Matrix3::from_diagonal(&Vector3::new(
                    mass * (y2 + z2) / 3.0,
                    mass * (x2 + z2) / 3.0,
                    mass * (x2 + y2) / 3.0,
                ))
            }
            ColliderShape::Sphere { radius } => {
                let diagonal = 0.4 * mass * radius * radius;
                Matrix3::from_diagonal(&Vector3::repeat(diagonal))
            }
            ColliderShape::ConvexHull { points } => {
                // Point-cloud approximation of the solid tensor.
                let n = points.len() as f32;
                let mut inertia = Matrix3::zeros();
                for v in points {
                    inertia[(0, 0)] += v.y * v.y + v.z * v.z;
                    inertia[(1, 1)] += v.x * v.x + v.z * v.z;
                    inertia[(2, 2)] += v.x * v.x + v.y * v.y;
                    inertia[(0, 1)] -= v.x * v.y;
                    inertia[(0, 2)] -= v.x * v.z;
                    inertia[(1, 2)] -= v.y * v.z;
                }
                inertia[(1, 0)] = inertia[(0, 1)];
                inertia[(2, 0)] = inertia[(0, 2)];
                inertia[(2, 1)] = inertia[(1, 2)];
                inertia * (mass / n)
            }
        }
    }
}

/// A collider instance: a shape attached to one rigid body at a local offset.
///
/// `node` is the broad-phase leaf holding this collider; it is a lookup
/// back-edge maintained by the physics world, not ownership.
#[derive(Debug, Clone)]
pub struct Collider {
    pub shape: ColliderShape,
    pub body: usize,
    pub local_center: Vector3<f32>,
    pub(crate) node: Option<u32>,
}

impl Collider {
    pub fn new(shape: ColliderShape, body: usize, local_center: Vector3<f32>) -> Self {
        Self {
            shape,
            body,
            local_center,
            node: None,
        }
    }

    /// World-space support point for the collider under the body pose.
    pub fn support_world(
        &self,
        position: &Vector3<f32>,
        orientation: &UnitQuaternion<f32>,
        world_dir: &Vector3<f32>,
    ) -> Vector3<f32> {
        let local_dir = orientation.inverse_transform_vector(world_dir);
        let local_point = self.local_center + self.shape.support(&local_dir);
        orientation.transform_vector(&local_point) + position
    }

    /// Tight world AABB from support points along the principal axes.
    pub fn tight_aabb(
        &self,
        position: &Vector3<f32>,
        orientation: &UnitQuaternion<f32>,
    ) -> Aabb {
        let axes = [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(-1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, -1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.0, 0.0, -1.0),
        ];

        let mut aabb = Aabb::empty();
        for axis in &axes {
            let support = self.support_world(position, orientation, axis);
            aabb.expand(&support);
        }
        aabb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_4;

    #[test]
    fn test_box_support_picks_corner() {
        let shape = ColliderShape::Box {
            half_extents: Vector3::new(1.0, 2.0, 3.0),
        };
        let s = shape.support(&Vector3::new(0.5, -0.1, 0.7));
        assert_eq!(s, Vector3::new(1.0, -2.0, 3.0));
    }

    #[test]
    fn test_sphere_support_on_surface() {
        let shape = ColliderShape::Sphere { radius: 2.0 };
        let s = shape.support(&Vector3::new(3.0, 4.0, 0.0));
        assert_relative_eq!(s.norm(), 2.0, epsilon = 1e-6);
        assert_relative_eq!(s.x, 1.2, epsilon = 1e-6);
        assert_relative_eq!(s.y, 1.6, epsilon = 1e-6);
    }

    #[test]
    fn test_hull_support_is_extreme_vertex() {
        let shape = ColliderShape::ConvexHull {
            points: vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
                Vector3::new(0.0, 0.0, 1.0),
            ],
        };
        let s = shape.support(&Vector3::new(1.0, 0.1, 0.1));
        assert_eq!(s, Vector3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_tight_aabb_of_rotated_box() {
        let collider = Collider::new(
            ColliderShape::Box {
                half_extents: Vector3::repeat(1.0),
            },
            0,
            Vector3::zeros(),
        );
        let orientation = UnitQuaternion::from_euler_angles(0.0, 0.0, FRAC_PI_4);
        let aabb = collider.tight_aabb(&Vector3::zeros(), &orientation);

        // A 45-degree yawed unit cube spans sqrt(2) horizontally.
        let expected = 2.0_f32.sqrt();
        assert_relative_eq!(aabb.max.x, expected, epsilon = 1e-5);
        assert_relative_eq!(aabb.max.y, expected, epsilon = 1e-5);
        assert_relative_eq!(aabb.max.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_tight_aabb_respects_local_center() {
        let collider = Collider::new(
            ColliderShape::Sphere { radius: 0.5 },
            0,
            Vector3::new(0.0, 0.0, 1.0),
        );
        let aabb = collider.tight_aabb(&Vector3::new(2.0, 0.0, 0.0), &UnitQuaternion::identity());
        assert_relative_eq!(aabb.center().x, 2.0, epsilon = 1e-6);
        assert_relative_eq!(aabb.center().z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_shape_validation() {
        assert!(ColliderShape::Sphere { radius: 0.0 }.validate().is_err());
        assert!(ColliderShape::Box {
            half_extents: Vector3::new(1.0, -1.0, 1.0)
        }
        .validate()
        .is_err());
        assert!(ColliderShape::ConvexHull { points: vec![] }.validate().is_err());
    }
}
