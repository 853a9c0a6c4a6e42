use nalgebra::{SMatrix, SVector, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::drones::types::FlatOutput;
use crate::utils::errors::{Result, SimError};
use crate::utils::rng::seeded_rng;

/// Reference trajectories producing flat outputs over time.
pub enum Trajectory {
    Hover(HoverTrajectory),
    Circular(CircularTrajectory),
    Chaotic(ChaoticTrajectory),
    MinSnap(MinSnapTrajectory),
}

impl Trajectory {
    pub fn hover(position: Vector3<f32>, yaw: f32) -> Self {
        Trajectory::Hover(HoverTrajectory { position, yaw })
    }

    pub fn update(&self, time: f32) -> FlatOutput {
        match self {
            Trajectory::Hover(t) => t.update(time),
            Trajectory::Circular(t) => t.update(time),
            Trajectory::Chaotic(t) => t.update(time),
            Trajectory::MinSnap(t) => t.update(time),
        }
    }
}

/// Constant position and yaw.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HoverTrajectory {
    pub position: Vector3<f32>,
    pub yaw: f32,
}

impl HoverTrajectory {
    pub fn update(&self, _time: f32) -> FlatOutput {
        FlatOutput {
            position: self.position,
            yaw: self.yaw,
            ..FlatOutput::default()
        }
    }
}

/// Constant-speed circle in the horizontal plane.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircularTrajectory {
    pub center: Vector3<f32>,
    pub radius: f32,
    /// Revolutions per second.
    pub frequency: f32,
    pub yaw_follows_velocity: bool,
}

impl CircularTrajectory {
    pub fn update(&self, time: f32) -> FlatOutput {
        let omega = 2.0 * std::f32::consts::PI * self.frequency;
        let theta = omega * time;
        let (sin, cos) = theta.sin_cos();
        let r = self.radius;

        let omega2 = omega * omega;
        let omega3 = omega2 * omega;
        let omega4 = omega3 * omega;

        let position = self.center + Vector3::new(r * cos, r * sin, 0.0);
        let velocity = Vector3::new(-r * omega * sin, r * omega * cos, 0.0);
        let acceleration = Vector3::new(-r * omega2 * cos, -r * omega2 * sin, 0.0);
        let jerk = Vector3::new(r * omega3 * sin, -r * omega3 * cos, 0.0);
        let snap = Vector3::new(r * omega4 * cos, r * omega4 * sin, 0.0);

        let (yaw, yaw_rate) = if self.yaw_follows_velocity {
            (velocity.y.atan2(velocity.x), omega)
        } else {
            (0.0, 0.0)
        };

        FlatOutput {
            position,
            velocity,
            acceleration,
            jerk,
            snap,
            yaw,
            yaw_rate,
            yaw_acceleration: 0.0,
        }
    }
}

/// Piecewise-linear wandering between seeded random control points around a
/// center. Derivatives above velocity are zero.
#[derive(Debug, Clone)]
pub struct ChaoticTrajectory {
    points: Vec<Vector3<f32>>,
    segment_time: f32,
}

impl ChaoticTrajectory {
    pub fn new(
        center: Vector3<f32>,
        delta: f32,
        n_points: usize,
        segment_time: f32,
        seed: u64,
    ) -> Result<Self> {
        if n_points < 2 {
            return Err(SimError::validation("need at least two control points"));
        }
        if segment_time <= 0.0 {
            return Err(SimError::validation("segment time must be positive"));
        }

        let mut rng = seeded_rng(seed, "chaotic_trajectory");
        let points = (0..n_points)
            .map(|_| {
                center
                    + Vector3::new(
                        rng.gen_range(-delta..=delta),
                        rng.gen_range(-delta..=delta),
                        rng.gen_range(-delta..=delta),
                    )
            })
            .collect();

        Ok(Self {
            points,
            segment_time,
        })
    }

    pub fn update(&self, time: f32) -> FlatOutput {
        let segments = self.points.len() - 1;
        let index = ((time / self.segment_time) as usize) % segments;
        let alpha = (time % self.segment_time) / self.segment_time;

        let p0 = self.points[index];
        let p1 = self.points[index + 1];

        FlatOutput {
            position: p0.lerp(&p1, alpha),
            velocity: (p1 - p0) / self.segment_time,
            ..FlatOutput::default()
        }
    }
}

/// A waypoint for the minimum-snap planner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Waypoint {
    pub position: Vector3<f32>,
    pub yaw: f32,
    pub time: f32,
}

#[derive(Debug, Clone)]
struct Segment {
    start_time: f32,
    duration: f32,
    /// 7th-order coefficients, one column triple per power of t.
    position_coeffs: [Vector3<f32>; 8],
    yaw_coeffs: [f32; 8],
}

/// Minimum-snap trajectory: one 7th-order polynomial per waypoint pair with
/// position pinned at both ends and velocity, acceleration, and jerk zero at
/// segment boundaries.
#[derive(Debug, Clone)]
pub struct MinSnapTrajectory {
    segments: Vec<Segment>,
    total_duration: f32,
}

impl MinSnapTrajectory {
    pub fn new(waypoints: &[Waypoint]) -> Result<Self> {
        if waypoints.len() < 2 {
            return Err(SimError::validation("need at least two waypoints"));
        }

        let mut segments = Vec::with_capacity(waypoints.len() - 1);
        for pair in waypoints.windows(2) {
            let (start, end) = (&pair[0], &pair[1]);
            let duration = end.time - start.time;
            if duration <= 0.0 {
                return Err(SimError::validation("waypoint times must increase"));
            }
            segments.push(Self::solve_segment(start, end, duration)?);
        }

        Ok(Self {
            segments,
            total_duration: waypoints[waypoints.len() - 1].time,
        })
    }

    /// Eight boundary conditions pin position, velocity, acceleration, and
    /// jerk at both segment ends.
    fn solve_segment(start: &Waypoint, end: &Waypoint, dt: f32) -> Result<Segment> {
        let mut a = SMatrix::<f32, 8, 8>::zeros();

        for j in 0..8usize {
            let jf = j as f32;
            // Position rows at t = 0 and t = dt.
            a[(0, j)] = if j == 0 { 1.0 } else { 0.0 };
            a[(1, j)] = dt.powi(j as i32);

            // Velocity rows.
            a[(2, j)] = if j == 1 { 1.0 } else { 0.0 };
            a[(3, j)] = if j >= 1 { jf * dt.powi(j as i32 - 1) } else { 0.0 };

            // Acceleration rows.
            a[(4, j)] = if j == 2 { 2.0 } else { 0.0 };
            a[(5, j)] = if j >= 2 {
                jf * (jf - 1.0) * dt.powi(j as i32 - 2)
            } else {
                0.0
            };

            // Jerk rows.
            a[(6, j)] = if j == 3 { 6.0 } else { 0.0 };
            a[(7, j)] = if j >= 3 {
                jf * (jf - 1.0) * (jf - 2.0) * dt.powi(j as i32 - 3)
            } else {
                0.0
            };
        }

        let lu = a.lu();

        let mut position_coeffs = [Vector3::zeros(); 8];
        for axis in 0..3 {
            let mut rhs = SVector::<f32, 8>::zeros();
            rhs[0] = start.position[axis];
            rhs[1] = end.position[axis];

            let solution = lu
                .solve(&rhs)
                .ok_or_else(|| SimError::numeric("minimum-snap system is singular"))?;
            for j in 0..8 {
                position_coeffs[j][axis] = solution[j];
            }
        }

        let mut yaw_rhs = SVector::<f32, 8>::zeros();
        yaw_rhs[0] = start.yaw;
        yaw_rhs[1] = end.yaw;
        let yaw_solution = lu
            .solve(&yaw_rhs)
            .ok_or_else(|| SimError::numeric("minimum-snap system is singular"))?;
        let mut yaw_coeffs = [0.0; 8];
        yaw_coeffs.copy_from_slice(yaw_solution.as_slice());

        Ok(Segment {
            start_time: start.time,
            duration: dt,
            position_coeffs,
            yaw_coeffs,
        })
    }

    fn evaluate(coeffs: &[Vector3<f32>; 8], t: f32, derivative: usize) -> Vector3<f32> {
        let mut result = Vector3::zeros();
        for i in derivative..8 {
            let mut factor = 1.0;
            for j in 0..derivative {
                factor *= (i - j) as f32;
            }
            result += factor * coeffs[i] * t.powi((i - derivative) as i32);
        }
        result
    }

    pub fn duration(&self) -> f32 {
        self.total_duration
    }

    pub fn is_complete(&self, time: f32) -> bool {
        time >= self.total_duration
    }

    pub fn update(&self, time: f32) -> FlatOutput {
        let time = time.clamp(0.0, self.total_duration);

        let segment = self
            .segments
            .iter()
            .find(|s| time >= s.start_time && time <= s.start_time + s.duration)
            .unwrap_or_else(|| &self.segments[self.segments.len() - 1]);
        let local = (time - segment.start_time).clamp(0.0, segment.duration);

        let mut yaw = 0.0;
        let mut yaw_rate = 0.0;
        for (i, c) in segment.yaw_coeffs.iter().enumerate() {
            yaw += c * local.powi(i as i32);
            if i > 0 {
                yaw_rate += i as f32 * c * local.powi(i as i32 - 1);
            }
        }

        FlatOutput {
            position: Self::evaluate(&segment.position_coeffs, local, 0),
            velocity: Self::evaluate(&segment.position_coeffs, local, 1),
            acceleration: Self::evaluate(&segment.position_coeffs, local, 2),
            jerk: Self::evaluate(&segment.position_coeffs, local, 3),
            snap: Self::evaluate(&segment.position_coeffs, local, 4),
            yaw,
            yaw_rate,
            yaw_acceleration: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hover_is_constant() {
        let trajectory = Trajectory::hover(Vector3::new(1.0, 2.0, 3.0), 0.5);
        for t in [0.0, 1.0, 100.0] {
            let flat = trajectory.update(t);
            assert_eq!(flat.position, Vector3::new(1.0, 2.0, 3.0));
            assert_eq!(flat.velocity, Vector3::zeros());
            assert_eq!(flat.yaw, 0.5);
        }
    }

    #[test]
    fn test_circular_radius_and_speed() {
        let circle = CircularTrajectory {
            center: Vector3::new(0.0, 0.0, 1.0),
            radius: 2.0,
            frequency: 0.1,
            yaw_follows_velocity: true,
        };

        let omega = 2.0 * std::f32::consts::PI * 0.1;
        for t in [0.0, 0.7, 2.5, 4.9] {
            let flat = circle.update(t);
            let offset = flat.position - circle.center;
            assert_relative_eq!(offset.norm(), 2.0, epsilon = 1e-4);
            assert_relative_eq!(flat.velocity.norm(), 2.0 * omega, epsilon = 1e-4);
            // Velocity is tangent to the radius.
            assert_relative_eq!(offset.dot(&flat.velocity), 0.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_circular_yaw_follows_velocity() {
        let circle = CircularTrajectory {
            center: Vector3::zeros(),
            radius: 1.0,
            frequency: 0.25,
            yaw_follows_velocity: true,
        };
        // At t = 0 the velocity points along +y.
        let flat = circle.update(0.0);
        assert_relative_eq!(flat.yaw, std::f32::consts::FRAC_PI_2, epsilon = 1e-4);
    }

    #[test]
    fn test_circular_derivative_chain() {
        // Finite-difference check of velocity and acceleration.
        let circle = CircularTrajectory {
            center: Vector3::zeros(),
            radius: 2.0,
            frequency: 0.2,
            yaw_follows_velocity: false,
        };
        let h = 1e-3;
        let t = 1.3;
        let before = circle.update(t - h);
        let at = circle.update(t);
        let after = circle.update(t + h);

        let velocity_fd = (after.position - before.position) / (2.0 * h);
        assert_relative_eq!((velocity_fd - at.velocity).norm(), 0.0, epsilon = 1e-2);

        let accel_fd = (after.velocity - before.velocity) / (2.0 * h);
        assert_relative_eq!((accel_fd - at.acceleration).norm(), 0.0, epsilon = 1e-2);
    }

    #[test]
    fn test_chaotic_is_deterministic_and_bounded() {
        let center = Vector3::new(0.0, 0.0, 2.0);
        let a = ChaoticTrajectory::new(center, 1.5, 8, 1.0, 9).unwrap();
        let b = ChaoticTrajectory::new(center, 1.5, 8, 1.0, 9).unwrap();

        for i in 0..100 {
            let t = i as f32 * 0.1;
            let fa = a.update(t);
            let fb = b.update(t);
            assert_eq!(fa.position, fb.position);
            assert!((fa.position - center).norm() <= 1.5 * 3.0_f32.sqrt() + 1e-5);
        }
    }

    #[test]
    fn test_chaotic_interpolates_linearly() {
        let trajectory = ChaoticTrajectory::new(Vector3::zeros(), 2.0, 4, 2.0, 1).unwrap();
        let start = trajectory.update(0.0);
        let quarter = trajectory.update(0.5);
        let mid = trajectory.update(1.0);

        let expected = start.position.lerp(&mid.position, 0.5);
        // Midpoint of a linear segment (t=1 is halfway through the 2 s leg).
        assert_relative_eq!((quarter.position - expected).norm(), 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_min_snap_hits_waypoints() {
        let waypoints = [
            Waypoint {
                position: Vector3::zeros(),
                yaw: 0.0,
                time: 0.0,
            },
            Waypoint {
                position: Vector3::new(2.0, 1.0, 3.0),
                yaw: 0.5,
                time: 2.0,
            },
            Waypoint {
                position: Vector3::new(-1.0, 2.0, 1.0),
                yaw: -0.2,
                time: 5.0,
            },
        ];
        let trajectory = MinSnapTrajectory::new(&waypoints).unwrap();

        for wp in &waypoints {
            let flat = trajectory.update(wp.time);
            assert_relative_eq!((flat.position - wp.position).norm(), 0.0, epsilon = 1e-2);
            assert_relative_eq!(flat.yaw, wp.yaw, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_min_snap_rest_at_endpoints() {
        let waypoints = [
            Waypoint {
                position: Vector3::zeros(),
                yaw: 0.0,
                time: 0.0,
            },
            Waypoint {
                position: Vector3::new(0.0, 0.0, 2.0),
                yaw: 0.0,
                time: 3.0,
            },
        ];
        let trajectory = MinSnapTrajectory::new(&waypoints).unwrap();

        for t in [0.0, 3.0] {
            let flat = trajectory.update(t);
            assert_relative_eq!(flat.velocity.norm(), 0.0, epsilon = 1e-2);
            assert_relative_eq!(flat.acceleration.norm(), 0.0, epsilon = 5e-2);
            assert_relative_eq!(flat.jerk.norm(), 0.0, epsilon = 0.2);
        }
    }

    #[test]
    fn test_min_snap_continuous_position() {
        let waypoints = [
            Waypoint {
                position: Vector3::zeros(),
                yaw: 0.0,
                time: 0.0,
            },
            Waypoint {
                position: Vector3::new(1.0, 0.0, 1.0),
                yaw: 0.0,
                time: 2.0,
            },
            Waypoint {
                position: Vector3::new(2.0, 2.0, 0.5),
                yaw: 0.0,
                time: 4.0,
            },
        ];
        let trajectory = MinSnapTrajectory::new(&waypoints).unwrap();

        // No jump across the interior waypoint.
        let before = trajectory.update(2.0 - 1e-3);
        let after = trajectory.update(2.0 + 1e-3);
        assert_relative_eq!((before.position - after.position).norm(), 0.0, epsilon = 1e-2);
    }

    #[test]
    fn test_min_snap_clamps_past_duration() {
        let waypoints = [
            Waypoint {
                position: Vector3::zeros(),
                yaw: 0.0,
                time: 0.0,
            },
            Waypoint {
                position: Vector3::new(1.0, 1.0, 1.0),
                yaw: 0.0,
                time: 1.0,
            },
        ];
        let trajectory = MinSnapTrajectory::new(&waypoints).unwrap();
        assert!(trajectory.is_complete(1.5));

        let flat = trajectory.update(100.0);
        assert_relative_eq!(
            (flat.position - Vector3::new(1.0, 1.0, 1.0)).norm(),
            0.0,
            epsilon = 1e-2
        );
    }

    #[test]
    fn test_min_snap_rejects_bad_times() {
        let waypoints = [
            Waypoint {
                position: Vector3::zeros(),
                yaw: 0.0,
                time: 1.0,
            },
            Waypoint {
                position: Vector3::new(1.0, 0.0, 0.0),
                yaw: 0.0,
                time: 1.0,
            },
        ];
        assert!(MinSnapTrajectory::new(&waypoints).is_err());
        assert!(MinSnapTrajectory::new(&waypoints[..1]).is_err());
    }
}
