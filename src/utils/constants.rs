/// Standard gravitational acceleration magnitude [m/s^2].
pub const GRAVITY: f32 = 9.81;

/// Default fat-AABB inflation for broad-phase leaves [m].
pub const AABB_MARGIN: f32 = 0.2;

/// Baumgarte position-correction factor.
pub const BAUMGARTE_FACTOR: f32 = 0.2;

/// Penetration allowed before Baumgarte correction engages [m].
pub const PENETRATION_SLOP: f32 = 0.005;

/// Approach speed below which restitution is suppressed [m/s].
pub const RESTITUTION_THRESHOLD: f32 = -1.0;

/// Solver velocity iterations.
pub const VELOCITY_ITERATIONS: usize = 8;
pub const MIN_VELOCITY_ITERATIONS: usize = 4;

/// Iteration caps for the narrow phase.
pub const GJK_MAX_ITERATIONS: usize = 30;
pub const EPA_MAX_ITERATIONS: usize = 32;
pub const EPA_TOLERANCE: f32 = 1e-4;

/// Bodies slower than these thresholds are put to sleep.
pub const SLEEP_LINEAR_THRESHOLD: f32 = 0.01;
pub const SLEEP_ANGULAR_THRESHOLD: f32 = 0.01;
