mod common;

use approx::assert_relative_eq;
use nalgebra::Vector3;

use common::*;
use rotorsim::environment::{CircularTrajectory, Trajectory};
use rotorsim::{ControlMode, QuadParams};

#[test]
fn free_fall_matches_analytic_drop() {
    let mut world = default_world();
    let sphere = spawn_sphere(&mut world, Vector3::new(0.0, 0.0, 10.0), 0.0);

    // One second at 1 kHz keeps the Euler error inside the tolerance.
    let dt = 0.001;
    run(&mut world, 1.0, dt);

    let (position, _) = world.read_pose(sphere).unwrap();
    assert_relative_eq!(position.x, 0.0, epsilon = 1e-6);
    assert_relative_eq!(position.y, 0.0, epsilon = 1e-6);
    assert_relative_eq!(position.z, 10.0 - 0.5 * 9.81, epsilon = 0.01);

    let (velocity, _) = world.read_twist(sphere).unwrap();
    assert_relative_eq!(velocity.z, -9.81, epsilon = 0.02);
}

#[test]
fn sphere_settles_on_static_ground() {
    let mut world = default_world();
    let ground = spawn_ground(&mut world, 0.5);
    let sphere = spawn_sphere(&mut world, Vector3::new(0.0, 0.0, 10.0), 0.0);

    // Long enough for the impact transient to die out completely.
    run(&mut world, 3.0, 0.01);

    let (position, _) = world.read_pose(sphere).unwrap();
    assert!(
        position.z > 0.45 && position.z < 0.62,
        "sphere rests at z = {}",
        position.z
    );
    let (velocity, _) = world.read_twist(sphere).unwrap();
    assert!(velocity.norm() < 0.15, "residual speed {}", velocity.norm());

    // The ground never moves.
    let (ground_position, _) = world.read_pose(ground).unwrap();
    assert_relative_eq!(ground_position.z, 0.0, epsilon = 1e-6);
}

#[test]
fn hover_converges_to_setpoint() {
    let mut world = default_world();
    let drone = spawn_hummingbird(
        &mut world,
        Vector3::zeros(),
        ControlMode::CollectiveThrustBodyMoments,
        Trajectory::hover(Vector3::new(0.0, 0.0, 1.0), 0.0),
    );

    // Step below the 5 ms motor constant so the rotor lag integrates cleanly.
    run(&mut world, 5.0, 0.002);

    let (position, _) = world.read_pose(drone).unwrap();
    let error = (position - Vector3::new(0.0, 0.0, 1.0)).norm();
    assert!(error < 0.3, "hover error {} m at {:?}", error, position);

    // Rotor speeds close to the analytic hover speed.
    let hover_speed = QuadParams::hummingbird().hover_rotor_speed();
    let state = world.drone_state(drone).unwrap();
    for speed in &state.rotor_speeds {
        assert!(
            (speed - hover_speed).abs() < 0.1 * hover_speed,
            "rotor speed {} far from hover speed {}",
            speed,
            hover_speed
        );
    }

    assert_pose_finite(&world, drone);
    assert_drone_state_valid(&world, drone);
}

#[test]
fn circular_trajectory_is_tracked() {
    let mut world = default_world();
    let center = Vector3::new(0.0, 0.0, 1.0);
    // Start on the circle so the run measures tracking, not the initial dash.
    let drone = spawn_hummingbird(
        &mut world,
        Vector3::new(2.0, 0.0, 1.0),
        ControlMode::CollectiveThrustBodyMoments,
        Trajectory::Circular(CircularTrajectory {
            center,
            radius: 2.0,
            frequency: 0.1,
            yaw_follows_velocity: false,
        }),
    );

    let dt = 0.002;
    let mut moved = false;
    let mut previous = world.read_pose(drone).unwrap().0;
    for _ in 0..2500 {
        world.tick(dt).unwrap();
        let current = world.read_pose(drone).unwrap().0;
        if (current - previous).norm() > 1e-3 {
            moved = true;
        }
        previous = current;
    }

    let (position, _) = world.read_pose(drone).unwrap();
    let horizontal = Vector3::new(position.x - center.x, position.y - center.y, 0.0).norm();
    assert!(
        (1.5..=2.5).contains(&horizontal),
        "horizontal distance from center is {}",
        horizontal
    );
    assert!(moved, "drone never moved between ticks");

    assert_drone_state_valid(&world, drone);
}

#[test]
fn quaternion_norm_invariant_over_long_run() {
    let mut world = default_world();
    let drone = spawn_hummingbird(
        &mut world,
        Vector3::zeros(),
        ControlMode::CollectiveThrustBodyMoments,
        Trajectory::hover(Vector3::new(0.5, -0.5, 1.5), 0.0),
    );

    for _ in 0..2500 {
        world.tick(0.002).unwrap();
        assert_drone_state_valid(&world, drone);
    }
}

#[test]
fn velocity_mode_chases_moving_setpoint() {
    let mut world = default_world();
    let drone = spawn_hummingbird(
        &mut world,
        Vector3::new(0.0, 0.0, 1.0),
        ControlMode::Velocity,
        Trajectory::hover(Vector3::new(0.0, 0.0, 1.0), 0.0),
    );

    // A hover trajectory commands zero velocity; the vehicle should stay
    // roughly where it started rather than drift away.
    run(&mut world, 2.0, 0.002);
    let (position, _) = world.read_pose(drone).unwrap();
    assert!(
        (position - Vector3::new(0.0, 0.0, 1.0)).norm() < 1.0,
        "velocity mode drifted to {:?}",
        position
    );
}
