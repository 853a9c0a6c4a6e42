// Shared fixtures; each test binary uses its own subset.
#![allow(dead_code)]

use nalgebra::Vector3;

use rotorsim::environment::Trajectory;
use rotorsim::world::{BodyInit, DroneInit, EntityInit, TransformInit};
use rotorsim::{ColliderShape, ControlMode, EntityId, QuadParams, World, WorldSettings};

pub fn default_world() -> World {
    World::new(WorldSettings::default()).unwrap()
}

/// A large static slab with its top face at `top_z`.
pub fn spawn_ground(world: &mut World, top_z: f32) -> EntityId {
    spawn_ground_with_friction(world, top_z, 0.5)
}

pub fn spawn_ground_with_friction(world: &mut World, top_z: f32, friction: f32) -> EntityId {
    let init = EntityInit {
        transform: Some(TransformInit::at(Vector3::new(0.0, 0.0, top_z - 0.5))),
        body: Some(
            BodyInit::fixed(ColliderShape::Box {
                half_extents: Vector3::new(10.0, 10.0, 0.5),
            })
            .with_material(friction, 0.0),
        ),
        drone: None,
    };
    world.create(init).unwrap()
}

/// A unit-mass sphere of radius 0.5 at the given height.
pub fn spawn_sphere(world: &mut World, position: Vector3<f32>, restitution: f32) -> EntityId {
    let init = EntityInit {
        transform: Some(TransformInit::at(position)),
        body: Some(
            BodyInit::dynamic(1.0, ColliderShape::Sphere { radius: 0.5 })
                .with_material(0.0, restitution),
        ),
        drone: None,
    };
    world.create(init).unwrap()
}

/// A Hummingbird quad tracking the given trajectory.
pub fn spawn_hummingbird(
    world: &mut World,
    position: Vector3<f32>,
    mode: ControlMode,
    trajectory: Trajectory,
) -> EntityId {
    let init = EntityInit {
        transform: Some(TransformInit::at(position)),
        body: Some(BodyInit::dynamic(0.5, ColliderShape::Sphere { radius: 0.15 })),
        drone: Some(DroneInit {
            params: QuadParams::hummingbird(),
            mode,
            trajectory,
        }),
    };
    world.create(init).unwrap()
}

pub fn run(world: &mut World, seconds: f32, dt: f32) {
    let steps = (seconds / dt).round() as usize;
    for _ in 0..steps {
        world.tick(dt).unwrap();
    }
}

/// Assert that an entity's published pose is finite.
#[track_caller]
pub fn assert_pose_finite(world: &World, id: EntityId) {
    let (position, rotation) = world.read_pose(id).unwrap();
    assert!(
        position.iter().all(|x| x.is_finite()),
        "position is not finite: {:?}",
        position
    );
    assert!(
        rotation.into_inner().norm().is_finite(),
        "rotation is not finite"
    );
}

/// Assert the quaternion norm invariant on a drone's internal state.
#[track_caller]
pub fn assert_drone_state_valid(world: &World, id: EntityId) {
    let state = world.drone_state(id).unwrap();
    let norm = state.orientation.norm();
    assert!(
        (norm - 1.0).abs() <= 1e-3,
        "quaternion norm {} outside tolerance",
        norm
    );

    let params = QuadParams::hummingbird();
    for speed in &state.rotor_speeds {
        assert!(
            *speed >= params.motor.rotor_speed_min - 1e-3
                && *speed <= params.motor.rotor_speed_max + 1e-3,
            "rotor speed {} out of bounds",
            speed
        );
    }
}
