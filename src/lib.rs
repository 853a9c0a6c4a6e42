//! Real-time rigid-body dynamics for multirotor vehicles.
//!
//! The crate couples three layers each fixed step: per-vehicle rotor
//! aerodynamics and integration ([`drones`]), an SE(3) geometric controller
//! mapping flat outputs to rotor commands, and a contact pipeline (dynamic
//! AABB broad phase, GJK/EPA narrow phase, sequential impulse solver) in
//! [`physics`]. Entities are generational ids over dense component arrays
//! ([`ecs`]); the [`world::World`] owns everything and runs the tick.

pub mod config;
pub mod drones;
pub mod ecs;
pub mod environment;
pub mod physics;
pub mod utils;
pub mod world;

pub use drones::{
    ControlInput, ControlMode, DroneState, FlatOutput, Multirotor, QuadParams, Se3Controller,
};
pub use ecs::{EntityId, EntityManager};
pub use environment::{DrydenParameters, Trajectory, WindModel};
pub use physics::{ColliderShape, PhysicsWorld, RigidBody};
pub use utils::{ErrorKind, Result, SimError};
pub use world::{BodyInit, DroneInit, EntityInit, TransformInit, World, WorldSettings};
