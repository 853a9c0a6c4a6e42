pub mod aabb;
pub mod broad_phase;
pub mod collider;
pub mod narrow_phase;
pub mod rigid_body;
pub mod solver;
pub mod world;

pub use aabb::Aabb;
pub use broad_phase::AabbTree;
pub use collider::{Collider, ColliderShape};
pub use narrow_phase::Contact;
pub use rigid_body::{Material, RigidBody};
pub use solver::{ContactSolver, SolverSettings};
pub use world::{PhysicsSettings, PhysicsWorld, SwapErase};
