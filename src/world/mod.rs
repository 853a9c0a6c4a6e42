mod settings;

pub use settings::WorldSettings;

use log::warn;
use nalgebra::{Quaternion, UnitQuaternion, Vector3};

use crate::drones::{ControlInput, ControlMode, DroneState, Multirotor, QuadParams, Se3Controller};
use crate::ecs::{DenseStorage, EntityId, EntityManager};
use crate::environment::{Trajectory, WindModel};
use crate::physics::{ColliderShape, PhysicsWorld, RigidBody};
use crate::utils::errors::{Result, SimError};

/// Pose published to external readers at the end of each tick.
#[derive(Debug, Clone, Copy)]
pub struct TransformComponent {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Default for TransformComponent {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::repeat(1.0),
        }
    }
}

/// Link from an entity to its rigid body slot in the physics world.
#[derive(Debug, Clone, Copy)]
struct RigidBodyLink {
    body: usize,
}

/// Per-entity drone stack: model, internal state, setpoint source, and the
/// controller that bridges them.
pub struct DroneComponent {
    pub model: Multirotor,
    pub state: DroneState,
    pub controller: Se3Controller,
    pub trajectory: Trajectory,
    pub mode: ControlMode,
}

/// Transform initialization; mandatory for every entity.
#[derive(Debug, Clone, Copy)]
pub struct TransformInit {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Default for TransformInit {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::repeat(1.0),
        }
    }
}

impl TransformInit {
    pub fn at(position: Vector3<f32>) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

/// Rigid body plus collider initialization. `mass == 0` makes the body
/// static.
#[derive(Debug, Clone)]
pub struct BodyInit {
    pub mass: f32,
    pub shape: ColliderShape,
    pub local_center: Vector3<f32>,
    pub friction: f32,
    pub restitution: f32,
    pub initial_velocity: Vector3<f32>,
}

impl BodyInit {
    pub fn dynamic(mass: f32, shape: ColliderShape) -> Self {
        Self {
            mass,
            shape,
            local_center: Vector3::zeros(),
            friction: 0.7,
            restitution: 0.2,
            initial_velocity: Vector3::zeros(),
        }
    }

    pub fn fixed(shape: ColliderShape) -> Self {
        Self {
            mass: 0.0,
            shape,
            local_center: Vector3::zeros(),
            friction: 0.7,
            restitution: 0.2,
            initial_velocity: Vector3::zeros(),
        }
    }

    pub fn with_material(mut self, friction: f32, restitution: f32) -> Self {
        self.friction = friction;
        self.restitution = restitution;
        self
    }
}

/// Drone initialization; requires a body on the same entity.
pub struct DroneInit {
    pub params: QuadParams,
    pub mode: ControlMode,
    pub trajectory: Trajectory,
}

/// Initialization bundle for entity creation. The transform is mandatory;
/// everything else is optional.
#[derive(Default)]
pub struct EntityInit {
    pub transform: Option<TransformInit>,
    pub body: Option<BodyInit>,
    pub drone: Option<DroneInit>,
}

/// The explicitly owned simulation world: entity registry, component
/// arrays, physics, wind, and the fixed-step tick that couples them.
pub struct World {
    pub settings: WorldSettings,
    entities: EntityManager,
    transforms: DenseStorage<TransformComponent>,
    rigid_links: DenseStorage<RigidBodyLink>,
    drones: DenseStorage<DroneComponent>,
    physics: PhysicsWorld,
    /// Owning entity per rigid body slot; kept in lockstep with the physics
    /// body arena so swap-erase back-edges can be rewritten.
    body_owner: Vec<EntityId>,
    wind: WindModel,
    time: f32,
    drone_seed_counter: u64,
}

impl World {
    pub fn new(settings: WorldSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            entities: EntityManager::new(),
            transforms: DenseStorage::new(),
            rigid_links: DenseStorage::new(),
            drones: DenseStorage::new(),
            physics: PhysicsWorld::new(settings.physics_settings()),
            body_owner: Vec::new(),
            wind: WindModel::None,
            time: 0.0,
            drone_seed_counter: 0,
        })
    }

    #[inline]
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn set_wind(&mut self, wind: WindModel) {
        self.wind = wind;
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    // ---------------------------------------------------------------
    // Entity lifecycle
    // ---------------------------------------------------------------

    /// Create an entity from its init bundle. Fails without a transform
    /// init; on any later failure all partial allocations are rolled back.
    pub fn create(&mut self, init: EntityInit) -> Result<EntityId> {
        let transform = init
            .transform
            .ok_or_else(|| SimError::configuration("entity init requires a transform"))?;

        let id = self.entities.create()?;
        self.transforms.insert(
            id,
            TransformComponent {
                position: transform.position,
                rotation: transform.rotation,
                scale: transform.scale,
            },
        );

        if let Some(body_init) = init.body {
            if let Err(err) = self.create_body(id, &transform, body_init) {
                self.rollback(id);
                return Err(err);
            }
        }

        if let Some(drone_init) = init.drone {
            if let Err(err) = self.create_drone(id, &transform, drone_init) {
                self.rollback(id);
                return Err(err);
            }
        }

        Ok(id)
    }

    fn create_body(
        &mut self,
        id: EntityId,
        transform: &TransformInit,
        init: BodyInit,
    ) -> Result<()> {
        let mut body = if init.mass > 0.0 {
            let inertia = init.shape.local_inertia(init.mass);
            RigidBody::new_dynamic(init.mass, inertia)?
        } else {
            RigidBody::new_static()
        };
        body.position = transform.position;
        body.orientation = transform.rotation;
        body.linear_velocity = init.initial_velocity;
        body.material.friction = init.friction;
        body.material.restitution = init.restitution;
        body.update_world_inertia();

        let body_index = self.physics.add_body(body);
        self.body_owner.push(id);
        debug_assert_eq!(self.body_owner.len(), self.physics.bodies().len());

        // Link first so a failed collider insert can be rolled back through
        // the normal removal path.
        self.rigid_links.insert(id, RigidBodyLink { body: body_index });
        self.physics
            .add_collider(init.shape, body_index, init.local_center)?;
        Ok(())
    }

    fn create_drone(
        &mut self,
        id: EntityId,
        transform: &TransformInit,
        init: DroneInit,
    ) -> Result<()> {
        let link = match self.rigid_links.get(id) {
            Some(link) => *link,
            None => {
                return Err(SimError::configuration(
                    "drone component requires a rigid body on the same entity",
                ))
            }
        };

        init.params.validate()?;

        // The rigid body carries the vehicle's mass properties, not the
        // collider's; otherwise the controller and the plant disagree.
        let inertia = init.params.inertia.inertia_matrix();
        let inverse_inertia = inertia
            .try_inverse()
            .ok_or_else(|| SimError::numeric("vehicle inertia matrix is singular"))?;
        if let Some(body) = self.physics.body_mut(link.body) {
            body.mass = init.params.inertia.mass;
            body.inverse_mass = 1.0 / init.params.inertia.mass;
            body.local_inverse_inertia = inverse_inertia;
            body.update_world_inertia();
        }

        let seed = self.settings.seed.wrapping_add(self.drone_seed_counter);
        self.drone_seed_counter += 1;

        let n_rotors = init.params.geometry.n_rotors();
        let hover_speed = init.params.hover_rotor_speed();
        let controller = Se3Controller::new(init.params.clone())?;
        let model = Multirotor::with_seed(init.params, init.mode, seed)?;

        let state = DroneState::hovering(transform.position, n_rotors, hover_speed);

        self.drones.insert(
            id,
            DroneComponent {
                model,
                state,
                controller,
                trajectory: init.trajectory,
                mode: init.mode,
            },
        );
        Ok(())
    }

    /// Undo a partially created entity.
    fn rollback(&mut self, id: EntityId) {
        self.drones.remove(id);
        self.remove_body_of(id);
        self.transforms.remove(id);
        let _ = self.entities.remove(id);
    }

    /// Remove an entity. Drone and physics components are invalidated
    /// first; the transform goes last since its presence defines aliveness.
    pub fn remove(&mut self, id: EntityId) -> Result<()> {
        if !self.is_alive(id) {
            return Err(SimError::liveness(format!(
                "entity {:?} is not alive",
                id.raw()
            )));
        }

        self.drones.remove(id);
        self.remove_body_of(id);
        self.transforms.remove(id);
        self.entities.remove(id)
    }

    fn remove_body_of(&mut self, id: EntityId) {
        let link = match self.rigid_links.remove(id) {
            Some(link) => link,
            None => return,
        };

        match self.physics.remove_body(link.body) {
            Ok(Some(moved)) => {
                // The tail body now lives at `moved.moved_to`; rewrite the
                // displaced entity's link and the owner table.
                self.body_owner.swap_remove(moved.moved_to);
                let displaced = self.body_owner[moved.moved_to];
                if let Some(link) = self.rigid_links.get_mut(displaced) {
                    link.body = moved.moved_to;
                }
            }
            Ok(None) => {
                self.body_owner.swap_remove(link.body);
            }
            Err(err) => warn!("rigid body removal failed: {}", err),
        }
    }

    #[inline]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.entities.is_alive(id) && self.transforms.contains(id)
    }

    /// Live entity ids in slot order.
    pub fn active_entities(&self) -> Vec<EntityId> {
        self.entities.iter().collect()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // ---------------------------------------------------------------
    // External interfaces
    // ---------------------------------------------------------------

    /// Published pose of an entity; stable until the next tick.
    pub fn read_pose(&self, id: EntityId) -> Result<(Vector3<f32>, UnitQuaternion<f32>)> {
        let transform = self
            .transforms
            .get(id)
            .ok_or_else(|| SimError::liveness("stale entity handle"))?;
        Ok((transform.position, transform.rotation))
    }

    /// Linear (world) and angular (world) velocity of an entity's body.
    pub fn read_twist(&self, id: EntityId) -> Result<(Vector3<f32>, Vector3<f32>)> {
        let link = self
            .rigid_links
            .get(id)
            .ok_or_else(|| SimError::liveness("entity has no rigid body"))?;
        let body = self
            .physics
            .body(link.body)
            .ok_or_else(|| SimError::liveness("rigid body slot vanished"))?;
        Ok((body.linear_velocity, body.angular_velocity))
    }

    pub fn apply_force(&mut self, id: EntityId, force: Vector3<f32>) -> Result<()> {
        let link = self
            .rigid_links
            .get(id)
            .ok_or_else(|| SimError::liveness("entity has no rigid body"))?;
        let body = self
            .physics
            .body_mut(link.body)
            .ok_or_else(|| SimError::liveness("rigid body slot vanished"))?;
        body.apply_central_force(force);
        Ok(())
    }

    pub fn apply_torque(&mut self, id: EntityId, torque: Vector3<f32>) -> Result<()> {
        let link = self
            .rigid_links
            .get(id)
            .ok_or_else(|| SimError::liveness("entity has no rigid body"))?;
        let body = self
            .physics
            .body_mut(link.body)
            .ok_or_else(|| SimError::liveness("rigid body slot vanished"))?;
        body.apply_torque(torque);
        Ok(())
    }

    pub fn set_control_mode(&mut self, id: EntityId, mode: ControlMode) -> Result<()> {
        let drone = self
            .drones
            .get_mut(id)
            .ok_or_else(|| SimError::liveness("entity has no drone component"))?;
        drone.mode = mode;
        drone.model.set_control_mode(mode);
        Ok(())
    }

    pub fn set_trajectory(&mut self, id: EntityId, trajectory: Trajectory) -> Result<()> {
        let drone = self
            .drones
            .get_mut(id)
            .ok_or_else(|| SimError::liveness("entity has no drone component"))?;
        drone.trajectory = trajectory;
        Ok(())
    }

    pub fn drone_state(&self, id: EntityId) -> Result<&DroneState> {
        self.drones
            .get(id)
            .map(|d| &d.state)
            .ok_or_else(|| SimError::liveness("entity has no drone component"))
    }

    // ---------------------------------------------------------------
    // Tick
    // ---------------------------------------------------------------

    /// Advance the whole world by one fixed step.
    ///
    /// Per-entity failures in the drone pipeline are logged and skipped;
    /// the tick itself always runs to completion.
    pub fn tick(&mut self, dt: f32) -> Result<()> {
        if !(dt.is_finite() && dt >= 0.0) {
            return Err(SimError::validation("time step must be non-negative"));
        }
        if dt == 0.0 {
            return Ok(());
        }

        self.time += dt;
        let time = self.time;

        // Drone pipeline: sync from physics, sample wind and trajectory,
        // run the controller and dynamics, push the wrench into the body.
        for (id, drone) in self.drones.iter_mut() {
            let link = match self.rigid_links.get(id) {
                Some(link) => *link,
                None => continue,
            };
            let body = match self.physics.body_mut(link.body) {
                Some(body) => body,
                None => continue,
            };

            // World -> drone sync; body rates are the world angular
            // velocity expressed in the body frame.
            let rotation = body.orientation.to_rotation_matrix().into_inner();
            let q = body.orientation.into_inner();
            drone.state.sync_from_physics(
                body.position,
                Quaternion::new(q.w, q.i, q.j, q.k),
                body.linear_velocity,
                rotation.transpose() * body.angular_velocity,
            );

            drone.state.wind = self.wind.update(time, &drone.state.position);

            let flat = drone.trajectory.update(time);
            let control: ControlInput =
                match drone.controller.compute(drone.mode, &drone.state, &flat) {
                    Ok(control) => control,
                    Err(err) => {
                        warn!("controller failed for entity {:?}: {}", id.raw(), err);
                        continue;
                    }
                };

            let (next_state, force_world, moment_world) =
                match drone.model.step(&drone.state, &control, dt) {
                    Ok(result) => result,
                    Err(err) => {
                        warn!("drone dynamics failed for entity {:?}: {}", id.raw(), err);
                        continue;
                    }
                };
            drone.state = next_state;

            body.apply_central_force(force_world);
            body.apply_torque(moment_world);
        }

        // Contact pipeline and integration (phases 7-13).
        self.physics.step(dt)?;

        // Publish physics poses to the read side.
        for (id, link) in self.rigid_links.iter() {
            if let Some((position, orientation)) = self.physics.pose(link.body) {
                if let Some(transform) = self.transforms.get_mut(id) {
                    transform.position = position;
                    transform.rotation = orientation;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ErrorKind;
    use approx::assert_relative_eq;

    fn world() -> World {
        World::new(WorldSettings::default()).unwrap()
    }

    fn sphere_init(z: f32) -> EntityInit {
        EntityInit {
            transform: Some(TransformInit::at(Vector3::new(0.0, 0.0, z))),
            body: Some(
                BodyInit::dynamic(1.0, ColliderShape::Sphere { radius: 0.5 })
                    .with_material(0.0, 0.0),
            ),
            drone: None,
        }
    }

    #[test]
    fn test_create_requires_transform() {
        let mut world = world();
        let err = world.create(EntityInit::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn test_create_and_read_pose() {
        let mut world = world();
        let id = world.create(sphere_init(4.0)).unwrap();
        let (position, _) = world.read_pose(id).unwrap();
        assert_relative_eq!(position.z, 4.0, epsilon = 1e-6);
    }

    #[test]
    fn test_remove_rejects_stale_handle() {
        let mut world = world();
        let id = world.create(sphere_init(1.0)).unwrap();
        world.remove(id).unwrap();

        let err = world.remove(id).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Liveness);
        assert!(world.read_pose(id).is_err());
        assert!(world.apply_force(id, Vector3::zeros()).is_err());
    }

    #[test]
    fn test_drone_requires_body() {
        let mut world = world();
        let init = EntityInit {
            transform: Some(TransformInit::at(Vector3::zeros())),
            body: None,
            drone: Some(DroneInit {
                params: QuadParams::hummingbird(),
                mode: ControlMode::MotorSpeeds,
                trajectory: Trajectory::hover(Vector3::zeros(), 0.0),
            }),
        };
        let err = world.create(init).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);

        // Rollback left nothing behind.
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.physics().bodies().len(), 0);
    }

    #[test]
    fn test_removal_rewrites_displaced_body_link() {
        let mut world = world();
        let a = world.create(sphere_init(1.0)).unwrap();
        let b = world.create(sphere_init(5.0)).unwrap();

        world.remove(a).unwrap();

        // Entity b's body was swap-moved to slot 0 and must still read back
        // its own pose.
        let (_, _) = world.read_pose(b).unwrap();
        world.tick(0.01).unwrap();
        let (position, _) = world.read_pose(b).unwrap();
        assert!(position.z < 5.0 && position.z > 4.9);
    }

    #[test]
    fn test_gravity_free_fall_through_tick() {
        let mut world = world();
        let id = world.create(sphere_init(10.0)).unwrap();

        for _ in 0..100 {
            world.tick(0.01).unwrap();
        }
        let (position, _) = world.read_pose(id).unwrap();
        // Semi-implicit Euler: z = 10 - g dt^2 n(n+1)/2.
        assert_relative_eq!(position.z, 10.0 - 4.954, epsilon = 0.05);

        let (velocity, _) = world.read_twist(id).unwrap();
        assert_relative_eq!(velocity.z, -9.81, epsilon = 0.05);
    }

    #[test]
    fn test_zero_dt_tick_is_identity() {
        let mut world = world();
        let id = world.create(sphere_init(10.0)).unwrap();
        world.tick(0.0).unwrap();
        let (position, _) = world.read_pose(id).unwrap();
        assert_eq!(position.z, 10.0);
        assert_eq!(world.time(), 0.0);
    }

    #[test]
    fn test_set_control_mode_on_non_drone_fails() {
        let mut world = world();
        let id = world.create(sphere_init(1.0)).unwrap();
        let err = world
            .set_control_mode(id, ControlMode::Velocity)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Liveness);
    }
}
