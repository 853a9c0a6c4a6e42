pub mod allocation;
pub mod controller;
pub mod multirotor;
pub mod params;
pub mod types;

pub use allocation::ControlAllocation;
pub use controller::Se3Controller;
pub use multirotor::{Multirotor, StateDerivative};
pub use params::{
    AeroProperties, ControlGains, GeometricProperties, InertiaProperties, MotorProperties,
    QuadParams, RotorProperties,
};
pub use types::{ControlInput, ControlMode, DroneState, FlatOutput};
