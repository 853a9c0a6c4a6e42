pub mod trajectory;
pub mod wind;

pub use trajectory::{
    ChaoticTrajectory, CircularTrajectory, HoverTrajectory, MinSnapTrajectory, Trajectory,
    Waypoint,
};
pub use wind::{DrydenGust, DrydenParameters, WindModel};
