pub mod constants;
pub mod errors;
pub mod math;
pub mod rng;

pub use errors::{ErrorKind, Result, Severity, SimError};
