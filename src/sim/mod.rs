//! Simulated hardware for demos, tests and benches.

pub mod actuators;
pub mod sensors;

pub use actuators::{SimMotor, TwoWheelDrive};
pub use sensors::{BarometerData, GpsData, ImuData, SimBarometer, SimGps, SimImu};
