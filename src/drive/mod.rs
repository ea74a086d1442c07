// Drivetrain module for the 4-wheel omniwheel base
//
// Provides:
// - Omniwheel inverse kinematics (body velocity -> wheel velocities)
// - Acceleration and speed limiting with per-tick wheel state
// - Wheel setpoint publishing onto the bus

mod driver;
mod engine;
pub mod kinematics;

pub use driver::WheelDriver;
pub use engine::DriveEngine;
pub use kinematics::{Wheel, WheelVelocities, body_to_wheel};
