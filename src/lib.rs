// Control core for the 4-wheel omniwheel competition base
//
// - state: operating-mode state machine gating the subsystems below
// - activation: groups of gates/notifiers switched as one unit
// - bus: payload codec, bus frames, SLCAN serial bridge
// - drive: wheel kinematics with acceleration and speed caps
// - mission: waypoint-triggered autonomous work
// - runtime: zenoh wiring of all of the above

pub mod activation;
pub mod bus;
pub mod config;
pub mod drive;
pub mod error;
pub mod geometry;
pub mod messages;
pub mod mission;
pub mod outbox;
pub mod runtime;
pub mod state;

pub use error::{Error, Result};
