// Bus layer for the shared serial CAN bus
//
// Provides:
// - Typed value <-> payload codec with per-field byte order control
// - Bus frames and actuator commands
// - SLCAN serial bridge to a USB-CAN adapter, written from its own thread

pub mod codec;
mod frame;
pub mod slcan;

pub use codec::{FieldOrder, Layout, WirePayload, WireValue, decode, encode, reverse_bytes};
pub use frame::{ActuatorCommand, BusFrame, MotorMode, ODOMETRY_LAYOUT, TARGET_LAYOUT};
pub use slcan::{SlcanBridge, SlcanWriter};
