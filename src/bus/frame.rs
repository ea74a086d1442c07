// Bus frames and the actuator commands carried in them

use serde::{Deserialize, Serialize};

use super::codec::{self, Layout, WireValue};
use crate::config::{MODE_BYTE_DISABLE, MODE_BYTE_HOMING, MODE_BYTE_POSITION, MODE_BYTE_VELOCITY};
use crate::error::Result;

/// Motor driver setpoints travel in host order
pub const TARGET_LAYOUT: Layout = Layout::NATIVE;

/// The odometry board sends every field byte-reversed
pub const ODOMETRY_LAYOUT: Layout = Layout::REVERSED;

/// One frame on the shared bus: an 11-bit id and its data field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusFrame {
    pub id: u16,
    pub data: Vec<u8>,
}

impl BusFrame {
    pub fn encode<V: WireValue>(id: u16, value: &V, layout: Layout) -> Self {
        Self {
            id,
            data: codec::encode(value, layout).into_vec(),
        }
    }

    pub fn decode<V: WireValue>(&self, layout: Layout) -> Result<V> {
        codec::decode(&self.data, layout)
    }
}

/// Control mode a motor driver can be switched into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorMode {
    Disabled,
    Homing,
    Velocity,
    Position,
}

impl MotorMode {
    pub fn byte(self) -> u8 {
        match self {
            MotorMode::Disabled => MODE_BYTE_DISABLE,
            MotorMode::Homing => MODE_BYTE_HOMING,
            MotorMode::Velocity => MODE_BYTE_VELOCITY,
            MotorMode::Position => MODE_BYTE_POSITION,
        }
    }
}

/// A command addressed to one logical actuator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorCommand {
    /// Mode byte on the driver's base id
    SelectMode { motor: u16, mode: MotorMode },
    /// f32 velocity or position setpoint on base id + 1
    Target { motor: u16, value: f32 },
    /// Single command byte for simple on/off mechanisms
    Discrete { id: u16, code: u8 },
}

impl ActuatorCommand {
    pub fn to_frame(&self) -> BusFrame {
        match *self {
            ActuatorCommand::SelectMode { motor, mode } => {
                BusFrame::encode(motor, &mode.byte(), Layout::NATIVE)
            }
            ActuatorCommand::Target { motor, value } => {
                BusFrame::encode(motor + 1, &value, TARGET_LAYOUT)
            }
            ActuatorCommand::Discrete { id, code } => BusFrame::encode(id, &code, Layout::NATIVE),
        }
    }
}
