// Loop rates, topics, bus ids, geometry and limits
use std::time::Duration;

use crate::mission::Plan;

// Drivetrain loop frequency
pub const DRIVE_HZ: u64 = 100;

// Mission sequencer check frequency
pub const MISSION_HZ: u64 = 50;

// Zenoh topics
pub const TOPIC_BODY_TWIST: &str = "robot/cmd/body_twist"; // operator / planner velocity
pub const TOPIC_STATE_REQUEST: &str = "robot/cmd/state"; // mode requests
pub const TOPIC_MISSION_ADVANCE: &str = "robot/cmd/mission_advance";
pub const TOPIC_BUS_RX: &str = "robot/bus/rx"; // frames from the bus
pub const TOPIC_BUS_TX: &str = "robot/bus/tx"; // frames to the bus
pub const TOPIC_STATE_CURRENT: &str = "robot/state/current";
pub const TOPIC_ACTIVATION: &str = "robot/state/activation";
pub const TOPIC_SHUTDOWN: &str = "robot/state/shutdown";

// Bus ids. Each motor driver takes a mode byte on its base id and a
// f32 target on base id + 1.
pub const DRIVE_MOTOR_IDS: [u16; 4] = [0x160, 0x164, 0x168, 0x16C]; // FR, FL, BL, BR
pub const LIFT_MOTOR_ID: u16 = 0x170;
pub const POSITION_CONTROLLED_IDS: [u16; 1] = [LIFT_MOTOR_ID];
pub const STEPPING_MOTOR_ID: u16 = 0x180; // shovel
pub const TABLE_CLOTH_ID: u16 = 0x184;
pub const ODOMETRY_ID: u16 = 0x200;

// Motor driver mode bytes
pub const MODE_BYTE_DISABLE: u8 = 0;
pub const MODE_BYTE_HOMING: u8 = 2;
pub const MODE_BYTE_VELOCITY: u8 = 5;
pub const MODE_BYTE_POSITION: u8 = 6;

// Drivetrain geometry
pub const WHEEL_RADIUS: f32 = 0.05; // meters
pub const BODY_RADIUS: f32 = 0.3; // meters (center to wheel contact)

// Drivetrain limits
pub const WHEEL_ACCEL_LIMIT: f32 = 60.0; // rad/s^2
pub const WHEEL_SPEED_LIMIT: f32 = 40.0; // rad/s

// Lift targets (rad on the lift motor shaft)
pub const LIFT_BOTTOM_POSITION: f32 = 0.0;
pub const LIFT_STEP1_POSITION: f32 = 12.0;
pub const LIFT_STEP2_POSITION: f32 = 24.0;
pub const LIFT_STEP3_POSITION: f32 = 36.0;

/// Drivetrain tuning used by the kinematics engine
#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub wheel_radius: f32,
    pub body_radius: f32,
    /// Maximum wheel angular acceleration in rad/s^2, `None` disables limiting
    pub accel_limit: Option<f32>,
    /// Maximum wheel angular velocity in rad/s, `None` disables limiting
    pub speed_limit: Option<f32>,
    pub tick_hz: u64,
}

impl DriveConfig {
    /// Largest change of wheel velocity allowed in one tick
    pub fn accel_step(&self) -> Option<f32> {
        self.accel_limit.map(|limit| limit / self.tick_hz as f32)
    }

    pub fn period(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.tick_hz)
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            wheel_radius: WHEEL_RADIUS,
            body_radius: BODY_RADIUS,
            accel_limit: Some(WHEEL_ACCEL_LIMIT),
            speed_limit: Some(WHEEL_SPEED_LIMIT),
            tick_hz: DRIVE_HZ,
        }
    }
}

/// Everything the runtime needs beyond compile-time topics
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub drive: DriveConfig,
    pub mission_hz: u64,
    pub plan: Plan,
    /// Serial port of the SLCAN adapter, if frames should also go out over serial
    pub serial_port: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            drive: DriveConfig::default(),
            mission_hz: MISSION_HZ,
            plan: Plan::default_routine(),
            serial_port: None,
        }
    }
}
