// Wheel motor driver: turns wheel velocities into bus setpoints
//
// Each wheel is an independent stream: one f32 target frame per drive
// motor per tick.

use tracing::{debug, info};

use super::kinematics::{Wheel, WheelVelocities};
use crate::bus::ActuatorCommand;
use crate::config::DRIVE_MOTOR_IDS;
use crate::outbox::Outbox;

pub struct WheelDriver {
    motor_ids: [u16; 4], // [FR, FL, BL, BR]
    outbox: Outbox,
}

impl WheelDriver {
    pub fn new(outbox: Outbox) -> Self {
        Self::with_motor_ids(outbox, DRIVE_MOTOR_IDS)
    }

    /// Create with custom motor ids
    pub fn with_motor_ids(outbox: Outbox, motor_ids: [u16; 4]) -> Self {
        Self { motor_ids, outbox }
    }

    /// Send wheel velocity setpoints
    pub fn publish(&self, velocities: &WheelVelocities) {
        debug!(
            "Setting wheel velocities: FR={:.2}, FL={:.2}, BL={:.2}, BR={:.2}",
            velocities.get(Wheel::FrontRight),
            velocities.get(Wheel::FrontLeft),
            velocities.get(Wheel::BackLeft),
            velocities.get(Wheel::BackRight)
        );

        for (motor, value) in self.motor_ids.into_iter().zip(velocities.as_array()) {
            self.outbox.command(ActuatorCommand::Target { motor, value });
        }
    }

    /// Command zero velocity on every wheel
    pub fn stop(&self) {
        info!("Stopping all wheels");
        self.publish(&WheelVelocities::zero());
    }
}
