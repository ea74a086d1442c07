// Message types exchanged with the pub/sub fabric

use serde::{Deserialize, Serialize};

use crate::bus::codec::{Decoder, Encoder, WireValue};
use crate::geometry::Vec2;

// Body velocity command from teleop/planner -> runtime
// Last value wins, the default is standing still
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyTwist {
    pub linear_x: f32,  // m/s, forward
    pub linear_y: f32,  // m/s, left
    pub angular_z: f32, // rad/s, counter-clockwise
}

impl BodyTwist {
    pub fn linear(&self) -> Vec2 {
        Vec2::new(self.linear_x, self.linear_y)
    }
}

/// Latest fused odometry sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseEstimate {
    pub position: Vec2,
    pub heading: f32, // rad
}

// Odometry board frame layout: pos_x, pos_y, rot_z as three f32
impl WireValue for PoseEstimate {
    const SIZE: usize = 12;

    fn write(&self, enc: &mut Encoder) {
        enc.field(self.position.x)
            .field(self.position.y)
            .field(self.heading);
    }

    fn read(dec: &mut Decoder<'_>) -> Self {
        let x = dec.field();
        let y = dec.field();
        let heading = dec.field();
        Self {
            position: Vec2::new(x, y),
            heading,
        }
    }
}

/// Published whenever an activation group switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationNotice {
    pub group: String,
    pub active: bool,
}

/// Fire-once notification sent right before the runtime halts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShutdownNotice {
    pub shutdown: bool,
}
