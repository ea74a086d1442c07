// Omniwheel inverse kinematics for the 4-wheel base
// Converts body-frame velocities (x, y, omega) to wheel angular velocities
// and applies the acceleration and speed caps.

use std::ops::{Add, Mul, Sub};

use crate::geometry::Vec2;
use crate::messages::BodyTwist;

/// Wheel slots in output order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wheel {
    FrontRight = 0,
    FrontLeft = 1,
    BackLeft = 2,
    BackRight = 3,
}

impl Wheel {
    pub const ALL: [Wheel; 4] = [
        Wheel::FrontRight,
        Wheel::FrontLeft,
        Wheel::BackLeft,
        Wheel::BackRight,
    ];

    /// Mounting position relative to the body center (x forward, y left), not normalized
    pub fn position(self) -> Vec2 {
        match self {
            Wheel::FrontRight => Vec2::new(1.0, -1.0),
            Wheel::FrontLeft => Vec2::new(1.0, 1.0),
            Wheel::BackLeft => Vec2::new(-1.0, 1.0),
            Wheel::BackRight => Vec2::new(-1.0, -1.0),
        }
    }

    /// Unit rolling direction: tangent to the mounting circle, counter-clockwise
    pub fn direction(self) -> Vec2 {
        self.position().normalized().rot90()
    }
}

/// Angular velocities of the four wheels in rad/s
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelVelocities([f32; 4]);

impl WheelVelocities {
    pub fn new(front_right: f32, front_left: f32, back_left: f32, back_right: f32) -> Self {
        Self([front_right, front_left, back_left, back_right])
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn get(&self, wheel: Wheel) -> f32 {
        self.0[wheel as usize]
    }

    /// Returns velocities as array [FR, FL, BL, BR]
    pub fn as_array(&self) -> [f32; 4] {
        self.0
    }

    /// Largest absolute value across the four wheels.
    ///
    /// Both limiters compare magnitudes, so a wheel spinning fast
    /// backwards is capped exactly like one spinning fast forwards.
    pub fn max_magnitude(&self) -> f32 {
        self.0.iter().fold(0.0f32, |max, v| max.max(v.abs()))
    }
}

impl Add for WheelVelocities {
    type Output = WheelVelocities;

    fn add(self, rhs: WheelVelocities) -> WheelVelocities {
        Self(std::array::from_fn(|i| self.0[i] + rhs.0[i]))
    }
}

impl Sub for WheelVelocities {
    type Output = WheelVelocities;

    fn sub(self, rhs: WheelVelocities) -> WheelVelocities {
        Self(std::array::from_fn(|i| self.0[i] - rhs.0[i]))
    }
}

impl Mul<f32> for WheelVelocities {
    type Output = WheelVelocities;

    fn mul(self, rhs: f32) -> WheelVelocities {
        Self(self.0.map(|v| v * rhs))
    }
}

/// Convert a body twist to wheel angular velocities
///
/// # Arguments
/// * `twist` - linear x/y in m/s, angular z in rad/s (counter-clockwise)
/// * `wheel_radius` - meters
/// * `body_radius` - distance from body center to the wheel contact, meters
pub fn body_to_wheel(twist: &BodyTwist, wheel_radius: f32, body_radius: f32) -> WheelVelocities {
    let linear = twist.linear();
    WheelVelocities(Wheel::ALL.map(|wheel| {
        let direction = wheel.direction();
        // rotation moves the contact point along the tangent of the mounting circle
        let tangent = wheel.position().normalized().rot90();
        let rotational = twist.angular_z * body_radius * tangent.dot(direction);
        (direction.dot(linear) + rotational) / wheel_radius
    }))
}

/// Cap the per-tick change of every wheel.
///
/// When the largest change exceeds `max_step`, every wheel's change is
/// scaled by the same factor so the wheels stay in proportion. Returns the
/// new velocities and the factor used, if any.
pub fn limit_acceleration(
    target: WheelVelocities,
    previous: WheelVelocities,
    max_step: f32,
) -> (WheelVelocities, Option<f32>) {
    let delta = target - previous;
    let max = delta.max_magnitude();
    if max > max_step {
        let factor = max_step / max;
        (previous + delta * factor, Some(factor))
    } else {
        (target, None)
    }
}

/// Scale all wheels uniformly so none exceeds `max_speed`
pub fn limit_speed(target: WheelVelocities, max_speed: f32) -> (WheelVelocities, Option<f32>) {
    let max = target.max_magnitude();
    if max > max_speed {
        let factor = max_speed / max;
        (target * factor, Some(factor))
    } else {
        (target, None)
    }
}
