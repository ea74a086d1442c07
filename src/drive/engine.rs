// Per-tick drivetrain computation: kinematics, then acceleration cap, then speed cap

use tracing::warn;

use super::kinematics::{WheelVelocities, body_to_wheel, limit_acceleration, limit_speed};
use crate::config::DriveConfig;
use crate::messages::BodyTwist;

pub struct DriveEngine {
    config: DriveConfig,
    // Wheel state: last emitted velocities, only kept when accel limiting is on
    previous: WheelVelocities,
}

impl DriveEngine {
    pub fn new(config: DriveConfig) -> Self {
        Self {
            config,
            previous: WheelVelocities::zero(),
        }
    }

    pub fn previous(&self) -> WheelVelocities {
        self.previous
    }

    /// Forget the wheel history, e.g. after the motors were disabled
    pub fn reset(&mut self) {
        self.previous = WheelVelocities::zero();
    }

    /// Compute the wheel setpoints for one tick
    pub fn tick(&mut self, twist: &BodyTwist) -> WheelVelocities {
        let mut wheels = body_to_wheel(twist, self.config.wheel_radius, self.config.body_radius);

        let accel_step = self.config.accel_step();
        if let Some(step) = accel_step {
            let (limited, clamped) = limit_acceleration(wheels, self.previous, step);
            if let Some(factor) = clamped {
                warn!(
                    "Wheel acceleration too high, limited (factor {:.3})",
                    factor
                );
            }
            wheels = limited;
        }

        if let Some(max_speed) = self.config.speed_limit {
            let (limited, clamped) = limit_speed(wheels, max_speed);
            if let Some(factor) = clamped {
                warn!("Wheel speed too high, limited (factor {:.3})", factor);
            }
            wheels = limited;
        }

        if accel_step.is_some() {
            self.previous = wheels;
        }

        wheels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::kinematics::Wheel;

    fn config(accel_limit: Option<f32>, speed_limit: Option<f32>) -> DriveConfig {
        DriveConfig {
            wheel_radius: 0.05,
            body_radius: 0.3,
            accel_limit,
            speed_limit,
            tick_hz: 100,
        }
    }

    fn spin(angular_z: f32) -> BodyTwist {
        BodyTwist {
            angular_z,
            ..BodyTwist::default()
        }
    }

    #[test]
    fn test_unlimited_passes_kinematics_through() {
        let mut engine = DriveEngine::new(config(None, None));
        let wheels = engine.tick(&spin(1.0));
        for v in wheels.as_array() {
            assert!((v - 6.0).abs() < 1e-4);
        }
        // no history kept without accel limiting
        assert_eq!(engine.previous(), WheelVelocities::zero());
    }

    #[test]
    fn test_ramps_up_under_accel_limit() {
        // 100 rad/s^2 at 100 Hz -> 1 rad/s per tick
        let mut engine = DriveEngine::new(config(Some(100.0), None));
        let first = engine.tick(&spin(1.0));
        for v in first.as_array() {
            assert!((v - 1.0).abs() < 1e-4);
        }
        let second = engine.tick(&spin(1.0));
        for v in second.as_array() {
            assert!((v - 2.0).abs() < 1e-4);
        }
        assert_eq!(engine.previous(), second);
    }

    #[test]
    fn test_stop_command_bounded_by_accel_cap() {
        let mut engine = DriveEngine::new(config(Some(100.0), None));
        for _ in 0..10 {
            engine.tick(&spin(1.0));
        }
        let before = engine.previous();
        let after = engine.tick(&BodyTwist::default());
        for wheel in Wheel::ALL {
            assert!((after.get(wheel) - before.get(wheel)).abs() <= 1.0 + 1e-4);
        }
    }

    #[test]
    fn test_speed_cap_applied_after_accel() {
        let mut engine = DriveEngine::new(config(None, Some(3.0)));
        let wheels = engine.tick(&spin(1.0));
        assert!((wheels.max_magnitude() - 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut engine = DriveEngine::new(config(Some(100.0), None));
        engine.tick(&spin(1.0));
        engine.reset();
        assert_eq!(engine.previous(), WheelVelocities::zero());
    }
}
