// Autonomous routine: waypoints, missions and the plan they form
//
// A waypoint is a circle on the field with one work action attached. A
// mission is an ordered list of waypoints; the plan is an ordered list of
// missions, only one of which is live at a time.

mod sequencer;

pub use sequencer::{CheckOutcome, Sequencer};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::bus::ActuatorCommand;
use crate::config::{
    LIFT_BOTTOM_POSITION, LIFT_MOTOR_ID, LIFT_STEP1_POSITION, LIFT_STEP2_POSITION,
    LIFT_STEP3_POSITION, STEPPING_MOTOR_ID, TABLE_CLOTH_ID,
};
use crate::error::{Error, Result};
use crate::geometry::Vec2;

// Command bytes of the shovel stepper and the tablecloth mechanism
const SHOVEL_OPEN: u8 = 0;
const SHOVEL_CLOSE: u8 = 1;
const TABLECLOTH_PUSH: u8 = 0;
const TABLECLOTH_PULL: u8 = 1;

/// Discrete action fired when the robot enters a waypoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkAction {
    /// Pass-through point, nothing to do
    Transit,
    LiftBottom,
    LiftStep1,
    LiftStep2,
    LiftStep3,
    ShovelOpen,
    ShovelClose,
    TableclothPush,
    TableclothPull,
    /// Reserved for the fence crossing sequence, currently a no-op
    ChangeToOverFence,
}

impl WorkAction {
    /// Bus command that carries out this action, if any
    pub fn command(self) -> Option<ActuatorCommand> {
        let lift = |value| ActuatorCommand::Target {
            motor: LIFT_MOTOR_ID,
            value,
        };
        let shovel = |code| ActuatorCommand::Discrete {
            id: STEPPING_MOTOR_ID,
            code,
        };
        let tablecloth = |code| ActuatorCommand::Discrete {
            id: TABLE_CLOTH_ID,
            code,
        };

        match self {
            WorkAction::Transit | WorkAction::ChangeToOverFence => None,
            WorkAction::LiftBottom => Some(lift(LIFT_BOTTOM_POSITION)),
            WorkAction::LiftStep1 => Some(lift(LIFT_STEP1_POSITION)),
            WorkAction::LiftStep2 => Some(lift(LIFT_STEP2_POSITION)),
            WorkAction::LiftStep3 => Some(lift(LIFT_STEP3_POSITION)),
            WorkAction::ShovelOpen => Some(shovel(SHOVEL_OPEN)),
            WorkAction::ShovelClose => Some(shovel(SHOVEL_CLOSE)),
            WorkAction::TableclothPush => Some(tablecloth(TABLECLOTH_PUSH)),
            WorkAction::TableclothPull => Some(tablecloth(TABLECLOTH_PULL)),
        }
    }
}

/// Geofenced trigger point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub center: Vec2,
    pub radius: f32,
    pub work: WorkAction,
}

impl Waypoint {
    pub fn new(x: f32, y: f32, radius: f32, work: WorkAction) -> Self {
        Self {
            center: Vec2::new(x, y),
            radius,
            work,
        }
    }

    /// Inside or on the circle
    pub fn contains(&self, position: Vec2) -> bool {
        (position - self.center).norm_squared() <= self.radius * self.radius
    }
}

/// One phase of the autonomous routine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mission {
    pub waypoints: Vec<Waypoint>,
}

impl Mission {
    pub fn new(waypoints: Vec<Waypoint>) -> Self {
        Self { waypoints }
    }
}

/// Ordered missions executed one after another
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub missions: Vec<Mission>,
}

impl Plan {
    pub fn new(missions: Vec<Mission>) -> Self {
        Self { missions }
    }

    /// Parse a plan from JSON
    ///
    /// ```json
    /// {"missions": [[{"center": {"x": 1.0, "y": 0.0}, "radius": 0.2, "work": "lift_step1"}]]}
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let plan: Plan = serde_json::from_str(json)?;
        if plan.missions.is_empty() {
            return Err(Error::PlanLoad("plan has no missions".to_string()));
        }
        if let Some(bad) = plan
            .missions
            .iter()
            .flat_map(|m| &m.waypoints)
            .find(|wp| !(wp.radius >= 0.0))
        {
            return Err(Error::PlanLoad(format!(
                "waypoint at ({}, {}) has invalid radius {}",
                bad.center.x, bad.center.y, bad.radius
            )));
        }
        Ok(plan)
    }

    /// Load a plan from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Built-in routine: collect, carry over the step, unload
    pub fn default_routine() -> Self {
        use WorkAction::*;

        Self::new(vec![
            Mission::new(vec![
                Waypoint::new(0.5, 0.0, 0.15, Transit),
                Waypoint::new(1.2, 0.0, 0.1, ShovelOpen),
                Waypoint::new(1.2, 0.0, 0.1, LiftBottom),
                Waypoint::new(1.6, 0.4, 0.1, ShovelClose),
                Waypoint::new(1.6, 0.4, 0.1, LiftStep1),
            ]),
            Mission::new(vec![
                Waypoint::new(2.4, 0.4, 0.1, LiftStep2),
                Waypoint::new(3.0, 0.4, 0.1, ChangeToOverFence),
                Waypoint::new(3.4, 0.8, 0.1, LiftStep3),
            ]),
            Mission::new(vec![
                Waypoint::new(3.8, 1.2, 0.1, TableclothPush),
                Waypoint::new(3.8, 1.2, 0.1, ShovelOpen),
                Waypoint::new(3.4, 1.2, 0.15, TableclothPull),
                Waypoint::new(3.0, 1.2, 0.15, LiftBottom),
            ]),
        ])
    }
}
