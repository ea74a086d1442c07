// Mission sequencer: fires waypoint work as the robot enters each circle

use tracing::{debug, info, warn};

use super::{Plan, Waypoint, WorkAction};
use crate::messages::PoseEstimate;
use crate::outbox::Outbox;

/// What one position check did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Work fired this update, in waypoint order
    Fired(Vec<WorkAction>),
    /// Nothing matched
    Idle,
    /// Current mission has no pending waypoints left
    Exhausted,
}

pub struct Sequencer {
    plan: Plan,
    current: usize,
    pending: Vec<Waypoint>,
    outbox: Outbox,
}

impl Sequencer {
    pub fn new(plan: Plan, outbox: Outbox) -> Self {
        let pending = plan
            .missions
            .first()
            .map(|m| m.waypoints.clone())
            .unwrap_or_default();
        Self {
            plan,
            current: 0,
            pending,
            outbox,
        }
    }

    pub fn current_mission(&self) -> usize {
        self.current
    }

    pub fn pending(&self) -> &[Waypoint] {
        &self.pending
    }

    /// Test the pose against every pending waypoint of the current mission.
    ///
    /// Every match fires in list order and is removed so it cannot fire again.
    pub fn check(&mut self, pose: &PoseEstimate) -> CheckOutcome {
        if self.pending.is_empty() {
            return CheckOutcome::Exhausted;
        }

        let mut fired = Vec::new();
        let outbox = &self.outbox;
        self.pending.retain(|wp| {
            if !wp.contains(pose.position) {
                return true;
            }
            debug!(
                "Waypoint ({:.2}, {:.2}) reached, doing {:?}",
                wp.center.x, wp.center.y, wp.work
            );
            if let Some(cmd) = wp.work.command() {
                outbox.command(cmd);
            }
            fired.push(wp.work);
            false
        });

        if fired.is_empty() {
            return CheckOutcome::Idle;
        }
        if self.pending.is_empty() {
            info!(
                "Mission {} complete, waiting for advance",
                self.current
            );
        }
        CheckOutcome::Fired(fired)
    }

    /// Move to the next mission of the plan. Returns false when there is none.
    pub fn advance(&mut self) -> bool {
        let next = self.current + 1;
        let Some(mission) = self.plan.missions.get(next) else {
            warn!("No mission after {}, staying put", self.current);
            return false;
        };
        if !self.pending.is_empty() {
            warn!(
                "Advancing past mission {} with {} waypoints left",
                self.current,
                self.pending.len()
            );
        }
        self.current = next;
        self.pending = mission.waypoints.clone();
        info!("Mission {} started ({} waypoints)", next, self.pending.len());
        true
    }
}
