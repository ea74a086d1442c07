// Activation groups: switch a set of heterogeneous resources on/off together

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info};

use crate::messages::ActivationNotice;
use crate::outbox::{Outbound, Outbox};

/// Two-state capability shared by every group member.
///
/// Implementations track their own state and skip a transition whose
/// target equals the current state, so repeated calls are no-ops.
pub trait Activate {
    fn activate(&mut self);
    fn deactivate(&mut self);
    fn is_active(&self) -> bool;
}

/// On/off flag checked by a periodic task or a subscription before it does work.
///
/// Clones share the flag: the group holds one, the task holds another.
/// Every opening bumps an epoch so work accepted under an earlier
/// activation can be told apart from work accepted under the current one.
#[derive(Debug, Clone)]
pub struct Gate {
    name: &'static str,
    open: Arc<AtomicBool>,
    epoch: Arc<AtomicU64>,
}

impl Gate {
    /// New gates start closed
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            open: Arc::new(AtomicBool::new(false)),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Number of times the gate has been opened
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn set(&self, open: bool) {
        if open == self.is_open() {
            return;
        }
        // epoch moves before the flag so an open gate never reports a stale epoch
        if open {
            self.epoch.fetch_add(1, Ordering::AcqRel);
        }
        self.open.store(open, Ordering::Release);
        debug!("Gate {} {}", self.name, if open { "opened" } else { "closed" });
    }
}

impl Activate for Gate {
    fn activate(&mut self) {
        self.set(true);
    }

    fn deactivate(&mut self) {
        self.set(false);
    }

    fn is_active(&self) -> bool {
        self.is_open()
    }
}

/// Publishes an activation notice so nodes outside this process can follow
#[derive(Debug)]
pub struct Notifier {
    group: &'static str,
    outbox: Outbox,
    active: bool,
}

impl Notifier {
    pub fn new(group: &'static str, outbox: Outbox) -> Self {
        Self {
            group,
            outbox,
            active: false,
        }
    }

    fn set(&mut self, active: bool) {
        if self.active == active {
            return;
        }
        self.active = active;
        self.outbox.send(Outbound::Activation(ActivationNotice {
            group: self.group.to_string(),
            active,
        }));
    }
}

impl Activate for Notifier {
    fn activate(&mut self) {
        self.set(true);
    }

    fn deactivate(&mut self) {
        self.set(false);
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

/// Tagged group member
#[derive(Debug)]
pub enum Member {
    Gate(Gate),
    Notifier(Notifier),
}

impl Activate for Member {
    fn activate(&mut self) {
        match self {
            Member::Gate(gate) => gate.activate(),
            Member::Notifier(notifier) => notifier.activate(),
        }
    }

    fn deactivate(&mut self) {
        match self {
            Member::Gate(gate) => gate.deactivate(),
            Member::Notifier(notifier) => notifier.deactivate(),
        }
    }

    fn is_active(&self) -> bool {
        match self {
            Member::Gate(gate) => gate.is_active(),
            Member::Notifier(notifier) => notifier.is_active(),
        }
    }
}

impl From<Gate> for Member {
    fn from(gate: Gate) -> Self {
        Member::Gate(gate)
    }
}

impl From<Notifier> for Member {
    fn from(notifier: Notifier) -> Self {
        Member::Notifier(notifier)
    }
}

/// Ordered set of members switched as one unit
#[derive(Debug)]
pub struct ActivationGroup {
    name: &'static str,
    members: Vec<Member>,
}

impl ActivationGroup {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            members: Vec::new(),
        }
    }

    pub fn with(mut self, member: impl Into<Member>) -> Self {
        self.members.push(member.into());
        self
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }
}

impl Activate for ActivationGroup {
    fn activate(&mut self) {
        if !self.is_active() {
            info!("Activating {}", self.name);
        }
        self.members.iter_mut().for_each(|m| m.activate());
    }

    fn deactivate(&mut self) {
        if self.members.iter().any(|m| m.is_active()) {
            info!("Deactivating {}", self.name);
        }
        self.members.iter_mut().for_each(|m| m.deactivate());
    }

    /// True when every member is active
    fn is_active(&self) -> bool {
        self.members.iter().all(|m| m.is_active())
    }
}
