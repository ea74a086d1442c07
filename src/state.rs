// Operating-mode state machine
//
// The machine is owned by a single task; `&mut self` on `request` is the
// serialization point, so one transition always finishes (groups switched,
// mode bytes queued) before the next one starts. Everyone else reads the
// current mode through a watch channel that is only updated after the side
// effects ran.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::activation::{Activate, ActivationGroup};
use crate::bus::{ActuatorCommand, MotorMode};
use crate::config::{DRIVE_MOTOR_IDS, POSITION_CONTROLLED_IDS};
use crate::error::{Error, Result};
use crate::outbox::{Outbound, Outbox};

/// Process-wide operating mode
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    Disabled = 0,
    Shutdown = 1,
    Manual = 2,
    Reset = 3,
    Automatic = 4,
}

impl TryFrom<u8> for OperatingMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(OperatingMode::Disabled),
            1 => Ok(OperatingMode::Shutdown),
            2 => Ok(OperatingMode::Manual),
            3 => Ok(OperatingMode::Reset),
            4 => Ok(OperatingMode::Automatic),
            other => Err(Error::InvalidModeRequest(other)),
        }
    }
}

/// Motor drivers whose control mode follows the operating mode
#[derive(Debug, Clone)]
pub struct ActuatorBank {
    pub position_ids: Vec<u16>,
    pub drive_ids: Vec<u16>,
}

impl ActuatorBank {
    fn select(&self, outbox: &Outbox, position: MotorMode, drive: MotorMode) {
        for &motor in &self.position_ids {
            outbox.command(ActuatorCommand::SelectMode {
                motor,
                mode: position,
            });
        }
        for &motor in &self.drive_ids {
            outbox.command(ActuatorCommand::SelectMode { motor, mode: drive });
        }
    }
}

impl Default for ActuatorBank {
    fn default() -> Self {
        Self {
            position_ids: POSITION_CONTROLLED_IDS.to_vec(),
            drive_ids: DRIVE_MOTOR_IDS.to_vec(),
        }
    }
}

/// Result of handling one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Adopted(OperatingMode),
    /// Already shut down
    Ignored,
    /// Shutdown was requested, the caller must stop the process
    Halt,
}

pub struct ModeMachine {
    mode: watch::Sender<OperatingMode>,
    drivetrain: ActivationGroup,
    autonomous: ActivationGroup,
    actuators: ActuatorBank,
    outbox: Outbox,
}

impl ModeMachine {
    /// Starts in Disabled. Call `startup` before handing out requests.
    pub fn new(
        drivetrain: ActivationGroup,
        autonomous: ActivationGroup,
        actuators: ActuatorBank,
        outbox: Outbox,
    ) -> (Self, watch::Receiver<OperatingMode>) {
        let (mode, mode_rx) = watch::channel(OperatingMode::Disabled);
        let machine = Self {
            mode,
            drivetrain,
            autonomous,
            actuators,
            outbox,
        };
        (machine, mode_rx)
    }

    pub fn mode(&self) -> OperatingMode {
        *self.mode.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<OperatingMode> {
        self.mode.subscribe()
    }

    /// Home every actuator before any motion is allowed.
    /// Runs the Reset side effects without changing the mode.
    pub fn startup(&mut self) {
        info!("Startup: homing actuators");
        self.reset_effects();
    }

    /// Handle a raw mode byte from the request topic
    pub fn request_raw(&mut self, raw: u8) -> Result<Transition> {
        let requested = OperatingMode::try_from(raw)?;
        Ok(self.request(requested))
    }

    /// Apply an absolute mode request
    pub fn request(&mut self, requested: OperatingMode) -> Transition {
        if self.mode() == OperatingMode::Shutdown {
            warn!("Ignoring {:?} request, already shut down", requested);
            return Transition::Ignored;
        }

        match requested {
            OperatingMode::Disabled => {
                self.drivetrain.deactivate();
                self.autonomous.deactivate();
                self.select(MotorMode::Disabled, MotorMode::Disabled);
            }
            OperatingMode::Shutdown => {
                // the notice ends the forwarder, so the mode goes out first
                self.adopt(requested);
                self.outbox.send(Outbound::Shutdown);
                return Transition::Halt;
            }
            OperatingMode::Manual => {
                self.drivetrain.activate();
                self.autonomous.deactivate();
                self.select(MotorMode::Position, MotorMode::Velocity);
            }
            OperatingMode::Reset => self.reset_effects(),
            OperatingMode::Automatic => {
                self.drivetrain.activate();
                self.autonomous.activate();
                self.select(MotorMode::Position, MotorMode::Velocity);
            }
        }

        self.adopt(requested);
        Transition::Adopted(requested)
    }

    fn reset_effects(&mut self) {
        self.drivetrain.deactivate();
        self.autonomous.deactivate();
        self.select(MotorMode::Homing, MotorMode::Disabled);
    }

    fn select(&self, position: MotorMode, drive: MotorMode) {
        self.actuators.select(&self.outbox, position, drive);
    }

    fn adopt(&mut self, mode: OperatingMode) {
        info!("State changed to {:?}", mode);
        self.outbox.send(Outbound::Mode(mode));
        self.mode.send_replace(mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::{Gate, Notifier};
    use crate::bus::BusFrame;
    use crate::outbox::drain;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Rig {
        machine: ModeMachine,
        mode_rx: watch::Receiver<OperatingMode>,
        rx: UnboundedReceiver<Outbound>,
        drive_gate: Gate,
        auto_gate: Gate,
    }

    fn rig() -> Rig {
        let (outbox, rx) = Outbox::channel();
        let drive_gate = Gate::new("drive");
        let auto_gate = Gate::new("auto");
        let drivetrain = ActivationGroup::new("drivetrain")
            .with(drive_gate.clone())
            .with(Notifier::new("drivetrain", outbox.clone()));
        let autonomous = ActivationGroup::new("autonomous").with(auto_gate.clone());
        let bank = ActuatorBank {
            position_ids: vec![0x170],
            drive_ids: vec![0x160, 0x164, 0x168, 0x16C],
        };
        let (machine, mode_rx) = ModeMachine::new(drivetrain, autonomous, bank, outbox);
        Rig {
            machine,
            mode_rx,
            rx,
            drive_gate,
            auto_gate,
        }
    }

    fn frames(out: &[Outbound]) -> Vec<BusFrame> {
        out.iter()
            .filter_map(|msg| match msg {
                Outbound::Frame(frame) => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }

    fn mode_frames(position: MotorMode, drive: MotorMode) -> Vec<BusFrame> {
        let mut expected = vec![BusFrame {
            id: 0x170,
            data: vec![position.byte()],
        }];
        for id in [0x160, 0x164, 0x168, 0x16C] {
            expected.push(BusFrame {
                id,
                data: vec![drive.byte()],
            });
        }
        expected
    }

    #[test]
    fn test_mode_from_byte() {
        assert_eq!(OperatingMode::try_from(4).unwrap(), OperatingMode::Automatic);
        assert!(matches!(
            OperatingMode::try_from(5),
            Err(Error::InvalidModeRequest(5))
        ));
    }

    #[test]
    fn test_startup_homes_without_changing_mode() {
        let mut rig = rig();
        rig.machine.startup();
        assert_eq!(rig.machine.mode(), OperatingMode::Disabled);
        let out = drain(&mut rig.rx);
        assert_eq!(frames(&out), mode_frames(MotorMode::Homing, MotorMode::Disabled));
        assert!(!out.iter().any(|m| matches!(m, Outbound::Mode(_))));
    }

    #[test]
    fn test_manual_side_effects() {
        let mut rig = rig();
        assert_eq!(
            rig.machine.request(OperatingMode::Manual),
            Transition::Adopted(OperatingMode::Manual)
        );
        assert!(rig.drive_gate.is_open());
        assert!(!rig.auto_gate.is_open());

        let out = drain(&mut rig.rx);
        assert_eq!(frames(&out), mode_frames(MotorMode::Position, MotorMode::Velocity));
        // mode broadcast comes last, after every side effect
        assert_eq!(out.last(), Some(&Outbound::Mode(OperatingMode::Manual)));
        assert_eq!(*rig.mode_rx.borrow(), OperatingMode::Manual);
    }

    #[test]
    fn test_automatic_side_effects() {
        let mut rig = rig();
        rig.machine.request(OperatingMode::Automatic);
        assert!(rig.drive_gate.is_open());
        assert!(rig.auto_gate.is_open());
        let out = drain(&mut rig.rx);
        assert_eq!(frames(&out), mode_frames(MotorMode::Position, MotorMode::Velocity));
        assert_eq!(rig.machine.mode(), OperatingMode::Automatic);
    }

    #[test]
    fn test_disabled_side_effects() {
        let mut rig = rig();
        rig.machine.request(OperatingMode::Automatic);
        drain(&mut rig.rx);

        rig.machine.request(OperatingMode::Disabled);
        assert!(!rig.drive_gate.is_open());
        assert!(!rig.auto_gate.is_open());
        let out = drain(&mut rig.rx);
        assert_eq!(frames(&out), mode_frames(MotorMode::Disabled, MotorMode::Disabled));
        assert_eq!(*rig.mode_rx.borrow(), OperatingMode::Disabled);
    }

    #[test]
    fn test_reset_side_effects() {
        let mut rig = rig();
        rig.machine.request(OperatingMode::Manual);
        drain(&mut rig.rx);

        rig.machine.request(OperatingMode::Reset);
        assert!(!rig.drive_gate.is_open());
        assert!(!rig.auto_gate.is_open());
        let out = drain(&mut rig.rx);
        assert_eq!(frames(&out), mode_frames(MotorMode::Homing, MotorMode::Disabled));
        assert_eq!(rig.machine.mode(), OperatingMode::Reset);
    }

    #[test]
    fn test_shutdown_is_terminal() {
        let mut rig = rig();
        rig.machine.request(OperatingMode::Manual);
        drain(&mut rig.rx);

        assert_eq!(rig.machine.request(OperatingMode::Shutdown), Transition::Halt);
        let out = drain(&mut rig.rx);
        assert_eq!(
            out,
            vec![Outbound::Mode(OperatingMode::Shutdown), Outbound::Shutdown]
        );

        assert_eq!(rig.machine.request(OperatingMode::Manual), Transition::Ignored);
        assert_eq!(rig.machine.mode(), OperatingMode::Shutdown);
        assert!(drain(&mut rig.rx).is_empty());
    }

    #[test]
    fn test_invalid_raw_request_leaves_mode() {
        let mut rig = rig();
        rig.machine.request(OperatingMode::Manual);
        drain(&mut rig.rx);

        assert!(matches!(
            rig.machine.request_raw(42),
            Err(Error::InvalidModeRequest(42))
        ));
        assert_eq!(rig.machine.mode(), OperatingMode::Manual);
        assert!(drain(&mut rig.rx).is_empty());
    }

    #[test]
    fn test_subscriber_sees_mode_changes() {
        let mut rig = rig();
        let mut watcher = rig.machine.subscribe();
        rig.machine.request_raw(2).unwrap();
        assert!(watcher.has_changed().unwrap());
        assert_eq!(*watcher.borrow_and_update(), OperatingMode::Manual);
    }
}
