// Task wiring: inputs, periodic loops, mode requests and the outbound forwarder
//
// - drive loop (DRIVE_HZ): latest body twist -> wheel setpoints
// - mission loop (MISSION_HZ): latest pose -> waypoint work
// - this task: mode requests, one at a time, until shutdown
// - forwarder: outbox -> zenoh topics (+ SLCAN writer thread)
//
// Inputs are last-value-wins: each subscriber overwrites a watch channel
// and the loops read whatever is newest when they tick.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, info, warn};
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::{Publisher, Subscriber};
use zenoh::sample::Sample;

use crate::activation::{ActivationGroup, Gate, Notifier};
use crate::bus::{BusFrame, ODOMETRY_LAYOUT, SlcanBridge, SlcanWriter};
use crate::config::{
    ODOMETRY_ID, RuntimeConfig, TOPIC_ACTIVATION, TOPIC_BODY_TWIST, TOPIC_BUS_RX, TOPIC_BUS_TX,
    TOPIC_MISSION_ADVANCE, TOPIC_SHUTDOWN, TOPIC_STATE_CURRENT, TOPIC_STATE_REQUEST,
};
use crate::drive::{DriveEngine, WheelDriver};
use crate::error::Result;
use crate::messages::{BodyTwist, PoseEstimate, ShutdownNotice};
use crate::mission::{CheckOutcome, Sequencer};
use crate::outbox::{Outbound, Outbox};
use crate::state::{ActuatorBank, ModeMachine, Transition};

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type SampleSubscriber = Subscriber<FifoChannelHandler<Sample>>;

/// How long the shutdown notice gets to leave the process
const SHUTDOWN_FLUSH: Duration = Duration::from_millis(500);

/// Gates shared between the activation groups and the tasks they switch
#[derive(Debug, Clone)]
pub struct Gates {
    pub drive_tick: Gate,
    pub twist_input: Gate,
    pub mission_tick: Gate,
    pub pose_input: Gate,
}

impl Gates {
    pub fn new() -> Self {
        Self {
            drive_tick: Gate::new("drive_tick"),
            twist_input: Gate::new("twist_input"),
            mission_tick: Gate::new("mission_tick"),
            pose_input: Gate::new("pose_input"),
        }
    }

    /// Drivetrain and autonomous groups built over these gates
    pub fn groups(&self, outbox: &Outbox) -> (ActivationGroup, ActivationGroup) {
        let drivetrain = ActivationGroup::new("drivetrain")
            .with(self.drive_tick.clone())
            .with(self.twist_input.clone())
            .with(Notifier::new("drivetrain", outbox.clone()));
        let autonomous = ActivationGroup::new("autonomous")
            .with(self.pose_input.clone())
            .with(self.mission_tick.clone())
            .with(Notifier::new("autonomous", outbox.clone()));
        (drivetrain, autonomous)
    }
}

impl Default for Gates {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull a pose out of a bus frame. `None` for frames from other devices.
pub fn pose_from_frame(frame: &BusFrame) -> Option<Result<PoseEstimate>> {
    (frame.id == ODOMETRY_ID).then(|| frame.decode::<PoseEstimate>(ODOMETRY_LAYOUT))
}

/// Body twist stamped with the drivetrain activation it was accepted under
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TwistCommand {
    pub epoch: u64,
    pub twist: BodyTwist,
}

/// Drivetrain state carried between ticks
pub struct DriveLoop {
    engine: DriveEngine,
    driver: WheelDriver,
    // Activation the engine state belongs to, `None` while closed
    epoch: Option<u64>,
}

impl DriveLoop {
    pub fn new(engine: DriveEngine, driver: WheelDriver) -> Self {
        Self {
            engine,
            driver,
            epoch: None,
        }
    }

    /// One tick. Skipped while the drivetrain is inactive; the wheels get a
    /// zero setpoint when it closes. On reactivation the wheel history is
    /// dropped and only commands accepted under the new activation count.
    pub fn tick(&mut self, gate: &Gate, twist_rx: &watch::Receiver<TwistCommand>) {
        if !gate.is_open() {
            if self.epoch.take().is_some() {
                self.driver.stop();
            }
            return;
        }
        let epoch = gate.epoch();
        if self.epoch != Some(epoch) {
            self.epoch = Some(epoch);
            self.engine.reset();
        }

        let latest = *twist_rx.borrow();
        let command = if latest.epoch == epoch {
            latest.twist
        } else {
            BodyTwist::default()
        };

        let wheels = self.engine.tick(&command);
        self.driver.publish(&wheels);
    }
}

async fn drive_task(
    mut drive: DriveLoop,
    period: Duration,
    gate: Gate,
    twist_rx: watch::Receiver<TwistCommand>,
) {
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tick.tick().await;
        drive.tick(&gate, &twist_rx);
    }
}

async fn mission_task(
    mut sequencer: Sequencer,
    period: Duration,
    gate: Gate,
    pose_rx: watch::Receiver<Option<PoseEstimate>>,
    advance_sub: SampleSubscriber,
) {
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                if !gate.is_open() {
                    continue;
                }
                let pose = *pose_rx.borrow();
                if let Some(pose) = pose {
                    if let CheckOutcome::Fired(work) = sequencer.check(&pose) {
                        info!("Fired {:?} at ({:.2}, {:.2})", work, pose.position.x, pose.position.y);
                    }
                }
            }
            advance = advance_sub.recv_async() => match advance {
                Ok(_) => {
                    sequencer.advance();
                }
                Err(_) => return,
            },
        }
    }
}

async fn twist_input(sub: SampleSubscriber, gate: Gate, twist_tx: watch::Sender<TwistCommand>) {
    while let Ok(sample) = sub.recv_async().await {
        if !gate.is_open() {
            continue;
        }
        let epoch = gate.epoch();
        let payload = sample.payload().to_bytes();
        match serde_json::from_slice::<BodyTwist>(&payload) {
            Ok(twist) => {
                debug!("Received body twist: {:?}", twist);
                twist_tx.send_replace(TwistCommand { epoch, twist });
            }
            Err(e) => warn!("Failed to parse body twist: {}", e),
        }
    }
}

async fn odometry_input(
    sub: SampleSubscriber,
    gate: Gate,
    pose_tx: watch::Sender<Option<PoseEstimate>>,
) {
    while let Ok(sample) = sub.recv_async().await {
        let payload = sample.payload().to_bytes();
        let frame = match serde_json::from_slice::<BusFrame>(&payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to parse bus frame: {}", e);
                continue;
            }
        };
        match pose_from_frame(&frame) {
            Some(Ok(pose)) if gate.is_open() => {
                pose_tx.send_replace(Some(pose));
            }
            Some(Ok(_)) | None => {}
            Some(Err(e)) => warn!("Dropping odometry frame: {}", e),
        }
    }
}

struct Publishers {
    bus_tx: Publisher<'static>,
    current: Publisher<'static>,
    activation: Publisher<'static>,
    shutdown: Publisher<'static>,
}

async fn publish<T: serde::Serialize>(publisher: &Publisher<'_>, value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => {
            if let Err(e) = publisher.put(json).await {
                warn!("Publish on {} failed: {}", publisher.key_expr(), e);
            }
        }
        Err(e) => warn!("Failed to serialize for {}: {}", publisher.key_expr(), e),
    }
}

/// Drain the outbox toward the transport. Returns after the shutdown notice went out.
async fn forward_outbound(
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    pubs: Publishers,
    serial: Option<SlcanWriter>,
) {
    while let Some(msg) = rx.recv().await {
        match msg {
            Outbound::Frame(frame) => {
                if let Some(serial) = &serial {
                    serial.send(frame.clone());
                }
                publish(&pubs.bus_tx, &frame).await;
            }
            Outbound::Mode(mode) => publish(&pubs.current, &mode).await,
            Outbound::Activation(notice) => publish(&pubs.activation, &notice).await,
            Outbound::Shutdown => {
                publish(&pubs.shutdown, &ShutdownNotice { shutdown: true }).await;
                break;
            }
        }
    }

    // let the writer thread flush what is queued and close the channel
    if let Some(serial) = serial {
        if tokio::task::spawn_blocking(move || serial.finish()).await.is_err() {
            warn!("SLCAN writer did not finish cleanly");
        }
    }
}

pub async fn run(config: RuntimeConfig) -> std::result::Result<(), BoxError> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let twist_sub = session.declare_subscriber(TOPIC_BODY_TWIST).await?;
    let state_sub = session.declare_subscriber(TOPIC_STATE_REQUEST).await?;
    let advance_sub = session.declare_subscriber(TOPIC_MISSION_ADVANCE).await?;
    let bus_rx_sub = session.declare_subscriber(TOPIC_BUS_RX).await?;
    let pubs = Publishers {
        bus_tx: session.declare_publisher(TOPIC_BUS_TX).await?,
        current: session.declare_publisher(TOPIC_STATE_CURRENT).await?,
        activation: session.declare_publisher(TOPIC_ACTIVATION).await?,
        shutdown: session.declare_publisher(TOPIC_SHUTDOWN).await?,
    };

    let serial = match &config.serial_port {
        Some(port) => Some(SlcanBridge::open(port)?.spawn()?),
        None => None,
    };

    let (outbox, outbound_rx) = Outbox::channel();
    let forwarder = tokio::spawn(forward_outbound(outbound_rx, pubs, serial));

    let gates = Gates::new();
    let (drivetrain, autonomous) = gates.groups(&outbox);
    let (mut machine, _mode_rx) =
        ModeMachine::new(drivetrain, autonomous, ActuatorBank::default(), outbox.clone());
    machine.startup();

    let (twist_tx, twist_rx) = watch::channel(TwistCommand::default());
    let (pose_tx, pose_rx) = watch::channel(None);

    let drive_period = config.drive.period();
    let drive = DriveLoop::new(
        DriveEngine::new(config.drive.clone()),
        WheelDriver::new(outbox.clone()),
    );
    let sequencer = Sequencer::new(config.plan.clone(), outbox.clone());
    let mission_period = Duration::from_micros(1_000_000 / config.mission_hz);

    tokio::spawn(twist_input(twist_sub, gates.twist_input.clone(), twist_tx));
    tokio::spawn(odometry_input(bus_rx_sub, gates.pose_input.clone(), pose_tx));
    tokio::spawn(drive_task(drive, drive_period, gates.drive_tick.clone(), twist_rx));
    tokio::spawn(mission_task(
        sequencer,
        mission_period,
        gates.mission_tick.clone(),
        pose_rx,
        advance_sub,
    ));

    info!(
        "Runtime started: drive {}Hz, mission {}Hz, {} missions",
        config.drive.tick_hz,
        config.mission_hz,
        config.plan.missions.len()
    );
    info!("Waiting for mode requests on {}", TOPIC_STATE_REQUEST);

    // Mode requests are handled one at a time, here
    while let Ok(sample) = state_sub.recv_async().await {
        let payload = sample.payload().to_bytes();
        let raw = match serde_json::from_slice::<u8>(&payload) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to parse mode request: {}", e);
                continue;
            }
        };
        match machine.request_raw(raw) {
            Ok(Transition::Halt) => break,
            Ok(_) => {}
            Err(e) => warn!("{}, ignored", e),
        }
    }

    info!("Shutting down");
    if timeout(SHUTDOWN_FLUSH, forwarder).await.is_err() {
        warn!("Shutdown notice not confirmed within {:?}", SHUTDOWN_FLUSH);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activate;
    use crate::bus::{TARGET_LAYOUT, encode};
    use crate::config::DriveConfig;
    use crate::error::Error;
    use crate::geometry::Vec2;
    use crate::outbox::drain;
    use crate::state::OperatingMode;

    fn wheel_values(out: Vec<Outbound>) -> Vec<f32> {
        out.into_iter()
            .filter_map(|msg| match msg {
                Outbound::Frame(frame) => Some(frame.decode::<f32>(TARGET_LAYOUT).unwrap()),
                _ => None,
            })
            .collect()
    }

    fn unlimited() -> DriveConfig {
        DriveConfig {
            accel_limit: None,
            speed_limit: None,
            ..DriveConfig::default()
        }
    }

    #[test]
    fn test_pose_from_frame() {
        let pose = PoseEstimate {
            position: Vec2::new(1.0, 2.0),
            heading: 0.5,
        };
        let frame = BusFrame {
            id: ODOMETRY_ID,
            data: encode(&pose, ODOMETRY_LAYOUT).into_vec(),
        };
        assert_eq!(pose_from_frame(&frame).unwrap().unwrap(), pose);

        let other = BusFrame {
            id: ODOMETRY_ID + 1,
            data: vec![1, 2, 3],
        };
        assert!(pose_from_frame(&other).is_none());

        let short = BusFrame {
            id: ODOMETRY_ID,
            data: vec![1, 2, 3],
        };
        assert!(matches!(
            pose_from_frame(&short),
            Some(Err(Error::MalformedFrame { .. }))
        ));
    }

    fn spin(angular_z: f32) -> BodyTwist {
        BodyTwist {
            angular_z,
            ..BodyTwist::default()
        }
    }

    fn all_near(values: &[f32], expected: f32) -> bool {
        values.len() == 4 && values.iter().all(|v| (v - expected).abs() < 1e-4)
    }

    #[test]
    fn test_drive_loop_gated() {
        let (outbox, mut rx) = Outbox::channel();
        let mut gate = Gate::new("drive");
        let (twist_tx, twist_rx) = watch::channel(TwistCommand::default());
        let mut drive = DriveLoop::new(DriveEngine::new(unlimited()), WheelDriver::new(outbox));

        drive.tick(&gate, &twist_rx);
        assert!(drain(&mut rx).is_empty());

        gate.activate();
        twist_tx.send_replace(TwistCommand {
            epoch: gate.epoch(),
            twist: spin(1.0),
        });
        drive.tick(&gate, &twist_rx);
        assert!(all_near(&wheel_values(drain(&mut rx)), 6.0));

        // last value wins, no new sample keeps the same command
        drive.tick(&gate, &twist_rx);
        assert!(all_near(&wheel_values(drain(&mut rx)), 6.0));
    }

    #[test]
    fn test_command_accepted_before_first_tick_is_kept() {
        let (outbox, mut rx) = Outbox::channel();
        let mut gate = Gate::new("drive");
        let (twist_tx, twist_rx) = watch::channel(TwistCommand::default());
        let mut drive = DriveLoop::new(DriveEngine::new(unlimited()), WheelDriver::new(outbox));

        // a single command right after the mode switch, never repeated
        gate.activate();
        twist_tx.send_replace(TwistCommand {
            epoch: gate.epoch(),
            twist: spin(1.0),
        });
        for _ in 0..3 {
            drive.tick(&gate, &twist_rx);
            assert!(all_near(&wheel_values(drain(&mut rx)), 6.0));
        }
    }

    #[test]
    fn test_command_from_previous_activation_is_stale() {
        let (outbox, mut rx) = Outbox::channel();
        let mut gate = Gate::new("drive");
        let (twist_tx, twist_rx) = watch::channel(TwistCommand::default());
        let mut drive = DriveLoop::new(DriveEngine::new(unlimited()), WheelDriver::new(outbox));

        gate.activate();
        twist_tx.send_replace(TwistCommand {
            epoch: gate.epoch(),
            twist: spin(1.0),
        });
        drive.tick(&gate, &twist_rx);
        drain(&mut rx);

        // closing stops the wheels once
        gate.deactivate();
        drive.tick(&gate, &twist_rx);
        assert!(all_near(&wheel_values(drain(&mut rx)), 0.0));
        drive.tick(&gate, &twist_rx);
        assert!(drain(&mut rx).is_empty());

        gate.activate();
        drive.tick(&gate, &twist_rx);
        assert!(all_near(&wheel_values(drain(&mut rx)), 0.0));
    }

    #[test]
    fn test_fast_reopen_drops_old_command() {
        let (outbox, mut rx) = Outbox::channel();
        let mut gate = Gate::new("drive");
        let (twist_tx, twist_rx) = watch::channel(TwistCommand::default());
        let mut drive = DriveLoop::new(DriveEngine::new(unlimited()), WheelDriver::new(outbox));

        gate.activate();
        twist_tx.send_replace(TwistCommand {
            epoch: gate.epoch(),
            twist: spin(1.0),
        });
        drive.tick(&gate, &twist_rx);
        drain(&mut rx);

        // closed and reopened between two ticks
        gate.deactivate();
        gate.activate();
        drive.tick(&gate, &twist_rx);
        assert!(all_near(&wheel_values(drain(&mut rx)), 0.0));
    }

    #[test]
    fn test_groups_follow_mode() {
        let (outbox, _rx) = Outbox::channel();
        let gates = Gates::new();
        let (drivetrain, autonomous) = gates.groups(&outbox);
        let (mut machine, mode_rx) =
            ModeMachine::new(drivetrain, autonomous, ActuatorBank::default(), outbox);
        machine.startup();

        machine.request(OperatingMode::Manual);
        assert!(gates.drive_tick.is_open() && gates.twist_input.is_open());
        assert!(!gates.mission_tick.is_open() && !gates.pose_input.is_open());

        machine.request(OperatingMode::Automatic);
        assert!(gates.mission_tick.is_open() && gates.pose_input.is_open());

        machine.request(OperatingMode::Reset);
        assert!(!gates.drive_tick.is_open() && !gates.mission_tick.is_open());
        assert_eq!(*mode_rx.borrow(), OperatingMode::Reset);
    }
}
