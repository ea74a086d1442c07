// Outbound queue toward the transport
//
// Components never talk to zenoh or the serial port directly. They push
// into the outbox, which never blocks, and the runtime's forwarder task
// drains it.

use tokio::sync::mpsc;
use tracing::debug;

use crate::bus::{ActuatorCommand, BusFrame};
use crate::messages::ActivationNotice;
use crate::state::OperatingMode;

/// Everything the core emits
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Frame(BusFrame),
    Mode(OperatingMode),
    Activation(ActivationNotice),
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Outbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Best-effort send, dropped if the forwarder is gone
    pub fn send(&self, msg: Outbound) {
        if let Err(e) = self.tx.send(msg) {
            debug!("Outbox closed, dropping {:?}", e.0);
        }
    }

    pub fn command(&self, cmd: ActuatorCommand) {
        self.send(Outbound::Frame(cmd.to_frame()));
    }
}

/// Take everything queued so far without waiting
pub fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}
