// Serial bridge to a USB-CAN adapter speaking SLCAN (Lawicel ASCII)
//
// Frame format: 't' + 3 hex digit id + 1 digit length + 2 hex digits per byte + '\r'
//
// Serial writes block, so the bridge lives on its own thread and the async
// side only queues frames for it.

use std::io::Write;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::frame::BusFrame;
use crate::error::{Error, Result};

/// Default serial configuration for the adapter
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 50;

/// Classic CAN data field limit
pub const MAX_DATA_LEN: usize = 8;

/// Largest standard (11-bit) identifier
const MAX_STD_ID: u16 = 0x7FF;

/// Adapter setup: close any open channel, 1 Mbit/s, open
const SETUP_COMMANDS: [&[u8]; 3] = [b"C\r", b"S8\r", b"O\r"];
const CLOSE_COMMAND: &[u8] = b"C\r";

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Writes outbound bus frames to the adapter
pub struct SlcanBridge {
    port: Box<dyn Write + Send>,
}

impl SlcanBridge {
    /// Open the adapter and bring the CAN channel up
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        info!("Opening SLCAN adapter on {}", port_name);
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;
        Self::from_writer(Box::new(port))
    }

    /// Bring the channel up over an already open byte sink
    pub fn from_writer(port: Box<dyn Write + Send>) -> Result<Self> {
        let mut bridge = Self { port };
        for command in SETUP_COMMANDS {
            bridge.write(command)?;
        }
        Ok(bridge)
    }

    /// Move the bridge onto a dedicated writer thread
    pub fn spawn(self) -> Result<SlcanWriter> {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = thread::Builder::new()
            .name("slcan-writer".to_string())
            .spawn(move || self.run(rx))?;
        Ok(SlcanWriter { tx, thread })
    }

    fn run(mut self, mut rx: mpsc::UnboundedReceiver<BusFrame>) {
        while let Some(frame) = rx.blocking_recv() {
            if let Err(e) = self.send(&frame) {
                warn!("SLCAN send failed: {}", e);
            }
        }
        debug!("SLCAN writer stopped");
    }

    /// Send one frame
    pub fn send(&mut self, frame: &BusFrame) -> Result<()> {
        let line = encode_frame(frame)?;
        debug!("SLCAN tx id=0x{:03X} len={}", frame.id, frame.data.len());
        self.write(&line)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }
}

/// Queue side of the writer thread
pub struct SlcanWriter {
    tx: mpsc::UnboundedSender<BusFrame>,
    thread: JoinHandle<()>,
}

impl SlcanWriter {
    /// Queue a frame, never blocks
    pub fn send(&self, frame: BusFrame) {
        if self.tx.send(frame).is_err() {
            warn!("SLCAN writer is gone, frame dropped");
        }
    }

    /// Write out everything queued, close the channel and join the thread
    pub fn finish(self) {
        drop(self.tx);
        if self.thread.join().is_err() {
            warn!("SLCAN writer thread panicked");
        }
    }
}

impl Drop for SlcanBridge {
    fn drop(&mut self) {
        if let Err(e) = self.write(CLOSE_COMMAND) {
            warn!("Failed to close SLCAN channel on drop: {}", e);
        }
    }
}

/// Build the ASCII line for a standard data frame
pub fn encode_frame(frame: &BusFrame) -> Result<Vec<u8>> {
    if frame.data.len() > MAX_DATA_LEN {
        return Err(Error::MalformedFrame {
            expected: MAX_DATA_LEN,
            actual: frame.data.len(),
        });
    }

    let id = frame.id & MAX_STD_ID;
    let mut line = Vec::with_capacity(6 + 2 * frame.data.len());
    line.push(b't');
    line.push(HEX[((id >> 8) & 0xF) as usize]);
    line.push(HEX[((id >> 4) & 0xF) as usize]);
    line.push(HEX[(id & 0xF) as usize]);
    line.push(b'0' + frame.data.len() as u8);
    for &byte in &frame.data {
        line.push(HEX[(byte >> 4) as usize]);
        line.push(HEX[(byte & 0xF) as usize]);
    }
    line.push(b'\r');
    Ok(line)
}
