// Keyboard teleop: WASD move, Z/X rotate, R/F speed, 0-4 mode, N next mission, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use omnibase_runtime::config::{TOPIC_BODY_TWIST, TOPIC_MISSION_ADVANCE, TOPIC_STATE_REQUEST};
use omnibase_runtime::messages::BodyTwist;
use omnibase_runtime::state::OperatingMode;

const SPEEDS: [f32; 3] = [0.2, 0.5, 1.0]; // m/s
const TURN_SPEEDS: [f32; 3] = [0.5, 1.5, 3.0]; // rad/s
const INPUT_TIMEOUT_MS: u64 = 100; // Reset velocities after this much time with no input

type BoxError = Box<dyn std::error::Error + Send + Sync>;

struct Publishers {
    twist: zenoh::pubsub::Publisher<'static>,
    state: zenoh::pubsub::Publisher<'static>,
    advance: zenoh::pubsub::Publisher<'static>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pubs = Publishers {
        twist: session.declare_publisher(TOPIC_BODY_TWIST).await?,
        state: session.declare_publisher(TOPIC_STATE_REQUEST).await?,
        advance: session.declare_publisher(TOPIC_MISSION_ADVANCE).await?,
    };

    info!("Controls: WASD=move, Z/X=rotate, R/F=speed, Q=quit");
    info!("Modes: 0=disabled 1=shutdown 2=manual 3=reset 4=automatic, N=next mission");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&pubs).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(pubs: &Publishers) -> Result<(), BoxError> {
    let mut speed_idx: usize = 0;

    // Persistent velocity state
    let mut twist = BodyTwist::default();
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                let mut moved = true;

                match code {
                    KeyCode::Char('w') if pressed => twist.linear_x = SPEEDS[speed_idx],
                    KeyCode::Char('s') if pressed => twist.linear_x = -SPEEDS[speed_idx],
                    KeyCode::Char('a') if pressed => twist.linear_y = SPEEDS[speed_idx],
                    KeyCode::Char('d') if pressed => twist.linear_y = -SPEEDS[speed_idx],
                    KeyCode::Char('z') if pressed => twist.angular_z = TURN_SPEEDS[speed_idx],
                    KeyCode::Char('x') if pressed => twist.angular_z = -TURN_SPEEDS[speed_idx],
                    other => {
                        moved = false;
                        match other {
                            // Speed control
                            KeyCode::Char('r') if pressed => {
                                speed_idx = (speed_idx + 1).min(2);
                                print_speed(speed_idx);
                            }
                            KeyCode::Char('f') if pressed => {
                                speed_idx = speed_idx.saturating_sub(1);
                                print_speed(speed_idx);
                            }

                            // Mode requests
                            KeyCode::Char(c @ '0'..='4') if pressed => {
                                let raw = c as u8 - b'0';
                                if let Ok(mode) = OperatingMode::try_from(raw) {
                                    info!("Requesting {:?}", mode);
                                }
                                pubs.state.put(raw.to_string()).await?;
                            }
                            KeyCode::Char('n') if pressed => {
                                info!("Advancing mission");
                                pubs.advance.put("{}").await?;
                            }

                            // Quit
                            KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                            _ => {}
                        }
                    }
                }

                if moved {
                    last_movement_input = Instant::now();
                }
            }
        }

        // Reset velocities if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            twist = BodyTwist::default();
        }

        // Always publish at ~50Hz
        pubs.twist.put(serde_json::to_string(&twist)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
