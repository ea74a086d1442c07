use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use omnibase_runtime::config::RuntimeConfig;
use omnibase_runtime::mission::Plan;

#[derive(Parser, Debug)]
#[command(about = "Control runtime for the omniwheel competition base")]
struct Args {
    /// Serial port of the SLCAN USB-CAN adapter (frames go to zenoh only if omitted)
    #[arg(short, long)]
    serial: Option<String>,

    /// Mission plan JSON file (built-in routine if omitted)
    #[arg(short, long)]
    plan: Option<PathBuf>,

    /// Disable wheel acceleration limiting
    #[arg(long)]
    no_accel_limit: bool,

    /// Disable wheel speed limiting
    #[arg(long)]
    no_speed_limit: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = RuntimeConfig {
        serial_port: args.serial,
        ..RuntimeConfig::default()
    };
    if args.no_accel_limit {
        config.drive.accel_limit = None;
    }
    if args.no_speed_limit {
        config.drive.speed_limit = None;
    }
    if let Some(path) = args.plan {
        match Plan::load(&path) {
            Ok(plan) => {
                info!("Loaded plan from {}", path.display());
                config.plan = plan;
            }
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = omnibase_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
