use anyhow::Context;
use clap::Parser;
use hexapod_relay::actuation::{Actuator, LoggingActuator, SerialActuator, SerialConfig, DEFAULT_BAUD_RATE};
use hexapod_relay::{serve, RelayConfig};
use hexapod_shared::protocol;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Network command relay for the hexapod robot
#[derive(Parser, Debug)]
#[command(name = "hexapod-relay", version, about, long_about = None)]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = protocol::DEFAULT_HOST)]
    host: String,

    /// TCP port to listen on
    #[arg(long, default_value_t = protocol::DEFAULT_PORT)]
    port: u16,

    /// Serial port of the servo controller; without it commands are only logged
    #[arg(long)]
    serial: Option<String>,

    /// Baud rate of the servo controller
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let config = RelayConfig::with_address(cli.host, cli.port);

    let actuator: Arc<dyn Actuator> = match cli.serial {
        Some(port) => {
            let serial = SerialConfig {
                port,
                baud: cli.baud,
            };
            Arc::new(
                SerialActuator::open(&serial)
                    .with_context(|| format!("opening servo controller on {}", serial.port))?,
            )
        }
        None => {
            info!("No serial port given, commands will only be logged");
            Arc::new(LoggingActuator::new())
        }
    };

    let report = serve(config, actuator).await?;
    info!(
        "Exited cleanly ({} queued commands discarded, {} connections closed)",
        report.discarded_commands, report.closed_connections
    );

    Ok(())
}
