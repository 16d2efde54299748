mod input;
mod link;

use anyhow::{bail, Result};
use clap::Parser;
use futures::StreamExt;
use hexapod_shared::{protocol, Command};
use link::{RobotLink, MIN_COMMAND_INTERVAL};
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Remote control for the hexapod relay
#[derive(Parser, Debug)]
#[command(name = "hexapod-controller", version, about, long_about = None)]
struct Cli {
    /// Relay host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Relay port
    #[arg(long, default_value_t = protocol::DEFAULT_PORT)]
    port: u16,

    /// Seconds to wait for the connection
    #[arg(long, default_value_t = 5)]
    connect_timeout: u64,

    /// Resend the last movement command every N milliseconds until STOP,
    /// another pose or end of input
    #[arg(long)]
    repeat: Option<u64>,

    /// Milliseconds between keepalive pings
    #[arg(long, default_value_t = 2000)]
    ping_interval: u64,

    /// Milliseconds to stay connected after the last command
    #[arg(long, default_value_t = 500)]
    linger: u64,

    /// Commands to send; read from stdin when none are given
    commands: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let addr = format!("{}:{}", cli.host, cli.port);

    let link = RobotLink::connect(&addr, Duration::from_secs(cli.connect_timeout)).await?;
    info!("Connected to robot at {}", addr);

    let result = drive(&link, &cli).await;
    link.shutdown().await;
    result
}

async fn drive(link: &RobotLink, cli: &Cli) -> Result<()> {
    let ping_every = Duration::from_millis(cli.ping_interval.max(1));
    let silence_limit = ping_every * 3;

    let mut pings = interval(ping_every);
    pings.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let repeat_every = cli
        .repeat
        .map(|ms| Duration::from_millis(ms).max(MIN_COMMAND_INTERVAL));
    let mut repeats = interval(repeat_every.unwrap_or(Duration::from_secs(3600)));
    repeats.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut repeating: Option<Command> = None;

    let mut commands = input::command_stream(cli.commands.clone());
    let mut input_done = false;
    let linger = sleep(Duration::MAX);
    tokio::pin!(linger);

    loop {
        tokio::select! {
            _ = link.closed() => bail!("Connection to robot lost"),
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping robot");
                link.send(Command::Stop).await?;
                return Ok(());
            }
            line = commands.next(), if !input_done => match line {
                Some(line) => match input::parse_command(&line) {
                    Ok(command) => {
                        if link.send(command).await? {
                            info!("Sent {}", command);
                        }
                        if repeat_every.is_some() {
                            repeating = next_repeat(repeating, command);
                            repeats.reset();
                        }
                    }
                    Err(e) => warn!("{}", e),
                },
                None => {
                    input_done = true;
                    repeating = None;
                    linger
                        .as_mut()
                        .set(sleep(Duration::from_millis(cli.linger)));
                }
            },
            _ = repeats.tick(), if repeating.is_some() => {
                if let Some(command) = repeating {
                    link.send(command).await?;
                }
            }
            _ = pings.tick() => {
                link.ping().await?;
                if link.since_last_seen() > silence_limit {
                    warn!("Robot silent for {:?}", link.since_last_seen());
                }
            }
            _ = &mut linger => return Ok(()),
        }
    }
}

/// Movement to keep resending after `command` was sent.
///
/// A new movement replaces the repeated one and a gait change keeps it going
/// in the new gait. Anything else, STOP included, ends the repetition.
fn next_repeat(current: Option<Command>, command: Command) -> Option<Command> {
    if command.is_movement() {
        Some(command)
    } else if command.is_gait() {
        current
    } else {
        None
    }
}
