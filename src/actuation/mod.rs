//! Actuation backends
//!
//! The relay never moves legs itself. Every resolved command is handed to an
//! [`Actuator`], one operation per command, awaited from the dispatcher task.

mod logging;
#[cfg(any(test, feature = "test-util"))]
mod recording;
mod serial;

pub use logging::LoggingActuator;
#[cfg(any(test, feature = "test-util"))]
pub use recording::RecordingActuator;
pub use serial::{SerialActuator, SerialConfig, DEFAULT_BAUD_RATE};

use async_trait::async_trait;
use hexapod_shared::Command;
use thiserror::Error;

/// Errors raised by an actuation backend
#[derive(Error, Debug)]
pub enum ActuationError {
    #[error("Serial link error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("Actuator I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{operation} failed: {reason}")]
    Failed {
        operation: &'static str,
        reason: String,
    },
}

/// Motion and gait operations of the robot
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn move_forward(&self) -> Result<(), ActuationError>;
    async fn move_backward(&self) -> Result<(), ActuationError>;
    async fn turn_left(&self) -> Result<(), ActuationError>;
    async fn turn_right(&self) -> Result<(), ActuationError>;

    /// Halt all motion. Must be idempotent.
    async fn stop(&self) -> Result<(), ActuationError>;

    async fn stand(&self) -> Result<(), ActuationError>;
    async fn lay_down(&self) -> Result<(), ActuationError>;
    async fn dance(&self) -> Result<(), ActuationError>;
    async fn set_tripod_gait(&self) -> Result<(), ActuationError>;
    async fn set_wave_gait(&self) -> Result<(), ActuationError>;
    async fn set_ripple_gait(&self) -> Result<(), ActuationError>;
    async fn set_staircase_mode(&self) -> Result<(), ActuationError>;
}

/// Name of the actuator operation a command maps to
pub fn operation_name(command: Command) -> &'static str {
    match command {
        Command::Forward => "move_forward",
        Command::Backward => "move_backward",
        Command::Left => "turn_left",
        Command::Right => "turn_right",
        Command::Stop => "stop",
        Command::Stand => "stand",
        Command::LayDown => "lay_down",
        Command::Dance => "dance",
        Command::TripodGait => "set_tripod_gait",
        Command::WaveGait => "set_wave_gait",
        Command::RippleGait => "set_ripple_gait",
        Command::StaircaseMode => "set_staircase_mode",
    }
}

/// Invoke the operation matching `command`
pub async fn actuate(actuator: &dyn Actuator, command: Command) -> Result<(), ActuationError> {
    match command {
        Command::Forward => actuator.move_forward().await,
        Command::Backward => actuator.move_backward().await,
        Command::Left => actuator.turn_left().await,
        Command::Right => actuator.turn_right().await,
        Command::Stop => actuator.stop().await,
        Command::Stand => actuator.stand().await,
        Command::LayDown => actuator.lay_down().await,
        Command::Dance => actuator.dance().await,
        Command::TripodGait => actuator.set_tripod_gait().await,
        Command::WaveGait => actuator.set_wave_gait().await,
        Command::RippleGait => actuator.set_ripple_gait().await,
        Command::StaircaseMode => actuator.set_staircase_mode().await,
    }
}
