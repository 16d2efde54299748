//! Serial link to the servo microcontroller
//!
//! The microcontroller runs the gait engine. Each operation is forwarded as
//! the command name followed by a newline, e.g. `TRIPOD_GAIT\n`.

use super::{ActuationError, Actuator};
use async_trait::async_trait;
use hexapod_shared::Command;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

/// Baud rate of the servo controller firmware
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial port parameters
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Device path, e.g. "/dev/ttyUSB0" or "/dev/serial0"
    pub port: String,
    pub baud: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".into(),
            baud: DEFAULT_BAUD_RATE,
        }
    }
}

/// Forwards every operation to the microcontroller over a serial port
pub struct SerialActuator {
    port: String,
    writer: Mutex<SerialStream>,
}

impl SerialActuator {
    /// Open the serial port
    pub fn open(config: &SerialConfig) -> Result<Self, ActuationError> {
        let stream = tokio_serial::new(&config.port, config.baud).open_native_async()?;
        info!("Serial actuator opened on {} at {} baud", config.port, config.baud);

        Ok(Self {
            port: config.port.clone(),
            writer: Mutex::new(stream),
        })
    }

    async fn send(&self, command: Command) -> Result<(), ActuationError> {
        let line = encode_line(command);
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        debug!("Sent {} to {}", command, self.port);
        Ok(())
    }
}

/// Line sent to the microcontroller for `command`
fn encode_line(command: Command) -> String {
    format!("{}\n", command.as_str())
}

#[async_trait]
impl Actuator for SerialActuator {
    async fn move_forward(&self) -> Result<(), ActuationError> {
        self.send(Command::Forward).await
    }

    async fn move_backward(&self) -> Result<(), ActuationError> {
        self.send(Command::Backward).await
    }

    async fn turn_left(&self) -> Result<(), ActuationError> {
        self.send(Command::Left).await
    }

    async fn turn_right(&self) -> Result<(), ActuationError> {
        self.send(Command::Right).await
    }

    async fn stop(&self) -> Result<(), ActuationError> {
        self.send(Command::Stop).await
    }

    async fn stand(&self) -> Result<(), ActuationError> {
        self.send(Command::Stand).await
    }

    async fn lay_down(&self) -> Result<(), ActuationError> {
        self.send(Command::LayDown).await
    }

    async fn dance(&self) -> Result<(), ActuationError> {
        self.send(Command::Dance).await
    }

    async fn set_tripod_gait(&self) -> Result<(), ActuationError> {
        self.send(Command::TripodGait).await
    }

    async fn set_wave_gait(&self) -> Result<(), ActuationError> {
        self.send(Command::WaveGait).await
    }

    async fn set_ripple_gait(&self) -> Result<(), ActuationError> {
        self.send(Command::RippleGait).await
    }

    async fn set_staircase_mode(&self) -> Result<(), ActuationError> {
        self.send(Command::StaircaseMode).await
    }
}
