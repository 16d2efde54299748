//! Actuator that only logs what it would do

use super::{ActuationError, Actuator};
use async_trait::async_trait;
use tracing::info;

/// Dry-run backend, used when no servo controller is attached
#[derive(Debug, Default, Clone)]
pub struct LoggingActuator;

impl LoggingActuator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Actuator for LoggingActuator {
    async fn move_forward(&self) -> Result<(), ActuationError> {
        info!("Moving forward");
        Ok(())
    }

    async fn move_backward(&self) -> Result<(), ActuationError> {
        info!("Moving backward");
        Ok(())
    }

    async fn turn_left(&self) -> Result<(), ActuationError> {
        info!("Turning left");
        Ok(())
    }

    async fn turn_right(&self) -> Result<(), ActuationError> {
        info!("Turning right");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ActuationError> {
        info!("Stopping");
        Ok(())
    }

    async fn stand(&self) -> Result<(), ActuationError> {
        info!("Standing");
        Ok(())
    }

    async fn lay_down(&self) -> Result<(), ActuationError> {
        info!("Laying down");
        Ok(())
    }

    async fn dance(&self) -> Result<(), ActuationError> {
        info!("Dancing");
        Ok(())
    }

    // Tripod: legs 1,3,5 and 2,4,6 swing in alternating phases
    async fn set_tripod_gait(&self) -> Result<(), ActuationError> {
        info!("Setting tripod gait");
        Ok(())
    }

    // Wave: one leg at a time, 1 through 6
    async fn set_wave_gait(&self) -> Result<(), ActuationError> {
        info!("Setting wave gait");
        Ok(())
    }

    // Ripple: pairs (1,4), (2,5), (3,6)
    async fn set_ripple_gait(&self) -> Result<(), ActuationError> {
        info!("Setting ripple gait");
        Ok(())
    }

    async fn set_staircase_mode(&self) -> Result<(), ActuationError> {
        info!("Setting staircase mode");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuation::actuate;
    use hexapod_shared::Command;

    #[tokio::test]
    async fn test_logging_actuator_never_fails() {
        let actuator = LoggingActuator::new();
        for command in Command::ALL {
            assert!(actuate(&actuator, command).await.is_ok());
        }
    }
}
