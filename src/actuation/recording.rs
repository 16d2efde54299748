//! Actuator that records every call
//!
//! Useful for test harnesses and for checking a command stream without
//! hardware. Calls can be made to fail or to take time.

use super::{ActuationError, Actuator};
use async_trait::async_trait;
use hexapod_shared::Command;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records the operation name of every call, in call order
#[derive(Debug, Default, Clone)]
pub struct RecordingActuator {
    calls: Arc<Mutex<Vec<&'static str>>>,
    failing: HashSet<&'static str>,
    delay: Option<Duration>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the operation behind `command` return an error (after recording it)
    pub fn failing_on(mut self, command: Command) -> Self {
        self.failing.insert(super::operation_name(command));
        self
    }

    /// Make every call take `delay` before returning
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Operation names called so far
    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().clone()
    }

    /// Number of times `operation` was called
    pub fn count(&self, operation: &str) -> usize {
        self.lock().iter().filter(|op| **op == operation).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<&'static str>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn record(&self, operation: &'static str) -> Result<(), ActuationError> {
        self.lock().push(operation);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(operation) {
            return Err(ActuationError::Failed {
                operation,
                reason: "injected failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Actuator for RecordingActuator {
    async fn move_forward(&self) -> Result<(), ActuationError> {
        self.record("move_forward").await
    }

    async fn move_backward(&self) -> Result<(), ActuationError> {
        self.record("move_backward").await
    }

    async fn turn_left(&self) -> Result<(), ActuationError> {
        self.record("turn_left").await
    }

    async fn turn_right(&self) -> Result<(), ActuationError> {
        self.record("turn_right").await
    }

    async fn stop(&self) -> Result<(), ActuationError> {
        self.record("stop").await
    }

    async fn stand(&self) -> Result<(), ActuationError> {
        self.record("stand").await
    }

    async fn lay_down(&self) -> Result<(), ActuationError> {
        self.record("lay_down").await
    }

    async fn dance(&self) -> Result<(), ActuationError> {
        self.record("dance").await
    }

    async fn set_tripod_gait(&self) -> Result<(), ActuationError> {
        self.record("set_tripod_gait").await
    }

    async fn set_wave_gait(&self) -> Result<(), ActuationError> {
        self.record("set_wave_gait").await
    }

    async fn set_ripple_gait(&self) -> Result<(), ActuationError> {
        self.record("set_ripple_gait").await
    }

    async fn set_staircase_mode(&self) -> Result<(), ActuationError> {
        self.record("set_staircase_mode").await
    }
}
