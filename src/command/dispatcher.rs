//! Command dispatcher - the single consumer of the command queue

use super::{CommandQueue, CommandToken, DispatchMonitor, DispatchState};
use crate::actuation::{self, ActuationError, Actuator};
use crate::config::RelayConfig;
use crate::lifecycle::RunningFlag;
use hexapod_shared::Command;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// What happened to a dispatched token
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The actuation call succeeded
    Executed(Command),
    /// The token names no command; nothing was actuated
    Unknown,
    /// A movement step failed and was forgiven
    Forgiven {
        command: Command,
        error: ActuationError,
    },
    /// A non-movement command failed and the robot was stopped
    FailSafe {
        command: Command,
        error: ActuationError,
    },
}

/// Pulls tokens off the queue one at a time and drives the actuator
pub struct CommandDispatcher {
    queue: CommandQueue,
    actuator: Arc<dyn Actuator>,
    state: DispatchState,
    running: RunningFlag,
    poll_interval: Duration,
    pause: Duration,
}

impl CommandDispatcher {
    /// Create a dispatcher and the monitor for its state
    pub fn new(
        queue: CommandQueue,
        actuator: Arc<dyn Actuator>,
        running: RunningFlag,
        config: &RelayConfig,
    ) -> (Self, DispatchMonitor) {
        let (state, monitor) = DispatchState::new();
        let dispatcher = Self {
            queue,
            actuator,
            state,
            running,
            poll_interval: config.dispatch_poll,
            pause: config.dispatch_pause,
        };
        (dispatcher, monitor)
    }

    /// Dispatch loop. Runs until the running flag is cleared or the queue is
    /// closed and empty.
    pub async fn run(mut self) {
        info!("Command dispatcher started");

        while self.running.is_running() {
            let token = tokio::select! {
                biased;
                _ = self.running.cleared() => break,
                pulled = timeout(self.poll_interval, self.queue.pop()) => match pulled {
                    Ok(Some(token)) => token,
                    Ok(None) => break,
                    // Nothing queued, recheck the flag
                    Err(_) => continue,
                },
            };

            self.dispatch(token).await;

            // Throughput cap for the actuation backend
            sleep(self.pause).await;
        }

        info!(
            dispatched = self.state.dispatched(),
            "Command dispatcher stopped"
        );
    }

    /// Record and execute one token
    pub async fn dispatch(&mut self, token: CommandToken) -> DispatchOutcome {
        self.state.record(&token);

        let command = match token.resolve() {
            Ok(command) => command,
            Err(e) => {
                warn!("{}", e);
                return DispatchOutcome::Unknown;
            }
        };

        debug!(operation = actuation::operation_name(command), "Dispatching {}", command);

        match actuation::actuate(self.actuator.as_ref(), command).await {
            Ok(()) => DispatchOutcome::Executed(command),
            Err(error) if command.is_movement() => {
                error!("Error executing command {}: {}", command, error);
                DispatchOutcome::Forgiven { command, error }
            }
            Err(error) => {
                error!("Error executing command {}: {}, stopping", command, error);
                if let Err(stop_error) = self.actuator.stop().await {
                    error!("Fail-safe stop failed: {}", stop_error);
                }
                DispatchOutcome::FailSafe { command, error }
            }
        }
    }

    pub fn state(&self) -> &DispatchState {
        &self.state
    }
}
