//! Hexapod command relay
//!
//! Accepts TCP connections from operator controllers, funnels every command
//! they send into one ordered stream and drives the robot's actuation backend
//! from it, one command at a time.
//!
//! ```text
//! socket bytes -> ConnectionHandler -> CommandQueue -> CommandDispatcher -> Actuator
//! ```

pub mod actuation;
pub mod command;
pub mod config;
pub mod lifecycle;
pub mod listener;
pub mod session;

pub use actuation::{Actuator, ActuationError, LoggingActuator, SerialActuator};
pub use command::{CommandQueue, CommandToken, DispatchMonitor, DispatchSnapshot};
pub use config::RelayConfig;
pub use lifecycle::{serve, RelayError, RelayServer, RunningFlag, ShutdownReport};
