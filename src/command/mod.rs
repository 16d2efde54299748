//! Command queueing and dispatch
//!
//! This module handles:
//! - The single global FIFO of command tokens fed by every connection
//! - Serialized dispatch of tokens to the actuation backend
//! - Tracking of the most recently dispatched command

mod dispatcher;
mod queue;
mod state;
mod token;

pub use dispatcher::{CommandDispatcher, DispatchOutcome};
pub use queue::{CommandQueue, QueueClosed};
pub use state::{DispatchMonitor, DispatchSnapshot, DispatchState};
pub use token::CommandToken;
