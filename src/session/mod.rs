//! Client connection handling
//!
//! This module handles:
//! - Tracking every live client connection
//! - Per-connection reading of pings and command frames
//! - Liveness probing of idle connections
//! - Halting the robot when a client goes away

mod connection;
mod registry;

pub use connection::{ConnectionHandler, Disconnect};
pub use registry::{CloseSignal, ConnectionId, ConnectionInfo, ConnectionRegistry};
