//! Hexapod Shared Protocol Types
//!
//! This crate provides the command vocabulary and frame classification shared
//! by the relay server and the operator controllers.

pub mod command;
pub mod frame;

use std::time::{SystemTime, UNIX_EPOCH};

// Re-export commonly used types at crate root
pub use command::{Command, UnknownCommand};
pub use frame::{Frame, FrameError};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Wire and timing parameters for the relay
pub mod protocol {
    /// Default TCP port the relay listens on
    pub const DEFAULT_PORT: u16 = 8080;

    /// Default bind address
    pub const DEFAULT_HOST: &str = "0.0.0.0";

    /// Value of the single-byte ping frame (and of its reply)
    pub const PING_BYTE: u8 = 0x00;

    /// A complete ping frame
    pub const PING_FRAME: [u8; 1] = [PING_BYTE];

    /// Per-read timeout before the server probes an idle connection
    pub const READ_TIMEOUT_MS: u64 = 5000;

    /// Bounded wait of the dispatcher on an empty queue
    pub const DISPATCH_POLL_MS: u64 = 100;

    /// Pause after every dispatched command
    pub const DISPATCH_PAUSE_MS: u64 = 10;

    /// Size of a single socket read
    pub const READ_BUFFER_SIZE: usize = 1024;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_is_monotonic_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(a > 0);
        assert!(b >= a);
    }

    #[test]
    fn test_ping_frame_is_single_zero_byte() {
        assert_eq!(protocol::PING_FRAME, [0u8]);
    }
}
