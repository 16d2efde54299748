//! Frame classification
//!
//! The relay protocol has no framing layer: every read from the socket is one
//! frame.
//! ```text
//! [ 0x00 ]            ping (or ping reply / liveness probe)
//! [ UTF-8 text ... ]  command token
//! ```

use bytes::Bytes;
use thiserror::Error;

use crate::command::Command;
use crate::protocol::{PING_BYTE, PING_FRAME};

/// Errors raised while classifying a received payload
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Empty frame")]
    Empty,

    #[error("Command frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// One unit of the wire protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Single zero byte
    Ping,
    /// Command text, exactly as received
    Command(String),
}

impl Frame {
    /// Classify a received payload
    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        match payload {
            [] => Err(FrameError::Empty),
            [PING_BYTE] => Ok(Frame::Ping),
            text => Ok(Frame::Command(std::str::from_utf8(text)?.to_string())),
        }
    }

    /// Build a command frame for a known command
    pub fn command(command: Command) -> Self {
        Frame::Command(command.as_str().to_string())
    }

    /// Encode this frame for the wire
    pub fn encode(&self) -> Bytes {
        match self {
            Frame::Ping => Bytes::from_static(&PING_FRAME),
            Frame::Command(text) => Bytes::copy_from_slice(text.as_bytes()),
        }
    }
}
