//! Command vocabulary understood by the hexapod
//!
//! Every command travels as its upper-case name in UTF-8, e.g. `FORWARD` or
//! `TRIPOD_GAIT`. Matching is exact: `forward` or `FORWARD\n` are not commands.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A recognised motion or gait command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
    Stand,
    LayDown,
    Dance,
    TripodGait,
    WaveGait,
    RippleGait,
    StaircaseMode,
}

/// Text that does not name any command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown command: {0}")]
pub struct UnknownCommand(pub String);

impl Command {
    /// The full vocabulary, in wire order
    pub const ALL: [Command; 12] = [
        Command::Forward,
        Command::Backward,
        Command::Left,
        Command::Right,
        Command::Stop,
        Command::Stand,
        Command::LayDown,
        Command::Dance,
        Command::TripodGait,
        Command::WaveGait,
        Command::RippleGait,
        Command::StaircaseMode,
    ];

    /// Wire representation of this command
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Forward => "FORWARD",
            Command::Backward => "BACKWARD",
            Command::Left => "LEFT",
            Command::Right => "RIGHT",
            Command::Stop => "STOP",
            Command::Stand => "STAND",
            Command::LayDown => "LAY_DOWN",
            Command::Dance => "DANCE",
            Command::TripodGait => "TRIPOD_GAIT",
            Command::WaveGait => "WAVE_GAIT",
            Command::RippleGait => "RIPPLE_GAIT",
            Command::StaircaseMode => "STAIRCASE_MODE",
        }
    }

    /// Single gait steps. A failed step is expected to correct itself on the
    /// next one, so these never trigger a fail-safe stop.
    pub fn is_movement(&self) -> bool {
        matches!(
            self,
            Command::Forward | Command::Backward | Command::Left | Command::Right
        )
    }

    /// Gait mode selectors
    pub fn is_gait(&self) -> bool {
        matches!(
            self,
            Command::TripodGait | Command::WaveGait | Command::RippleGait | Command::StaircaseMode
        )
    }
}

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
