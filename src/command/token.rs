//! Command tokens as they travel through the queue

use hexapod_shared::{Command, UnknownCommand};
use std::fmt;
use std::sync::Arc;

/// Command text received from a client, unmodified.
///
/// A token may or may not name a known command; resolution happens only at
/// dispatch time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandToken(Arc<str>);

impl CommandToken {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    /// The synthetic token enqueued when a connection ends
    pub fn stop() -> Self {
        Command::Stop.into()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve against the command vocabulary
    pub fn resolve(&self) -> Result<Command, UnknownCommand> {
        self.0.parse()
    }
}

impl From<Command> for CommandToken {
    fn from(command: Command) -> Self {
        Self::new(command.as_str())
    }
}

impl From<&str> for CommandToken {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for CommandToken {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for CommandToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
