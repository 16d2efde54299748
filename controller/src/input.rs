//! Operator input: command arguments or stdin lines

use futures::stream::{self, BoxStream, StreamExt};
use hexapod_shared::{Command, UnknownCommand};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Normalize operator text into a command name and resolve it.
///
/// Accepts any case and `-` or spaces in place of `_`, so `tripod gait`
/// and `Tripod-Gait` both resolve to `TRIPOD_GAIT`.
pub fn parse_command(input: &str) -> Result<Command, UnknownCommand> {
    let normalized: String = input
        .trim()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase();
    normalized.parse()
}

/// Operator lines to send, from the command line if any were given,
/// otherwise from stdin until EOF
pub fn command_stream(args: Vec<String>) -> BoxStream<'static, String> {
    if !args.is_empty() {
        return stream::iter(args).boxed();
    }

    let lines = BufReader::new(tokio::io::stdin()).lines();
    stream::unfold(lines, |mut lines| async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return Some((line, lines)),
                Ok(None) | Err(_) => return None,
            }
        }
    })
    .boxed()
}
