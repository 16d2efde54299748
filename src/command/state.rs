//! Dispatch state and read-only snapshots of it

use super::CommandToken;
use hexapod_shared::now_ms;
use tokio::sync::watch;

/// Point-in-time view of the dispatcher
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    /// Last dispatched token, known or not
    pub current_command: Option<CommandToken>,
    /// When that token was dispatched (ms since Unix epoch)
    pub last_command_time_ms: Option<u64>,
    /// Tokens dispatched since start
    pub dispatched: u64,
}

/// State owned by the dispatcher. Only the dispatcher mutates it; everyone
/// else reads through a [`DispatchMonitor`].
pub struct DispatchState {
    current_command: Option<CommandToken>,
    last_command_time_ms: Option<u64>,
    dispatched: u64,
    publisher: watch::Sender<DispatchSnapshot>,
}

impl DispatchState {
    /// Create empty state plus a monitor for it
    pub fn new() -> (Self, DispatchMonitor) {
        let (publisher, receiver) = watch::channel(DispatchSnapshot::default());
        let state = Self {
            current_command: None,
            last_command_time_ms: None,
            dispatched: 0,
            publisher,
        };
        (state, DispatchMonitor { receiver })
    }

    /// Record `token` as the active command
    pub fn record(&mut self, token: &CommandToken) {
        self.current_command = Some(token.clone());
        self.last_command_time_ms = Some(now_ms());
        self.dispatched += 1;

        self.publisher.send_replace(DispatchSnapshot {
            current_command: self.current_command.clone(),
            last_command_time_ms: self.last_command_time_ms,
            dispatched: self.dispatched,
        });
    }

    pub fn current_command(&self) -> Option<&CommandToken> {
        self.current_command.as_ref()
    }

    pub fn last_command_time_ms(&self) -> Option<u64> {
        self.last_command_time_ms
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }
}

/// Read-only handle on the dispatch state
#[derive(Clone)]
pub struct DispatchMonitor {
    receiver: watch::Receiver<DispatchSnapshot>,
}

impl DispatchMonitor {
    pub fn snapshot(&self) -> DispatchSnapshot {
        self.receiver.borrow().clone()
    }

    /// Wait until at least `count` tokens have been dispatched.
    ///
    /// Returns the snapshot that satisfied the condition, or `None` if the
    /// dispatcher is gone.
    pub async fn wait_for_dispatched(&mut self, count: u64) -> Option<DispatchSnapshot> {
        self.receiver
            .wait_for(|snapshot| snapshot.dispatched >= count)
            .await
            .ok()
            .map(|snapshot| snapshot.clone())
    }
}
