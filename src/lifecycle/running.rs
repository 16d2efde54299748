//! Process-wide running flag

use std::sync::Arc;
use tokio::sync::watch;

/// Gate shared by the acceptor, every connection handler and the dispatcher.
///
/// Starts set. Clearing it is the only cancellation signal in the relay;
/// tasks either poll [`RunningFlag::is_running`] or await
/// [`RunningFlag::cleared`] next to their blocking call.
#[derive(Clone)]
pub struct RunningFlag {
    sender: Arc<watch::Sender<bool>>,
}

impl RunningFlag {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(true);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn is_running(&self) -> bool {
        *self.sender.borrow()
    }

    /// Clear the flag. Returns `true` only for the call that actually cleared it.
    pub fn clear(&self) -> bool {
        self.sender.send_replace(false)
    }

    /// Resolves once the flag is cleared
    pub async fn cleared(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as self, so this cannot fail
        let _ = receiver.wait_for(|running| !*running).await;
    }
}

impl Default for RunningFlag {
    fn default() -> Self {
        Self::new()
    }
}
