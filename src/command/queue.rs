//! Unbounded multi-producer command queue

use super::CommandToken;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::Notify;

/// Returned by [`CommandQueue::push`] once the queue has been closed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Command queue closed, dropped {0}")]
pub struct QueueClosed(pub CommandToken);

/// FIFO of pending command tokens.
///
/// Cloning gives another handle to the same queue. Any number of handles may
/// push; a single consumer pops. Tokens leave in exactly the order they were
/// pushed.
#[derive(Clone, Default)]
pub struct CommandQueue {
    inner: Arc<QueueInner>,
}

#[derive(Default)]
struct QueueInner {
    state: Mutex<QueueState>,
    /// Wakes the consumer on push or close
    available: Notify,
}

#[derive(Default)]
struct QueueState {
    tokens: VecDeque<CommandToken>,
    closed: bool,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a token
    pub fn push(&self, token: CommandToken) -> Result<(), QueueClosed> {
        {
            let mut state = self.state();
            if state.closed {
                return Err(QueueClosed(token));
            }
            state.tokens.push_back(token);
        }
        self.inner.available.notify_one();
        Ok(())
    }

    /// Wait for the next token.
    ///
    /// Returns `None` once the queue is closed and empty.
    pub async fn pop(&self) -> Option<CommandToken> {
        loop {
            {
                let mut state = self.state();
                if let Some(token) = state.tokens.pop_front() {
                    return Some(token);
                }
                if state.closed {
                    return None;
                }
            }
            // notify_one stores a permit when nobody is waiting, so a push
            // between the check above and this await is not lost
            self.inner.available.notified().await;
        }
    }

    /// Reject all further pushes and wake the consumer
    pub fn close(&self) {
        self.state().closed = true;
        self.inner.available.notify_one();
    }

    /// Remove and return every pending token
    pub fn drain(&self) -> Vec<CommandToken> {
        self.state().tokens.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.state().tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().tokens.is_empty()
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
