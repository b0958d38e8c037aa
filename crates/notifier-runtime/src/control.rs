//! Control channel: external callers → driver thread.
//!
//! A bounded lock-free queue of string tokens. Any thread may hold a
//! `ControlSender`; exactly one driver owns the `ControlReceiver` and only
//! ever polls it without blocking.
//!
//! Sending after the driver has stopped is harmless: the token is queued
//! and never read.

use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use notifier_core::control::{ControlMessage, SHUTDOWN_TOKEN};
use notifier_core::error::{NotifyError, NotifyResult};

/// Create a control channel holding at most `capacity` unread tokens.
pub fn control_channel(capacity: usize) -> (ControlSender, ControlReceiver) {
    let queue = Arc::new(ArrayQueue::new(capacity.max(1)));
    (
        ControlSender { queue: Arc::clone(&queue) },
        ControlReceiver { queue },
    )
}

/// Producer half. Cheap to clone, usable from any thread.
#[derive(Clone)]
pub struct ControlSender {
    queue: Arc<ArrayQueue<String>>,
}

impl ControlSender {
    /// Queue a raw token.
    ///
    /// Returns `Err(ControlQueueFull)` if the driver has fallen behind by
    /// `capacity` tokens.
    pub fn send(&self, token: impl Into<String>) -> NotifyResult<()> {
        self.queue
            .push(token.into())
            .map_err(|_| NotifyError::ControlQueueFull)
    }

    /// Ask the driver to stop.
    pub fn shutdown(&self) -> NotifyResult<()> {
        self.send(SHUTDOWN_TOKEN)
    }

    /// Tokens queued and not yet read.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Consumer half, owned by the driver.
pub struct ControlReceiver {
    queue: Arc<ArrayQueue<String>>,
}

impl ControlReceiver {
    /// Pop one token without blocking.
    pub fn try_recv(&self) -> Option<ControlMessage> {
        self.queue.pop().map(ControlMessage::from)
    }

    /// Pop every token currently queued, oldest first.
    pub fn drain(&self) -> impl Iterator<Item = ControlMessage> + '_ {
        std::iter::from_fn(move || self.try_recv())
    }
}
