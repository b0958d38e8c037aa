//! Worker contract.
//!
//! A `RequestNotifier` is the slice of a communication worker that the
//! bridge drives. The worker owns its completion queues and its table of
//! waiters; the bridge only tells it when to refill, when to block and
//! when to resolve.
//!
//! # Implementors
//!
//! - `RequestTable` (notifier-runtime): in-process table of futures
//!   completed by a progress thread. Used by tests and the smoke binary.
//! - Native transports: wrap the transport's own notifier behind this trait.

use std::time::Duration;

use crate::error::NotifyResult;

/// Result of one bounded wait on the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitOutcome {
    /// At least one waiter became ready.
    Ready,
    /// The timeout elapsed without a notification.
    Timeout,
    /// The worker is shutting down. Terminal.
    Shutdown,
}

impl WaitOutcome {
    #[inline]
    pub fn is_shutdown(self) -> bool {
        matches!(self, WaitOutcome::Shutdown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WaitOutcome::Ready => "ready",
            WaitOutcome::Timeout => "timeout",
            WaitOutcome::Shutdown => "shutdown",
        }
    }
}

/// The three worker operations consumed by the bridge.
///
/// **Contract:**
/// - `populate_pending()` runs before every `wait()`, including the first.
/// - `wait()` blocks for at most `timeout`.
/// - `notify_pending()` is cheap and idempotent with nothing ready.
/// - Calls never overlap: the driver thread and the resolution task take
///   turns, so implementations may rely on external serialization but must
///   still be `Sync` because the calls come from two different threads.
pub trait RequestNotifier: Send + Sync {
    /// Refill the pool of waiters that new requests will be attached to.
    fn populate_pending(&self);

    /// Block until a waiter is ready, the timeout elapses, or the worker
    /// shuts down.
    ///
    /// An `Err` is fatal to the caller's loop.
    fn wait(&self, timeout: Duration) -> NotifyResult<WaitOutcome>;

    /// Resolve every waiter that is currently satisfied.
    ///
    /// Returns the number of waiters resolved (0 is not an error).
    fn notify_pending(&self) -> usize;
}

impl<T: RequestNotifier + ?Sized> RequestNotifier for std::sync::Arc<T> {
    fn populate_pending(&self) {
        (**self).populate_pending()
    }

    fn wait(&self, timeout: Duration) -> NotifyResult<WaitOutcome> {
        (**self).wait(timeout)
    }

    fn notify_pending(&self) -> usize {
        (**self).notify_pending()
    }
}
