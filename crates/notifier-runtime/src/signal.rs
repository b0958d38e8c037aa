//! Single-use completion signal.
//!
//! The one-slot rendezvous between the scheduler thread (which completes
//! the signal once the resolution task has run) and the driver thread
//! (which blocks on the handle).
//!
//! States:
//!
//! ```text
//!   Pending ──complete(v)──▶ Completed(v)
//!      │
//!      └──signal dropped──▶ Abandoned
//! ```
//!
//! Both transitions happen at most once. A `Mutex` + `Condvar` pair is
//! enough here: there is exactly one waiter and one completer.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Observable state of a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalState<T> {
    Pending,
    Completed(T),
    Abandoned,
}

struct Slot<T> {
    state: Mutex<SignalState<T>>,
    condvar: Condvar,
}

impl<T> Slot<T> {
    // The lock is never held across user code, so poisoning can only come
    // from a panic inside this module. Recover the guard either way.
    fn lock(&self) -> MutexGuard<'_, SignalState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Create a connected signal/handle pair.
pub fn signal<T>() -> (CompletionSignal<T>, CompletionHandle<T>) {
    let slot = Arc::new(Slot {
        state: Mutex::new(SignalState::Pending),
        condvar: Condvar::new(),
    });
    (
        CompletionSignal { slot: Some(Arc::clone(&slot)) },
        CompletionHandle { slot },
    )
}

/// Completing half. Sent to the scheduler thread with the task.
pub struct CompletionSignal<T> {
    slot: Option<Arc<Slot<T>>>,
}

impl<T> CompletionSignal<T> {
    /// Fulfil the signal and wake the waiter.
    pub fn complete(mut self, value: T) {
        if let Some(slot) = self.slot.take() {
            *slot.lock() = SignalState::Completed(value);
            slot.condvar.notify_one();
        }
    }
}

impl<T> Drop for CompletionSignal<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            let mut state = slot.lock();
            if matches!(*state, SignalState::Pending) {
                *state = SignalState::Abandoned;
            }
            drop(state);
            slot.condvar.notify_one();
        }
    }
}

/// Waiting half. Stays on the driver thread.
pub struct CompletionHandle<T> {
    slot: Arc<Slot<T>>,
}

impl<T> CompletionHandle<T> {
    /// Block until completed. `None` if the signal was dropped unfulfilled.
    pub fn wait(self) -> Option<T> {
        let mut state = self.slot.lock();
        while matches!(*state, SignalState::Pending) {
            state = self
                .slot
                .condvar
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
        Self::take(&mut state)
    }

    /// Block for at most `timeout`.
    ///
    /// `Err(self)` if still pending, so the caller can wait again.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Option<T>, Self> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Ok(self.wait());
        };
        {
            let mut state = self.slot.lock();
            loop {
                if !matches!(*state, SignalState::Pending) {
                    return Ok(Self::take(&mut state));
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let (guard, _) = self
                    .slot
                    .condvar
                    .wait_timeout(state, deadline - now)
                    .unwrap_or_else(|e| e.into_inner());
                state = guard;
            }
        }
        Err(self)
    }

    /// Non-blocking check.
    pub fn is_pending(&self) -> bool {
        matches!(*self.slot.lock(), SignalState::Pending)
    }

    fn take(state: &mut SignalState<T>) -> Option<T> {
        match std::mem::replace(state, SignalState::Abandoned) {
            SignalState::Completed(v) => Some(v),
            _ => None,
        }
    }
}
