//! Executor thread parking
//!
//! The local executor parks its thread when it has nothing to run. Wake
//! sources (task wakers, runnables injected from the driver thread) call
//! `unpark()`.
//!
//! Token semantics: an `unpark()` that lands while the thread is not parked
//! is remembered, and the next `park()` returns immediately. A wake-up can
//! therefore never be lost between "queue looked empty" and "go to sleep".

use std::time::Duration;

/// Single-owner park / any-thread unpark.
pub trait Parker: Send + Sync {
    /// Park the calling thread until unparked or timeout.
    ///
    /// Returns:
    /// - `true` if a wake token was consumed
    /// - `false` on timeout or spurious wakeup
    ///
    /// Callers must re-check their queues regardless of the result.
    fn park(&self, timeout: Option<Duration>) -> bool;

    /// Make the next (or current) `park()` return.
    fn unpark(&self);
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParker as PlatformParker;
    } else {
        mod fallback;
        pub use fallback::CondvarParker as PlatformParker;
    }
}

/// Create a new platform-appropriate parker
pub fn new_parker() -> Box<dyn Parker> {
    Box::new(PlatformParker::new())
}
