//! Submit-and-block hand-off onto a foreign scheduler.
//!
//! ```text
//!  driver thread                          scheduler thread
//!  ─────────────                          ────────────────
//!  signal() → (sig, handle)
//!  schedule(move || {                ──▶  catch_unwind(task)
//!      sig.complete(outcome)              sig.complete(outcome)
//!  })
//!  handle.wait()  ◀───────────────────── condvar notify
//! ```
//!
//! Only the scheduler's submission primitive is used, so any `Scheduler`
//! works: the local executor, a tokio handle, or a test double.

use std::panic::{self, AssertUnwindSafe};

use notifier_core::error::{panic_message, NotifyError, NotifyResult};
use notifier_core::scheduler::Scheduler;

use crate::signal::signal;

/// How a submitted task finished on the scheduler thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<T> {
    /// Ran to completion.
    Completed(T),
    /// Panicked. The payload is rendered as a string.
    Panicked(String),
}

impl<T> TaskOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed(_))
    }
}

/// Run `task` on the scheduler's thread and block the caller until it has
/// finished.
///
/// # Errors
///
/// - `SchedulerClosed` if the scheduler refused the task
/// - `ResolutionDropped` if the scheduler accepted the task and then
///   dropped it without running it
///
/// A panic inside `task` is not an error here: it is caught on the
/// scheduler thread and returned as `TaskOutcome::Panicked`.
pub fn submit_and_wait<S, F, T>(scheduler: &S, task: F) -> NotifyResult<TaskOutcome<T>>
where
    S: Scheduler + ?Sized,
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (sig, handle) = signal::<TaskOutcome<T>>();

    scheduler.schedule(Box::new(move || {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(task)) {
            Ok(v) => TaskOutcome::Completed(v),
            Err(payload) => TaskOutcome::Panicked(panic_message(payload.as_ref())),
        };
        sig.complete(outcome);
    }))?;

    handle.wait().ok_or(NotifyError::ResolutionDropped)
}
