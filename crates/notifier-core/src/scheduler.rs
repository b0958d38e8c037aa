//! Cooperative scheduler contract.
//!
//! The bridge never runs resolution work on its own thread. It hands a
//! `Runnable` to a `Scheduler`, which runs it on the scheduler's thread
//! alongside everything else queued there. Waiting for the runnable to
//! finish is the bridge's business (see `notifier_runtime::handoff`), so
//! the contract here is submission only.

use crate::error::NotifyResult;

/// A unit of work shipped to the scheduler thread.
pub type Runnable = Box<dyn FnOnce() + Send + 'static>;

/// Accepts work from foreign threads.
///
/// **Contract:**
/// - `schedule()` must NEVER block on the scheduler thread making progress.
/// - A runnable that was accepted runs exactly once, or is dropped
///   unrun if the scheduler is torn down.
/// - Returns `Err(NotifyError::SchedulerClosed)` once the scheduler no
///   longer accepts work.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, task: Runnable) -> NotifyResult<()>;
}

impl<S: Scheduler + ?Sized> Scheduler for std::sync::Arc<S> {
    fn schedule(&self, task: Runnable) -> NotifyResult<()> {
        (**self).schedule(task)
    }
}

impl<S: Scheduler + ?Sized> Scheduler for Box<S> {
    fn schedule(&self, task: Runnable) -> NotifyResult<()> {
        (**self).schedule(task)
    }
}
