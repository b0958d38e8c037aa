//! # Notifier cycle
//!
//! One cycle:
//! 1. `populate_pending()` - refill the waiter pool (new requests may have
//!    registered since the last cycle)
//! 2. `wait(timeout)` - block until ready / timeout / shutdown
//! 3. On `Shutdown`: stop, nothing else this cycle
//! 4. Otherwise `notify_pending()` - on `Ready` *and* on `Timeout`
//!
//! Step 4 runs after a timeout as well. A request can become ready right
//! as the wait gives up, and the worker's classification of the wake-up
//! is not trusted to say which requests are done. Draining an empty set is
//! free, so the cycle always drains.
//!
//! `NotifierLoop` runs cycles in place, on whichever thread calls it. The
//! threaded variant with back-pressure is `driver::Driver`.

use std::time::Duration;

use notifier_core::error::NotifyResult;
use notifier_core::worker::{RequestNotifier, WaitOutcome};
use notifier_core::{ndebug, ntrace};

/// Whether the worker is still running after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Continue,
    Finished,
}

/// Perform one notifier cycle against `worker`.
pub fn run_notifier_cycle<W>(worker: &W, timeout: Duration) -> NotifyResult<CycleOutcome>
where
    W: RequestNotifier + ?Sized,
{
    Ok(cycle_counted(worker, timeout)?.0)
}

fn cycle_counted<W>(worker: &W, timeout: Duration) -> NotifyResult<(CycleOutcome, usize)>
where
    W: RequestNotifier + ?Sized,
{
    worker.populate_pending();

    let outcome = worker.wait(timeout)?;
    ntrace!("notifier cycle: wait -> {}", outcome.as_str());

    match outcome {
        WaitOutcome::Shutdown => Ok((CycleOutcome::Finished, 0)),
        WaitOutcome::Ready | WaitOutcome::Timeout => {
            let resolved = worker.notify_pending();
            Ok((CycleOutcome::Continue, resolved))
        }
    }
}

/// Counters from `NotifierLoop::run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Cycles run, including the final one that saw `Shutdown`
    pub cycles: u64,
    /// Waiters resolved across all cycles
    pub resolved: u64,
}

/// Runs notifier cycles on the current thread.
pub struct NotifierLoop<W: RequestNotifier> {
    worker: W,
    timeout: Duration,
    stats: LoopStats,
    finished: bool,
}

impl<W: RequestNotifier> NotifierLoop<W> {
    pub fn new(worker: W, timeout: Duration) -> Self {
        Self {
            worker,
            timeout,
            stats: LoopStats::default(),
            finished: false,
        }
    }

    /// Run one cycle. After `Finished` further calls do nothing.
    pub fn cycle(&mut self) -> NotifyResult<CycleOutcome> {
        if self.finished {
            return Ok(CycleOutcome::Finished);
        }
        let (outcome, resolved) = cycle_counted(&self.worker, self.timeout)?;
        self.stats.cycles += 1;
        self.stats.resolved += resolved as u64;
        if outcome == CycleOutcome::Finished {
            self.finished = true;
        }
        Ok(outcome)
    }

    /// Run cycles until the worker shuts down.
    pub fn run(mut self) -> NotifyResult<LoopStats> {
        while self.cycle()? == CycleOutcome::Continue {}
        ndebug!(
            "notifier loop finished: {} cycles, {} resolved",
            self.stats.cycles, self.stats.resolved
        );
        Ok(self.stats)
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn worker(&self) -> &W {
        &self.worker
    }
}
