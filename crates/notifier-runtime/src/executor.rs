//! # Local cooperative executor
//!
//! A single-threaded executor that owns its tasks and runs them on the
//! thread that calls `block_on()`. Other threads reach it only through an
//! `ExecutorHandle`, which implements `Scheduler`: runnables are pushed
//! onto a lock-free injection queue and the executor thread is unparked.
//!
//! ```text
//!  any thread                       executor thread (block_on)
//!  ──────────                       ──────────────────────────
//!  handle.schedule(r) ──inject──▶   run injected runnables
//!  waker.wake()       ──woken───▶   poll woken tasks
//!       └──────────── unpark ───▶   park() when both queues are empty
//! ```
//!
//! Tasks need not be `Send`. Injected runnables run to completion before
//! any task is polled in the same round.

use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::{pin, Pin};
use std::sync::atomic::{fence, AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use crossbeam_queue::SegQueue;

use notifier_core::error::{NotifyError, NotifyResult};
use notifier_core::scheduler::{Runnable, Scheduler};
use notifier_core::ndebug;

use crate::parking::{new_parker, Parker};

type LocalTask = Pin<Box<dyn Future<Output = ()> + 'static>>;

/// State reachable from other threads.
struct Shared {
    /// Slab indices of woken tasks
    woken: SegQueue<usize>,
    /// Runnables submitted through a handle
    injected: SegQueue<Runnable>,
    parker: Box<dyn Parker>,
    /// New submissions refused
    closed: AtomicBool,
    /// The executor is gone; queued runnables will never run
    dropped: AtomicBool,
}

impl Shared {
    /// Drop every queued runnable without running it.
    fn discard_injected(&self) -> usize {
        let mut n = 0;
        while self.injected.pop().is_some() {
            n += 1;
        }
        n
    }
}

struct TaskWaker {
    index: usize,
    shared: Arc<Shared>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.shared.woken.push(self.index);
        self.shared.parker.unpark();
    }
}

/// Waker for the future passed to `block_on`.
struct MainWaker {
    notified: AtomicBool,
    shared: Arc<Shared>,
}

impl Wake for MainWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.notified.store(true, Ordering::Release);
        self.shared.parker.unpark();
    }
}

/// Task slab. Freed slots are reused, so a stale wake may poll an
/// unrelated task once; futures tolerate spurious polls.
#[derive(Default)]
struct Slab {
    tasks: Vec<Option<LocalTask>>,
    free: Vec<usize>,
}

impl Slab {
    fn insert(&mut self, task: LocalTask) -> usize {
        match self.free.pop() {
            Some(i) => {
                self.tasks[i] = Some(task);
                i
            }
            None => {
                self.tasks.push(Some(task));
                self.tasks.len() - 1
            }
        }
    }

    fn live(&self) -> usize {
        self.tasks.len() - self.free.len()
    }
}

/// Single-threaded executor. Not `Send`: it stays on the thread that
/// created it.
pub struct LocalExecutor {
    shared: Arc<Shared>,
    slab: RefCell<Slab>,
    _not_send: PhantomData<*const ()>,
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                woken: SegQueue::new(),
                injected: SegQueue::new(),
                parker: new_parker(),
                closed: AtomicBool::new(false),
                dropped: AtomicBool::new(false),
            }),
            slab: RefCell::new(Slab::default()),
            _not_send: PhantomData,
        }
    }

    /// A cloneable, thread-safe handle for submitting runnables.
    pub fn handle(&self) -> ExecutorHandle {
        ExecutorHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Add a task. It is first polled by the next `block_on` or
    /// `run_until_idle`.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + 'static,
    {
        let index = self.slab.borrow_mut().insert(Box::pin(future));
        self.shared.woken.push(index);
    }

    /// Number of spawned tasks not yet finished.
    pub fn task_count(&self) -> usize {
        self.slab.borrow().live()
    }

    /// Run `future` to completion on this thread, driving spawned tasks
    /// and injected runnables while it is pending.
    ///
    /// Panics raised by spawned tasks or injected runnables propagate.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        let mut future = pin!(future);
        let main = Arc::new(MainWaker {
            notified: AtomicBool::new(true),
            shared: Arc::clone(&self.shared),
        });
        let waker = Waker::from(Arc::clone(&main));
        let mut cx = Context::from_waker(&waker);

        loop {
            if main.notified.swap(false, Ordering::Acquire) {
                if let Poll::Ready(out) = future.as_mut().poll(&mut cx) {
                    return out;
                }
            }

            let progressed = self.run_round();
            if progressed == 0 && !main.notified.load(Ordering::Acquire) {
                self.shared.parker.park(None);
            }
        }
    }

    /// Run until both queues are empty. Returns the number of runnables
    /// run plus task polls made.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let n = self.run_round();
            if n == 0 {
                return total;
            }
            total += n;
        }
    }

    /// One round: every injected runnable, then every task woken so far.
    fn run_round(&self) -> usize {
        let mut n = 0;

        while let Some(runnable) = self.shared.injected.pop() {
            runnable();
            n += 1;
        }

        let woken = self.shared.woken.len();
        for _ in 0..woken {
            let Some(index) = self.shared.woken.pop() else {
                break;
            };
            if self.poll_task(index) {
                n += 1;
            }
        }

        n
    }

    /// Poll one task. The task is taken out of its slot for the duration
    /// so the slab is not borrowed while it runs.
    fn poll_task(&self, index: usize) -> bool {
        let task = match self.slab.borrow_mut().tasks.get_mut(index) {
            Some(slot) => slot.take(),
            None => None,
        };
        let Some(mut task) = task else {
            return false;
        };

        let waker = Waker::from(Arc::new(TaskWaker {
            index,
            shared: Arc::clone(&self.shared),
        }));
        let mut cx = Context::from_waker(&waker);

        let done = task.as_mut().poll(&mut cx).is_ready();
        let mut slab = self.slab.borrow_mut();
        if done {
            slab.free.push(index);
        } else {
            slab.tasks[index] = Some(task);
        }
        true
    }
}

impl Drop for LocalExecutor {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.dropped.store(true, Ordering::SeqCst);
        fence(Ordering::SeqCst);
        let dropped = self.shared.discard_injected();
        if dropped > 0 {
            ndebug!("executor dropped {} queued runnables", dropped);
        }
    }
}

/// Thread-safe submission handle for a `LocalExecutor`.
#[derive(Clone)]
pub struct ExecutorHandle {
    shared: Arc<Shared>,
}

impl ExecutorHandle {
    /// Refuse further submissions. Runnables already queued still run.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Wake the executor thread without submitting anything.
    pub fn unpark(&self) {
        self.shared.parker.unpark();
    }

    /// Queue `task` past the closed check. A `close()` that lands here
    /// leaves the queue alone; only a dropped executor discards it.
    fn inject(&self, task: Runnable) -> NotifyResult<()> {
        self.shared.injected.push(task);
        fence(Ordering::SeqCst);
        if self.shared.dropped.load(Ordering::SeqCst) {
            self.shared.discard_injected();
            return Err(NotifyError::SchedulerClosed);
        }
        self.shared.parker.unpark();
        Ok(())
    }
}

impl Scheduler for ExecutorHandle {
    fn schedule(&self, task: Runnable) -> NotifyResult<()> {
        if self.is_closed() {
            return Err(NotifyError::SchedulerClosed);
        }
        self.inject(task)
    }
}

/// `Scheduler` backed by a tokio runtime.
///
/// Use a current-thread runtime to get single-threaded cooperative
/// semantics. A runnable submitted after the runtime has shut down is
/// dropped unrun, which the hand-off reports as `ResolutionDropped`.
#[cfg(feature = "tokio")]
#[derive(Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

#[cfg(feature = "tokio")]
impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Handle of the runtime the caller is running in.
    pub fn current() -> NotifyResult<Self> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|_| NotifyError::SchedulerClosed)
    }
}

#[cfg(feature = "tokio")]
impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Runnable) -> NotifyResult<()> {
        self.handle.spawn(async move { task() });
        Ok(())
    }
}
