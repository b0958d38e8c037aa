//! # In-process request table
//!
//! A `RequestNotifier` for transports that report completions from their
//! own progress thread. Requests register a waiter and get a future back;
//! the progress side calls `complete()`; the notifier driver wakes up,
//! and the resolution task on the scheduler thread fulfils the futures.
//!
//! ```text
//!  scheduler thread        progress thread         driver thread
//!  ────────────────        ───────────────         ─────────────
//!  register() → future
//!                          complete(id) ──ready──▶ wait() → Ready
//!  notify_pending()  ◀──────────── resolution task ───────┘
//!  future → Ready
//! ```
//!
//! `populate_pending()` keeps a pool of waiters pre-allocated so that
//! `register()` rarely allocates. `notify_pending()` swaps the ready list
//! out under the lock and resolves outside it, one `catch_unwind` per
//! waiter: a waker that panics does not stop the rest of the batch.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use notifier_core::error::{panic_message, NotifyError, NotifyResult};
use notifier_core::worker::{RequestNotifier, WaitOutcome};
use notifier_core::{ndebug, nerror, ntrace};

/// Identifier handed out by `register()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// Final state of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    /// Transfer finished; bytes moved.
    Completed(usize),
    /// Transfer failed with a transport message.
    Failed(String),
    /// Cancelled before completion.
    Cancelled,
}

/// Work deferred to the next `notify_pending()`.
pub type DelayedCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct WaiterState {
    status: Option<RequestStatus>,
    waker: Option<Waker>,
    /// The future was dropped before it saw a status
    abandoned: bool,
}

type Waiter = Arc<Mutex<WaiterState>>;

fn lock_waiter(w: &Waiter) -> MutexGuard<'_, WaiterState> {
    w.lock().unwrap_or_else(|e| e.into_inner())
}

/// Future returned by `RequestTable::register()`.
///
/// Dropping it before completion abandons the request; the table forgets
/// it on the next `populate_pending()`.
pub struct RequestFuture {
    waiter: Waiter,
    abandoned: Arc<AtomicUsize>,
    finished: bool,
}

impl Future for RequestFuture {
    type Output = RequestStatus;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<RequestStatus> {
        let this = self.get_mut();
        let mut state = lock_waiter(&this.waiter);
        match state.status.take() {
            Some(status) => {
                this.finished = true;
                Poll::Ready(status)
            }
            None => {
                let stale = state
                    .waker
                    .as_ref()
                    .map_or(true, |w| !w.will_wake(cx.waker()));
                if stale {
                    state.waker = Some(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl Drop for RequestFuture {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        {
            let mut state = lock_waiter(&self.waiter);
            state.abandoned = true;
            state.waker = None;
        }
        self.abandoned.fetch_add(1, Ordering::Release);
    }
}

struct TableInner {
    /// Pre-allocated waiters
    pool: Vec<Waiter>,
    /// Registered, not yet completed
    pending: HashMap<RequestId, Waiter>,
    /// Completed, not yet resolved
    ready: Vec<(RequestId, Waiter, RequestStatus)>,
    /// Callbacks for the next drain
    callbacks: Vec<DelayedCallback>,
    next_id: u64,
    stopped: bool,
}

/// Table of in-flight requests. Share it as `Arc<RequestTable>`.
pub struct RequestTable {
    inner: Mutex<TableInner>,
    condvar: Condvar,
    pool_size: usize,
    /// Futures dropped since the last sweep
    abandoned: Arc<AtomicUsize>,
}

impl RequestTable {
    pub fn new(pool_size: usize) -> Self {
        Self {
            inner: Mutex::new(TableInner {
                pool: Vec::with_capacity(pool_size),
                pending: HashMap::new(),
                ready: Vec::new(),
                callbacks: Vec::new(),
                next_id: 0,
                stopped: false,
            }),
            condvar: Condvar::new(),
            pool_size,
            abandoned: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new request and return its future.
    pub fn register(&self) -> (RequestId, RequestFuture) {
        let mut inner = self.lock();
        let waiter = inner.pool.pop().unwrap_or_default();
        let id = RequestId(inner.next_id);
        inner.next_id += 1;
        inner.pending.insert(id, Arc::clone(&waiter));
        let fut = RequestFuture {
            waiter,
            abandoned: Arc::clone(&self.abandoned),
            finished: false,
        };
        (id, fut)
    }

    /// Mark a request finished. Callable from any thread.
    pub fn complete(&self, id: RequestId, status: RequestStatus) -> NotifyResult<()> {
        {
            let mut inner = self.lock();
            let waiter = inner
                .pending
                .remove(&id)
                .ok_or(NotifyError::UnknownRequest(id.0))?;
            inner.ready.push((id, waiter, status));
        }
        self.condvar.notify_all();
        Ok(())
    }

    /// Move every pending request to the ready list as `Cancelled`.
    ///
    /// Returns how many were cancelled. They are resolved by the next
    /// `notify_pending()`.
    pub fn cancel_pending(&self) -> usize {
        let n = {
            let mut inner = self.lock();
            let drained: Vec<_> = inner.pending.drain().collect();
            let n = drained.len();
            inner
                .ready
                .extend(drained.into_iter().map(|(id, w)| (id, w, RequestStatus::Cancelled)));
            n
        };
        if n > 0 {
            self.condvar.notify_all();
        }
        n
    }

    /// Run `callback` on the scheduler thread during the next drain.
    pub fn register_callback<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.lock().callbacks.push(Box::new(callback));
        self.condvar.notify_all();
    }

    /// Worker-side shutdown: every current and future `wait` returns
    /// `Shutdown`.
    pub fn stop(&self) {
        self.lock().stopped = true;
        self.condvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn ready_len(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn pool_len(&self) -> usize {
        self.lock().pool.len()
    }
}

impl RequestNotifier for RequestTable {
    /// Refill the waiter pool and forget requests whose future was dropped.
    fn populate_pending(&self) {
        let mut inner = self.lock();
        if self.abandoned.swap(0, Ordering::Acquire) > 0 {
            let before = inner.pending.len();
            inner.pending.retain(|_, w| !lock_waiter(w).abandoned);
            let swept = before - inner.pending.len();
            if swept > 0 {
                ndebug!("request table forgot {} abandoned requests", swept);
            }
        }
        let missing = self.pool_size.saturating_sub(inner.pool.len());
        inner.pool.extend((0..missing).map(|_| Waiter::default()));
    }

    fn wait(&self, timeout: Duration) -> NotifyResult<WaitOutcome> {
        // A timeout too large for `Instant` means no deadline
        let deadline = Instant::now().checked_add(timeout);
        let mut inner = self.lock();
        loop {
            if inner.stopped {
                return Ok(WaitOutcome::Shutdown);
            }
            if !inner.ready.is_empty() || !inner.callbacks.is_empty() {
                return Ok(WaitOutcome::Ready);
            }
            inner = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(WaitOutcome::Timeout);
                    }
                    self.condvar
                        .wait_timeout(inner, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                }
                None => self.condvar.wait(inner).unwrap_or_else(|e| e.into_inner()),
            };
        }
    }

    /// Resolve ready waiters, then run delayed callbacks.
    ///
    /// Returns waiters resolved plus callbacks run; failures are logged and
    /// not counted.
    fn notify_pending(&self) -> usize {
        let (ready, callbacks) = {
            let mut inner = self.lock();
            if inner.ready.is_empty() && inner.callbacks.is_empty() {
                return 0;
            }
            (
                std::mem::take(&mut inner.ready),
                std::mem::take(&mut inner.callbacks),
            )
        };

        ntrace!("resolving {} requests, {} callbacks", ready.len(), callbacks.len());

        let mut resolved = 0;
        for (id, waiter, status) in ready {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                let waker = {
                    let mut state = lock_waiter(&waiter);
                    state.status = Some(status);
                    state.waker.take()
                };
                if let Some(w) = waker {
                    w.wake();
                }
            }));
            match result {
                Ok(()) => resolved += 1,
                Err(payload) => {
                    nerror!("resolving {} panicked: {}", id, panic_message(payload.as_ref()));
                }
            }
        }

        for callback in callbacks {
            match panic::catch_unwind(AssertUnwindSafe(callback)) {
                Ok(()) => resolved += 1,
                Err(payload) => {
                    nerror!("delayed callback panicked: {}", panic_message(payload.as_ref()));
                }
            }
        }

        resolved
    }
}
