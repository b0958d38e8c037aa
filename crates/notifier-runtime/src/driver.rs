//! # Driver: the notifier thread
//!
//! The driver runs on a dedicated OS thread. Each iteration it:
//! 1. Refills the worker's waiter pool and blocks in `wait(timeout)`
//! 2. Polls the control channel once (non-blocking, drains what is queued)
//! 3. Stops on a `shutdown` token or a worker `Shutdown`
//! 4. Loops straight back on `Timeout`
//! 5. On `Ready`, ships one resolution task to the scheduler and blocks
//!    until it has run
//!
//! ```text
//!            ┌──────────── Timeout ────────────┐
//!            ▼                                 │
//!        Running ──populate+wait──▶ Draining(outcome)
//!            ▲                                 │
//!            └──── Ready: submit + block ──────┤
//!                                              │ shutdown token / worker Shutdown
//!                                              ▼
//!                                        ShuttingDown ──▶ Stopped
//! ```
//!
//! Step 5 is the back-pressure point: the driver never calls `wait` again
//! while a resolution task is outstanding, so two drains can never race on
//! the worker's waiter table.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use notifier_core::control::ControlMessage;
use notifier_core::error::{panic_message, NotifyError, NotifyResult};
use notifier_core::scheduler::Scheduler;
use notifier_core::worker::{RequestNotifier, WaitOutcome};
use notifier_core::{ndebug, nerror, ntrace, nwarn};

use crate::config::NotifierConfig;
use crate::control::ControlReceiver;
use crate::handoff::{submit_and_wait, TaskOutcome};

/// Why the driver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A `shutdown` token arrived on the control channel.
    ShutdownMessage,
    /// The worker's `wait` reported `Shutdown`.
    WorkerShutdown,
}

/// Driver state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// About to populate and wait.
    Running,
    /// `wait` returned; deciding what to do with the outcome.
    Draining(WaitOutcome),
    /// Shutdown observed; no further waits or resolutions.
    ShuttingDown(StopReason),
    /// Terminal.
    Stopped,
}

/// Counters returned when the driver stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Completed `wait` calls
    pub iterations: u64,
    /// Waits that ended in `Timeout`
    pub timeouts: u64,
    /// Resolution tasks submitted to the scheduler
    pub resolution_tasks: u64,
    /// Waiters resolved by those tasks
    pub resolved: u64,
    /// Control tokens other than `shutdown`
    pub unknown_messages: u64,
    /// Resolution tasks that panicked on the scheduler thread
    pub resolution_failures: u64,
    /// Set once the driver has stopped
    pub stop_reason: Option<StopReason>,
}

/// The driver loop. Usually run through `NotifierThread`, but `run()` works
/// on any thread.
pub struct Driver<W, S> {
    worker: Arc<W>,
    scheduler: S,
    control: ControlReceiver,
    timeout: Duration,
    state: DriverState,
    stats: DriverStats,
}

impl<W, S> Driver<W, S>
where
    W: RequestNotifier + 'static,
    S: Scheduler,
{
    pub fn new(worker: Arc<W>, scheduler: S, control: ControlReceiver, timeout: Duration) -> Self {
        Self {
            worker,
            scheduler,
            control,
            timeout,
            state: DriverState::Running,
            stats: DriverStats::default(),
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    /// Advance the state machine by one transition.
    ///
    /// An error leaves the driver `Stopped`.
    pub fn step(&mut self) -> NotifyResult<DriverState> {
        match self.transition() {
            Ok(next) => {
                self.state = next;
                Ok(next)
            }
            Err(e) => {
                self.state = DriverState::Stopped;
                Err(e)
            }
        }
    }

    fn transition(&mut self) -> NotifyResult<DriverState> {
        match self.state {
            DriverState::Running => {
                self.worker.populate_pending();
                let outcome = self.worker.wait(self.timeout)?;
                self.stats.iterations += 1;
                ntrace!("notifier thread: wait -> {}", outcome.as_str());
                Ok(DriverState::Draining(outcome))
            }
            DriverState::Draining(outcome) => {
                let shutdown_requested = self.poll_control();

                if outcome == WaitOutcome::Shutdown {
                    return Ok(DriverState::ShuttingDown(StopReason::WorkerShutdown));
                }
                if shutdown_requested {
                    return Ok(DriverState::ShuttingDown(StopReason::ShutdownMessage));
                }

                match outcome {
                    WaitOutcome::Timeout => {
                        self.stats.timeouts += 1;
                    }
                    _ => self.dispatch_resolution()?,
                }
                Ok(DriverState::Running)
            }
            DriverState::ShuttingDown(reason) => {
                nwarn!("notifier thread shutting down ({:?})", reason);
                self.stats.stop_reason = Some(reason);
                Ok(DriverState::Stopped)
            }
            DriverState::Stopped => Ok(DriverState::Stopped),
        }
    }

    /// Drain the control channel. True if a shutdown token was seen.
    fn poll_control(&mut self) -> bool {
        let mut shutdown = false;
        for msg in self.control.drain() {
            match msg {
                ControlMessage::Shutdown => shutdown = true,
                ControlMessage::Unknown(token) => {
                    self.stats.unknown_messages += 1;
                    nwarn!("notifier thread got unknown message from control queue: {:?}", token);
                }
            }
        }
        shutdown
    }

    /// Submit one resolution task and block until the scheduler has run it.
    fn dispatch_resolution(&mut self) -> NotifyResult<()> {
        let worker = Arc::clone(&self.worker);
        self.stats.resolution_tasks += 1;

        match submit_and_wait(&self.scheduler, move || worker.notify_pending())? {
            TaskOutcome::Completed(n) => {
                self.stats.resolved += n as u64;
            }
            TaskOutcome::Panicked(msg) => {
                self.stats.resolution_failures += 1;
                nerror!("notifier thread: resolution task panicked: {}", msg);
            }
        }
        Ok(())
    }

    /// Run until stopped.
    pub fn run(mut self) -> NotifyResult<DriverStats> {
        ndebug!("starting notifier thread (wait timeout {:?})", self.timeout);
        while self.state != DriverState::Stopped {
            if let Err(e) = self.step() {
                nerror!("notifier thread terminating: {}", e);
                return Err(e);
            }
        }
        Ok(self.stats)
    }
}

/// Handle to a running driver thread.
///
/// The driver is stopped through the `ControlSender` paired with the
/// receiver passed to `spawn`. Dropping the handle detaches the thread.
pub struct NotifierThread {
    handle: thread::JoinHandle<NotifyResult<DriverStats>>,
    name: String,
}

impl NotifierThread {
    /// Validate `config` and start the driver on a new named thread.
    pub fn spawn<W, S>(
        worker: Arc<W>,
        scheduler: S,
        control: ControlReceiver,
        config: &NotifierConfig,
    ) -> NotifyResult<Self>
    where
        W: RequestNotifier + 'static,
        S: Scheduler + 'static,
    {
        config.validate()?;

        let mut builder = thread::Builder::new().name(config.thread_name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let timeout = config.wait_timeout;
        let handle = builder
            .spawn(move || Driver::new(worker, scheduler, control, timeout).run())?;

        Ok(Self {
            handle,
            name: config.thread_name.clone(),
        })
    }

    /// True once the thread has exited, for whatever reason.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the thread to exit.
    ///
    /// A driver that panicked is reported as `DriverPanicked`; a worker or
    /// scheduler failure is returned as the error that stopped it.
    pub fn join(self) -> NotifyResult<DriverStats> {
        match self.handle.join() {
            Ok(result) => result,
            Err(payload) => Err(NotifyError::DriverPanicked(panic_message(payload.as_ref()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::control_channel;
    use crate::testing::{
        count, event_log, Event, InlineScheduler, ScriptedWorker, Step, ThreadScheduler,
    };
    use notifier_core::scheduler::Runnable;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;
    use WaitOutcome::*;

    const T: Duration = Duration::from_millis(10);

    fn run_script(steps: Vec<Step>) -> (NotifyResult<DriverStats>, crate::testing::EventLog) {
        let log = event_log();
        let (tx, rx) = control_channel(8);
        let worker = Arc::new(ScriptedWorker::new(steps, log.clone()).with_control(tx));
        let driver = Driver::new(worker, InlineScheduler::logging(log.clone()), rx, T);
        (driver.run(), log)
    }

    fn outcomes(list: &[WaitOutcome]) -> Vec<Step> {
        list.iter().copied().map(Step::outcome).collect()
    }

    #[test]
    fn test_timeout_timeout_ready_shutdown() {
        let (result, log) = run_script(outcomes(&[Timeout, Timeout, Ready, Shutdown]));
        let stats = result.unwrap();

        assert_eq!(count(&log, &Event::Submit), 1);
        assert_eq!(stats.resolution_tasks, 1);
        assert_eq!(stats.iterations, 4);
        assert_eq!(stats.timeouts, 2);
        assert_eq!(stats.stop_reason, Some(StopReason::WorkerShutdown));

        // The one resolution happened right after the Ready wait
        let events = log.lock().unwrap();
        let ready = events.iter().position(|e| *e == Event::Wait(Ready)).unwrap();
        assert_eq!(events[ready + 1], Event::Submit);
        assert_eq!(events[ready + 2], Event::Notify);
        assert_eq!(events[ready + 3], Event::Complete);
    }

    #[test]
    fn test_immediate_worker_shutdown() {
        let (result, log) = run_script(outcomes(&[Shutdown]));
        let stats = result.unwrap();

        assert_eq!(count(&log, &Event::Submit), 0);
        assert_eq!(count(&log, &Event::Notify), 0);
        assert_eq!(stats.iterations, 1);
        assert_eq!(stats.stop_reason, Some(StopReason::WorkerShutdown));
    }

    #[test]
    fn test_unknown_token_is_ignored() {
        let log = event_log();
        let (tx, rx) = control_channel(8);
        let worker = Arc::new(
            ScriptedWorker::new(vec![Step::with_token(Ready, "ping"), Step::outcome(Timeout)], log.clone())
                .with_control(tx),
        );
        let mut driver = Driver::new(worker, InlineScheduler::logging(log.clone()), rx, T);

        assert_eq!(driver.step().unwrap(), DriverState::Draining(Ready));
        assert_eq!(driver.step().unwrap(), DriverState::Running);
        assert_eq!(count(&log, &Event::Submit), 1);
        assert_eq!(driver.stats().unknown_messages, 1);

        // Next iteration behaves as if nothing had arrived
        assert_eq!(driver.step().unwrap(), DriverState::Draining(Timeout));
        assert_eq!(driver.step().unwrap(), DriverState::Running);
        assert_eq!(count(&log, &Event::Submit), 1);
    }

    #[test]
    fn test_shutdown_token_suppresses_resolution() {
        let (result, log) = run_script(vec![
            Step::outcome(Ready),
            Step::with_token(Ready, "shutdown"),
            Step::outcome(Ready),
        ]);
        let stats = result.unwrap();

        assert_eq!(stats.stop_reason, Some(StopReason::ShutdownMessage));
        assert_eq!(stats.iterations, 2);
        // Only the first Ready was resolved
        assert_eq!(count(&log, &Event::Submit), 1);
        assert_eq!(count(&log, &Event::Wait(Ready)), 2);
    }

    #[test]
    fn test_shutdown_behind_unknown_token() {
        let log = event_log();
        let (tx, rx) = control_channel(8);
        tx.send("ping").unwrap();
        tx.shutdown().unwrap();
        let worker = Arc::new(ScriptedWorker::outcomes(&[Timeout, Timeout], log.clone()));
        let stats = Driver::new(worker, InlineScheduler::new(), rx, T).run().unwrap();

        assert_eq!(stats.iterations, 1);
        assert_eq!(stats.unknown_messages, 1);
        assert_eq!(stats.stop_reason, Some(StopReason::ShutdownMessage));
    }

    #[test]
    fn test_submits_exactly_on_ready() {
        // Deterministic mix of Ready/Timeout with no Shutdown; the script
        // running out is the only way the driver stops.
        let script: Vec<WaitOutcome> = (0..64u32)
            .map(|i| if (i * 7 + 3) % 5 < 2 { Ready } else { Timeout })
            .collect();
        let readies = script.iter().filter(|o| **o == Ready).count();

        let (result, log) = run_script(outcomes(&script));
        let stats = result.unwrap();

        assert_eq!(stats.iterations, 65);
        assert_eq!(stats.resolution_tasks as usize, readies);
        assert_eq!(count(&log, &Event::Submit), readies);
        assert_eq!(count(&log, &Event::Populate), 65);

        let events = log.lock().unwrap();
        for (i, e) in events.iter().enumerate() {
            if matches!(e, Event::Wait(_)) {
                assert_eq!(events[i - 1], Event::Populate);
            }
        }
    }

    struct PanickingNotify;

    impl RequestNotifier for PanickingNotify {
        fn populate_pending(&self) {}
        fn wait(&self, _timeout: Duration) -> NotifyResult<WaitOutcome> {
            Ok(Ready)
        }
        fn notify_pending(&self) -> usize {
            panic!("waiter callback failed")
        }
    }

    #[test]
    fn test_resolution_panic_is_counted() {
        let (tx, rx) = control_channel(4);
        let mut driver = Driver::new(Arc::new(PanickingNotify), InlineScheduler::new(), rx, T);

        driver.step().unwrap();
        assert_eq!(driver.step().unwrap(), DriverState::Running);
        assert_eq!(driver.stats().resolution_failures, 1);

        // The driver kept going: the next Ready is seen, then the queued
        // shutdown stops it before a second resolution
        tx.shutdown().unwrap();
        let stats = driver.run().unwrap();
        assert_eq!(stats.iterations, 2);
        assert_eq!(stats.resolution_tasks, 1);
        assert_eq!(stats.resolution_failures, 1);
        assert_eq!(stats.stop_reason, Some(StopReason::ShutdownMessage));
    }

    struct ClosedScheduler;

    impl Scheduler for ClosedScheduler {
        fn schedule(&self, _task: Runnable) -> NotifyResult<()> {
            Err(NotifyError::SchedulerClosed)
        }
    }

    #[test]
    fn test_closed_scheduler_is_fatal() {
        let log = event_log();
        let (_tx, rx) = control_channel(4);
        let worker = Arc::new(ScriptedWorker::outcomes(&[Timeout, Ready, Ready], log.clone()));
        let mut driver = Driver::new(worker, ClosedScheduler, rx, T);

        assert_eq!(driver.step().unwrap(), DriverState::Draining(Timeout));
        assert_eq!(driver.step().unwrap(), DriverState::Running);
        assert_eq!(driver.step().unwrap(), DriverState::Draining(Ready));
        assert_eq!(driver.step(), Err(NotifyError::SchedulerClosed));
        assert_eq!(driver.state(), DriverState::Stopped);
    }

    #[test]
    fn test_worker_error_is_fatal() {
        let (result, log) = run_script(vec![Step::outcome(Ready), Step::error("device lost")]);
        assert_eq!(result, Err(NotifyError::Worker("device lost".into())));
        assert_eq!(count(&log, &Event::Submit), 1);
    }

    /// Reports Ready after a short sleep, forever. Each resolution takes
    /// a few milliseconds and records when it finished.
    struct AlwaysReady {
        waits: AtomicUsize,
        resolved_at: Mutex<Vec<Instant>>,
    }

    impl RequestNotifier for AlwaysReady {
        fn populate_pending(&self) {}
        fn wait(&self, _timeout: Duration) -> NotifyResult<WaitOutcome> {
            thread::sleep(Duration::from_millis(1));
            self.waits.fetch_add(1, Ordering::SeqCst);
            Ok(Ready)
        }
        fn notify_pending(&self) -> usize {
            thread::sleep(Duration::from_millis(2));
            self.resolved_at.lock().unwrap().push(Instant::now());
            0
        }
    }

    #[test]
    fn test_thread_one_resolution_in_flight() {
        let sched = ThreadScheduler::start("test-sched");
        let worker = Arc::new(AlwaysReady {
            waits: AtomicUsize::new(0),
            resolved_at: Mutex::new(Vec::new()),
        });
        let (tx, rx) = control_channel(4);
        let config = NotifierConfig::new().thread_name("test-notifier");

        let driver = NotifierThread::spawn(worker.clone(), sched.clone(), rx, &config).unwrap();
        assert_eq!(driver.name(), "test-notifier");

        thread::sleep(Duration::from_millis(60));
        tx.shutdown().unwrap();
        let stats = driver.join().unwrap();
        sched.stop();

        let submits = sched.submit_times();
        let resolved = worker.resolved_at.lock().unwrap().clone();
        assert!(stats.resolution_tasks > 1);
        assert_eq!(stats.resolution_tasks as usize, submits.len());
        assert_eq!(resolved.len(), submits.len());
        // Every submission waits for the previous resolution to finish
        for i in 1..submits.len() {
            assert!(submits[i] >= resolved[i - 1], "submit {} overlapped resolution {}", i, i - 1);
        }
        assert_eq!(sched.in_flight(), 0);
        assert_eq!(stats.stop_reason, Some(StopReason::ShutdownMessage));
    }

    /// Blocks for the whole timeout and reports Timeout.
    struct Idle;

    impl RequestNotifier for Idle {
        fn populate_pending(&self) {}
        fn wait(&self, timeout: Duration) -> NotifyResult<WaitOutcome> {
            thread::sleep(timeout);
            Ok(Timeout)
        }
        fn notify_pending(&self) -> usize {
            0
        }
    }

    #[test]
    fn test_thread_shutdown_within_one_period() {
        let (tx, rx) = control_channel(4);
        let config = NotifierConfig::new().wait_timeout(Duration::from_millis(50));
        let driver = NotifierThread::spawn(Arc::new(Idle), InlineScheduler::new(), rx, &config).unwrap();

        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        tx.shutdown().unwrap();
        let stats = driver.join().unwrap();

        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(stats.resolution_tasks, 0);
        assert_eq!(stats.stop_reason, Some(StopReason::ShutdownMessage));

        // Stopped is terminal: a second shutdown is simply never read
        assert!(tx.shutdown().is_ok());
    }

    struct PanickingWait;

    impl RequestNotifier for PanickingWait {
        fn populate_pending(&self) {}
        fn wait(&self, _timeout: Duration) -> NotifyResult<WaitOutcome> {
            panic!("native progress crashed")
        }
        fn notify_pending(&self) -> usize {
            0
        }
    }

    #[test]
    fn test_thread_panic_reported_on_join() {
        let (_tx, rx) = control_channel(4);
        let driver =
            NotifierThread::spawn(Arc::new(PanickingWait), InlineScheduler::new(), rx, &NotifierConfig::new())
                .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !driver.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(driver.is_finished());
        assert_eq!(
            driver.join(),
            Err(NotifyError::DriverPanicked("native progress crashed".into()))
        );
    }

    #[test]
    fn test_spawn_rejects_bad_config() {
        let (_tx, rx) = control_channel(4);
        let config = NotifierConfig::new().wait_timeout(Duration::ZERO);
        let err = NotifierThread::spawn(Arc::new(Idle), InlineScheduler::new(), rx, &config)
            .err()
            .unwrap();
        assert_eq!(err, NotifyError::Config("wait_timeout must be > 0"));

        let (_tx, rx) = control_channel(4);
        let config = NotifierConfig::new().wait_timeout(Duration::MAX);
        let err = NotifierThread::spawn(Arc::new(Idle), InlineScheduler::new(), rx, &config)
            .err()
            .unwrap();
        assert_eq!(err, NotifyError::Config("wait_timeout must be <= 1h"));
    }

    #[test]
    fn test_unbounded_wait_on_request_table() {
        let table = Arc::new(crate::request::RequestTable::new(1));
        let (_tx, rx) = control_channel(4);
        let mut driver = Driver::new(Arc::clone(&table), InlineScheduler::new(), rx, Duration::MAX);

        let stopper = {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                table.stop();
            })
        };
        assert_eq!(driver.step().unwrap(), DriverState::Draining(Shutdown));
        stopper.join().unwrap();
        let stats = driver.run().unwrap();
        assert_eq!(stats.stop_reason, Some(StopReason::WorkerShutdown));
    }
}
