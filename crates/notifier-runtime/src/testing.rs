//! Test doubles shared by the unit tests of this crate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use notifier_core::error::{NotifyError, NotifyResult};
use notifier_core::scheduler::{Runnable, Scheduler};
use notifier_core::worker::{RequestNotifier, WaitOutcome};

use crate::control::ControlSender;

/// One call observed on a double.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Populate,
    Wait(WaitOutcome),
    Notify,
    Submit,
    Complete,
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn count(log: &EventLog, event: &Event) -> usize {
    log.lock().unwrap().iter().filter(|e| *e == event).count()
}

/// A scripted wait result, optionally delivering a control token while the
/// driver is blocked in `wait`.
pub struct Step {
    pub result: NotifyResult<WaitOutcome>,
    pub token: Option<&'static str>,
}

impl Step {
    pub fn outcome(outcome: WaitOutcome) -> Self {
        Self { result: Ok(outcome), token: None }
    }

    pub fn with_token(outcome: WaitOutcome, token: &'static str) -> Self {
        Self { result: Ok(outcome), token: Some(token) }
    }

    pub fn error(msg: &str) -> Self {
        Self { result: Err(NotifyError::Worker(msg.into())), token: None }
    }
}

/// Worker that replays a script of wait results. Once the script runs out
/// every wait reports `Shutdown`.
pub struct ScriptedWorker {
    script: Mutex<VecDeque<Step>>,
    control: Option<ControlSender>,
    log: EventLog,
    resolved_per_notify: usize,
}

impl ScriptedWorker {
    pub fn new(steps: Vec<Step>, log: EventLog) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            control: None,
            log,
            resolved_per_notify: 1,
        }
    }

    pub fn outcomes(outcomes: &[WaitOutcome], log: EventLog) -> Self {
        Self::new(outcomes.iter().copied().map(Step::outcome).collect(), log)
    }

    pub fn with_control(mut self, control: ControlSender) -> Self {
        self.control = Some(control);
        self
    }

    fn push(&self, event: Event) {
        self.log.lock().unwrap().push(event);
    }
}

impl RequestNotifier for ScriptedWorker {
    fn populate_pending(&self) {
        self.push(Event::Populate);
    }

    fn wait(&self, _timeout: Duration) -> NotifyResult<WaitOutcome> {
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Step::outcome(WaitOutcome::Shutdown));
        if let (Some(token), Some(control)) = (step.token, &self.control) {
            control.send(token).unwrap();
        }
        if let Ok(outcome) = step.result {
            self.push(Event::Wait(outcome));
        }
        step.result
    }

    fn notify_pending(&self) -> usize {
        self.push(Event::Notify);
        self.resolved_per_notify
    }
}

/// Runs every task immediately on the submitting thread.
pub struct InlineScheduler {
    log: Option<EventLog>,
}

impl InlineScheduler {
    pub fn new() -> Self {
        Self { log: None }
    }

    pub fn logging(log: EventLog) -> Self {
        Self { log: Some(log) }
    }
}

impl Scheduler for InlineScheduler {
    fn schedule(&self, task: Runnable) -> NotifyResult<()> {
        if let Some(log) = &self.log {
            log.lock().unwrap().push(Event::Submit);
        }
        task();
        if let Some(log) = &self.log {
            log.lock().unwrap().push(Event::Complete);
        }
        Ok(())
    }
}

/// Runs tasks on a dedicated thread and records when each was submitted.
#[derive(Clone)]
pub struct ThreadScheduler {
    tx: Arc<Mutex<Option<mpsc::Sender<Runnable>>>>,
    /// Submitted and not yet returned from the task body
    in_flight: Arc<AtomicUsize>,
    submits: Arc<Mutex<Vec<Instant>>>,
    join: Arc<Mutex<Option<thread::JoinHandle<()>>>>,
}

impl ThreadScheduler {
    pub fn start(name: &str) -> Self {
        let (tx, rx) = mpsc::channel::<Runnable>();
        let join = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                while let Ok(task) = rx.recv() {
                    task();
                }
            })
            .unwrap();
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
            in_flight: Arc::new(AtomicUsize::new(0)),
            submits: Arc::new(Mutex::new(Vec::new())),
            join: Arc::new(Mutex::new(Some(join))),
        }
    }

    pub fn submitted(&self) -> usize {
        self.submits.lock().unwrap().len()
    }

    pub fn submit_times(&self) -> Vec<Instant> {
        self.submits.lock().unwrap().clone()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.tx.lock().unwrap().take();
        if let Some(join) = self.join.lock().unwrap().take() {
            join.join().unwrap();
        }
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, task: Runnable) -> NotifyResult<()> {
        let guard = self.tx.lock().unwrap();
        let tx = guard.as_ref().ok_or(NotifyError::SchedulerClosed)?;

        self.submits.lock().unwrap().push(Instant::now());
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        let in_flight = Arc::clone(&self.in_flight);
        tx.send(Box::new(move || {
            task();
            in_flight.fetch_sub(1, Ordering::SeqCst);
        }))
        .map_err(|_| NotifyError::SchedulerClosed)
    }
}
