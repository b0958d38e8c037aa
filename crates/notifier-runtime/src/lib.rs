//! # notifier-runtime
//!
//! Drives a worker's request notifier from a dedicated OS thread and
//! delivers "waiters are ready" back onto a single-threaded cooperative
//! scheduler.
//!
//! This crate provides:
//! - The notifier cycle (populate → wait → resolve) and a loop around it
//! - The driver thread with its explicit state machine
//! - The control channel used to stop the driver from outside
//! - Submit-and-block hand-off onto a foreign scheduler thread
//! - An in-process request table implementing the worker contract
//! - A local cooperative executor implementing the scheduler contract
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use notifier_runtime::{
//!     control_channel, LocalExecutor, NotifierConfig, NotifierThread, RequestTable,
//! };
//!
//! let config = NotifierConfig::from_env();
//! let table = Arc::new(RequestTable::new(config.pool_size));
//! let mut executor = LocalExecutor::new();
//! let (tx, rx) = control_channel(config.control_capacity);
//!
//! let driver = NotifierThread::spawn(table.clone(), executor.handle(), rx, &config)?;
//!
//! let (id, fut) = table.register();
//! // ... progress side calls table.complete(id, RequestStatus::Completed(n)) ...
//! let status = executor.block_on(fut);
//!
//! tx.shutdown()?;
//! let stats = driver.join()?;
//! ```
//!
//! ## Design Decisions
//!
//! - **One resolution in flight**: the driver blocks on a completion signal
//!   until the scheduler has run the resolution task
//! - **Bounded wait**: the only way the driver regains control, so the
//!   control channel is seen at least once per timeout period
//! - **Resolve on timeout too**: the cycle always drains after a
//!   non-shutdown wait, so a request that became ready right at the
//!   deadline is not stranded
//! - **Lock-free control queue**: crossbeam `ArrayQueue`, any thread may send

#![allow(clippy::new_without_default)]

pub mod config;
pub mod control;
pub mod driver;
pub mod executor;
pub mod handoff;
pub mod notifier;
pub mod parking;
pub mod request;
pub mod signal;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use config::{ConfigError, NotifierConfig};
pub use control::{control_channel, ControlReceiver, ControlSender};
pub use driver::{Driver, DriverState, DriverStats, NotifierThread, StopReason};
pub use executor::{ExecutorHandle, LocalExecutor};
pub use handoff::{submit_and_wait, TaskOutcome};
pub use notifier::{run_notifier_cycle, CycleOutcome, LoopStats, NotifierLoop};
pub use parking::{new_parker, Parker};
pub use request::{RequestFuture, RequestId, RequestStatus, RequestTable};
pub use signal::{signal, CompletionHandle, CompletionSignal, SignalState};

#[cfg(feature = "tokio")]
pub use executor::TokioScheduler;

pub use notifier_core::{
    ControlMessage, NotifyError, NotifyResult, RequestNotifier, Runnable, Scheduler,
    WaitOutcome,
};
