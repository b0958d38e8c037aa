//! # notifier-core
//!
//! Contracts shared by every piece of the request notifier bridge.
//!
//! The bridge connects two execution contexts:
//!
//! ```text
//! ┌──────────────────────────────┐        ┌──────────────────────────────┐
//! │  Driver thread (dedicated)   │        │  Cooperative scheduler       │
//! │                              │        │  (single thread)             │
//! │  populate_pending()          │        │                              │
//! │  wait(timeout) ── blocks     │ submit │                              │
//! │  Ready ─────────────────────────────▶ │  notify_pending()            │
//! │  block on completion ◀──────────────── │  resolve waiters            │
//! └──────────────────────────────┘ signal └──────────────────────────────┘
//! ```
//!
//! This crate holds no threads and no platform code. Implementations live
//! in `notifier-runtime`.
//!
//! ## Modules
//!
//! - `worker` - The worker contract (`RequestNotifier`) and `WaitOutcome`
//! - `scheduler` - The cooperative scheduler contract (`Scheduler`)
//! - `control` - Control tokens carried by the shutdown channel
//! - `error` - Error types
//! - `log` - Leveled logging macros
//! - `env` - Environment variable utilities

pub mod worker;
pub mod scheduler;
pub mod control;
pub mod error;
pub mod log;
pub mod env;

// Re-exports for convenience
pub use worker::{RequestNotifier, WaitOutcome};
pub use scheduler::{Runnable, Scheduler};
pub use control::{ControlMessage, SHUTDOWN_TOKEN};
pub use error::{NotifyError, NotifyResult};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str};
