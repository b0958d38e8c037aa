//! Library defaults for `NotifierConfig`.

/// Bounded wait on the worker per driver iteration.
pub const WAIT_TIMEOUT_MS: u64 = 1000;

/// Upper bound accepted by `validate()`. Shutdown latency is one wait.
pub const MAX_WAIT_TIMEOUT_MS: u64 = 60 * 60 * 1000;

/// Waiters pre-allocated by `populate_pending()`.
pub const POOL_SIZE: usize = 100;

/// Control tokens that can be queued before `send` reports full.
pub const CONTROL_CAPACITY: usize = 16;

/// Driver thread name.
pub const THREAD_NAME: &str = "notifier";

/// Driver thread stack size (0 = system default).
pub const STACK_SIZE: usize = 0;
