//! Error types for the request notifier bridge

use core::fmt;

/// Result type for bridge operations
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Errors surfaced by the bridge.
///
/// Everything except `ControlQueueFull` and `UnknownRequest` terminates a
/// running driver thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The worker reported a failure from `wait()`
    Worker(String),

    /// The scheduler no longer accepts work
    SchedulerClosed,

    /// The scheduler dropped a resolution task without running it
    ResolutionDropped,

    /// The control channel is full
    ControlQueueFull,

    /// No pending request with this id
    UnknownRequest(u64),

    /// Failed to spawn the driver thread
    SpawnFailed(String),

    /// The driver thread panicked
    DriverPanicked(String),

    /// Configuration rejected by `validate()`
    Config(&'static str),
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::Worker(msg) => write!(f, "worker failure: {}", msg),
            NotifyError::SchedulerClosed => write!(f, "scheduler closed"),
            NotifyError::ResolutionDropped => {
                write!(f, "resolution task dropped before it ran")
            }
            NotifyError::ControlQueueFull => write!(f, "control queue full"),
            NotifyError::UnknownRequest(id) => write!(f, "unknown request {}", id),
            NotifyError::SpawnFailed(msg) => {
                write!(f, "failed to spawn notifier thread: {}", msg)
            }
            NotifyError::DriverPanicked(msg) => {
                write!(f, "notifier thread panicked: {}", msg)
            }
            NotifyError::Config(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for NotifyError {}

impl From<std::io::Error> for NotifyError {
    fn from(e: std::io::Error) -> Self {
        NotifyError::SpawnFailed(e.to_string())
    }
}

/// Render a panic payload for logs and errors.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
