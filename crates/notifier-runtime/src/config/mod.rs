//! Notifier configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables (`from_env()` only)
//! 3. Library defaults (`defaults`)
//!
//! # Example
//!
//! ```rust,ignore
//! use notifier_runtime::config::NotifierConfig;
//!
//! let config = NotifierConfig::from_env()
//!     .wait_timeout(Duration::from_millis(250))
//!     .thread_name("ucx-notifier");
//! ```

pub mod defaults;

use std::time::Duration;

use notifier_core::env::{env_get, env_get_str};
use notifier_core::NotifyError;

/// Driver and request-table settings.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Bounded wait per driver iteration
    pub wait_timeout: Duration,
    /// Waiters kept pre-allocated by `populate_pending()`
    pub pool_size: usize,
    /// Capacity of the control channel
    pub control_capacity: usize,
    /// Driver thread name
    pub thread_name: String,
    /// Driver thread stack size (None = system default)
    pub stack_size: Option<usize>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl NotifierConfig {
    /// Defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `NOTIFIER_WAIT_TIMEOUT_MS` - Bounded wait in milliseconds
    /// - `NOTIFIER_POOL_SIZE` - Pre-allocated waiters
    /// - `NOTIFIER_CONTROL_CAPACITY` - Control channel capacity
    /// - `NOTIFIER_THREAD_NAME` - Driver thread name
    /// - `NOTIFIER_STACK_SIZE` - Driver stack size in bytes (0 = default)
    pub fn from_env() -> Self {
        let stack_size: usize = env_get("NOTIFIER_STACK_SIZE", defaults::STACK_SIZE);
        Self {
            wait_timeout: Duration::from_millis(env_get(
                "NOTIFIER_WAIT_TIMEOUT_MS",
                defaults::WAIT_TIMEOUT_MS,
            )),
            pool_size: env_get("NOTIFIER_POOL_SIZE", defaults::POOL_SIZE),
            control_capacity: env_get(
                "NOTIFIER_CONTROL_CAPACITY",
                defaults::CONTROL_CAPACITY,
            ),
            thread_name: env_get_str("NOTIFIER_THREAD_NAME", defaults::THREAD_NAME),
            stack_size: (stack_size > 0).then_some(stack_size),
        }
    }

    /// Library defaults, no environment lookups. Useful for tests.
    pub fn new() -> Self {
        Self {
            wait_timeout: Duration::from_millis(defaults::WAIT_TIMEOUT_MS),
            pool_size: defaults::POOL_SIZE,
            control_capacity: defaults::CONTROL_CAPACITY,
            thread_name: defaults::THREAD_NAME.to_string(),
            stack_size: None,
        }
    }

    // Builder methods

    pub fn wait_timeout(mut self, d: Duration) -> Self {
        self.wait_timeout = d;
        self
    }

    pub fn pool_size(mut self, n: usize) -> Self {
        self.pool_size = n;
        self
    }

    pub fn control_capacity(mut self, n: usize) -> Self {
        self.control_capacity = n;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wait_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("wait_timeout must be > 0"));
        }
        if self.wait_timeout > Duration::from_millis(defaults::MAX_WAIT_TIMEOUT_MS) {
            return Err(ConfigError::InvalidValue("wait_timeout must be <= 1h"));
        }
        if self.control_capacity == 0 {
            return Err(ConfigError::InvalidValue("control_capacity must be > 0"));
        }
        if self.thread_name.is_empty() {
            return Err(ConfigError::InvalidValue("thread_name must not be empty"));
        }
        if self.thread_name.contains('\0') {
            return Err(ConfigError::InvalidValue("thread_name must not contain NUL"));
        }
        if let Some(size) = self.stack_size {
            if size < 64 * 1024 {
                return Err(ConfigError::InvalidValue("stack_size must be >= 64KB"));
            }
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("Notifier Configuration:");
        eprintln!("  wait_timeout:      {:?}", self.wait_timeout);
        eprintln!("  pool_size:         {}", self.pool_size);
        eprintln!("  control_capacity:  {}", self.control_capacity);
        eprintln!("  thread_name:       {}", self.thread_name);
        match self.stack_size {
            Some(size) => eprintln!("  stack_size:        {}", size),
            None => eprintln!("  stack_size:        default"),
        }
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for NotifyError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::InvalidValue(msg) => NotifyError::Config(msg),
        }
    }
}
