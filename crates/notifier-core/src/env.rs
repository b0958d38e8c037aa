//! Environment variable utilities
//!
//! Typed lookups with defaults, used by `NotifierConfig::from_env()` and
//! the logging setup.
//!
//! ```ignore
//! use notifier_core::env::{env_get, env_get_bool};
//!
//! let timeout_ms: u64 = env_get("NOTIFIER_WAIT_TIMEOUT_MS", 1000);
//! let flush = env_get_bool("NOTIFIER_FLUSH_EPRINT", false);
//! ```

use std::str::FromStr;

/// Get environment variable parsed as `T`, or return `default`.
///
/// Unset and unparsable values both fall back to the default.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as boolean.
///
/// "1", "true", "yes", "on" (case-insensitive) are true, anything else
/// that is set is false, unset returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// `Some(T)` if the variable is set and parses.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Get environment variable as string, or return default
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
