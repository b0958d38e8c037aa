//! Fallback parker using std::sync::Condvar
//!
//! Used on platforms without futex support.

use super::Parker;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

pub struct CondvarParker {
    /// true = wake pending
    token: Mutex<bool>,
    condvar: Condvar,
}

impl CondvarParker {
    pub fn new() -> Self {
        Self {
            token: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }
}

impl Default for CondvarParker {
    fn default() -> Self {
        Self::new()
    }
}

impl Parker for CondvarParker {
    fn park(&self, timeout: Option<Duration>) -> bool {
        let mut guard = self.token.lock().unwrap_or_else(|e| e.into_inner());

        if !*guard {
            guard = match timeout {
                Some(t) => {
                    self.condvar
                        .wait_timeout(guard, t)
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                }
                None => self.condvar.wait(guard).unwrap_or_else(|e| e.into_inner()),
            };
        }

        std::mem::replace(&mut *guard, false)
    }

    fn unpark(&self) {
        {
            let mut guard = self.token.lock().unwrap_or_else(|e| e.into_inner());
            if *guard {
                return;
            }
            *guard = true;
        }
        self.condvar.notify_one();
    }
}
