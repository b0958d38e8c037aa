//! Linux futex-based parker
//!
//! Futex word semantics:
//! - 0 = no wake pending
//! - 1 = wake pending
//!
//! `park()`: consume a pending token, otherwise FUTEX_WAIT while the word
//! is 0. An `unpark()` racing with the wait changes the word first, so the
//! kernel returns EAGAIN instead of sleeping.
//!
//! `unpark()`: set the word to 1; only the 0 → 1 edge issues FUTEX_WAKE.

use super::Parker;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

pub struct FutexParker {
    futex: AtomicU32,
}

impl FutexParker {
    pub fn new() -> Self {
        Self {
            futex: AtomicU32::new(0),
        }
    }
}

impl Default for FutexParker {
    fn default() -> Self {
        Self::new()
    }
}

impl Parker for FutexParker {
    fn park(&self, timeout: Option<Duration>) -> bool {
        if self.futex.swap(0, Ordering::Acquire) == 1 {
            return true;
        }

        let timespec = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        let timespec_ptr = match &timespec {
            Some(ts) => ts as *const libc::timespec,
            None => std::ptr::null(),
        };

        // FUTEX_WAIT: sleep while futex == 0. ETIMEDOUT, EAGAIN and EINTR
        // all land here too; the swap below decides.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                0u32,
                timespec_ptr,
                std::ptr::null::<u32>(),
                0u32,
            );
        }

        self.futex.swap(0, Ordering::Acquire) == 1
    }

    fn unpark(&self) {
        if self.futex.swap(1, Ordering::Release) == 1 {
            return; // Token already pending, waiter already signalled
        }

        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                1i32,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }
}
