//! Cooperative cancellation shared between a caller and a running transfer.
//!
//! # Design
//! `AbortController::abort` only flips a flag and records a reason. The
//! native transfer reads the flag from its progress callback, so cancellation
//! takes effect at the library's progress cadence rather than immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct AbortState {
    aborted: AtomicBool,
    reason: Mutex<Option<String>>,
}

/// The writing side of an abort flag.
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    state: Arc<AbortState>,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            state: Arc::clone(&self.state),
        }
    }

    /// Request cancellation. Only the first reason is kept.
    pub fn abort(&self, reason: Option<String>) {
        {
            let mut slot = self.state.reason.lock();
            if self.state.aborted.load(Ordering::Acquire) {
                return;
            }
            *slot = reason;
        }
        self.state.aborted.store(true, Ordering::Release);
    }
}

/// The reading side of an abort flag, handed to requests.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    state: Arc<AbortState>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<String> {
        self.state.reason.lock().clone()
    }
}
