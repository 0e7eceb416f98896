//! One-shot completion signal for a single callback invocation

use std::sync::{Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};

/// Signalled once when an in-flight callback returns (or unwinds).
///
/// A fresh `Completion` is created for every firing; it is never reset.
/// Synchronous stoppers clone it out of the timer state and block on it
/// without holding any timer lock.
#[derive(Debug)]
pub(crate) struct Completion {
    /// Thread the callback runs on (always the dispatch thread)
    runner: ThreadId,
    done: Mutex<bool>,
    signal: Condvar,
}

impl Completion {
    /// Create a pending completion owned by the current thread.
    pub(crate) fn new() -> Self {
        Self {
            runner: thread::current().id(),
            done: Mutex::new(false),
            signal: Condvar::new(),
        }
    }

    /// Mark the invocation finished and wake every waiter.
    pub(crate) fn complete(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        *done = true;
        self.signal.notify_all();
    }

    /// Block until `complete` has been called.
    pub(crate) fn wait(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        while !*done {
            done = self
                .signal
                .wait(done)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        *self.done.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True when called from the thread running the callback.
    pub(crate) fn runs_on_current_thread(&self) -> bool {
        self.runner == thread::current().id()
    }
}
