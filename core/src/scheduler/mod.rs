//! Timer scheduler
//!
//! One `Scheduler` owns one dispatch thread and one deadline-ordered queue.
//! Any thread may register timer states; the dispatch thread is the only
//! consumer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   add_timer (lock, push, notify)
//! │ Timer handles (any   │ ─────────────────────────────────┐
//! │ thread)              │                                  ▼
//! └──────────────────────┘                  ┌──────────────────────────────┐
//!                                           │ Queue (Mutex) + Condvar      │
//!                                           │ min-heap of (deadline, state)│
//!                                           └──────────────────────────────┘
//!                                                           │
//!                                    wait ▸ pop due ▸ validate ▸ fire
//!                                                           ▼
//!                                           ┌──────────────────────────────┐
//!                                           │ Dispatch thread              │
//!                                           │ callbacks run inline, no     │
//!                                           │ scheduler lock held          │
//!                                           └──────────────────────────────┘
//! ```

mod error;
mod queue;

#[cfg(test)]
mod scheduler_tests;

pub use error::SchedulerError;

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use ticktock_types::SchedulerConfig;

use crate::timer::TimerState;
use queue::Queue;

/// State shared between the scheduler front and its dispatch thread.
pub(crate) struct Shared {
    queue: Mutex<Queue>,
    wake: Condvar,
}

impl Shared {
    fn new() -> Self {
        Self {
            queue: Mutex::new(Queue::new()),
            wake: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `state` to fire at `deadline` and wake the dispatch thread.
    ///
    /// Returns false if the state already has a queued entry or the
    /// scheduler has shut down.
    pub(crate) fn register(&self, state: Arc<TimerState>, deadline: Instant) -> bool {
        let id = state.id();
        let inserted = {
            let mut queue = self.lock();
            if !queue.running {
                warn!(timer_id = %id, "Scheduler is shut down, timer not registered");
                return false;
            }
            queue.push(state, deadline)
        };

        if inserted {
            self.wake.notify_one();
        } else {
            debug!(timer_id = %id, "Timer already queued, registration ignored");
        }
        inserted
    }

    /// Sleep until the earliest entry is due, something new is registered,
    /// or shutdown is requested. Spurious returns are fine; the caller
    /// re-checks.
    fn wait<'a>(&self, queue: MutexGuard<'a, Queue>) -> MutexGuard<'a, Queue> {
        if !queue.running {
            return queue;
        }
        match queue.next_deadline() {
            None => self
                .wake
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner),
            Some(deadline) => {
                let timeout = deadline.saturating_duration_since(Instant::now());
                if timeout.is_zero() {
                    return queue;
                }
                match self.wake.wait_timeout(queue, timeout) {
                    Ok((queue, _)) => queue,
                    Err(poisoned) => poisoned.into_inner().0,
                }
            }
        }
    }
}

/// Owns the dispatch thread and the wait queue.
///
/// Dropping the last reference shuts the scheduler down; timers still queued
/// at that point are abandoned without firing.
pub struct Scheduler {
    shared: Arc<Shared>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Spawn the dispatch thread and return a running scheduler.
    pub fn start(config: SchedulerConfig) -> Result<Arc<Self>, SchedulerError> {
        let shared = Arc::new(Shared::new());

        let mut builder = thread::Builder::new().name(config.thread_name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let slow_callback = Duration::from_millis(config.slow_callback_warn_ms);
        let loop_shared = Arc::clone(&shared);
        let handle = builder
            .spawn(move || dispatch_loop(&loop_shared, slow_callback))
            .map_err(|source| SchedulerError::Spawn {
                name: config.thread_name.clone(),
                source,
            })?;

        info!(thread = %config.thread_name, "Timer scheduler started");

        Ok(Arc::new(Self {
            shared,
            dispatch: Mutex::new(Some(handle)),
        }))
    }

    /// Start a scheduler with [`SchedulerConfig::default`].
    pub fn with_defaults() -> Result<Arc<Self>, SchedulerError> {
        Self::start(SchedulerConfig::default())
    }

    /// Queue an armed state at its current deadline.
    ///
    /// Inactive states, states that already have an entry, and registrations
    /// after shutdown are ignored (returns false).
    pub fn add_timer(&self, state: &Arc<TimerState>) -> bool {
        let Some(deadline) = state.deadline() else {
            debug!(timer_id = %state.id(), "Inactive timer not registered");
            return false;
        };
        let registered = self.shared.register(Arc::clone(state), deadline);
        if registered {
            debug!(
                timer_id = %state.id(),
                interval_ms = u64::try_from(state.interval().as_millis()).unwrap_or(u64::MAX),
                single_shot = state.is_single_shot(),
                "Timer registered"
            );
        }
        registered
    }

    /// Number of queued entries, including stale ones not yet reclaimed.
    pub fn pending(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Stop the dispatch thread and abandon queued timers.
    ///
    /// Blocks until the thread exits (including a callback that is running
    /// right now), unless called from the dispatch thread itself. Calling it
    /// again is a no-op.
    pub fn shutdown(&self) {
        let handle = self
            .dispatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };

        let abandoned = {
            let mut queue = self.shared.lock();
            queue.running = false;
            queue.abandon()
        };
        self.shared.wake.notify_all();
        let abandoned = abandoned.len();

        if handle.thread().id() == thread::current().id() {
            // Released from inside a callback; the loop exits after it returns
            debug!(abandoned, "Scheduler shut down from dispatch thread");
            return;
        }
        if handle.join().is_err() {
            error!("Timer dispatch thread panicked");
        }
        info!(abandoned, "Timer scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queue = self.shared.lock();
        f.debug_struct("Scheduler")
            .field("running", &queue.running)
            .field("pending", &queue.len())
            .finish()
    }
}

/// Marks the scheduler stopped when the dispatch loop exits for any reason,
/// so registrations are refused instead of queueing into a dead loop.
struct StopOnExit<'a>(&'a Shared);

impl Drop for StopOnExit<'_> {
    fn drop(&mut self) {
        let abandoned = {
            let mut queue = self.0.lock();
            if !queue.running {
                return;
            }
            queue.running = false;
            queue.abandon()
        };
        error!(
            abandoned = abandoned.len(),
            "Timer dispatch loop exited unexpectedly"
        );
    }
}

/// Wait, drain due entries one at a time, fire each with no lock held.
///
/// Timer states (and the callbacks they own) are only released after the
/// queue lock is dropped: a callback's captures may own the scheduler.
fn dispatch_loop(shared: &Shared, slow_callback: Duration) {
    let _stop_on_exit = StopOnExit(shared);
    let mut stale = Vec::new();
    let mut queue = shared.lock();
    while queue.running {
        queue = shared.wait(queue);

        while queue.running {
            let next = queue.pop_due(Instant::now(), &mut stale);
            drop(queue);
            stale.clear();

            let Some(state) = next else {
                queue = shared.lock();
                break;
            };

            let started = Instant::now();
            state.fire(shared);
            let elapsed = started.elapsed();
            if !slow_callback.is_zero() && elapsed > slow_callback {
                warn!(
                    timer_id = %state.id(),
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Slow timer callback"
                );
            }
            drop(state);

            queue = shared.lock();
        }
    }
    debug!("Timer dispatch loop exited");
}
