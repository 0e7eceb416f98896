//! Shared scheduling record for one timer (runtime state)
//!
//! A `TimerState` is owned jointly by the `Timer` handle that created it and
//! by every queue entry the scheduler holds for it. It is dropped once both
//! sides have let go.
//!
//! # Lifecycle
//!
//! 1. Handle creates the state and calls `arm` → state becomes active
//! 2. Scheduler pops a due entry and calls `fire` on the dispatch thread
//! 3. Repeating: deadline advances and the state is queued again.
//!    Single-shot: state goes inactive.
//! 4. Handle reconfigures or stops → `disarm`; queued entries go stale

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tracing::{debug, error};

use super::completion::Completion;
use super::error::TimerError;
use crate::scheduler::Shared;

/// Zero-argument timer callback.
///
/// `Fn` rather than `FnMut`: a rearmed timer may briefly have its old
/// invocation still running while the replacement state already owns the
/// same callback.
pub type Callback = Arc<dyn Fn() + Send + Sync + 'static>;

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Stand-in deadline for delays too large to add to an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `delay` from now, saturating at a far-future deadline instead of overflowing.
fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Process-unique identifier of a `TimerState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

impl TimerId {
    fn next() -> Self {
        Self(NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Fields guarded by the per-state lock
struct Schedule {
    active: bool,
    deadline: Instant,
    callback: Option<Callback>,
    /// Present while a callback invocation is running on the dispatch thread
    in_flight: Option<Arc<Completion>>,
}

/// Mutable scheduling record for one armed (or formerly armed) timer
pub struct TimerState {
    id: TimerId,
    single_shot: bool,
    interval: Duration,
    schedule: RwLock<Schedule>,
}

impl TimerState {
    /// Create an inactive state with a fresh id.
    pub fn new(interval: Duration, single_shot: bool, callback: Option<Callback>) -> Self {
        Self {
            id: TimerId::next(),
            single_shot,
            interval,
            schedule: RwLock::new(Schedule {
                active: false,
                deadline: Instant::now(),
                callback,
                in_flight: None,
            }),
        }
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_single_shot(&self) -> bool {
        self.single_shot
    }

    fn read(&self) -> RwLockReadGuard<'_, Schedule> {
        self.schedule.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Schedule> {
        self.schedule.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Activate the state with its first deadline `delay` from now.
    ///
    /// Returns false (and changes nothing) if the state is already active.
    /// Deadlines never move backwards, even when re-arming a stopped state.
    pub fn arm(&self, delay: Duration) -> bool {
        let mut schedule = self.write();
        if schedule.active {
            return false;
        }
        schedule.active = true;
        schedule.deadline = schedule.deadline.max(deadline_after(delay));
        debug!(timer_id = %self.id, delay_ms = millis(delay), "Timer armed");
        true
    }

    /// Deactivate the state.
    ///
    /// With `synchronous` set, blocks until a callback currently running on
    /// the dispatch thread has returned. Once this returns `Ok`, no callback
    /// for this state is running and none will start.
    ///
    /// Must not be called synchronously from this timer's own callback; that
    /// case is detected and reported as [`TimerError::StopFromCallback`].
    pub fn disarm(&self, synchronous: bool) -> Result<(), TimerError> {
        let in_flight = self.deactivate();
        if !synchronous {
            return Ok(());
        }
        match in_flight {
            Some(completion) => wait_for(self.id, &completion),
            None => Ok(()),
        }
    }

    /// Deactivate without waiting, returning the completion of a callback
    /// that is running right now.
    ///
    /// No invocation of this state can start after this returns, so the
    /// returned completion covers the last one.
    pub(crate) fn deactivate(&self) -> Option<Arc<Completion>> {
        let mut schedule = self.write();
        if schedule.active {
            debug!(timer_id = %self.id, "Timer disarmed");
        }
        schedule.active = false;
        schedule.in_flight.clone()
    }

    pub fn is_active(&self) -> bool {
        self.read().active
    }

    /// Time until the next fire, or `None` while inactive.
    /// An overdue deadline reports zero.
    pub fn remaining(&self) -> Option<Duration> {
        let schedule = self.read();
        schedule
            .active
            .then(|| schedule.deadline.saturating_duration_since(Instant::now()))
    }

    /// Milliseconds until the next fire, or -1 while inactive.
    pub fn remaining_time(&self) -> i64 {
        self.remaining()
            .map_or(-1, |left| i64::try_from(left.as_millis()).unwrap_or(i64::MAX))
    }

    /// Current deadline if the state is active.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        let schedule = self.read();
        schedule.active.then_some(schedule.deadline)
    }

    /// Move the callback out, leaving the state without one.
    pub(crate) fn take_callback(&self) -> Option<Callback> {
        self.write().callback.take()
    }

    /// Run one scheduled expiry. Dispatch thread only.
    ///
    /// Repeating states are queued again before the callback starts, under
    /// the same lock span that advances the deadline, so readers see either
    /// the old or the new deadline.
    pub(crate) fn fire(self: &Arc<Self>, shared: &Shared) {
        let (callback, completion) = {
            let mut schedule = self.write();
            // Stopped between pop and dispatch
            if !schedule.active {
                return;
            }

            if self.single_shot {
                schedule.active = false;
            } else {
                schedule.deadline = schedule.deadline.max(deadline_after(self.interval));
                shared.register(Arc::clone(self), schedule.deadline);
            }

            let Some(callback) = schedule.callback.clone() else {
                return;
            };
            let completion = Arc::new(Completion::new());
            schedule.in_flight = Some(Arc::clone(&completion));
            (callback, completion)
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback()));

        {
            let mut schedule = self.write();
            if schedule
                .in_flight
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &completion))
            {
                schedule.in_flight = None;
            }
        }
        completion.complete();

        if let Err(payload) = outcome {
            error!(
                timer_id = %self.id,
                panic = panic_message(payload.as_ref()),
                "Timer callback panicked"
            );
        }
    }
}

impl fmt::Debug for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let schedule = self.read();
        f.debug_struct("TimerState")
            .field("id", &self.id)
            .field("single_shot", &self.single_shot)
            .field("interval", &self.interval)
            .field("active", &schedule.active)
            .field("deadline", &schedule.deadline)
            .field("has_callback", &schedule.callback.is_some())
            .field("dispatching", &schedule.in_flight.is_some())
            .finish()
    }
}

/// Block on `completion` unless it belongs to the calling thread, in which
/// case waiting would never return.
pub(crate) fn wait_for(id: TimerId, completion: &Completion) -> Result<(), TimerError> {
    if completion.is_complete() {
        return Ok(());
    }
    if completion.runs_on_current_thread() {
        return Err(TimerError::StopFromCallback { id });
    }
    completion.wait();
    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}
