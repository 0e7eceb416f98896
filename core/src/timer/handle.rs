//! User-facing timer handle
//!
//! A `Timer` remembers the requested configuration (interval, repeat policy,
//! callback) and is bound to at most one `TimerState` at a time. The queue
//! cannot move an entry's deadline in place, so every reconfiguration of a
//! running timer disarms the bound state and binds a fresh one.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::completion::Completion;
use super::error::TimerError;
use super::state::{self, Callback, TimerId, TimerState};
use crate::scheduler::Scheduler;

/// A single-shot or repeating timer driven by a [`Scheduler`].
///
/// Dropping the handle disarms the timer (without waiting for an in-flight
/// callback).
pub struct Timer {
    scheduler: Arc<Scheduler>,
    state: Option<Arc<TimerState>>,
    interval: Duration,
    single_shot: bool,
    /// Callback not yet handed to a state
    callback: Option<Callback>,
    /// Invocations of previously bound states that were still running when
    /// the handle moved on; a synchronous stop waits for these too
    pub(super) retired: Vec<(TimerId, Arc<Completion>)>,
}

impl Timer {
    /// Create an unarmed repeating timer with a zero interval and no callback.
    pub fn new(scheduler: &Arc<Scheduler>) -> Self {
        Self {
            scheduler: Arc::clone(scheduler),
            state: None,
            interval: Duration::ZERO,
            single_shot: false,
            callback: None,
            retired: Vec::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_single_shot(&self) -> bool {
        self.single_shot
    }

    /// Id of the currently bound state, if any.
    pub fn id(&self) -> Option<TimerId> {
        self.state.as_ref().map(|state| state.id())
    }

    /// Change the interval. A running timer is rearmed to fire one new
    /// interval from now.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
        if self.is_active() {
            self.rearm();
        }
    }

    /// Change the repeat policy. A running timer is rearmed.
    pub fn set_single_shot(&mut self, single_shot: bool) {
        self.single_shot = single_shot;
        if self.is_active() {
            self.rearm();
        }
    }

    /// Replace the callback. A running timer is rearmed.
    pub fn set_timeout_callback<F>(&mut self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        if self.is_active() {
            self.rearm();
        }
    }

    /// Arm the timer with the configured interval. No-op while active.
    pub fn start(&mut self) {
        if self.is_active() {
            return;
        }
        self.rearm();
    }

    /// Configure and arm in one call. A running timer is rearmed with the new
    /// settings.
    pub fn start_with<F>(&mut self, delay: Duration, repeat: bool, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.interval = delay;
        self.single_shot = !repeat;
        self.callback = Some(Arc::new(callback));
        self.rearm();
    }

    /// Disarm the timer.
    ///
    /// With `synchronous` set, also waits for a callback that is running right
    /// now; afterwards no callback of this timer runs. Never call it
    /// synchronously from this timer's own callback.
    pub fn stop(&self, synchronous: bool) -> Result<(), TimerError> {
        let mut outcome = match &self.state {
            Some(state) => state.disarm(synchronous),
            None => Ok(()),
        };
        if synchronous {
            for (id, completion) in &self.retired {
                outcome = outcome.and(state::wait_for(*id, completion));
            }
        }
        outcome
    }

    pub fn is_active(&self) -> bool {
        self.state.as_ref().is_some_and(|state| state.is_active())
    }

    /// Milliseconds until the next fire, or -1 while inactive.
    pub fn remaining_time(&self) -> i64 {
        self.state.as_ref().map_or(-1, |state| state.remaining_time())
    }

    /// Time until the next fire, or `None` while inactive.
    pub fn remaining(&self) -> Option<Duration> {
        self.state.as_ref().and_then(|state| state.remaining())
    }

    /// Disarm the bound state (if any) and bind, arm and register a new one.
    ///
    /// The callback moves from the handle (if newly set) or from the old state.
    fn rearm(&mut self) {
        self.retired.retain(|(_, completion)| !completion.is_complete());

        let callback = match self.state.take() {
            Some(old) => {
                // Not synchronous: may run on the dispatch thread
                if let Some(completion) = old.deactivate() {
                    self.retired.push((old.id(), completion));
                }
                let carried = old.take_callback();
                self.callback.take().or(carried)
            }
            None => self.callback.take(),
        };

        let state = Arc::new(TimerState::new(self.interval, self.single_shot, callback));
        state.arm(self.interval);
        self.scheduler.add_timer(&state);
        debug!(
            timer_id = %state.id(),
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            single_shot = self.single_shot,
            "Timer bound to new state"
        );
        self.state = Some(state);
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if let Some(state) = &self.state {
            state.deactivate();
        }
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("state", &self.state)
            .field("interval", &self.interval)
            .field("single_shot", &self.single_shot)
            .field("retired", &self.retired.len())
            .finish()
    }
}
