//! Deadline-ordered wait queue
//!
//! A binary min-heap of `(deadline, state)` entries with lazy deletion: the
//! heap has no decrease-key, so a rearmed or stopped timer leaves its old
//! entry behind and the entry is checked against the state when it reaches
//! the top.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Instant;

use hashbrown::HashSet;
use tracing::debug;

use crate::timer::{TimerId, TimerState};

/// One queued expiry.
///
/// The deadline is a snapshot taken at registration; comparing snapshots
/// keeps heap maintenance from touching the per-state locks.
struct Entry {
    deadline: Instant,
    state: Arc<TimerState>,
}

impl Entry {
    /// Ties on deadline fall back to id. Callers must not rely on any
    /// particular order among equal deadlines.
    fn key(&self) -> (Instant, TimerId) {
        (self.deadline, self.state.id())
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Scheduler-wide queue state, guarded by the scheduler lock.
pub(crate) struct Queue {
    heap: BinaryHeap<Reverse<Entry>>,
    /// Ids with an entry currently in `heap`
    queued: HashSet<TimerId>,
    pub(crate) running: bool,
}

impl Queue {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            queued: HashSet::new(),
            running: true,
        }
    }

    /// Insert an entry. An id that already has an entry is left alone.
    pub(crate) fn push(&mut self, state: Arc<TimerState>, deadline: Instant) -> bool {
        if !self.queued.insert(state.id()) {
            return false;
        }
        self.heap.push(Reverse(Entry { deadline, state }));
        true
    }

    /// Earliest queued deadline, stale or not.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(entry)| entry.deadline)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    /// Pop the next entry that is due at `now` and still current.
    ///
    /// Stale entries met on the way are moved into `stale`, even when not yet
    /// due, so the caller can release them after unlocking. An entry for an
    /// active state whose deadline has moved is queued again under the real
    /// deadline.
    pub(crate) fn pop_due(
        &mut self,
        now: Instant,
        stale: &mut Vec<Arc<TimerState>>,
    ) -> Option<Arc<TimerState>> {
        loop {
            let Reverse(head) = self.heap.peek()?;
            let current = head.state.deadline();
            if current == Some(head.deadline) && head.deadline > now {
                return None;
            }

            let Reverse(entry) = self.heap.pop()?;
            self.queued.remove(&entry.state.id());

            match current {
                None => {
                    debug!(timer_id = %entry.state.id(), "Discarding stale timer entry");
                    stale.push(entry.state);
                }
                Some(deadline) if deadline != entry.deadline => {
                    self.push(entry.state, deadline);
                }
                Some(_) => return Some(entry.state),
            }
        }
    }

    /// Remove every entry without firing anything.
    pub(crate) fn abandon(&mut self) -> Vec<Arc<TimerState>> {
        self.queued.clear();
        self.heap.drain().map(|Reverse(entry)| entry.state).collect()
    }
}
