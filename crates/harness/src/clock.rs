//! Manually advanced clock

use domwatch_core::{Scheduler, Task, TimerId};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Key ordering timers by due time, then by scheduling order
type Slot = (Duration, u64);

#[derive(Default)]
struct ClockState {
    now: Duration,
    next_id: u64,
    queue: BTreeMap<Slot, Task>,
    index: HashMap<u64, Slot>,
}

/// Deterministic timer queue driven by explicit `advance` calls
///
/// Time starts at zero and only moves forward when advanced. Timers due at the
/// same instant run in the order they were scheduled.
#[derive(Default)]
pub struct ManualClock {
    state: RefCell<ClockState>,
}

impl ManualClock {
    /// Create a clock at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Elapsed virtual time
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of timers waiting to fire
    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Due time of the earliest timer
    pub fn next_due(&self) -> Option<Duration> {
        self.state.borrow().queue.keys().next().map(|(due, _)| *due)
    }

    /// Move time forward by `by`, running every timer that comes due
    ///
    /// `between` runs after each fired timer (hosts use it to deliver the
    /// records the timer may have produced). Timers scheduled by fired timers
    /// also run if they fall inside the window. Returns how many fired.
    pub fn advance_with(&self, by: Duration, mut between: impl FnMut()) -> usize {
        let target = self.now() + by;
        let mut fired = 0;

        loop {
            let task = {
                let mut state = self.state.borrow_mut();
                let due = match state.queue.keys().next() {
                    Some(&slot) if slot.0 <= target => slot,
                    _ => break,
                };
                let task = state.queue.remove(&due);
                state.index.remove(&due.1);
                state.now = due.0;
                task
            };

            if let Some(task) = task {
                task();
                fired += 1;
                between();
            }
        }

        self.state.borrow_mut().now = target;
        fired
    }

    /// Move time forward by `by`
    pub fn advance(&self, by: Duration) -> usize {
        self.advance_with(by, || {})
    }
}

impl Scheduler for ManualClock {
    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;

        let slot = (state.now + delay, id);
        state.queue.insert(slot, task);
        state.index.insert(id, slot);
        TimerId(id)
    }

    fn clear_timeout(&self, id: TimerId) {
        let mut state = self.state.borrow_mut();
        if let Some(slot) = state.index.remove(&id.0) {
            state.queue.remove(&slot);
        }
    }
}
