//! Retriggerable debounce timer
//!
//! Collapses a burst of triggers into a single delayed action:
//! - At most one timer outstanding at a time
//! - Every trigger cancels the outstanding timer and schedules a fresh one
//! - Cancellation is idempotent
//! - Each timer carries a generation so a stale elapse is recognisable

use domwatch_core::{Scheduler, TimerId};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct Pending {
    timer: TimerId,
    generation: u64,
}

/// Debounce state owned by a single watcher
#[derive(Debug)]
pub struct Debouncer {
    /// Quiet period measured from the most recent trigger
    delay: Duration,
    /// The one outstanding timer, if any
    pending: Option<Pending>,
    /// Last generation handed out
    generation: u64,
}

impl Debouncer {
    /// Create an idle debouncer
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            generation: 0,
        }
    }

    /// Configured delay
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether a timer is outstanding
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// (Re)start the delay
    ///
    /// Cancels the outstanding timer, if any, then schedules `task` to run
    /// after the delay. The task receives the generation returned here and
    /// should pass it to [`Debouncer::complete`] before acting.
    pub fn schedule<S, F>(&mut self, scheduler: &S, task: F) -> u64
    where
        S: Scheduler + ?Sized,
        F: FnOnce(u64) + 'static,
    {
        self.cancel(scheduler);

        self.generation += 1;
        let generation = self.generation;
        let timer = scheduler.set_timeout(self.delay, Box::new(move || task(generation)));
        self.pending = Some(Pending { timer, generation });
        generation
    }

    /// Cancel the outstanding timer
    ///
    /// Returns whether a timer was actually cancelled. Calling this with
    /// nothing pending is a no-op.
    pub fn cancel<S: Scheduler + ?Sized>(&mut self, scheduler: &S) -> bool {
        match self.pending.take() {
            Some(pending) => {
                scheduler.clear_timeout(pending.timer);
                true
            }
            None => false,
        }
    }

    /// Acknowledge that a timer elapsed
    ///
    /// Returns `true` only for the generation currently pending, clearing it.
    /// Anything else is a stale or cancelled timer and must be ignored.
    pub fn complete(&mut self, generation: u64) -> bool {
        match self.pending {
            Some(pending) if pending.generation == generation => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}
