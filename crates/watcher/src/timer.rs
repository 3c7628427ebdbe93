//! Tokio-backed timers
//!
//! Each timer is a `spawn_local` task sleeping on `tokio::time`; clearing a
//! timer aborts its task. Tasks are `!Send` (they capture `Rc` state), so a
//! `TokioScheduler` must be used from inside a [`tokio::task::LocalSet`].

use domwatch_core::{Scheduler, Task, TimerId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Timer primitive for hosts running on a tokio local task set
#[derive(Default)]
pub struct TokioScheduler {
    next_id: Cell<u64>,
    timers: Rc<RefCell<HashMap<u64, JoinHandle<()>>>>,
}

impl TokioScheduler {
    /// Create a scheduler with no outstanding timers
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timers that have neither fired nor been cleared
    pub fn pending(&self) -> usize {
        self.timers.borrow().len()
    }
}

impl Scheduler for TokioScheduler {
    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let timers = Rc::downgrade(&self.timers);
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if let Some(timers) = timers.upgrade() {
                timers.borrow_mut().remove(&id);
            }
            task();
        });

        self.timers.borrow_mut().insert(id, handle);
        TimerId(id)
    }

    fn clear_timeout(&self, id: TimerId) {
        if let Some(handle) = self.timers.borrow_mut().remove(&id.0) {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.timers.borrow_mut().drain() {
            handle.abort();
        }
    }
}
