//! Bookkeeping for callbacks handed to the browser
//!
//! A callback is stored under a key together with its browser handle (timer
//! id). Once its body has returned it reports completion; completed entries
//! are dropped on the next `prune`, never while the callback is executing.

// Only the wasm32 host uses this outside tests.
#![cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

pub(crate) struct Slots<T> {
    next: Cell<u64>,
    live: RefCell<HashMap<u64, (i32, T)>>,
    finished: Rc<RefCell<Vec<u64>>>,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self {
            next: Cell::new(0),
            live: RefCell::new(HashMap::new()),
            finished: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<T> Slots<T> {
    pub(crate) fn next_key(&self) -> u64 {
        let key = self.next.get();
        self.next.set(key + 1);
        key
    }

    /// Marker to run after the callback stored under `key` has returned
    ///
    /// Does nothing once the slots themselves are gone.
    pub(crate) fn completion(&self, key: u64) -> impl Fn() + 'static {
        let finished = Rc::downgrade(&self.finished);
        move || {
            if let Some(finished) = finished.upgrade() {
                finished.borrow_mut().push(key);
            }
        }
    }

    pub(crate) fn insert(&self, key: u64, handle: i32, value: T) {
        self.live.borrow_mut().insert(key, (handle, value));
    }

    pub(crate) fn remove(&self, key: u64) -> Option<(i32, T)> {
        self.live.borrow_mut().remove(&key)
    }

    pub(crate) fn len(&self) -> usize {
        self.live.borrow().len()
    }

    /// Drop completed entries, handing each to `release` first
    ///
    /// Returns how many were dropped.
    pub(crate) fn prune(&self, mut release: impl FnMut(i32, &T)) -> usize {
        let keys: Vec<u64> = self.finished.borrow_mut().drain(..).collect();
        let mut dropped = 0;
        for key in keys {
            if let Some((handle, value)) = self.remove(key) {
                release(handle, &value);
                dropped += 1;
            }
        }
        dropped
    }
}
