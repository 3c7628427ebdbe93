//! Host environment abstraction
//!
//! A watcher never touches globals. Everything it needs from the surrounding
//! document (constructor lookup, selector queries, the ready state, ready
//! listeners and timers) goes through the [`Host`] trait, so the same state
//! machine runs against a browser, an in-memory document, or a test double.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::time::Duration;

/// Opaque handle of a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Opaque handle of a registered ready listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// One-shot unit of deferred work
pub type Task = Box<dyn FnOnce()>;

/// Listener fired when the document leaves its loading phase
pub type ReadyListener = Rc<dyn Fn()>;

/// Receives each batch of records delivered by an observation handle
pub type MutationCallback = Rc<dyn Fn(&[MutationRecord])>;

/// Document loading phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyState {
    /// Still parsing; ready listeners have not fired yet
    Loading,
    /// Parsed, subresources may still be loading
    Interactive,
    /// Fully loaded
    Complete,
}

/// Kind of low-level change a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Children added or removed
    ChildList,
    /// An attribute changed
    Attributes,
    /// Text content changed
    CharacterData,
}

/// Low-level change record
///
/// Watchers never inspect records beyond checking that a batch is non-empty;
/// the fields exist for hosts and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// Type of change
    pub kind: MutationKind,
    /// Changed attribute, for `Attributes` records
    pub attribute_name: Option<String>,
}

impl MutationRecord {
    /// Record for a child list change
    pub fn child_list() -> Self {
        Self {
            kind: MutationKind::ChildList,
            attribute_name: None,
        }
    }

    /// Record for an attribute change
    pub fn attribute(name: impl Into<String>) -> Self {
        Self {
            kind: MutationKind::Attributes,
            attribute_name: Some(name.into()),
        }
    }
}

/// What an observation handle reports for each target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserveOptions {
    /// Direct child additions and removals
    pub child_list: bool,
    /// Extend observation to every descendant of the target
    pub subtree: bool,
    /// Attribute changes
    pub attributes: bool,
}

impl Default for ObserveOptions {
    fn default() -> Self {
        Self {
            child_list: true,
            subtree: true,
            attributes: true,
        }
    }
}

/// Cancellable delay-timer primitive
pub trait Scheduler {
    /// Run `task` once after `delay`
    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId;

    /// Cancel a timer. Unknown or already-fired ids are ignored.
    fn clear_timeout(&self, id: TimerId);
}

/// Live observation handle created by a [`HandleConstructor`]
pub trait ObservationHandle<E> {
    /// Start reporting changes on `target`
    fn observe(&mut self, target: &E, options: &ObserveOptions) -> Result<()>;

    /// Stop reporting on every target and drop queued records
    fn disconnect(&mut self);
}

/// Host-provided mutation-observer constructor
pub trait HandleConstructor<E> {
    /// Create a handle that reports batches to `on_mutations`
    fn construct(&self, on_mutations: MutationCallback) -> Result<Box<dyn ObservationHandle<E>>>;
}

/// Everything a watcher consumes from its environment
pub trait Host: Scheduler + 'static {
    /// Element reference returned by selector queries
    type Element: Clone + 'static;

    /// Look up a global mutation-observer constructor by name
    fn global_constructor(&self, name: &str) -> Option<Rc<dyn HandleConstructor<Self::Element>>>;

    /// All elements currently matching `selector`, in document order
    fn query_selector_all(&self, selector: &str) -> Result<Vec<Self::Element>>;

    /// Current loading phase of the document
    fn ready_state(&self) -> ReadyState;

    /// Register a listener fired once when the document becomes ready
    fn add_ready_listener(&self, listener: ReadyListener) -> ListenerId;

    /// Remove a ready listener. Unknown ids are ignored.
    fn remove_ready_listener(&self, id: ListenerId);
}
