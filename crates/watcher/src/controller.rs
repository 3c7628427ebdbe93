//! Watcher lifecycle and notification batching
//!
//! States:
//! - `Unsupported`: the host has no mutation-observer constructor. Terminal;
//!   `start`/`stop` only log.
//! - `Inert`: constructed or stopped, nothing attached
//! - `Active`: a handle is attached to the targets resolved at start
//! - `PendingNotify`: active with a debounce timer outstanding
//!
//! Host callbacks (mutation batches, ready events, timer elapses) only hold
//! `Weak` references to the shared state, and no `RefCell` borrow is held
//! while the user callback runs.

use crate::debounce::Debouncer;
use domwatch_core::error::UNSUPPORTED_MESSAGE;
use domwatch_core::{
    resolve, validate_callback, Callback, Capability, Host, ListenerId, MutationCallback,
    MutationRecord, ObservationHandle, ObserveOptions, ReadyState, Result, Value, WatcherConfig,
    DEFAULT_DEBOUNCE_MS,
};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Observable state of a [`Watcher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// No mutation-observer capability; permanently inert
    Unsupported,
    /// Not observing
    Inert,
    /// Observing, no callback scheduled
    Active,
    /// Observing, callback scheduled
    PendingNotify,
}

/// Construction input for a [`Watcher`]
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Procedure to run once per burst of changes (must be a function)
    pub callback: Value,
    /// Selectors of elements to observe
    pub targets: Vec<String>,
    /// Quiet period before the callback fires (default: 150ms)
    pub debounce: Duration,
    /// What each target reports
    pub observe: ObserveOptions,
}

impl WatchOptions {
    /// Options with the given callback and defaults for everything else
    pub fn new(callback: Value) -> Self {
        Self {
            callback,
            targets: Vec::new(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            observe: ObserveOptions::default(),
        }
    }

    /// Options from a loaded configuration
    pub fn from_config(callback: Value, config: &WatcherConfig) -> Self {
        Self {
            callback,
            targets: config.targets.clone(),
            debounce: config.debounce(),
            observe: config.observe,
        }
    }

    /// Replace the target selectors
    pub fn targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = targets.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the debounce delay
    pub fn debounce(mut self, delay: Duration) -> Self {
        self.debounce = delay;
        self
    }

    /// Replace the observe options
    pub fn observe(mut self, observe: ObserveOptions) -> Self {
        self.observe = observe;
        self
    }
}

/// Debounced mutation watcher
///
/// Register selectors and one callback; the callback runs once per burst of
/// changes on the matching elements, after the debounce delay has passed
/// without further changes.
pub struct Watcher<H: Host> {
    /// Selectors resolved on each `start`
    targets: Vec<String>,
    /// `None` when the host is unsupported
    shared: Option<Rc<RefCell<Shared<H>>>>,
}

/// State reachable from host callbacks
struct Shared<H: Host> {
    host: Rc<H>,
    callback: Callback,
    capability: Capability<H::Element>,
    observe: ObserveOptions,
    debouncer: Debouncer,
    session: Option<Session<H::Element>>,
}

/// Resources owned between `start` and `stop`
struct Session<E> {
    handle: Box<dyn ObservationHandle<E>>,
    /// One-time ready listener, registered while the document is loading
    ready_listener: Option<ListenerId>,
    /// Elements the handle was attached to
    observed: usize,
}

impl<H: Host> Watcher<H> {
    /// Create a watcher
    ///
    /// When the host lacks every mutation-observer constructor the watcher is
    /// created in the `Unsupported` state (logged, not an error) and the
    /// callback is not inspected. Otherwise an uncallable callback fails with
    /// [`domwatch_core::DomwatchError::InvalidArgument`].
    pub fn new(host: Rc<H>, options: WatchOptions) -> Result<Self> {
        let Some(capability) = resolve(&*host) else {
            error!("{}", UNSUPPORTED_MESSAGE);
            return Ok(Self {
                targets: options.targets,
                shared: None,
            });
        };

        let callback = validate_callback(options.callback)?;
        debug!("Resolved mutation observer capability: {}", capability.name);

        Ok(Self {
            targets: options.targets,
            shared: Some(Rc::new(RefCell::new(Shared {
                host,
                callback,
                capability,
                observe: options.observe,
                debouncer: Debouncer::new(options.debounce),
                session: None,
            }))),
        })
    }

    /// Shorthand for a Rust closure callback
    pub fn with_callback<F, I, S>(host: Rc<H>, callback: F, targets: I) -> Result<Self>
    where
        F: Fn() + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(host, WatchOptions::new(Value::function(callback)).targets(targets))
    }

    /// Attach to every element currently matching the targets
    ///
    /// Calling this while already active is a no-op.
    pub fn start(&mut self) {
        let Some(shared) = &self.shared else {
            error!("{}", UNSUPPORTED_MESSAGE);
            return;
        };
        activate(shared, &self.targets);
    }

    /// Detach, cancel any pending callback and drop the ready listener
    ///
    /// Calling this while inert is a no-op.
    pub fn stop(&mut self) {
        let Some(shared) = &self.shared else {
            error!("{}", UNSUPPORTED_MESSAGE);
            return;
        };
        if release(shared) {
            info!("Stopped watching {} selector(s)", self.targets.len());
        } else {
            debug!("Watcher already inert, ignoring stop");
        }
    }

    /// Current state
    pub fn state(&self) -> WatcherState {
        let Some(shared) = &self.shared else {
            return WatcherState::Unsupported;
        };
        let shared = shared.borrow();
        match shared.session {
            None => WatcherState::Inert,
            Some(_) if shared.debouncer.is_pending() => WatcherState::PendingNotify,
            Some(_) => WatcherState::Active,
        }
    }

    /// Whether the host provided a mutation-observer capability
    pub fn is_supported(&self) -> bool {
        self.shared.is_some()
    }

    /// Name of the resolved capability
    pub fn capability_name(&self) -> Option<&'static str> {
        self.shared.as_ref().map(|s| s.borrow().capability.name)
    }

    /// Configured selectors
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Add a selector
    ///
    /// Targets are resolved when the watcher starts, so a selector added
    /// while active is picked up by the next `start`.
    pub fn add_target(&mut self, selector: impl Into<String>) {
        self.targets.push(selector.into());
    }

    /// Debounce delay, if supported
    pub fn debounce(&self) -> Option<Duration> {
        self.shared.as_ref().map(|s| s.borrow().debouncer.delay())
    }

    /// Number of elements attached in the current session
    pub fn observed_count(&self) -> usize {
        self.shared
            .as_ref()
            .and_then(|s| s.borrow().session.as_ref().map(|session| session.observed))
            .unwrap_or(0)
    }
}

impl<H: Host> Drop for Watcher<H> {
    fn drop(&mut self) {
        if let Some(shared) = &self.shared {
            release(shared);
        }
    }
}

impl<H: Host> std::fmt::Debug for Watcher<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("targets", &self.targets)
            .field("state", &self.state())
            .finish()
    }
}

fn activate<H: Host>(shared: &Rc<RefCell<Shared<H>>>, targets: &[String]) {
    let mut this = shared.borrow_mut();
    if this.session.is_some() {
        debug!("Watcher already active, ignoring start");
        return;
    }

    let weak = Rc::downgrade(shared);
    let on_mutations: MutationCallback = Rc::new(move |records: &[MutationRecord]| {
        if let Some(shared) = weak.upgrade() {
            evaluate_mutations(&shared, records);
        }
    });

    let mut handle = match this.capability.constructor.construct(on_mutations) {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to create {}: {}", this.capability.name, e);
            return;
        }
    };

    let mut observed = 0;
    for selector in targets {
        let elements = match this.host.query_selector_all(selector) {
            Ok(elements) => elements,
            Err(e) => {
                warn!("Skipping target '{}': {}", selector, e);
                continue;
            }
        };
        if elements.is_empty() {
            debug!("Target '{}' matched no elements", selector);
        }
        for element in &elements {
            match handle.observe(element, &this.observe) {
                Ok(()) => observed += 1,
                Err(e) => warn!("Failed to observe an element of '{}': {}", selector, e),
            }
        }
    }

    this.session = Some(Session {
        handle,
        ready_listener: None,
        observed,
    });
    info!(
        "Watching {} element(s) across {} selector(s)",
        observed,
        targets.len()
    );
}

/// Tear down the session. Returns whether there was one.
fn release<H: Host>(shared: &Rc<RefCell<Shared<H>>>) -> bool {
    let mut this = shared.borrow_mut();
    let Some(mut session) = this.session.take() else {
        return false;
    };

    let host = this.host.clone();
    if this.debouncer.cancel(&*host) {
        debug!("Cancelled pending notification");
    }
    if let Some(listener) = session.ready_listener.take() {
        host.remove_ready_listener(listener);
    }
    session.handle.disconnect();
    true
}

/// Handle one batch from the observation handle
fn evaluate_mutations<H: Host>(shared: &Rc<RefCell<Shared<H>>>, records: &[MutationRecord]) {
    if records.is_empty() {
        return;
    }

    let mut this = shared.borrow_mut();
    let host = this.host.clone();
    let Some(session) = this.session.as_mut() else {
        return;
    };

    if host.ready_state() == ReadyState::Loading {
        if session.ready_listener.is_none() {
            let weak = Rc::downgrade(shared);
            let listener = host.add_ready_listener(Rc::new(move || {
                if let Some(shared) = weak.upgrade() {
                    on_ready(&shared);
                }
            }));
            session.ready_listener = Some(listener);
            debug!("Document still loading, deferring {} record(s)", records.len());
        }
        return;
    }

    schedule_notify(shared, &mut this);
}

/// The deferred trigger once the document is ready
fn on_ready<H: Host>(shared: &Rc<RefCell<Shared<H>>>) {
    let mut this = shared.borrow_mut();
    let Some(session) = this.session.as_mut() else {
        return;
    };
    if session.ready_listener.take().is_none() {
        return;
    }
    schedule_notify(shared, &mut this);
}

fn schedule_notify<H: Host>(shared: &Rc<RefCell<Shared<H>>>, this: &mut Shared<H>) {
    let weak: Weak<RefCell<Shared<H>>> = Rc::downgrade(shared);
    let host = this.host.clone();
    let restarted = this.debouncer.is_pending();
    this.debouncer.schedule(&*host, move |generation| {
        if let Some(shared) = weak.upgrade() {
            notify(&shared, generation);
        }
    });
    debug!(
        "Notification {} ({:?})",
        if restarted { "rescheduled" } else { "scheduled" },
        this.debouncer.delay()
    );
}

fn notify<H: Host>(shared: &Rc<RefCell<Shared<H>>>, generation: u64) {
    let callback = {
        let mut this = shared.borrow_mut();
        if this.session.is_none() || !this.debouncer.complete(generation) {
            return;
        }
        this.callback.clone()
    };
    debug!("Quiet period elapsed, invoking callback");
    callback();
}
