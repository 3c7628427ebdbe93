//! Scenario replay against an in-memory document
//!
//! Two clocks are supported:
//! - `Virtual`: a manual clock, instant and deterministic
//! - `Realtime`: tokio timers; must run inside a `tokio::task::LocalSet`

use crate::scenario::{Scenario, Step};
use anyhow::{anyhow, bail, Result};
use domwatch::{TokioScheduler, WatchOptions, Watcher, WatcherState};
use domwatch_core::{Value, CAPABILITY_NAMES};
use domwatch_harness::{ElementId, VirtualHost};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info};

/// How time moves during a replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Clock {
    Virtual,
    Realtime,
}

/// Outcome of a replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub clock: Clock,
    /// Whether the document exposed a mutation-observer constructor
    pub supported: bool,
    pub capability: Option<String>,
    pub debounce_ms: Option<u64>,
    /// Elements attached in the current session
    pub observed: usize,
    /// Callback firing times, in milliseconds since replay began
    pub firings_ms: Vec<u64>,
    pub elapsed_ms: u64,
    pub final_state: String,
}

type Now = Rc<dyn Fn() -> Duration>;

struct Replayer {
    host: Rc<VirtualHost>,
    watcher: Watcher<VirtualHost>,
    elements: HashMap<String, ElementId>,
    firings: Rc<RefCell<Vec<Duration>>>,
}

impl Replayer {
    fn new(scenario: &Scenario, host: Rc<VirtualHost>, now: Now) -> Result<Self> {
        for name in CAPABILITY_NAMES {
            host.remove_global(name);
        }
        for name in &scenario.capabilities {
            host.define_global(name);
        }
        if scenario.loading {
            host.set_loading();
        }

        let mut elements = HashMap::new();
        elements.insert("html".to_string(), host.document_element());
        elements.insert("body".to_string(), host.body());
        for spec in &scenario.elements {
            let parent = match &spec.parent {
                Some(name) => lookup(&elements, name)?,
                None => host.body(),
            };
            let id = host.create_element(&spec.tag);
            for (name, value) in &spec.attributes {
                host.set_attribute(id, name, value);
            }
            host.append_child(parent, id);
            elements.insert(spec.name.clone(), id);
        }

        let firings = Rc::new(RefCell::new(Vec::new()));
        let sink = firings.clone();
        let callback = Value::function(move || {
            let at = now();
            debug!("Callback fired at {}ms", at.as_millis());
            sink.borrow_mut().push(at);
        });

        let watcher = Watcher::new(
            host.clone(),
            WatchOptions::from_config(callback, &scenario.watcher),
        )?;

        Ok(Self {
            host,
            watcher,
            elements,
            firings,
        })
    }

    /// Apply one step; `wait` steps are returned for the driver to sleep on
    fn apply(&mut self, step: &Step) -> Result<Option<Duration>> {
        debug!("Step: {:?}", step);
        match step {
            Step::Start => self.watcher.start(),
            Step::Stop => self.watcher.stop(),
            Step::SetAttribute {
                element,
                attribute,
                value,
            } => {
                let id = lookup(&self.elements, element)?;
                self.host.set_attribute(id, attribute, value);
            }
            Step::RemoveAttribute { element, attribute } => {
                let id = lookup(&self.elements, element)?;
                self.host.remove_attribute(id, attribute);
            }
            Step::Append { parent, tag, name } => {
                let parent = lookup(&self.elements, parent)?;
                let id = self.host.append_new(parent, tag);
                if let Some(name) = name {
                    self.elements.insert(name.clone(), id);
                }
            }
            Step::Remove { element } => {
                let id = lookup(&self.elements, element)?;
                let Some(parent) = self.host.parent(id) else {
                    bail!("Element '{}' is already detached", element);
                };
                self.host.remove_child(parent, id);
            }
            Step::Loading => self.host.set_loading(),
            Step::Ready => {
                self.host.finish_loading();
            }
            Step::Wait { ms } => return Ok(Some(Duration::from_millis(*ms))),
        }
        self.host.flush();
        Ok(None)
    }

    /// Delay still owed to a pending callback, if any
    fn owed(&self) -> Option<Duration> {
        if self.watcher.state() == WatcherState::PendingNotify {
            self.watcher.debounce()
        } else {
            None
        }
    }

    fn report(&self, clock: Clock, elapsed: Duration) -> Report {
        Report {
            clock,
            supported: self.watcher.is_supported(),
            capability: self.watcher.capability_name().map(str::to_string),
            debounce_ms: self.watcher.debounce().map(|d| d.as_millis() as u64),
            observed: self.watcher.observed_count(),
            firings_ms: self
                .firings
                .borrow()
                .iter()
                .map(|d| d.as_millis() as u64)
                .collect(),
            elapsed_ms: elapsed.as_millis() as u64,
            final_state: format!("{:?}", self.watcher.state()),
        }
    }
}

fn lookup(elements: &HashMap<String, ElementId>, name: &str) -> Result<ElementId> {
    elements
        .get(name)
        .copied()
        .ok_or_else(|| anyhow!("Unknown element '{}'", name))
}

/// Replay on a manual clock
///
/// A callback still pending after the last step is allowed to fire.
pub fn replay_virtual(scenario: &Scenario) -> Result<Report> {
    info!("Replaying {} step(s) on a virtual clock", scenario.steps.len());

    let host = Rc::new(VirtualHost::new());
    let clock = Rc::downgrade(&host);
    let now: Now = Rc::new(move || clock.upgrade().map(|h| h.now()).unwrap_or_default());
    let mut replayer = Replayer::new(scenario, host.clone(), now)?;

    for step in &scenario.steps {
        if let Some(wait) = replayer.apply(step)? {
            host.advance(wait);
        }
    }
    if let Some(owed) = replayer.owed() {
        host.advance(owed);
    }

    Ok(replayer.report(Clock::Virtual, host.now()))
}

/// Replay on tokio timers
///
/// Must be awaited inside a `LocalSet`.
pub async fn replay_realtime(scenario: &Scenario) -> Result<Report> {
    info!("Replaying {} step(s) in real time", scenario.steps.len());

    let host = Rc::new(VirtualHost::with_scheduler(Rc::new(TokioScheduler::new())));
    let started = tokio::time::Instant::now();
    let now: Now = Rc::new(move || started.elapsed());
    let mut replayer = Replayer::new(scenario, host.clone(), now)?;

    for step in &scenario.steps {
        if let Some(wait) = replayer.apply(step)? {
            tokio::time::sleep(wait).await;
            host.flush();
        }
    }
    if let Some(owed) = replayer.owed() {
        tokio::time::sleep(owed).await;
    }

    Ok(replayer.report(Clock::Realtime, started.elapsed()))
}
