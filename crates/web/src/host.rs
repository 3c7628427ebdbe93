use crate::slots::Slots;
use crate::{ready_state_from_js, record_kind};
use domwatch_core::{
    DomwatchError, HandleConstructor, Host, ListenerId, MutationCallback, MutationRecord,
    ObservationHandle, ObserveOptions, ReadyListener, ReadyState, Result, Scheduler, Task,
    TimerId,
};
use js_sys::{Array, Function, Reflect};
use std::rc::Rc;
use std::time::Duration;
use tracing::warn;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, MutationObserver, MutationObserverInit, Window};

const READY_EVENT: &str = "DOMContentLoaded";

type ClosureSlots = Slots<Closure<dyn FnMut()>>;

pub(crate) fn describe(value: &JsValue) -> String {
    value
        .as_string()
        .unwrap_or_else(|| format!("{:?}", value))
}

/// Wrap `body` so its slot is marked complete after it returns
fn wrap(slots: &ClosureSlots, key: u64, mut body: impl FnMut() + 'static) -> Closure<dyn FnMut()> {
    let done = slots.completion(key);
    Closure::<dyn FnMut()>::new(move || {
        body();
        done();
    })
}

struct Page {
    window: Window,
    document: Document,
}

/// Host backed by the page's `window` and `document`
///
/// Outside a page (a worker, for instance) the host exposes no globals, so a
/// watcher built on it is unsupported.
pub struct WebHost {
    page: Option<Page>,
    timers: ClosureSlots,
    listeners: ClosureSlots,
}

impl WebHost {
    /// Bind to the current page, if any
    pub fn new() -> Self {
        let page = web_sys::window().and_then(|window| {
            let document = window.document()?;
            Some(Page { window, document })
        });
        Self {
            page,
            timers: ClosureSlots::default(),
            listeners: ClosureSlots::default(),
        }
    }

    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| DomwatchError::Host("no document in this context".to_string()))
    }

    fn prune_listeners(&self, document: &Document) {
        self.listeners.prune(|_, closure| {
            let _ = document
                .remove_event_listener_with_callback(READY_EVENT, closure.as_ref().unchecked_ref());
        });
    }
}

impl Default for WebHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for WebHost {
    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId {
        self.timers.prune(|_, _| {});

        let key = self.timers.next_key();
        let page = match self.page() {
            Ok(page) => page,
            Err(e) => {
                warn!("setTimeout unavailable: {}", e);
                return TimerId(key);
            }
        };

        let mut task = Some(task);
        let closure = wrap(&self.timers, key, move || {
            if let Some(task) = task.take() {
                task();
            }
        });

        let ms = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
        match page
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(closure.as_ref().unchecked_ref(), ms)
        {
            Ok(handle) => self.timers.insert(key, handle, closure),
            Err(e) => warn!("setTimeout failed: {}", describe(&e)),
        }
        TimerId(key)
    }

    fn clear_timeout(&self, id: TimerId) {
        self.timers.prune(|_, _| {});
        if let (Some((handle, _closure)), Some(page)) = (self.timers.remove(id.0), &self.page) {
            page.window.clear_timeout_with_handle(handle);
        }
    }
}

impl Host for WebHost {
    type Element = Element;

    fn global_constructor(&self, name: &str) -> Option<Rc<dyn HandleConstructor<Element>>> {
        let page = self.page.as_ref()?;
        let value = Reflect::get(&page.window, &JsValue::from_str(name)).ok()?;
        let constructor = value.dyn_into::<Function>().ok()?;
        Some(Rc::new(WebConstructor { constructor }))
    }

    fn query_selector_all(&self, selector: &str) -> Result<Vec<Element>> {
        let list = self
            .page()?
            .document
            .query_selector_all(selector)
            .map_err(|e| DomwatchError::Host(describe(&e)))?;
        Ok((0..list.length())
            .filter_map(|i| list.item(i))
            .filter_map(|node| node.dyn_into::<Element>().ok())
            .collect())
    }

    fn ready_state(&self) -> ReadyState {
        match &self.page {
            Some(page) => ready_state_from_js(&page.document.ready_state()),
            None => ReadyState::Complete,
        }
    }

    fn add_ready_listener(&self, listener: ReadyListener) -> ListenerId {
        let key = self.listeners.next_key();
        let Some(page) = &self.page else {
            warn!("No document to listen for {} on", READY_EVENT);
            return ListenerId(key);
        };
        self.prune_listeners(&page.document);

        let closure = wrap(&self.listeners, key, move || listener());
        match page
            .document
            .add_event_listener_with_callback(READY_EVENT, closure.as_ref().unchecked_ref())
        {
            Ok(()) => self.listeners.insert(key, 0, closure),
            Err(e) => warn!("Failed to listen for {}: {}", READY_EVENT, describe(&e)),
        }
        ListenerId(key)
    }

    fn remove_ready_listener(&self, id: ListenerId) {
        let Some(page) = &self.page else {
            return;
        };
        self.prune_listeners(&page.document);
        if let Some((_, closure)) = self.listeners.remove(id.0) {
            let _ = page
                .document
                .remove_event_listener_with_callback(READY_EVENT, closure.as_ref().unchecked_ref());
        }
    }
}

/// A resolved `MutationObserver` (or prefixed) constructor
struct WebConstructor {
    constructor: Function,
}

impl HandleConstructor<Element> for WebConstructor {
    fn construct(&self, on_mutations: MutationCallback) -> Result<Box<dyn ObservationHandle<Element>>> {
        let closure = Closure::<dyn FnMut(Array)>::new(move |records: Array| {
            let batch: Vec<MutationRecord> = records
                .iter()
                .filter_map(|record| record.dyn_into::<web_sys::MutationRecord>().ok())
                .filter_map(|record| {
                    record_kind(&record.type_()).map(|kind| MutationRecord {
                        kind,
                        attribute_name: record.attribute_name(),
                    })
                })
                .collect();
            on_mutations(&batch);
        });

        let observer = Reflect::construct(&self.constructor, &Array::of1(closure.as_ref()))
            .map_err(|e| DomwatchError::Host(describe(&e)))?
            .unchecked_into::<MutationObserver>();

        Ok(Box::new(WebObserver {
            observer,
            _closure: closure,
        }))
    }
}

struct WebObserver {
    observer: MutationObserver,
    _closure: Closure<dyn FnMut(Array)>,
}

impl ObservationHandle<Element> for WebObserver {
    fn observe(&mut self, target: &Element, options: &ObserveOptions) -> Result<()> {
        let init = MutationObserverInit::new();
        init.set_child_list(options.child_list);
        init.set_subtree(options.subtree);
        init.set_attributes(options.attributes);
        self.observer
            .observe_with_options(target, &init)
            .map_err(|e| DomwatchError::Host(describe(&e)))
    }

    fn disconnect(&mut self) {
        self.observer.disconnect();
    }
}
