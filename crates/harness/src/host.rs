//! In-memory document host
//!
//! `VirtualHost` models just enough of a browser document to drive a watcher
//! deterministically:
//! - An element tree rooted at `html` with a `body` child
//! - Selector queries in document order
//! - Mutation observers with per-observer record queues, delivered on
//!   `flush()` the way a browser delivers them at a microtask checkpoint
//! - A configurable set of global constructor names
//! - A loading phase with one-shot ready listeners
//! - Timers on a [`ManualClock`], or on any external [`Scheduler`]

use crate::clock::ManualClock;
use crate::selector::{Matchable, SelectorList};
use domwatch_core::{
    DomwatchError, HandleConstructor, Host, ListenerId, MutationCallback, MutationKind,
    MutationRecord, ObservationHandle, ObserveOptions, ReadyListener, ReadyState, Result,
    Scheduler, Task, TimerId, CAPABILITY_NAMES,
};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Element reference handed out by a `VirtualHost`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub usize);

#[derive(Debug)]
struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
}

impl Matchable for Node {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn id(&self) -> Option<&str> {
        self.attributes.get("id").map(String::as_str)
    }

    fn has_class(&self, class: &str) -> bool {
        self.attributes
            .get("class")
            .map(|list| list.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }
}

/// One live observer created through a capability
struct ObserverEntry {
    callback: MutationCallback,
    registrations: Vec<(ElementId, ObserveOptions)>,
    queue: Vec<MutationRecord>,
}

struct Document {
    nodes: Vec<Node>,
    ready_state: ReadyState,
    globals: BTreeSet<String>,
    observers: BTreeMap<u64, ObserverEntry>,
    next_observer: u64,
    ready_listeners: BTreeMap<u64, ReadyListener>,
    next_listener: u64,
    constructed: usize,
}

enum Timers {
    Manual(ManualClock),
    External(Rc<dyn Scheduler>),
}

/// Deterministic in-memory host
pub struct VirtualHost {
    doc: Rc<RefCell<Document>>,
    timers: Timers,
}

const HTML: ElementId = ElementId(0);
const BODY: ElementId = ElementId(1);

impl Default for VirtualHost {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualHost {
    /// Host exposing the unprefixed `MutationObserver`, already loaded, on a
    /// manual clock
    pub fn new() -> Self {
        Self::with_capabilities(&["MutationObserver"])
    }

    /// Host exposing exactly the given global names
    pub fn with_capabilities(names: &[&str]) -> Self {
        Self::build(names, Timers::Manual(ManualClock::new()))
    }

    /// Host exposing no mutation-observer constructor at all
    pub fn unsupported() -> Self {
        Self::with_capabilities(&[])
    }

    /// Host whose timers run on an external scheduler
    ///
    /// [`VirtualHost::advance`] then only flushes records; time moves with
    /// the scheduler.
    pub fn with_scheduler(scheduler: Rc<dyn Scheduler>) -> Self {
        Self::build(&CAPABILITY_NAMES[..1], Timers::External(scheduler))
    }

    fn build(names: &[&str], timers: Timers) -> Self {
        let html = Node {
            tag: "html".to_string(),
            attributes: BTreeMap::new(),
            parent: None,
            children: vec![BODY],
        };
        let body = Node {
            tag: "body".to_string(),
            attributes: BTreeMap::new(),
            parent: Some(HTML),
            children: Vec::new(),
        };

        Self {
            doc: Rc::new(RefCell::new(Document {
                nodes: vec![html, body],
                ready_state: ReadyState::Complete,
                globals: names.iter().map(|n| n.to_string()).collect(),
                observers: BTreeMap::new(),
                next_observer: 0,
                ready_listeners: BTreeMap::new(),
                next_listener: 0,
                constructed: 0,
            })),
            timers,
        }
    }

    /// The `<html>` element
    pub fn document_element(&self) -> ElementId {
        HTML
    }

    /// The `<body>` element
    pub fn body(&self) -> ElementId {
        BODY
    }

    // ---- document structure ----

    /// Create a detached element
    pub fn create_element(&self, tag: &str) -> ElementId {
        let mut doc = self.doc.borrow_mut();
        doc.nodes.push(Node {
            tag: tag.to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
        });
        ElementId(doc.nodes.len() - 1)
    }

    /// Append `child` to `parent`, moving it if already attached
    ///
    /// Returns false, changing nothing, if either element is unknown or the
    /// move would create a cycle.
    pub fn append_child(&self, parent: ElementId, child: ElementId) -> bool {
        let mut doc = self.doc.borrow_mut();
        if !doc.contains(parent) || !doc.contains(child) || doc.is_inclusive_ancestor(child, parent) {
            return false;
        }
        if let Some(old_parent) = doc.nodes[child.0].parent.take() {
            doc.nodes[old_parent.0].children.retain(|&c| c != child);
            doc.queue_record(old_parent, MutationRecord::child_list());
        }
        doc.nodes[child.0].parent = Some(parent);
        doc.nodes[parent.0].children.push(child);
        doc.queue_record(parent, MutationRecord::child_list());
        true
    }

    /// Detach `child` from `parent`. Returns false if it was not a child.
    pub fn remove_child(&self, parent: ElementId, child: ElementId) -> bool {
        let mut doc = self.doc.borrow_mut();
        match doc.nodes.get(child.0) {
            Some(node) if node.parent == Some(parent) => {}
            _ => return false,
        }
        doc.nodes[child.0].parent = None;
        doc.nodes[parent.0].children.retain(|&c| c != child);
        doc.queue_record(parent, MutationRecord::child_list());
        true
    }

    /// Create an element and append it to `parent`
    pub fn append_new(&self, parent: ElementId, tag: &str) -> ElementId {
        let child = self.create_element(tag);
        self.append_child(parent, child);
        child
    }

    /// Set an attribute (`class` and `id` feed selector matching)
    ///
    /// Returns false if the element is unknown.
    pub fn set_attribute(&self, element: ElementId, name: &str, value: &str) -> bool {
        let mut doc = self.doc.borrow_mut();
        let Some(node) = doc.nodes.get_mut(element.0) else {
            return false;
        };
        node.attributes.insert(name.to_string(), value.to_string());
        doc.queue_record(element, MutationRecord::attribute(name));
        true
    }

    /// Remove an attribute. Returns false if it was not set.
    pub fn remove_attribute(&self, element: ElementId, name: &str) -> bool {
        let mut doc = self.doc.borrow_mut();
        let removed = doc
            .nodes
            .get_mut(element.0)
            .and_then(|node| node.attributes.remove(name));
        if removed.is_none() {
            return false;
        }
        doc.queue_record(element, MutationRecord::attribute(name));
        true
    }

    /// Current value of an attribute
    pub fn attribute(&self, element: ElementId, name: &str) -> Option<String> {
        self.doc
            .borrow()
            .nodes
            .get(element.0)
            .and_then(|node| node.attributes.get(name).cloned())
    }

    /// Parent of an element
    pub fn parent(&self, element: ElementId) -> Option<ElementId> {
        self.doc.borrow().nodes.get(element.0).and_then(|node| node.parent)
    }

    // ---- capabilities ----

    /// Expose a global constructor name
    pub fn define_global(&self, name: &str) {
        self.doc.borrow_mut().globals.insert(name.to_string());
    }

    /// Remove a global constructor name
    pub fn remove_global(&self, name: &str) {
        self.doc.borrow_mut().globals.remove(name);
    }

    /// Number of observers ever constructed
    pub fn constructed_observers(&self) -> usize {
        self.doc.borrow().constructed
    }

    /// Number of connected observers
    pub fn live_observers(&self) -> usize {
        self.doc
            .borrow()
            .observers
            .values()
            .filter(|o| !o.registrations.is_empty())
            .count()
    }

    /// Elements some connected observer is registered on
    pub fn observed_elements(&self) -> Vec<ElementId> {
        let doc = self.doc.borrow();
        let set: BTreeSet<ElementId> = doc
            .observers
            .values()
            .flat_map(|o| o.registrations.iter().map(|(el, _)| *el))
            .collect();
        set.into_iter().collect()
    }

    /// Records waiting for the next flush, across observers
    pub fn queued_records(&self) -> usize {
        self.doc.borrow().observers.values().map(|o| o.queue.len()).sum()
    }

    // ---- loading phase ----

    /// Put the document back into its loading phase
    pub fn set_loading(&self) {
        self.doc.borrow_mut().ready_state = ReadyState::Loading;
    }

    /// Leave the loading phase, firing and discarding every ready listener
    ///
    /// Returns how many listeners fired. Does nothing if not loading.
    pub fn finish_loading(&self) -> usize {
        let listeners: Vec<ReadyListener> = {
            let mut doc = self.doc.borrow_mut();
            if doc.ready_state != ReadyState::Loading {
                return 0;
            }
            doc.ready_state = ReadyState::Interactive;
            std::mem::take(&mut doc.ready_listeners).into_values().collect()
        };
        for listener in &listeners {
            listener();
        }
        listeners.len()
    }

    /// Number of ready listeners still registered
    pub fn ready_listener_count(&self) -> usize {
        self.doc.borrow().ready_listeners.len()
    }

    // ---- delivery and time ----

    /// Deliver queued records to their observers
    ///
    /// Returns the number of non-empty batches delivered.
    pub fn flush(&self) -> usize {
        let mut delivered = 0;
        loop {
            let batches: Vec<(MutationCallback, Vec<MutationRecord>)> = {
                let mut doc = self.doc.borrow_mut();
                doc.observers
                    .values_mut()
                    .filter(|o| !o.queue.is_empty())
                    .map(|o| (o.callback.clone(), std::mem::take(&mut o.queue)))
                    .collect()
            };
            if batches.is_empty() {
                return delivered;
            }
            for (callback, records) in batches {
                callback(&records);
                delivered += 1;
            }
        }
    }

    /// Flush, then move the manual clock forward by `by`
    ///
    /// Records produced by fired timers are flushed after each one. Returns
    /// the number of timers fired (always 0 with an external scheduler).
    pub fn advance(&self, by: Duration) -> usize {
        self.flush();
        match &self.timers {
            Timers::Manual(clock) => clock.advance_with(by, || {
                self.flush();
            }),
            Timers::External(_) => 0,
        }
    }

    /// Shorthand for [`VirtualHost::advance`] in milliseconds
    pub fn advance_ms(&self, ms: u64) -> usize {
        self.advance(Duration::from_millis(ms))
    }

    /// Elapsed virtual time (zero with an external scheduler)
    pub fn now(&self) -> Duration {
        match &self.timers {
            Timers::Manual(clock) => clock.now(),
            Timers::External(_) => Duration::ZERO,
        }
    }

    /// Timers waiting to fire on the manual clock
    pub fn pending_timers(&self) -> usize {
        match &self.timers {
            Timers::Manual(clock) => clock.pending(),
            Timers::External(_) => 0,
        }
    }
}

impl Document {
    fn contains(&self, id: ElementId) -> bool {
        id.0 < self.nodes.len()
    }

    fn is_inclusive_ancestor(&self, ancestor: ElementId, mut node: ElementId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.nodes[node.0].parent {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    /// Queue `record` (a change on `target`) for every interested observer
    fn queue_record(&mut self, target: ElementId, record: MutationRecord) {
        let wants = |options: &ObserveOptions| match record.kind {
            MutationKind::ChildList => options.child_list,
            MutationKind::Attributes => options.attributes,
            MutationKind::CharacterData => false,
        };

        let interested: Vec<u64> = self
            .observers
            .iter()
            .filter(|(_, observer)| {
                observer.registrations.iter().any(|(registered, options)| {
                    wants(options)
                        && (*registered == target
                            || (options.subtree && self.is_inclusive_ancestor(*registered, target)))
                })
            })
            .map(|(id, _)| *id)
            .collect();

        for id in interested {
            if let Some(observer) = self.observers.get_mut(&id) {
                observer.queue.push(record.clone());
            }
        }
    }

    /// Elements in document order, starting at the root
    fn document_order(&self) -> Vec<ElementId> {
        let mut order = Vec::new();
        let mut stack = vec![HTML];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        order
    }
}

impl Scheduler for VirtualHost {
    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId {
        match &self.timers {
            Timers::Manual(clock) => clock.set_timeout(delay, task),
            Timers::External(scheduler) => scheduler.set_timeout(delay, task),
        }
    }

    fn clear_timeout(&self, id: TimerId) {
        match &self.timers {
            Timers::Manual(clock) => clock.clear_timeout(id),
            Timers::External(scheduler) => scheduler.clear_timeout(id),
        }
    }
}

impl Host for VirtualHost {
    type Element = ElementId;

    fn global_constructor(&self, name: &str) -> Option<Rc<dyn HandleConstructor<ElementId>>> {
        if !self.doc.borrow().globals.contains(name) {
            return None;
        }
        Some(Rc::new(VirtualConstructor {
            doc: Rc::downgrade(&self.doc),
        }))
    }

    fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementId>> {
        let selectors = SelectorList::parse(selector)?;
        let doc = self.doc.borrow();
        Ok(doc
            .document_order()
            .into_iter()
            .filter(|id| selectors.matches(&doc.nodes[id.0]))
            .collect())
    }

    fn ready_state(&self) -> ReadyState {
        self.doc.borrow().ready_state
    }

    fn add_ready_listener(&self, listener: ReadyListener) -> ListenerId {
        let mut doc = self.doc.borrow_mut();
        let id = doc.next_listener;
        doc.next_listener += 1;
        doc.ready_listeners.insert(id, listener);
        ListenerId(id)
    }

    fn remove_ready_listener(&self, id: ListenerId) {
        self.doc.borrow_mut().ready_listeners.remove(&id.0);
    }
}

struct VirtualConstructor {
    doc: Weak<RefCell<Document>>,
}

impl HandleConstructor<ElementId> for VirtualConstructor {
    fn construct(
        &self,
        on_mutations: MutationCallback,
    ) -> Result<Box<dyn ObservationHandle<ElementId>>> {
        let doc = self
            .doc
            .upgrade()
            .ok_or_else(|| DomwatchError::Host("document is gone".to_string()))?;

        let id = {
            let mut state = doc.borrow_mut();
            let id = state.next_observer;
            state.next_observer += 1;
            state.constructed += 1;
            state.observers.insert(
                id,
                ObserverEntry {
                    callback: on_mutations,
                    registrations: Vec::new(),
                    queue: Vec::new(),
                },
            );
            id
        };

        Ok(Box::new(VirtualObserver {
            doc: self.doc.clone(),
            id,
        }))
    }
}

struct VirtualObserver {
    doc: Weak<RefCell<Document>>,
    id: u64,
}

impl ObservationHandle<ElementId> for VirtualObserver {
    fn observe(&mut self, target: &ElementId, options: &ObserveOptions) -> Result<()> {
        if !(options.child_list || options.attributes) {
            return Err(DomwatchError::Host(
                "observe options must request child_list or attributes".to_string(),
            ));
        }
        let doc = self
            .doc
            .upgrade()
            .ok_or_else(|| DomwatchError::Host("document is gone".to_string()))?;
        let mut doc = doc.borrow_mut();
        if target.0 >= doc.nodes.len() {
            return Err(DomwatchError::Host(format!("no element {}", target.0)));
        }
        let observer = doc
            .observers
            .get_mut(&self.id)
            .ok_or_else(|| DomwatchError::Host("observer is gone".to_string()))?;

        // Re-observing a target replaces its options
        match observer.registrations.iter_mut().find(|(el, _)| el == target) {
            Some(existing) => existing.1 = *options,
            None => observer.registrations.push((*target, *options)),
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(doc) = self.doc.upgrade() {
            if let Some(observer) = doc.borrow_mut().observers.get_mut(&self.id) {
                observer.registrations.clear();
                observer.queue.clear();
            }
        }
    }
}

impl Drop for VirtualObserver {
    fn drop(&mut self) {
        if let Some(doc) = self.doc.upgrade() {
            doc.borrow_mut().observers.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    type Handle = Box<dyn ObservationHandle<ElementId>>;

    fn recording_handle(host: &VirtualHost) -> (Handle, Rc<RefCell<Vec<usize>>>) {
        let batches = Rc::new(RefCell::new(Vec::new()));
        let sink = batches.clone();
        let constructor = host.global_constructor("MutationObserver").unwrap();
        let handle = constructor
            .construct(Rc::new(move |records: &[MutationRecord]| {
                sink.borrow_mut().push(records.len())
            }))
            .unwrap();
        (handle, batches)
    }

    #[test]
    fn test_query_in_document_order() {
        let host = VirtualHost::new();
        let a = host.append_new(host.body(), "div");
        let b = host.append_new(a, "div");
        let c = host.append_new(host.body(), "div");
        host.set_attribute(b, "class", "watched");
        host.set_attribute(c, "class", "other watched");

        assert_eq!(host.query_selector_all("div").unwrap(), vec![a, b, c]);
        assert_eq!(host.query_selector_all(".watched").unwrap(), vec![b, c]);
        assert_eq!(host.query_selector_all("body").unwrap(), vec![host.body()]);
        assert!(host.query_selector_all(".missing").unwrap().is_empty());
        assert!(host.query_selector_all("div >").is_err());
    }

    #[test]
    fn test_detached_elements_are_not_queried() {
        let host = VirtualHost::new();
        let detached = host.create_element("p");
        host.set_attribute(detached, "class", "watched");
        assert!(host.query_selector_all(".watched").unwrap().is_empty());
    }

    #[test]
    fn test_records_batch_until_flush() {
        let host = VirtualHost::new();
        let target = host.append_new(host.body(), "div");
        let (mut handle, batches) = recording_handle(&host);
        handle.observe(&target, &ObserveOptions::default()).unwrap();

        host.set_attribute(target, "data-a", "1");
        host.set_attribute(target, "data-b", "2");
        host.append_new(target, "span");
        assert!(batches.borrow().is_empty());
        assert_eq!(host.queued_records(), 3);

        assert_eq!(host.flush(), 1);
        assert_eq!(*batches.borrow(), vec![3]);
        assert_eq!(host.flush(), 0);
    }

    #[test]
    fn test_subtree_option_controls_descendants() {
        let host = VirtualHost::new();
        let target = host.append_new(host.body(), "div");
        let child = host.append_new(target, "p");
        let (mut handle, batches) = recording_handle(&host);

        let shallow = ObserveOptions {
            subtree: false,
            ..ObserveOptions::default()
        };
        handle.observe(&target, &shallow).unwrap();
        host.set_attribute(child, "title", "x");
        assert_eq!(host.flush(), 0);

        handle.observe(&target, &ObserveOptions::default()).unwrap();
        host.set_attribute(child, "title", "y");
        assert_eq!(host.flush(), 1);
        assert_eq!(*batches.borrow(), vec![1]);
    }

    #[test]
    fn test_changes_outside_target_are_ignored() {
        let host = VirtualHost::new();
        let target = host.append_new(host.body(), "div");
        let sibling = host.append_new(host.body(), "div");
        let (mut handle, _batches) = recording_handle(&host);
        handle.observe(&target, &ObserveOptions::default()).unwrap();

        host.set_attribute(sibling, "title", "x");
        assert_eq!(host.queued_records(), 0);
    }

    #[test]
    fn test_disconnect_discards_queue() {
        let host = VirtualHost::new();
        let target = host.append_new(host.body(), "div");
        let (mut handle, batches) = recording_handle(&host);
        handle.observe(&target, &ObserveOptions::default()).unwrap();

        host.set_attribute(target, "title", "x");
        handle.disconnect();
        assert_eq!(host.flush(), 0);
        assert!(batches.borrow().is_empty());
        assert_eq!(host.live_observers(), 0);

        drop(handle);
        assert_eq!(host.constructed_observers(), 1);
    }

    #[test]
    fn test_ready_listeners_fire_once() {
        let host = VirtualHost::new();
        host.set_loading();
        let calls = Rc::new(Cell::new(0));

        let counter = calls.clone();
        host.add_ready_listener(Rc::new(move || counter.set(counter.get() + 1)));
        let removed = host.add_ready_listener(Rc::new(|| panic!("removed listener fired")));
        host.remove_ready_listener(removed);

        assert_eq!(host.ready_state(), ReadyState::Loading);
        assert_eq!(host.finish_loading(), 1);
        assert_eq!(host.finish_loading(), 0);
        assert_eq!(calls.get(), 1);
        assert_eq!(host.ready_state(), ReadyState::Interactive);
        assert_eq!(host.ready_listener_count(), 0);
    }

    #[test]
    fn test_globals() {
        let host = VirtualHost::unsupported();
        assert!(host.global_constructor("MutationObserver").is_none());
        host.define_global("MozMutationObserver");
        assert!(host.global_constructor("MozMutationObserver").is_some());
        host.remove_global("MozMutationObserver");
        assert!(host.global_constructor("MozMutationObserver").is_none());
    }

    #[test]
    fn test_foreign_element_ids_are_rejected() {
        let host = VirtualHost::new();
        let other = VirtualHost::new();
        let foreign = other.append_new(other.body(), "div");
        let foreign = other.append_new(foreign, "span");

        assert!(!host.set_attribute(foreign, "class", "x"));
        assert!(!host.remove_attribute(foreign, "class"));
        assert_eq!(host.attribute(foreign, "class"), None);
        assert_eq!(host.parent(foreign), None);
        assert!(!host.append_child(host.body(), foreign));
        assert!(!host.append_child(foreign, host.body()));
        assert!(!host.remove_child(host.body(), foreign));
        assert_eq!(host.queued_records(), 0);
    }

    #[test]
    fn test_append_child_refuses_cycles() {
        let host = VirtualHost::new();
        let outer = host.append_new(host.body(), "div");
        let inner = host.append_new(outer, "div");

        assert!(!host.append_child(inner, outer));
        assert!(!host.append_child(outer, outer));
        assert_eq!(host.parent(outer), Some(host.body()));
        assert!(host.append_child(host.body(), inner));
        assert_eq!(host.parent(inner), Some(host.body()));
    }

    #[test]
    fn test_advance_runs_timers_on_manual_clock() {
        let host = VirtualHost::new();
        let fired = Rc::new(Cell::new(false));
        let sink = fired.clone();
        host.set_timeout(Duration::from_millis(150), Box::new(move || sink.set(true)));

        assert_eq!(host.advance_ms(149), 0);
        assert!(!fired.get());
        assert_eq!(host.advance_ms(1), 1);
        assert!(fired.get());
        assert_eq!(host.now(), Duration::from_millis(150));
    }
}
