//! Watcher lifecycle tests against the in-memory host

use domwatch::{DomwatchError, Value, WatchOptions, Watcher, WatcherConfig, WatcherState};
use domwatch_harness::{ElementId, LogCapture, VirtualHost};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

const UNSUPPORTED: &str = "does not support MutationObserver";

/// Callback that counts its invocations
fn counter() -> (Rc<Cell<usize>>, impl Fn() + 'static) {
    let calls = Rc::new(Cell::new(0));
    let sink = calls.clone();
    (calls, move || sink.set(sink.get() + 1))
}

/// Host with one `<div class="watched">` under body
fn watched_host() -> (Rc<VirtualHost>, ElementId) {
    let host = Rc::new(VirtualHost::new());
    let target = host.append_new(host.body(), "div");
    host.set_attribute(target, "class", "watched");
    (host, target)
}

fn started(host: &Rc<VirtualHost>, callback: impl Fn() + 'static) -> Watcher<VirtualHost> {
    let mut watcher = Watcher::with_callback(host.clone(), callback, [".watched"]).unwrap();
    watcher.start();
    watcher
}

#[test]
fn test_attribute_change_fires_once_after_quiet_period() {
    let (host, target) = watched_host();
    let (calls, callback) = counter();
    let watcher = started(&host, callback);
    assert_eq!(watcher.state(), WatcherState::Active);
    assert_eq!(watcher.observed_count(), 1);

    host.set_attribute(target, "data-state", "open");
    host.advance_ms(149);
    assert_eq!(calls.get(), 0);
    assert_eq!(watcher.state(), WatcherState::PendingNotify);

    host.advance_ms(1);
    assert_eq!(calls.get(), 1);
    assert_eq!(watcher.state(), WatcherState::Active);

    host.advance_ms(1000);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_burst_collapses_into_one_callback_timed_from_last_change() {
    let (host, target) = watched_host();
    let fired_at = Rc::new(RefCell::new(Vec::new()));
    let sink = fired_at.clone();
    let clock = host.clone();
    let _watcher = started(&host, move || sink.borrow_mut().push(clock.now()));

    for i in 0..5 {
        host.set_attribute(target, "data-step", &i.to_string());
        host.advance_ms(100);
    }
    // Last change at t=400ms
    assert!(fired_at.borrow().is_empty());

    host.advance_ms(49);
    assert!(fired_at.borrow().is_empty());
    host.advance_ms(1);
    assert_eq!(*fired_at.borrow(), vec![Duration::from_millis(550)]);
}

#[test]
fn test_spaced_changes_fire_once_each() {
    let (host, target) = watched_host();
    let (calls, callback) = counter();
    let _watcher = started(&host, callback);

    for i in 0..3 {
        host.set_attribute(target, "data-step", &i.to_string());
        host.advance_ms(200);
    }
    assert_eq!(calls.get(), 3);
}

#[test]
fn test_many_records_in_one_batch_fire_once() {
    let (host, target) = watched_host();
    let (calls, callback) = counter();
    let _watcher = started(&host, callback);

    for i in 0..20 {
        host.set_attribute(target, &format!("data-{}", i), "x");
    }
    assert_eq!(host.flush(), 1);
    host.advance_ms(150);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_descendant_and_child_list_changes_trigger() {
    let (host, target) = watched_host();
    let (calls, callback) = counter();
    let _watcher = started(&host, callback);

    let child = host.append_new(target, "ul");
    host.advance_ms(150);
    assert_eq!(calls.get(), 1);

    let item = host.append_new(child, "li");
    host.advance_ms(150);
    assert_eq!(calls.get(), 2);

    host.set_attribute(item, "aria-selected", "true");
    host.advance_ms(150);
    assert_eq!(calls.get(), 3);

    host.remove_child(child, item);
    host.advance_ms(150);
    assert_eq!(calls.get(), 4);
}

#[test]
fn test_changes_elsewhere_are_ignored() {
    let (host, _target) = watched_host();
    let elsewhere = host.append_new(host.body(), "aside");
    let (calls, callback) = counter();
    let _watcher = started(&host, callback);

    host.set_attribute(elsewhere, "title", "x");
    host.append_new(elsewhere, "p");
    host.advance_ms(1000);
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_stop_while_pending_prevents_callback() {
    let (host, target) = watched_host();
    let (calls, callback) = counter();
    let mut watcher = started(&host, callback);

    host.set_attribute(target, "data-x", "1");
    host.advance_ms(50);
    assert_eq!(watcher.state(), WatcherState::PendingNotify);

    watcher.stop();
    assert_eq!(watcher.state(), WatcherState::Inert);
    assert_eq!(host.pending_timers(), 0);
    assert_eq!(host.live_observers(), 0);

    host.set_attribute(target, "data-x", "2");
    host.advance_ms(1000);
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_stop_discards_undelivered_records() {
    let (host, target) = watched_host();
    let (calls, callback) = counter();
    let mut watcher = started(&host, callback);

    host.set_attribute(target, "data-x", "1");
    watcher.stop();
    host.advance_ms(1000);
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_watcher_is_reusable_after_stop() {
    let (host, target) = watched_host();
    let (calls, callback) = counter();
    let mut watcher = started(&host, callback);

    watcher.stop();
    watcher.start();
    assert_eq!(watcher.state(), WatcherState::Active);
    assert_eq!(host.constructed_observers(), 2);
    assert_eq!(host.live_observers(), 1);

    host.set_attribute(target, "data-x", "1");
    host.advance_ms(150);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_start_twice_and_stop_twice_are_no_ops() {
    let (host, target) = watched_host();
    let (calls, callback) = counter();
    let mut watcher = started(&host, callback);

    watcher.start();
    assert_eq!(host.constructed_observers(), 1);
    assert_eq!(watcher.observed_count(), 1);

    host.set_attribute(target, "data-x", "1");
    host.advance_ms(150);
    assert_eq!(calls.get(), 1);

    watcher.stop();
    watcher.stop();
    assert_eq!(watcher.state(), WatcherState::Inert);
}

#[test]
fn test_stop_before_start_is_tolerated() {
    let (host, _target) = watched_host();
    let (_calls, callback) = counter();
    let mut watcher = Watcher::with_callback(host.clone(), callback, [".watched"]).unwrap();

    watcher.stop();
    assert_eq!(watcher.state(), WatcherState::Inert);
    assert_eq!(host.constructed_observers(), 0);
}

#[test]
fn test_unsupported_environment_is_inert_and_logs() {
    let logs = LogCapture::new();
    let _guard = logs.install();

    let host = Rc::new(VirtualHost::unsupported());
    let target = host.append_new(host.body(), "div");
    host.set_attribute(target, "class", "watched");
    let (calls, callback) = counter();

    let mut watcher = Watcher::with_callback(host.clone(), callback, [".watched"]).unwrap();
    assert!(!watcher.is_supported());
    assert_eq!(watcher.state(), WatcherState::Unsupported);
    assert_eq!(logs.count(UNSUPPORTED), 1);

    watcher.start();
    assert_eq!(logs.count(UNSUPPORTED), 2);
    assert!(logs.lines_containing(UNSUPPORTED)[1].contains("ERROR"));

    host.set_attribute(target, "data-x", "1");
    host.append_new(target, "span");
    host.advance_ms(1000);
    assert_eq!(calls.get(), 0);
    assert_eq!(host.constructed_observers(), 0);

    watcher.stop();
    assert_eq!(logs.count(UNSUPPORTED), 3);
    assert_eq!(watcher.state(), WatcherState::Unsupported);
}

#[test]
fn test_unsupported_environment_skips_callback_validation() {
    let host = Rc::new(VirtualHost::unsupported());
    let watcher = Watcher::new(host, WatchOptions::new(Value::from("not a function")));
    assert!(matches!(watcher, Ok(w) if !w.is_supported()));
}

#[test]
fn test_invalid_callback_fails_construction() {
    let (host, _target) = watched_host();
    let result = Watcher::new(
        host.clone(),
        WatchOptions::new(Value::from("not a function")).targets([".watched"]),
    );

    match result {
        Err(DomwatchError::InvalidArgument(kind)) => assert_eq!(kind, "string"),
        other => panic!("expected InvalidArgument, got {:?}", other.map(|_| ())),
    }
    assert_eq!(host.constructed_observers(), 0);
}

#[test]
fn test_prefixed_capabilities_are_used() {
    for name in ["WebKitMutationObserver", "MozMutationObserver"] {
        let host = Rc::new(VirtualHost::with_capabilities(&[name]));
        let target = host.append_new(host.body(), "div");
        host.set_attribute(target, "class", "watched");
        let (calls, callback) = counter();

        let watcher = started(&host, callback);
        assert_eq!(watcher.capability_name(), Some(name));

        host.set_attribute(target, "data-x", "1");
        host.advance_ms(150);
        assert_eq!(calls.get(), 1, "{}", name);
    }
}

#[test]
fn test_unprefixed_capability_preferred() {
    let host = Rc::new(VirtualHost::with_capabilities(&[
        "MozMutationObserver",
        "MutationObserver",
        "WebKitMutationObserver",
    ]));
    let (_calls, callback) = counter();
    let watcher = Watcher::with_callback(host, callback, Vec::<String>::new()).unwrap();
    assert_eq!(watcher.capability_name(), Some("MutationObserver"));
}

#[test]
fn test_loading_document_defers_until_ready() {
    let (host, target) = watched_host();
    host.set_loading();
    let (calls, callback) = counter();
    let watcher = started(&host, callback);

    host.set_attribute(target, "data-x", "1");
    host.flush();
    host.set_attribute(target, "data-x", "2");
    host.flush();
    assert_eq!(host.ready_listener_count(), 1);
    assert_eq!(watcher.state(), WatcherState::Active);

    host.advance_ms(1000);
    assert_eq!(calls.get(), 0);

    assert_eq!(host.finish_loading(), 1);
    assert_eq!(watcher.state(), WatcherState::PendingNotify);
    host.advance_ms(150);
    assert_eq!(calls.get(), 1);
    assert_eq!(host.ready_listener_count(), 0);
}

#[test]
fn test_stop_removes_ready_listener() {
    let (host, target) = watched_host();
    host.set_loading();
    let (calls, callback) = counter();
    let mut watcher = started(&host, callback);

    host.set_attribute(target, "data-x", "1");
    host.flush();
    assert_eq!(host.ready_listener_count(), 1);

    watcher.stop();
    assert_eq!(host.ready_listener_count(), 0);
    assert_eq!(host.finish_loading(), 0);
    host.advance_ms(1000);
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_targets_are_snapshotted_at_start() {
    let (host, _target) = watched_host();
    let (calls, callback) = counter();
    let mut watcher = started(&host, callback);

    let late = host.append_new(host.body(), "div");
    host.set_attribute(late, "class", "watched");
    host.set_attribute(late, "id", "late");
    watcher.add_target("#late");
    assert_eq!(watcher.targets(), &[".watched".to_string(), "#late".to_string()]);

    host.set_attribute(late, "data-x", "1");
    host.advance_ms(1000);
    assert_eq!(calls.get(), 0);

    watcher.stop();
    watcher.start();
    assert_eq!(watcher.observed_count(), 3);
    host.set_attribute(late, "data-x", "2");
    host.advance_ms(150);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_unmatched_and_invalid_selectors_are_skipped() {
    let logs = LogCapture::new();
    let _guard = logs.install();

    let (host, target) = watched_host();
    let (calls, callback) = counter();
    let mut watcher =
        Watcher::with_callback(host.clone(), callback, [".missing", "div >", ".watched"]).unwrap();
    watcher.start();

    assert_eq!(watcher.state(), WatcherState::Active);
    assert_eq!(watcher.observed_count(), 1);
    assert_eq!(logs.count("Skipping target 'div >'"), 1);

    host.set_attribute(target, "data-x", "1");
    host.advance_ms(150);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_no_targets_means_nothing_observed() {
    let (host, target) = watched_host();
    let (calls, callback) = counter();
    let mut watcher = Watcher::with_callback(host.clone(), callback, Vec::<String>::new()).unwrap();
    watcher.start();

    assert_eq!(watcher.state(), WatcherState::Active);
    assert_eq!(watcher.observed_count(), 0);
    host.set_attribute(target, "data-x", "1");
    host.advance_ms(1000);
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_custom_debounce_from_config() {
    let (host, target) = watched_host();
    let (calls, callback) = counter();
    let config = WatcherConfig::from_toml_str("targets = [\".watched\"]\ndebounce_ms = 40").unwrap();

    let mut watcher =
        Watcher::new(host.clone(), WatchOptions::from_config(Value::function(callback), &config))
            .unwrap();
    assert_eq!(watcher.debounce(), Some(Duration::from_millis(40)));
    watcher.start();

    host.set_attribute(target, "data-x", "1");
    host.advance_ms(39);
    assert_eq!(calls.get(), 0);
    host.advance_ms(1);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_attribute_only_observation_ignores_child_list() {
    let (host, target) = watched_host();
    let (calls, callback) = counter();
    let options = WatchOptions::new(Value::function(callback))
        .targets([".watched"])
        .observe(domwatch::ObserveOptions {
            child_list: false,
            ..Default::default()
        });
    let mut watcher = Watcher::new(host.clone(), options).unwrap();
    watcher.start();

    host.append_new(target, "span");
    host.advance_ms(1000);
    assert_eq!(calls.get(), 0);

    host.set_attribute(target, "data-x", "1");
    host.advance_ms(150);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_dropping_watcher_releases_everything() {
    let (host, target) = watched_host();
    host.set_loading();
    let (calls, callback) = counter();
    let watcher = started(&host, callback);

    host.set_attribute(target, "data-x", "1");
    host.flush();
    assert_eq!(host.ready_listener_count(), 1);
    drop(watcher);

    assert_eq!(host.live_observers(), 0);
    assert_eq!(host.ready_listener_count(), 0);
    host.finish_loading();
    host.advance_ms(1000);
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_callback_may_stop_its_own_watcher() {
    let (host, target) = watched_host();
    let slot: Rc<RefCell<Option<Watcher<VirtualHost>>>> = Rc::new(RefCell::new(None));
    let calls = Rc::new(Cell::new(0));

    let inner_slot = slot.clone();
    let inner_calls = calls.clone();
    let mut watcher = Watcher::with_callback(
        host.clone(),
        move || {
            inner_calls.set(inner_calls.get() + 1);
            if let Some(watcher) = inner_slot.borrow_mut().as_mut() {
                watcher.stop();
            }
        },
        [".watched"],
    )
    .unwrap();
    watcher.start();
    *slot.borrow_mut() = Some(watcher);

    host.set_attribute(target, "data-x", "1");
    host.advance_ms(150);
    assert_eq!(calls.get(), 1);

    let state = slot.borrow().as_ref().map(|w| w.state());
    assert_eq!(state, Some(WatcherState::Inert));

    host.set_attribute(target, "data-x", "2");
    host.advance_ms(1000);
    assert_eq!(calls.get(), 1);

    // Break the Rc cycle through the callback
    slot.borrow_mut().take();
}

#[test]
fn test_callback_changing_the_target_schedules_another_round() {
    let (host, target) = watched_host();
    let calls = Rc::new(Cell::new(0));

    let inner_calls = calls.clone();
    let dom = Rc::downgrade(&host);
    let _watcher = started(&host, move || {
        inner_calls.set(inner_calls.get() + 1);
        if inner_calls.get() == 1 {
            if let Some(dom) = dom.upgrade() {
                dom.set_attribute(target, "data-rendered", "true");
            }
        }
    });

    host.set_attribute(target, "data-x", "1");
    host.advance_ms(150);
    assert_eq!(calls.get(), 1);
    host.advance_ms(150);
    assert_eq!(calls.get(), 2);
    host.advance_ms(1000);
    assert_eq!(calls.get(), 2);
}
