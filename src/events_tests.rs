
use super::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Listener) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_for_factory = Arc::clone(&seen);
    let factory = move |tag: &'static str| -> Listener {
        let seen = Arc::clone(&seen_for_factory);
        Box::new(move |_ev: &Event| {
            seen.lock().unwrap().push(tag);
        })
    };
    (seen, factory)
}

#[test]
fn test_dispatch_runs_in_insertion_order() {
    let mut bus = EventBus::new();
    let (seen, listener) = recorder();

    bus.on(EventKey::Run, listener("first"));
    bus.on(EventKey::Run, listener("second"));
    bus.on(EventKey::Run, listener("third"));

    bus.dispatch(&EventKey::Run, Value::Null);
    assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn test_dispatch_unknown_event_is_noop() {
    let mut bus = EventBus::new();
    bus.dispatch(&EventKey::Shutdown, Value::Null);
}

#[test]
fn test_listener_receives_payload() {
    let mut bus = EventBus::new();
    let got = Arc::new(Mutex::new(None));
    let got_in = Arc::clone(&got);

    bus.on(
        EventKey::Signal,
        Box::new(move |ev: &Event| {
            *got_in.lock().unwrap() = Some(ev.payload.clone());
        }),
    );

    bus.dispatch(&EventKey::Signal, json!({"signal": 15}));
    assert_eq!(*got.lock().unwrap(), Some(json!({"signal": 15})));
}

#[test]
fn test_panicking_listener_does_not_abort_dispatch() {
    let mut bus = EventBus::new();
    let (seen, listener) = recorder();

    bus.on(EventKey::Run, listener("before"));
    bus.on(
        EventKey::Run,
        Box::new(|_ev: &Event| panic!("listener exploded")),
    );
    bus.on(EventKey::Run, listener("after"));

    bus.dispatch(&EventKey::Run, Value::Null);
    assert_eq!(*seen.lock().unwrap(), vec!["before", "after"]);
}

#[test]
fn test_off_returns_the_callable() {
    let mut bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));
    let count_in = Arc::clone(&count);

    let handle = bus.on(
        EventKey::Init,
        Box::new(move |_ev: &Event| {
            count_in.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let mut callback = bus.off(&handle).expect("listener should be returned");
    assert_eq!(bus.listener_count(&EventKey::Init), 0);

    // The returned callable is the original one.
    callback(&Event::new(EventKey::Init));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_off_twice_returns_none() {
    let mut bus = EventBus::new();
    let handle = bus.on(EventKey::Init, Box::new(|_ev: &Event| {}));

    assert!(bus.off(&handle).is_some());
    assert!(bus.off(&handle).is_none());
}

#[test]
fn test_removed_listener_is_not_invoked() {
    let mut bus = EventBus::new();
    let (seen, listener) = recorder();

    let handle = bus.on(EventKey::Run, listener("removed"));
    bus.on(EventKey::Run, listener("kept"));
    bus.off(&handle);

    bus.dispatch(&EventKey::Run, Value::Null);
    assert_eq!(*seen.lock().unwrap(), vec!["kept"]);
}

#[test]
fn test_dispatch_to_invokes_exactly_one() {
    let mut bus = EventBus::new();
    let (seen, listener) = recorder();

    bus.on(EventKey::Run, listener("a"));
    let handle = bus.on(EventKey::Run, listener("b"));
    bus.on(EventKey::Run, listener("c"));

    bus.dispatch_to(&handle, Value::Null);
    assert_eq!(*seen.lock().unwrap(), vec!["b"]);
}

#[test]
fn test_dispatch_to_stale_handle_is_noop() {
    let mut bus = EventBus::new();
    let (seen, listener) = recorder();

    let handle = bus.on(EventKey::Run, listener("gone"));
    bus.off(&handle);

    bus.dispatch_to(&handle, Value::Null);
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn test_custom_key_rejects_builtin_names() {
    assert!(EventKey::custom("shutdown").is_err());
    assert!(EventKey::custom("Shutdown").is_err());
    assert!(EventKey::custom("NEWPID").is_err());
}

#[test]
fn test_custom_key_accepts_distinct_names() {
    let key = EventKey::custom("cache-flush").unwrap();
    assert_eq!(key.as_str(), "cache-flush");

    let mut bus = EventBus::new();
    let (seen, listener) = recorder();
    bus.on(key.clone(), listener("custom"));
    bus.dispatch(&key, Value::Null);
    assert_eq!(*seen.lock().unwrap(), vec!["custom"]);
}

#[test]
fn test_separate_events_do_not_interfere() {
    let mut bus = EventBus::new();
    let (seen, listener) = recorder();

    bus.on(EventKey::Init, listener("init"));
    bus.on(EventKey::Shutdown, listener("shutdown"));

    bus.dispatch(&EventKey::Init, Value::Null);
    assert_eq!(*seen.lock().unwrap(), vec!["init"]);
}
