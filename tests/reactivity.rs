//! Reactivity laws and end-to-end scenarios across the dependency graph,
//! observer, scheduler and instance layers.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use vine::reactive::{self, WatchSource, Watcher, WatcherOptions};
use vine::{observe, Arr, Instance, Obj, Options, Value, WatchOptions};

#[test]
fn observe_is_idempotent_and_observer_is_hidden() {
    let obj = Obj::from_pairs([("a", Value::from(1))]);
    let value = Value::Object(obj.clone());

    let first = observe(&value).expect("plain object observes");
    let second = observe(&value).expect("second observe");
    assert!(first.dep().ptr_eq(second.dep()));

    // the marker is not a property: enumeration never sees it
    let keys: Vec<String> = obj.keys().iter().map(|k| k.to_string()).collect();
    assert_eq!(keys, ["a"]);
}

#[test]
fn write_triggers_exactly_one_update_identical_write_none() {
    let obj = Obj::from_pairs([("p", Value::from(1))]);
    observe(&Value::Object(obj.clone()));

    let updates = Rc::new(Cell::new(0));
    let updates_in_getter = updates.clone();
    let obj_getter = obj.clone();
    let _watcher = Watcher::new(
        None,
        WatchSource::getter(move |_| {
            updates_in_getter.set(updates_in_getter.get() + 1);
            obj_getter.get("p")
        }),
        None,
        WatcherOptions {
            sync: true,
            ..Default::default()
        },
    );
    assert_eq!(updates.get(), 1);

    obj.set("p", Value::from(2));
    assert_eq!(updates.get(), 2);

    // identical value: zero updates
    obj.set("p", Value::from(2));
    assert_eq!(updates.get(), 2);

    // NaN to NaN counts as identical
    obj.set("p", Value::Number(f64::NAN));
    assert_eq!(updates.get(), 3);
    obj.set("p", Value::Number(f64::NAN));
    assert_eq!(updates.get(), 3);
}

#[test]
fn teardown_severs_all_subscriptions() {
    let obj = Obj::from_pairs([("a", Value::from(1)), ("b", Value::from(2))]);
    observe(&Value::Object(obj.clone()));

    let runs = Rc::new(Cell::new(0));
    let runs_getter = runs.clone();
    let obj_getter = obj.clone();
    let watcher = Watcher::new(
        None,
        WatchSource::getter(move |_| {
            runs_getter.set(runs_getter.get() + 1);
            let a = obj_getter.get("a").as_f64().unwrap_or(0.0);
            let b = obj_getter.get("b").as_f64().unwrap_or(0.0);
            Value::from(a + b)
        }),
        None,
        WatcherOptions {
            sync: true,
            ..Default::default()
        },
    );
    assert_eq!(runs.get(), 1);
    assert_eq!(watcher.dep_count(), 2);

    watcher.teardown();
    obj.set("a", Value::from(10));
    obj.set("b", Value::from(20));
    assert_eq!(runs.get(), 1);
}

#[test]
fn computed_caches_until_input_changes() {
    let evaluations = Rc::new(Cell::new(0));
    let evals = evaluations.clone();
    let vm = Instance::new(
        Options::new()
            .data_fn(|_| {
                Value::Object(Obj::from_pairs([
                    ("a", Value::from(2)),
                    ("b", Value::from(3)),
                ]))
            })
            .computed("sum", move |vm| {
                evals.set(evals.get() + 1);
                let a = vm.get("a").as_f64().unwrap_or(0.0);
                let b = vm.get("b").as_f64().unwrap_or(0.0);
                Value::from(a + b)
            }),
    );
    assert_eq!(evaluations.get(), 0);

    // two consecutive reads: exactly one evaluation
    assert_eq!(vm.get("sum"), Value::from(5.0));
    assert_eq!(vm.get("sum"), Value::from(5.0));
    assert_eq!(evaluations.get(), 1);

    // one input write: exactly one re-evaluation on next read
    vm.set("a", Value::from(10));
    assert_eq!(evaluations.get(), 1);
    assert_eq!(vm.get("sum"), Value::from(13.0));
    assert_eq!(evaluations.get(), 2);
}

#[test]
fn array_mutators_notify_once_and_observe_inserts() {
    let arr = Arr::from_values(vec![Value::from(1), Value::from(2), Value::from(3)]);
    observe(&Value::Array(arr.clone()));

    let notifications = Rc::new(Cell::new(0));
    let notif_getter = notifications.clone();
    let arr_getter = arr.clone();
    let _watcher = Watcher::new(
        None,
        WatchSource::getter(move |_| {
            notif_getter.set(notif_getter.get() + 1);
            Value::from(arr_getter.len())
        }),
        None,
        WatcherOptions {
            sync: true,
            ..Default::default()
        },
    );
    notifications.set(0);

    arr.push(Value::from(4));
    arr.pop();
    arr.shift();
    arr.unshift(Value::from(0));
    arr.splice(0, 1, vec![Value::from(9)]);
    arr.sort(None);
    arr.reverse();
    assert_eq!(notifications.get(), 7);

    let nested = Obj::from_pairs([("x", Value::from(1))]);
    arr.push(Value::Object(nested.clone()));
    assert!(nested.observer().is_some(), "inserted elements observable");
}

// Scenario A: data -> computed -> watch, with identical-write suppression.
#[test]
fn scenario_data_computed_watch_pipeline() {
    let log: Rc<RefCell<Vec<f64>>> = Rc::new(RefCell::new(Vec::new()));
    let log_watch = log.clone();

    let vm = Instance::new(
        Options::new()
            .data_fn(|_| Value::Object(Obj::from_pairs([("n", Value::from(1))])))
            .computed("d", |vm| {
                Value::from(vm.get("n").as_f64().unwrap_or(0.0) * 2.0)
            })
            .watch_fn("d", move |_, new_val, _old| {
                if let Some(n) = new_val.as_f64() {
                    log_watch.borrow_mut().push(n);
                }
            }),
    );

    vm.set("n", Value::from(3));
    reactive::flush();
    vm.set("n", Value::from(3));
    reactive::flush();
    vm.set("n", Value::from(4));
    reactive::flush();

    assert_eq!(log.borrow().as_slice(), [6.0, 8.0]);
}

// Scenario B: a watcher over an observed array's length.
#[test]
fn scenario_array_length_watcher() {
    let arr = Arr::from_values(vec![Value::from(1), Value::from(2), Value::from(3)]);
    observe(&Value::Array(arr.clone()));

    let seen: Rc<RefCell<Vec<(f64, f64)>>> = Rc::new(RefCell::new(Vec::new()));
    let seen_cb = seen.clone();
    let arr_getter = arr.clone();
    let _watcher = Watcher::new(
        None,
        WatchSource::getter(move |_| Value::from(arr_getter.len())),
        Some(Rc::new(move |_, new_val, old_val| {
            seen_cb.borrow_mut().push((
                new_val.as_f64().unwrap_or(f64::NAN),
                old_val.as_f64().unwrap_or(f64::NAN),
            ));
            Ok(())
        })),
        WatcherOptions::default(),
    );

    arr.push(Value::from(4));
    reactive::flush();

    assert_eq!(seen.borrow().as_slice(), [(4.0, 3.0)]);
}

#[test]
fn deep_watcher_fires_on_nested_mutation() {
    let fired = Rc::new(Cell::new(0));
    let fired_cb = fired.clone();
    let vm = Instance::new(Options::new().data_fn(|_| {
        Value::Object(Obj::from_pairs([(
            "config",
            Value::Object(Obj::from_pairs([("depth", Value::from(1))])),
        )]))
    }));

    let _unwatch = vm.watch(
        WatchSource::path("config"),
        move |_, _, _| fired_cb.set(fired_cb.get() + 1),
        WatchOptions {
            deep: true,
            sync: true,
            ..Default::default()
        },
    );

    let config = vm.get("config");
    config
        .as_obj()
        .expect("config is an object")
        .set("depth", Value::from(2));
    assert_eq!(fired.get(), 1);
}

#[test]
fn unwatch_closure_stops_the_watcher() {
    let fired = Rc::new(Cell::new(0));
    let fired_cb = fired.clone();
    let vm = Instance::new(
        Options::new().data_fn(|_| Value::Object(Obj::from_pairs([("n", Value::from(1))]))),
    );

    let unwatch = vm.watch(
        WatchSource::path("n"),
        move |_, _, _| fired_cb.set(fired_cb.get() + 1),
        WatchOptions {
            sync: true,
            ..Default::default()
        },
    );

    vm.set("n", Value::from(2));
    assert_eq!(fired.get(), 1);

    unwatch();
    vm.set("n", Value::from(3));
    assert_eq!(fired.get(), 1);
}

#[test]
fn immediate_watcher_fires_at_registration() {
    let seen: Rc<RefCell<Vec<f64>>> = Rc::new(RefCell::new(Vec::new()));
    let seen_cb = seen.clone();
    let vm = Instance::new(
        Options::new().data_fn(|_| Value::Object(Obj::from_pairs([("n", Value::from(7))]))),
    );

    let _unwatch = vm.watch(
        WatchSource::path("n"),
        move |_, new_val, _| {
            if let Some(n) = new_val.as_f64() {
                seen_cb.borrow_mut().push(n);
            }
        },
        WatchOptions {
            immediate: true,
            ..Default::default()
        },
    );
    assert_eq!(seen.borrow().as_slice(), [7.0]);
}

#[test]
fn set_and_del_notify_watchers_of_structure() {
    let vm = Instance::new(Options::new().data_fn(|_| {
        Value::Object(Obj::from_pairs([(
            "bag",
            Value::Object(Obj::new()),
        )]))
    }));

    let fired = Rc::new(Cell::new(0));
    let fired_cb = fired.clone();
    let _unwatch = vm.watch(
        WatchSource::path("bag"),
        move |_, _, _| fired_cb.set(fired_cb.get() + 1),
        WatchOptions {
            deep: true,
            sync: true,
            ..Default::default()
        },
    );

    let bag = vm.get("bag");
    vine::set(&bag, &Value::from("k"), Value::from(1));
    assert_eq!(fired.get(), 1);

    vine::del(&bag, &Value::from("k"));
    assert_eq!(fired.get(), 2);
}

#[test]
fn scheduler_cycle_guard_aborts_runaway_watcher() {
    let warnings: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = warnings.clone();
    vine::set_warn_handler(move |msg, _| sink.borrow_mut().push(msg.to_string()));

    let obj = Obj::from_pairs([("n", Value::from(0))]);
    observe(&Value::Object(obj.clone()));

    // a watcher that re-writes its own dependency on every run
    let obj_in_getter = obj.clone();
    let obj_in_cb = obj.clone();
    let _watcher = Watcher::new(
        None,
        WatchSource::getter(move |_| obj_in_getter.get("n")),
        Some(Rc::new(move |_, new_val, _| {
            let next = new_val.as_f64().unwrap_or(0.0) + 1.0;
            obj_in_cb.set("n", Value::from(next));
            Ok(())
        })),
        WatcherOptions::default(),
    );

    obj.set("n", Value::from(1));
    reactive::flush();

    assert!(
        warnings
            .borrow()
            .iter()
            .any(|w| w.contains("infinite update loop")),
        "cycle guard should warn"
    );
}
