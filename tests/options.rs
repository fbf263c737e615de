//! Option-merge algebra and instance-initialization contracts.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use vine::{
    ComponentDef, Hook, Instance, Obj, OptionKey, OptionValue, Options, Value, WatchDef,
};

#[test]
fn scenario_data_factories_deep_merge() {
    // merging {data: () => ({a:1, b:{x:1}})} with {data: () => ({b:{y:2}, c:3})}
    ComponentDef::reset_base();
    let parent = ComponentDef::base().extend(Rc::new(
        Options::new().name("data-holder").data_fn(|_| {
            Value::Object(Obj::from_pairs([
                ("a", Value::from(1)),
                ("b", Value::Object(Obj::from_pairs([("x", Value::from(1))]))),
            ]))
        }),
    ));

    let vm = Instance::new_of(
        &parent,
        Options::new().data_fn(|_| {
            Value::Object(Obj::from_pairs([
                ("b", Value::Object(Obj::from_pairs([("y", Value::from(2))]))),
                ("c", Value::from(3)),
            ]))
        }),
    );

    assert_eq!(vm.get("a"), Value::from(1));
    assert_eq!(vm.get("c"), Value::from(3));
    let b = vm.get("b");
    let b = b.as_obj().expect("b is an object");
    assert_eq!(b.get_raw("x"), Some(Value::from(1)));
    assert_eq!(b.get_raw("y"), Some(Value::from(2)));
    ComponentDef::reset_base();
}

#[test]
fn lifecycle_hooks_concatenate_parent_before_child() {
    ComponentDef::reset_base();
    let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

    let parent_log = log.clone();
    let def = ComponentDef::base().extend(Rc::new(
        Options::new()
            .name("hooked")
            .hook(Hook::Created, move |_| parent_log.borrow_mut().push("parent")),
    ));

    let child_log = log.clone();
    let _vm = Instance::new_of(
        &def,
        Options::new().hook(Hook::Created, move |_| child_log.borrow_mut().push("child")),
    );

    assert_eq!(log.borrow().as_slice(), ["parent", "child"]);
    ComponentDef::reset_base();
}

#[test]
fn mixin_and_extends_fold_before_per_key_pass() {
    ComponentDef::reset_base();
    let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

    let base_log = order.clone();
    let mixin_log = order.clone();
    let own_log = order.clone();

    let extends = Options::new().hook(Hook::Created, move |_| base_log.borrow_mut().push("extends"));
    let mixin = Options::new().hook(Hook::Created, move |_| mixin_log.borrow_mut().push("mixin"));
    let child = Options::new()
        .extends_options(extends)
        .mixin(mixin)
        .hook(Hook::Created, move |_| own_log.borrow_mut().push("own"));

    let _vm = Instance::new(child);
    assert_eq!(order.borrow().as_slice(), ["extends", "mixin", "own"]);
    ComponentDef::reset_base();
}

#[test]
fn global_mixin_reaches_existing_subclass_instances() {
    ComponentDef::reset_base();
    let base = ComponentDef::base();
    let def = base.extend(Rc::new(Options::new().name("widget")));

    let count = Rc::new(Cell::new(0));
    let count_hook = count.clone();
    base.mixin(Options::new().hook(Hook::Created, move |_| {
        count_hook.set(count_hook.get() + 1)
    }));

    let _vm = Instance::new_of(&def, Options::new());
    assert_eq!(count.get(), 1, "late global mixin fires on subclass");
    ComponentDef::reset_base();
}

#[test]
fn methods_bind_to_the_instance() {
    let vm = Instance::new(
        Options::new()
            .data_fn(|_| Value::Object(Obj::from_pairs([("n", Value::from(5))])))
            .method("double", |vm, _| {
                Value::from(vm.get("n").as_f64().unwrap_or(0.0) * 2.0)
            }),
    );
    assert_eq!(vm.call_method("double", &[]), Value::from(10.0));

    // fetched as a value, the method stays bound
    let method = vm.get("double");
    let f = method.as_fn().expect("method value");
    assert_eq!(f.call(None, &[]).unwrap(), Value::from(10.0));
}

#[test]
fn watch_option_supports_method_handlers() {
    let seen: Rc<RefCell<Vec<f64>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let vm = Instance::new(
        Options::new()
            .data_fn(|_| Value::Object(Obj::from_pairs([("n", Value::from(0))])))
            .method("record", move |_, args| {
                if let Some(n) = args.first().and_then(Value::as_f64) {
                    sink.borrow_mut().push(n);
                }
                Value::Null
            })
            .watch("n", WatchDef::method("record").sync()),
    );

    vm.set("n", Value::from(1));
    vm.set("n", Value::from(2));
    assert_eq!(seen.borrow().as_slice(), [1.0, 2.0]);
}

#[test]
fn provide_inject_across_three_levels() {
    let root = Instance::new(
        Options::new().provide_obj(Obj::from_pairs([("token", Value::string("t-123"))])),
    );
    let middle = Instance::new_child(&root, Options::new());
    let leaf = Instance::new_child(&middle, Options::new().inject_names(&["token"]));

    assert_eq!(leaf.get("token"), Value::string("t-123"));
    // middle does not leak an injection it never asked for
    assert_eq!(middle.get("token"), Value::Null);
}

#[test]
fn props_data_flows_into_child_props() {
    ComponentDef::reset_base();
    let def = ComponentDef::base().extend(Rc::new(
        Options::new().name("labelled").prop_names(&["label"]),
    ));
    let parent = Instance::new(Options::new());
    let child = Instance::new_internal(
        &def,
        &parent,
        Obj::from_pairs([("label", Value::string("hello"))]),
        Vec::new(),
    );
    assert_eq!(child.get("label"), Value::string("hello"));
    assert!(child.parent().is_some());
    ComponentDef::reset_base();
}

#[test]
fn prop_mutation_on_child_warns_but_proceeds() {
    ComponentDef::reset_base();
    let warnings: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = warnings.clone();
    vine::set_warn_handler(move |msg, _| sink.borrow_mut().push(msg.to_string()));

    let def = ComponentDef::base().extend(Rc::new(
        Options::new().name("labelled").prop_names(&["label"]),
    ));
    let parent = Instance::new(Options::new());
    let child = Instance::new_internal(
        &def,
        &parent,
        Obj::from_pairs([("label", Value::string("a"))]),
        Vec::new(),
    );

    child.set("label", Value::string("b"));
    assert!(warnings
        .borrow()
        .iter()
        .any(|w| w.contains("Avoid mutating a prop")));
    assert_eq!(child.get("label"), Value::string("b"));
    ComponentDef::reset_base();
}

#[test]
fn computed_setter_and_missing_setter() {
    let warnings: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = warnings.clone();
    vine::set_warn_handler(move |msg, _| sink.borrow_mut().push(msg.to_string()));

    let vm = Instance::new(
        Options::new()
            .data_fn(|_| Value::Object(Obj::from_pairs([("n", Value::from(1))])))
            .computed("doubled", |vm| {
                Value::from(vm.get("n").as_f64().unwrap_or(0.0) * 2.0)
            }),
    );

    vm.set("doubled", Value::from(10));
    assert!(warnings.borrow().iter().any(|w| w.contains("no setter")));
    // the write was dropped
    assert_eq!(vm.get("doubled"), Value::from(2.0));
}

#[test]
fn error_captured_chain_stops_propagation() {
    let captured: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let warnings: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let warn_sink = warnings.clone();
    vine::set_warn_handler(move |msg, _| warn_sink.borrow_mut().push(msg.to_string()));

    let capture_sink = captured.clone();
    let parent = Instance::new(Options::new().hook_fn(
        Hook::ErrorCaptured,
        vine::FnValue::simple(move |_, args| {
            if let Some(msg) = args.first().and_then(|v| v.as_str().map(String::from)) {
                capture_sink.borrow_mut().push(msg);
            }
            // returning false stops propagation
            Value::Bool(false)
        }),
    ));
    let child = Instance::new_child(&parent, Options::new());

    child.on(
        "boom",
        vine::FnValue::new(|_, _| Err(vine::RuntimeError::msg("event went wrong"))),
    );
    child.emit("boom", &[]);

    assert_eq!(captured.borrow().as_slice(), ["event went wrong"]);
    assert!(
        warnings.borrow().is_empty(),
        "captured errors never reach the warn channel"
    );
}

#[test]
fn uncaptured_errors_reach_global_handler() {
    let seen: Rc<RefCell<Vec<(String, String)>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    vine::set_error_handler(move |err, _, info| {
        sink.borrow_mut().push((err.to_string(), info.to_string()));
    });

    let vm = Instance::new(Options::new());
    vm.on(
        "boom",
        vine::FnValue::new(|_, _| Err(vine::RuntimeError::msg("unhandled"))),
    );
    vm.emit("boom", &[]);

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "unhandled");
    assert!(seen[0].1.contains("event handler for \"boom\""));
    vine::reset_error_handler();
}

#[test]
fn custom_merge_strategy_is_consulted() {
    vine::reset_merge_strategies();
    let key = OptionKey::Custom(Rc::from("flavor"));
    vine::set_merge_strategy(
        key.clone(),
        Rc::new(|parent, child, _vm, _key| {
            // concatenate instead of replacing
            let p = match parent {
                Some(OptionValue::Raw(Value::Str(s))) => s.to_string(),
                _ => String::new(),
            };
            let c = match child {
                Some(OptionValue::Raw(Value::Str(s))) => s.to_string(),
                _ => String::new(),
            };
            Some(OptionValue::Raw(Value::string(format!("{p}{c}"))))
        }),
    );

    let mut parent = Options::new();
    parent.set(key.clone(), OptionValue::Raw(Value::string("sweet-")));
    let mut child = Options::new();
    child.set(key.clone(), OptionValue::Raw(Value::string("sour")));

    let merged = vine::merge_options(&parent, &child, None);
    match merged.get(&key) {
        Some(OptionValue::Raw(Value::Str(s))) => assert_eq!(&**s, "sweet-sour"),
        _ => panic!("custom strategy not applied"),
    }
    vine::reset_merge_strategies();
}

#[test]
fn observable_returns_an_observed_value() {
    let value = vine::observable(Value::Object(Obj::from_pairs([("k", Value::from(1))])));
    assert!(value.observer().is_some());
}
