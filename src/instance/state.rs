//! State initialization: props, methods, data, computed, watch.
//!
//! Runs in that order, with collision warnings between the namespaces. The
//! data factory is invoked with dependency collection disabled so reads
//! inside it don't leak into an outer watcher's dep set.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::instance::error::invoke_with_error_handling;
use crate::instance::options::{
    entries_lookup, ComputedDef, OptionKey, OptionValue, WatchDef, WatchHandler,
};
use crate::instance::props::validate_prop;
use crate::instance::Instance;
use crate::reactive::dep::{has_target, pop_target, push_target};
use crate::reactive::observer::{define_reactive, observe_as_root, toggle_observing};
use crate::reactive::watcher::{WatchCallback, WatchSource, Watcher, WatcherOptions};
use crate::types::{FnValue, Obj, Str, Value};
use crate::util::{is_reserved, warn};

pub(crate) fn init_state(vm: &Instance) {
    let options = vm.options();
    if let Some(OptionValue::Props(props)) = options.get(&OptionKey::Props) {
        init_props(vm, props);
    }
    if let Some(OptionValue::Methods(methods)) = options.get(&OptionKey::Methods) {
        init_methods(vm, methods);
    }
    if options.get(&OptionKey::Data).is_some() {
        init_data(vm);
    } else {
        let empty = Value::Object(vm.inner.data.borrow().clone());
        observe_as_root(&empty);
    }
    if let Some(OptionValue::Computed(computed)) = options.get(&OptionKey::Computed) {
        init_computed(vm, computed);
    }
    if let Some(OptionValue::Watch(watch)) = options.get(&OptionKey::Watch) {
        init_watch(vm, watch);
    }
}

// =============================================================================
// Props
// =============================================================================

fn init_props(vm: &Instance, props: &[(Str, crate::instance::options::PropOptions)]) {
    let props_data = match vm.options().get(&OptionKey::PropsData) {
        Some(OptionValue::PropsData(data)) => data.clone(),
        _ => Obj::new(),
    };
    let props_obj = vm.inner.props.borrow().clone();
    let is_root = vm.parent().is_none();

    // props hold references to parent-owned data: don't convert them
    if !is_root {
        toggle_observing(false);
    }
    for (key, prop) in props {
        let value = validate_prop(key, prop, &props_data, vm);
        let warn_key = key.clone();
        let warn_vm = vm.downgrade();
        let custom_setter: Option<Rc<dyn Fn(&Value)>> = if is_root {
            None
        } else {
            Some(Rc::new(move |_new: &Value| {
                let vm = warn_vm.upgrade();
                warn(
                    &format!(
                        "Avoid mutating a prop directly since the value will be \
                         overwritten whenever the parent component re-renders. \
                         Instead, use a data or computed property based on the \
                         prop's value. Prop being mutated: \"{warn_key}\""
                    ),
                    vm.as_ref(),
                );
            }))
        };
        define_reactive(&props_obj, key, Some(value), custom_setter, false);
    }
    if !is_root {
        toggle_observing(true);
    }
}

// =============================================================================
// Methods
// =============================================================================

fn init_methods(vm: &Instance, methods: &[(Str, FnValue)]) {
    let options = vm.options();
    let props = match options.get(&OptionKey::Props) {
        Some(OptionValue::Props(props)) => props.clone(),
        _ => Vec::new(),
    };
    for (key, _) in methods {
        if entries_lookup(&props, key).is_some() {
            warn(
                &format!("Method \"{key}\" has already been defined as a prop."),
                Some(vm),
            );
        }
        if is_reserved(key) {
            warn(
                &format!(
                    "Method \"{key}\" conflicts with an existing instance \
                     property. Avoid defining component methods that start \
                     with _ or $."
                ),
                Some(vm),
            );
        }
    }
}

// =============================================================================
// Data
// =============================================================================

fn init_data(vm: &Instance) {
    let data_def = match vm.options().get(&OptionKey::Data) {
        Some(OptionValue::Data(def)) => def.clone(),
        _ => return,
    };
    // disable dep collection while the factory runs
    push_target(None);
    let data = data_def.eval(Some(vm));
    pop_target();

    let data_obj = match data {
        Value::Object(obj) => obj,
        _ => {
            warn(
                "data functions should return an object so every instance \
                 gets its own state.",
                Some(vm),
            );
            Obj::new()
        }
    };

    let options = vm.options();
    let methods = match options.get(&OptionKey::Methods) {
        Some(OptionValue::Methods(m)) => m.clone(),
        _ => Vec::new(),
    };
    let props = match options.get(&OptionKey::Props) {
        Some(OptionValue::Props(p)) => p.clone(),
        _ => Vec::new(),
    };
    for key in data_obj.keys() {
        if entries_lookup(&methods, &key).is_some() {
            warn(
                &format!("Method \"{key}\" has already been defined as a data property."),
                Some(vm),
            );
        }
        if entries_lookup(&props, &key).is_some() {
            warn(
                &format!(
                    "The data property \"{key}\" is already declared as a prop. \
                     Use prop default value instead."
                ),
                Some(vm),
            );
        }
    }

    *vm.inner.data.borrow_mut() = data_obj.clone();
    observe_as_root(&Value::Object(data_obj));
}

// =============================================================================
// Computed
// =============================================================================

fn init_computed(vm: &Instance, computed: &[(Str, ComputedDef)]) {
    let data = vm.inner.data.borrow().clone();
    let props_obj = vm.inner.props.borrow().clone();
    let mut watchers: FxHashMap<Str, Watcher> = FxHashMap::default();
    for (key, def) in computed {
        if data.contains_key(key) {
            warn(
                &format!("The computed property \"{key}\" is already defined in data."),
                Some(vm),
            );
            continue;
        }
        if props_obj.contains_key(key) {
            warn(
                &format!("The computed property \"{key}\" is already defined as a prop."),
                Some(vm),
            );
            continue;
        }
        let getter = def.get.clone();
        let watcher = Watcher::new(
            Some(vm),
            WatchSource::Getter(Rc::new(move |vm| getter.call(vm, &[]))),
            None,
            WatcherOptions {
                lazy: true,
                ..Default::default()
            },
        );
        watchers.insert(key.clone(), watcher);
    }
    *vm.inner.computed_watchers.borrow_mut() = watchers;
}

impl Instance {
    /// The computed accessor: re-evaluate when dirty, then make the active
    /// target depend on the computed's own inputs rather than the computed
    /// itself, then return the cached value.
    pub(crate) fn computed_get(&self, key: &str) -> Value {
        let watcher = self.inner.computed_watchers.borrow().get(key).cloned();
        let Some(watcher) = watcher else {
            return Value::Null;
        };
        if watcher.dirty() {
            watcher.evaluate();
        }
        if has_target() {
            watcher.depend();
        }
        watcher.value()
    }

    pub(crate) fn computed_set(&self, key: &str, value: Value) {
        let def = match self.options().get(&OptionKey::Computed) {
            Some(OptionValue::Computed(defs)) => entries_lookup(defs, key).cloned(),
            _ => None,
        };
        let Some(def) = def else { return };
        match def.set {
            Some(setter) => {
                invoke_with_error_handling(
                    &setter,
                    Some(self),
                    std::slice::from_ref(&value),
                    &format!("setter for computed property \"{key}\""),
                );
            }
            None => {
                warn(
                    &format!(
                        "Computed property \"{key}\" was assigned to but it \
                         has no setter."
                    ),
                    Some(self),
                );
            }
        }
    }
}

// =============================================================================
// Watch
// =============================================================================

fn init_watch(vm: &Instance, watch: &[(Str, Vec<WatchDef>)]) {
    for (key, defs) in watch {
        for def in defs {
            create_watcher(vm, key, def);
        }
    }
}

fn create_watcher(vm: &Instance, path: &str, def: &WatchDef) {
    let handler = match &def.handler {
        WatchHandler::Func(f) => f.clone(),
        WatchHandler::Method(name) => match vm.method(name) {
            Some(f) => f,
            None => {
                warn(
                    &format!("Watch handler method \"{name}\" is not defined."),
                    Some(vm),
                );
                return;
            }
        },
    };
    let cb: WatchCallback = Rc::new(move |vm, new_val, old_val| {
        handler
            .call(vm, &[new_val.clone(), old_val.clone()])
            .map(|_| ())
    });
    // the unwatch closure is dropped: options-declared watchers live until
    // instance teardown
    let _unwatch = vm.watch_with_callback(
        WatchSource::path(path),
        cb,
        WatchOptions {
            deep: def.deep,
            immediate: def.immediate,
            sync: def.sync,
        },
    );
}

/// Options accepted by [`Instance::watch`].
#[derive(Default, Clone, Copy)]
pub struct WatchOptions {
    pub deep: bool,
    pub immediate: bool,
    pub sync: bool,
}

impl Instance {
    /// Create a user watcher on an expression or getter. Returns an
    /// `unwatch` closure that tears the watcher down.
    pub fn watch(
        &self,
        source: WatchSource,
        cb: impl Fn(&Instance, &Value, &Value) + 'static,
        options: WatchOptions,
    ) -> impl FnOnce() {
        let cb: WatchCallback = Rc::new(move |vm, new_val, old_val| {
            if let Some(vm) = vm {
                cb(vm, new_val, old_val);
            }
            Ok(())
        });
        self.watch_with_callback(source, cb, options)
    }

    pub(crate) fn watch_with_callback(
        &self,
        source: WatchSource,
        cb: WatchCallback,
        options: WatchOptions,
    ) -> impl FnOnce() {
        let watcher = Watcher::new(
            Some(self),
            source,
            Some(cb.clone()),
            WatcherOptions {
                deep: options.deep,
                sync: options.sync,
                user: true,
                ..Default::default()
            },
        );
        if options.immediate {
            push_target(None);
            let value = watcher.value();
            if let Err(err) = cb(Some(self), &value, &Value::Null) {
                crate::instance::error::handle_error(
                    &err,
                    Some(self),
                    &format!(
                        "callback for immediate watcher \"{}\"",
                        watcher.expression()
                    ),
                );
            }
            pop_target();
        }
        move || watcher.teardown()
    }
}
