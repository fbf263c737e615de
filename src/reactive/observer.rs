//! Observers: attaching reactivity to objects and arrays.
//!
//! `observe` walks a container and converts every property into a reactive
//! slot with its own dep. The observer marker carries the container's own
//! dep, notified on property add/delete and array mutation. Observing an
//! already-observed value returns the existing observer.

use std::cell::Cell;
use std::rc::Rc;

use crate::reactive::dep::{has_target, Dep};
use crate::types::{same_value, Arr, Obj, Value};
use crate::util::warn;

thread_local! {
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

/// Globally enable or disable observation. Returns the previous state.
/// Used during prop initialization of non-root instances.
pub fn toggle_observing(value: bool) -> bool {
    SHOULD_OBSERVE.with(|s| {
        let prev = s.get();
        s.set(value);
        prev
    })
}

pub fn should_observe() -> bool {
    SHOULD_OBSERVE.with(|s| s.get())
}

/// The marker attached to an observed container. Holds the container's own
/// dep and a count of instances using the container as root data.
#[derive(Clone)]
pub struct Observer {
    dep: Dep,
    vm_count: Rc<Cell<u32>>,
}

impl Observer {
    fn new() -> Observer {
        Observer {
            dep: Dep::new(),
            vm_count: Rc::new(Cell::new(0)),
        }
    }

    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    pub fn vm_count(&self) -> u32 {
        self.vm_count.get()
    }

    pub(crate) fn inc_vm_count(&self) {
        self.vm_count.set(self.vm_count.get() + 1);
    }

    pub(crate) fn dec_vm_count(&self) {
        self.vm_count.set(self.vm_count.get().saturating_sub(1));
    }
}

/// Attach an observer to a container value, or return the existing one.
/// Primitives, functions and frozen objects are not observable.
pub fn observe(value: &Value) -> Option<Observer> {
    match value {
        Value::Object(obj) => {
            if let Some(ob) = obj.observer() {
                return Some(ob);
            }
            if !should_observe() || obj.is_frozen() {
                return None;
            }
            let ob = Observer::new();
            obj.set_observer(ob.clone());
            for key in obj.keys() {
                define_reactive(obj, &key, None, None, false);
            }
            Some(ob)
        }
        Value::Array(arr) => {
            if let Some(ob) = arr.observer() {
                return Some(ob);
            }
            if !should_observe() {
                return None;
            }
            let ob = Observer::new();
            arr.set_observer(ob.clone());
            for item in arr.to_vec_raw() {
                observe(&item);
            }
            Some(ob)
        }
        _ => None,
    }
}

/// Observe a value used as an instance's root data.
pub fn observe_as_root(value: &Value) -> Option<Observer> {
    let ob = observe(value);
    if let Some(ob) = &ob {
        ob.inc_vm_count();
    }
    ob
}

/// Convert a property into a reactive slot: give it a dep, observe its
/// value, and route reads/writes through the dependency machinery.
pub fn define_reactive(
    obj: &Obj,
    key: &str,
    val: Option<Value>,
    custom_setter: Option<Rc<dyn Fn(&Value)>>,
    shallow: bool,
) {
    if obj.is_frozen() {
        return;
    }
    let dep = Dep::new();
    let value = val
        .or_else(|| obj.get_raw(key))
        .unwrap_or(Value::Null);
    if !shallow {
        observe(&value);
    }
    obj.set_raw(key, value);
    obj.install_dep(key, dep, shallow, custom_setter);
}

/// The reactive read path: register the slot's dep (and the child
/// container's dep) with the active target.
pub(crate) fn reactive_get(obj: &Obj, key: &str) -> Value {
    let Some((value, dep, _shallow)) = obj.slot_view(key) else {
        return Value::Null;
    };
    if let Some(dep) = dep {
        if has_target() {
            dep.depend();
            if let Some(child_ob) = value.observer() {
                child_ob.dep().depend();
                if let Value::Array(arr) = &value {
                    depend_array(arr);
                }
            }
        }
    }
    value
}

/// The reactive write path: identity short-circuit, custom-setter hook,
/// re-observe, notify. Writing a key with no slot installs a plain
/// (non-reactive) property, as a bare assignment would.
pub(crate) fn reactive_set(obj: &Obj, key: &str, new_val: Value) {
    let Some((old, dep, shallow)) = obj.slot_view(key) else {
        obj.set_raw(key, new_val);
        return;
    };
    if same_value(&old, &new_val) {
        return;
    }
    if let Some(custom) = obj.slot_custom_setter(key) {
        custom(&new_val);
    }
    if !obj.write_slot_value(key, new_val.clone()) {
        return;
    }
    if let Some(dep) = dep {
        if !shallow {
            observe(&new_val);
        }
        dep.notify();
    }
}

/// Collect deps on every nested observed array. Array element reads are not
/// interceptable, so the read of the holding property depends on them all.
pub(crate) fn depend_array(arr: &Arr) {
    for item in arr.to_vec_raw() {
        if let Some(ob) = item.observer() {
            ob.dep().depend();
        }
        if let Value::Array(nested) = &item {
            depend_array(nested);
        }
    }
}

impl Obj {
    /// Reactive property read. Registers the active target with the
    /// property's dep and the child container's dep.
    pub fn get(&self, key: &str) -> Value {
        reactive_get(self, key)
    }

    /// Reactive property write. No-op when the value is identical.
    pub fn set(&self, key: &str, value: Value) {
        reactive_set(self, key, value);
    }
}

// =============================================================================
// set / del
// =============================================================================

/// Add or replace a property with change notification. Array-index aware.
/// The instance-level `$set`.
pub fn set(target: &Value, key: &Value, value: Value) -> Value {
    match target {
        Value::Array(arr) => {
            if let Some(index) = valid_index(key) {
                arr.splice(index, 1, vec![value.clone()]);
                return value;
            }
            warn(
                &format!("Invalid array index in set(): {key:?}"),
                None,
            );
            value
        }
        Value::Object(obj) => {
            let key_str = match key.as_str() {
                Some(s) => s.to_string(),
                None => key.to_string(),
            };
            if obj.contains_key(&key_str) {
                obj.set(&key_str, value.clone());
                return value;
            }
            let ob = obj.observer();
            if let Some(ob) = &ob {
                if ob.vm_count() > 0 {
                    warn(
                        "Avoid adding reactive properties to the root $data \
                         at runtime - declare it upfront in the data option.",
                        None,
                    );
                    return value;
                }
            }
            match ob {
                None => obj.set_raw(&key_str, value.clone()),
                Some(ob) => {
                    define_reactive(obj, &key_str, Some(value.clone()), None, false);
                    ob.dep().notify();
                }
            }
            value
        }
        _ => {
            warn(
                &format!("Cannot set reactive property on non-container value: {target:?}"),
                None,
            );
            value
        }
    }
}

/// Remove a property with change notification. The instance-level `$delete`.
pub fn del(target: &Value, key: &Value) {
    match target {
        Value::Array(arr) => {
            if let Some(index) = valid_index(key) {
                arr.splice(index, 1, Vec::new());
            }
        }
        Value::Object(obj) => {
            let key_str = match key.as_str() {
                Some(s) => s.to_string(),
                None => key.to_string(),
            };
            let ob = obj.observer();
            if let Some(ob) = &ob {
                if ob.vm_count() > 0 {
                    warn(
                        "Avoid deleting properties on the root $data \
                         - just set it to null.",
                        None,
                    );
                    return;
                }
            }
            if obj.remove_raw(&key_str).is_none() {
                return;
            }
            if let Some(ob) = ob {
                ob.dep().notify();
            }
        }
        _ => {}
    }
}

fn valid_index(key: &Value) -> Option<usize> {
    let n = key.as_f64()?;
    if n >= 0.0 && n.fract() == 0.0 && n.is_finite() {
        Some(n as usize)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_is_idempotent() {
        let obj = Obj::from_pairs([("a", Value::from(1))]);
        let value = Value::Object(obj);
        let first = observe(&value).unwrap();
        let second = observe(&value).unwrap();
        assert!(first.dep().ptr_eq(second.dep()));
    }

    #[test]
    fn test_observe_respects_toggle() {
        let prev = toggle_observing(false);
        let obj = Obj::from_pairs([("a", Value::from(1))]);
        assert!(observe(&Value::Object(obj)).is_none());
        toggle_observing(prev);
    }

    #[test]
    fn test_frozen_objects_are_not_observed() {
        let obj = Obj::from_pairs([("a", Value::from(1))]);
        obj.freeze();
        assert!(observe(&Value::Object(obj)).is_none());
    }

    #[test]
    fn test_set_adds_reactive_property() {
        use crate::reactive::watcher::{WatchSource, Watcher, WatcherOptions};

        let obj = Obj::from_pairs([("a", Value::from(1))]);
        let value = Value::Object(obj.clone());
        observe(&value);

        // watcher reading the whole object (container dep)
        let obj_getter = obj.clone();
        let watcher = Watcher::new(
            None,
            WatchSource::getter(move |_| {
                // container-level read: touch every key
                let mut sum = 0.0;
                for key in obj_getter.keys() {
                    if let Some(n) = obj_getter.get(&key).as_f64() {
                        sum += n;
                    }
                }
                // depend on structure through the observer's own dep
                if let Some(ob) = obj_getter.observer() {
                    ob.dep().depend();
                }
                Value::from(sum)
            }),
            None,
            WatcherOptions {
                sync: true,
                ..Default::default()
            },
        );
        assert_eq!(watcher.value(), Value::from(1.0));

        set(&value, &Value::from("b"), Value::from(2));
        assert_eq!(watcher.value(), Value::from(3.0));

        // the new property is itself reactive now
        obj.set("b", Value::from(5));
        assert_eq!(watcher.value(), Value::from(6.0));
    }

    #[test]
    fn test_del_notifies_container() {
        let obj = Obj::from_pairs([("a", Value::from(1)), ("b", Value::from(2))]);
        let value = Value::Object(obj.clone());
        let ob = observe(&value).unwrap();
        assert_eq!(ob.vm_count(), 0);

        del(&value, &Value::from("b"));
        assert!(!obj.contains_key("b"));
    }
}
