//! Deep dependency collection for `deep` watchers.
//!
//! After reading the root value, walk the object graph and read every nested
//! reactive property so the active watcher subscribes to all of them.
//! Visits plain objects and arrays only; stops at frozen values and at
//! containers whose dep id was already seen in this traversal.

use rustc_hash::FxHashSet;

use crate::types::Value;

pub fn traverse(value: &Value) {
    let mut seen = FxHashSet::default();
    traverse_inner(value, &mut seen);
}

fn traverse_inner(value: &Value, seen: &mut FxHashSet<u64>) {
    if !value.is_container() {
        return;
    }
    if let Value::Object(obj) = value {
        if obj.is_frozen() {
            return;
        }
    }
    if let Some(ob) = value.observer() {
        // cycle guard: dep ids are stable per container
        if !seen.insert(ob.dep().id()) {
            return;
        }
    }
    match value {
        Value::Array(arr) => {
            for item in arr.to_vec() {
                traverse_inner(&item, seen);
            }
        }
        Value::Object(obj) => {
            for key in obj.keys() {
                // reactive read: registers the slot dep with the target
                let nested = obj.get(&key);
                traverse_inner(&nested, seen);
            }
        }
        _ => {}
    }
}
