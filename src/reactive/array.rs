//! Intercepted array mutators.
//!
//! The seven structural operations perform the underlying mutation, observe
//! any inserted elements, and fire exactly one notification on the array's
//! own dep. Reads of length or contents register the container dep with the
//! active target, so watchers of an array re-run on structural change.

use std::cmp::Ordering;

use crate::reactive::observer::observe;
use crate::types::{Arr, Value};

impl Arr {
    fn depend_self(&self) {
        if let Some(ob) = self.observer() {
            ob.dep().depend();
        }
    }

    fn notify_self(&self) {
        if let Some(ob) = self.observer() {
            ob.dep().notify();
        }
    }

    fn observe_inserted(&self, inserted: &[Value]) {
        if self.observer().is_some() {
            for item in inserted {
                observe(item);
            }
        }
    }

    /// Reactive length read.
    pub fn len(&self) -> usize {
        self.depend_self();
        self.len_raw()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reactive element read.
    pub fn get(&self, index: usize) -> Value {
        self.depend_self();
        self.get_raw(index).unwrap_or(Value::Null)
    }

    /// Reactive snapshot of the contents.
    pub fn to_vec(&self) -> Vec<Value> {
        self.depend_self();
        self.to_vec_raw()
    }

    pub fn push(&self, value: Value) {
        self.with_items(|items| items.push(value.clone()));
        self.observe_inserted(std::slice::from_ref(&value));
        self.notify_self();
    }

    pub fn pop(&self) -> Option<Value> {
        let removed = self.with_items(|items| items.pop());
        self.notify_self();
        removed
    }

    pub fn shift(&self) -> Option<Value> {
        let removed = self.with_items(|items| {
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        });
        self.notify_self();
        removed
    }

    pub fn unshift(&self, value: Value) {
        self.with_items(|items| items.insert(0, value.clone()));
        self.observe_inserted(std::slice::from_ref(&value));
        self.notify_self();
    }

    /// Remove `delete_count` elements at `start` and insert `items` in their
    /// place. Out-of-range positions clamp. Returns the removed elements.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        let inserted = items.clone();
        let removed = self.with_items(|existing| {
            let start = start.min(existing.len());
            let end = (start + delete_count).min(existing.len());
            existing.splice(start..end, items).collect::<Vec<_>>()
        });
        self.observe_inserted(&inserted);
        self.notify_self();
        removed
    }

    /// Sort in place. Without a comparator, elements order by their string
    /// form, the way a dynamic runtime's default sort does.
    pub fn sort(&self, compare: Option<&dyn Fn(&Value, &Value) -> Ordering>) {
        self.with_items(|items| match compare {
            Some(compare) => items.sort_by(|a, b| compare(a, b)),
            None => items.sort_by(|a, b| a.to_string().cmp(&b.to_string())),
        });
        self.notify_self();
    }

    pub fn reverse(&self) {
        self.with_items(|items| items.reverse());
        self.notify_self();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::watcher::{WatchSource, Watcher, WatcherOptions};
    use crate::types::Obj;

    fn observed(values: Vec<Value>) -> Arr {
        let arr = Arr::from_values(values);
        observe(&Value::Array(arr.clone()));
        arr
    }

    #[test]
    fn test_each_mutator_notifies_once() {
        let arr = observed(vec![Value::from(1), Value::from(2), Value::from(3)]);
        let runs = std::rc::Rc::new(std::cell::Cell::new(0));

        let arr_getter = arr.clone();
        let runs_getter = runs.clone();
        let _watcher = Watcher::new(
            None,
            WatchSource::getter(move |_| {
                runs_getter.set(runs_getter.get() + 1);
                Value::from(arr_getter.len())
            }),
            None,
            WatcherOptions {
                sync: true,
                ..Default::default()
            },
        );
        assert_eq!(runs.get(), 1);

        arr.push(Value::from(4));
        assert_eq!(runs.get(), 2);
        arr.pop();
        assert_eq!(runs.get(), 3);
        arr.shift();
        assert_eq!(runs.get(), 4);
        arr.unshift(Value::from(0));
        assert_eq!(runs.get(), 5);
        arr.splice(1, 1, vec![Value::from(9)]);
        assert_eq!(runs.get(), 6);
        arr.sort(None);
        assert_eq!(runs.get(), 7);
        arr.reverse();
        assert_eq!(runs.get(), 8);
    }

    #[test]
    fn test_inserted_elements_become_observable() {
        let arr = observed(vec![]);
        let child = Obj::from_pairs([("x", Value::from(1))]);
        assert!(child.observer().is_none());

        arr.push(Value::Object(child.clone()));
        assert!(child.observer().is_some());

        let spliced = Obj::from_pairs([("y", Value::from(2))]);
        arr.splice(0, 0, vec![Value::Object(spliced.clone())]);
        assert!(spliced.observer().is_some());
    }

    #[test]
    fn test_splice_returns_removed() {
        let arr = observed(vec![Value::from(1), Value::from(2), Value::from(3)]);
        let removed = arr.splice(1, 2, vec![Value::from(9)]);
        assert_eq!(removed, vec![Value::from(2), Value::from(3)]);
        assert_eq!(
            arr.to_vec_raw(),
            vec![Value::from(1), Value::from(9)]
        );
    }

    #[test]
    fn test_default_sort_is_stringwise() {
        let arr = observed(vec![Value::from(10), Value::from(2), Value::from(1)]);
        arr.sort(None);
        assert_eq!(
            arr.to_vec_raw(),
            vec![Value::from(1), Value::from(10), Value::from(2)]
        );
    }
}
