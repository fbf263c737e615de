//! Core value model.
//!
//! The runtime operates on dynamic values: state objects, arrays, primitives
//! and user functions. A reactive object is a map of slots, each slot pairing
//! a value with the dependency node installed by the observer; the observer
//! marker itself lives outside the slot map so enumeration never sees it.
//!
//! `Obj` and `Arr` are clone-cheap shared handles. Equality between container
//! values is identity (same handle), matching the change-detection rules of
//! the reactive layer. The reactive read/write paths for these types are
//! implemented in `crate::reactive` (`observer` for objects, `array` for the
//! intercepted mutators).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::instance::error::RuntimeError;
use crate::instance::Instance;
use crate::reactive::observer::Observer;
use crate::reactive::Dep;

pub type Str = Rc<str>;

/// A dynamic runtime value.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Str(Str),
    Object(Obj),
    Array(Arr),
    Func(FnValue),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Containers participate in deep/identity-insensitive change detection.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_obj(&self) -> Option<&Obj> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_arr(&self) -> Option<&Arr> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_fn(&self) -> Option<&FnValue> {
        match self {
            Value::Func(f) => Some(f),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) | Value::Array(_) | Value::Func(_) => true,
        }
    }

    /// The observer attached to this value, when it is an observed container.
    pub fn observer(&self) -> Option<Observer> {
        match self {
            Value::Object(o) => o.observer(),
            Value::Array(a) => a.observer(),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

/// Strict equality: structural for primitives, identity for containers and
/// functions. `NaN != NaN`, as usual.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Func(a), Value::Func(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// Change-detection equality: strict equality, except that two NaNs count as
/// the same value so a NaN write does not notify forever.
pub fn same_value(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    matches!((a, b), (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan())
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Object(o) => {
                let mut map = f.debug_map();
                for key in o.keys() {
                    map.entry(&&*key, &o.get_raw(&key).unwrap_or(Value::Null));
                }
                map.finish()
            }
            Value::Array(a) => f.debug_list().entries(a.to_vec_raw()).finish(),
            Value::Func(_) => write!(f, "<function>"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            other => write!(f, "{other:?}"),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Value {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Value {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Value {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(Rc::from(s))
    }
}

impl From<Obj> for Value {
    fn from(o: Obj) -> Value {
        Value::Object(o)
    }
}

impl From<Arr> for Value {
    fn from(a: Arr) -> Value {
        Value::Array(a)
    }
}

impl From<FnValue> for Value {
    fn from(f: FnValue) -> Value {
        Value::Func(f)
    }
}

// =============================================================================
// Function values
// =============================================================================

type RawFn = dyn Fn(Option<&Instance>, &[Value]) -> Result<Value, RuntimeError>;

/// A user-supplied function value: data factory, method, computed getter,
/// watch handler or event handler. Identity-comparable so handlers can be
/// deregistered by reference.
#[derive(Clone)]
pub struct FnValue {
    f: Rc<RawFn>,
}

impl FnValue {
    pub fn new(
        f: impl Fn(Option<&Instance>, &[Value]) -> Result<Value, RuntimeError> + 'static,
    ) -> Self {
        Self { f: Rc::new(f) }
    }

    /// Wrap an infallible closure.
    pub fn simple(f: impl Fn(Option<&Instance>, &[Value]) -> Value + 'static) -> Self {
        Self::new(move |vm, args| Ok(f(vm, args)))
    }

    pub fn call(&self, vm: Option<&Instance>, args: &[Value]) -> Result<Value, RuntimeError> {
        (self.f)(vm, args)
    }

    pub fn ptr_eq(&self, other: &FnValue) -> bool {
        Rc::ptr_eq(&self.f, &other.f)
    }
}

impl fmt::Debug for FnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function>")
    }
}

// =============================================================================
// Objects
// =============================================================================

/// A slot holds one property: its value plus the reactive bookkeeping the
/// observer installs on it.
pub(crate) struct Slot {
    pub value: Value,
    pub dep: Option<Dep>,
    pub shallow: bool,
    pub custom_setter: Option<Rc<dyn Fn(&Value)>>,
}

impl Slot {
    fn plain(value: Value) -> Slot {
        Slot {
            value,
            dep: None,
            shallow: false,
            custom_setter: None,
        }
    }
}

pub(crate) struct ObjData {
    slots: Vec<(Str, Slot)>,
    index: FxHashMap<Str, usize>,
    ob: Option<Observer>,
    frozen: bool,
}

/// A shared dynamic object. Clone is handle-clone.
#[derive(Clone)]
pub struct Obj {
    inner: Rc<RefCell<ObjData>>,
}

impl Obj {
    pub fn new() -> Obj {
        Obj {
            inner: Rc::new(RefCell::new(ObjData {
                slots: Vec::new(),
                index: FxHashMap::default(),
                ob: None,
                frozen: false,
            })),
        }
    }

    pub fn from_pairs<K: AsRef<str>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Obj {
        let obj = Obj::new();
        for (k, v) in pairs {
            obj.set_raw(k.as_ref(), v);
        }
        obj
    }

    pub fn ptr_eq(&self, other: &Obj) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().slots.is_empty()
    }

    /// Snapshot of the keys in insertion order.
    pub fn keys(&self) -> Vec<Str> {
        self.inner
            .borrow()
            .slots
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.borrow().index.contains_key(key)
    }

    /// Read a property without registering a dependency.
    pub fn get_raw(&self, key: &str) -> Option<Value> {
        let data = self.inner.borrow();
        data.index.get(key).map(|&i| data.slots[i].1.value.clone())
    }

    /// Write or insert a property without touching reactive bookkeeping and
    /// without notifying. Used before observation and by the merge layer.
    pub fn set_raw(&self, key: &str, value: Value) {
        let mut data = self.inner.borrow_mut();
        if data.frozen {
            return;
        }
        match data.index.get(key) {
            Some(&i) => data.slots[i].1.value = value,
            None => {
                let key: Str = Rc::from(key);
                let next = data.slots.len();
                data.index.insert(key.clone(), next);
                data.slots.push((key, Slot::plain(value)));
            }
        }
    }

    /// Remove a property. Returns the removed value.
    pub fn remove_raw(&self, key: &str) -> Option<Value> {
        let mut data = self.inner.borrow_mut();
        if data.frozen {
            return None;
        }
        let i = data.index.remove(key)?;
        let (_, slot) = data.slots.remove(i);
        for idx in data.index.values_mut() {
            if *idx > i {
                *idx -= 1;
            }
        }
        Some(slot.value)
    }

    /// Prevent observation and any further writes.
    pub fn freeze(&self) {
        self.inner.borrow_mut().frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.borrow().frozen
    }

    pub fn observer(&self) -> Option<Observer> {
        self.inner.borrow().ob.clone()
    }

    pub(crate) fn set_observer(&self, ob: Observer) {
        self.inner.borrow_mut().ob = Some(ob);
    }

    /// Clone of the reactive parts of a slot: `(value, dep, shallow)`.
    pub(crate) fn slot_view(&self, key: &str) -> Option<(Value, Option<Dep>, bool)> {
        let data = self.inner.borrow();
        data.index.get(key).map(|&i| {
            let slot = &data.slots[i].1;
            (slot.value.clone(), slot.dep.clone(), slot.shallow)
        })
    }

    pub(crate) fn slot_custom_setter(&self, key: &str) -> Option<Rc<dyn Fn(&Value)>> {
        let data = self.inner.borrow();
        data.index
            .get(key)
            .and_then(|&i| data.slots[i].1.custom_setter.clone())
    }

    /// Install reactive bookkeeping on a slot, creating the slot if missing.
    pub(crate) fn install_dep(
        &self,
        key: &str,
        dep: Dep,
        shallow: bool,
        custom_setter: Option<Rc<dyn Fn(&Value)>>,
    ) {
        let mut data = self.inner.borrow_mut();
        if data.frozen {
            return;
        }
        let i = match data.index.get(key) {
            Some(&i) => i,
            None => {
                let key: Str = Rc::from(key);
                let next = data.slots.len();
                data.index.insert(key.clone(), next);
                data.slots.push((key, Slot::plain(Value::Null)));
                next
            }
        };
        let slot = &mut data.slots[i].1;
        slot.dep = Some(dep);
        slot.shallow = shallow;
        slot.custom_setter = custom_setter;
    }

    /// Overwrite a slot's value, keeping its reactive bookkeeping. Returns
    /// false when the slot does not exist.
    pub(crate) fn write_slot_value(&self, key: &str, value: Value) -> bool {
        let mut data = self.inner.borrow_mut();
        if data.frozen {
            return false;
        }
        match data.index.get(key) {
            Some(&i) => {
                data.slots[i].1.value = value;
                true
            }
            None => false,
        }
    }
}

impl Default for Obj {
    fn default() -> Self {
        Obj::new()
    }
}

// =============================================================================
// Arrays
// =============================================================================

pub(crate) struct ArrData {
    pub items: Vec<Value>,
    pub ob: Option<Observer>,
}

/// A shared dynamic array. Elements are not individually reactive; structural
/// change notification goes through the observer's dep via the intercepted
/// mutators in `crate::reactive::array`.
#[derive(Clone)]
pub struct Arr {
    inner: Rc<RefCell<ArrData>>,
}

impl Arr {
    pub fn new() -> Arr {
        Arr::from_values(Vec::new())
    }

    pub fn from_values(items: impl IntoIterator<Item = Value>) -> Arr {
        Arr {
            inner: Rc::new(RefCell::new(ArrData {
                items: items.into_iter().collect(),
                ob: None,
            })),
        }
    }

    pub fn ptr_eq(&self, other: &Arr) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn len_raw(&self) -> usize {
        self.inner.borrow().items.len()
    }

    pub fn is_empty_raw(&self) -> bool {
        self.inner.borrow().items.is_empty()
    }

    pub fn get_raw(&self, index: usize) -> Option<Value> {
        self.inner.borrow().items.get(index).cloned()
    }

    /// Plain index write. Does not notify; use `splice` (or `crate::reactive::set`)
    /// for an observed write.
    pub fn set_raw(&self, index: usize, value: Value) {
        let mut data = self.inner.borrow_mut();
        if index < data.items.len() {
            data.items[index] = value;
        }
    }

    pub fn to_vec_raw(&self) -> Vec<Value> {
        self.inner.borrow().items.clone()
    }

    pub fn observer(&self) -> Option<Observer> {
        self.inner.borrow().ob.clone()
    }

    pub(crate) fn set_observer(&self, ob: Observer) {
        self.inner.borrow_mut().ob = Some(ob);
    }

    pub(crate) fn with_items<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        f(&mut self.inner.borrow_mut().items)
    }
}

impl Default for Arr {
    fn default() -> Self {
        Arr::new()
    }
}

// =============================================================================
// Deep merge
// =============================================================================

/// Recursively merge `from` into `to`, `to` winning per key. Only plain
/// objects merge; anything else keeps `to`'s value. Used by the data and
/// provide merge strategies.
pub fn merge_data(to: &Value, from: &Value) -> Value {
    let (Value::Object(to_obj), Value::Object(from_obj)) = (to, from) else {
        return to.clone();
    };
    for key in from_obj.keys() {
        let from_val = match from_obj.get_raw(&key) {
            Some(v) => v,
            None => continue,
        };
        match to_obj.get_raw(&key) {
            None => to_obj.set_raw(&key, from_val),
            Some(to_val) => {
                if to_val.is_object() && from_val.is_object() && to_val != from_val {
                    merge_data(&to_val, &from_val);
                }
            }
        }
    }
    to.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::Number(1.0), Value::Number(1.0));
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert!(same_value(
            &Value::Number(f64::NAN),
            &Value::Number(f64::NAN)
        ));

        let a = Obj::new();
        let b = Obj::new();
        assert_eq!(Value::Object(a.clone()), Value::Object(a.clone()));
        assert_ne!(Value::Object(a), Value::Object(b));
    }

    #[test]
    fn test_obj_insertion_order() {
        let obj = Obj::from_pairs([("b", Value::from(1)), ("a", Value::from(2))]);
        obj.set_raw("c", Value::from(3));
        let keys: Vec<_> = obj.keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, ["b", "a", "c"]);

        obj.remove_raw("a");
        let keys: Vec<_> = obj.keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, ["b", "c"]);
        assert_eq!(obj.get_raw("c"), Some(Value::from(3)));
    }

    #[test]
    fn test_merge_data_deep() {
        let parent = Obj::from_pairs([
            ("a", Value::from(1)),
            ("b", Value::Object(Obj::from_pairs([("x", Value::from(1))]))),
        ]);
        let child = Obj::from_pairs([
            ("b", Value::Object(Obj::from_pairs([("y", Value::from(2))]))),
            ("c", Value::from(3)),
        ]);
        let merged = merge_data(&Value::Object(child.clone()), &Value::Object(parent));
        let merged = merged.as_obj().unwrap();
        assert_eq!(merged.get_raw("a"), Some(Value::from(1)));
        assert_eq!(merged.get_raw("c"), Some(Value::from(3)));
        let b = merged.get_raw("b").unwrap();
        let b = b.as_obj().unwrap();
        assert_eq!(b.get_raw("x"), Some(Value::from(1)));
        assert_eq!(b.get_raw("y"), Some(Value::from(2)));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Number(0.0).truthy());
        assert!(!Value::Number(f64::NAN).truthy());
        assert!(!Value::string("").truthy());
        assert!(Value::string("x").truthy());
        assert!(Value::Object(Obj::new()).truthy());
    }
}
