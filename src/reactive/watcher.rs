//! Watchers: reactive computations.
//!
//! A watcher owns a getter, evaluates it with itself as the active target,
//! and re-runs (or marks itself dirty, or queues) when any dep it touched
//! notifies. Dep membership is reconciled after every evaluation so stale
//! subscriptions from earlier passes are dropped.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashSet;

use crate::instance::error::{handle_error, RuntimeError};
use crate::instance::{Instance, WeakInstance};
use crate::reactive::dep::{pop_target, push_target, Dep};
use crate::reactive::scheduler::queue_watcher;
use crate::reactive::traverse::traverse;
use crate::types::{same_value, Value};
use crate::util::{parse_path, warn};

thread_local! {
    static WATCHER_ID: std::cell::Cell<u64> = const { std::cell::Cell::new(1) };
}

pub type Getter = Rc<dyn Fn(Option<&Instance>) -> Result<Value, RuntimeError>>;
pub type WatchCallback = Rc<dyn Fn(Option<&Instance>, &Value, &Value) -> Result<(), RuntimeError>>;

/// What a watcher evaluates: a getter closure, or a dotted property path
/// resolved against the owning instance.
#[derive(Clone)]
pub enum WatchSource {
    Getter(Getter),
    Path(String),
}

impl WatchSource {
    pub fn getter(f: impl Fn(Option<&Instance>) -> Value + 'static) -> WatchSource {
        WatchSource::Getter(Rc::new(move |vm| Ok(f(vm))))
    }

    pub fn path(path: impl Into<String>) -> WatchSource {
        WatchSource::Path(path.into())
    }

    fn expression(&self) -> String {
        match self {
            WatchSource::Getter(_) => "function()".to_string(),
            WatchSource::Path(p) => p.clone(),
        }
    }

    fn into_getter(self, vm: Option<&Instance>) -> Getter {
        match self {
            WatchSource::Getter(g) => g,
            WatchSource::Path(path) => match parse_path(&path) {
                Some(segments) => Rc::new(move |vm: Option<&Instance>| {
                    let Some(vm) = vm else {
                        return Ok(Value::Null);
                    };
                    let mut current = vm.get(&segments[0]);
                    for segment in &segments[1..] {
                        current = match current {
                            Value::Object(ref o) => o.get(segment),
                            _ => return Ok(Value::Null),
                        };
                    }
                    Ok(current)
                }),
                None => {
                    warn(
                        &format!(
                            "Failed watching path: \"{path}\". \
                             Watcher only accepts simple dot-delimited paths. \
                             For full control, use a function instead."
                        ),
                        vm,
                    );
                    Rc::new(|_| Ok(Value::Null))
                }
            },
        }
    }
}

/// Construction options; all default off.
#[derive(Default)]
pub struct WatcherOptions {
    pub deep: bool,
    pub user: bool,
    pub lazy: bool,
    pub sync: bool,
    pub before: Option<Rc<dyn Fn()>>,
}

pub(crate) struct WatcherData {
    id: u64,
    vm: Option<WeakInstance>,
    expression: String,
    getter: Getter,
    cb: Option<WatchCallback>,
    deep: bool,
    user: bool,
    lazy: bool,
    sync: bool,
    before: Option<Rc<dyn Fn()>>,
    active: bool,
    dirty: bool,
    value: Value,
    deps: Vec<Dep>,
    dep_ids: FxHashSet<u64>,
    new_deps: Vec<Dep>,
    new_dep_ids: FxHashSet<u64>,
}

/// A reactive computation. Clone is handle-clone.
#[derive(Clone)]
pub struct Watcher {
    inner: Rc<RefCell<WatcherData>>,
}

pub struct WeakWatcher(Weak<RefCell<WatcherData>>);

impl WeakWatcher {
    pub fn upgrade(&self) -> Option<Watcher> {
        self.0.upgrade().map(|inner| Watcher { inner })
    }
}

impl Watcher {
    pub fn new(
        vm: Option<&Instance>,
        source: WatchSource,
        cb: Option<WatchCallback>,
        options: WatcherOptions,
    ) -> Watcher {
        let id = WATCHER_ID.with(|c| {
            let id = c.get();
            c.set(id + 1);
            id
        });
        let expression = source.expression();
        let getter = source.into_getter(vm);
        let lazy = options.lazy;
        let watcher = Watcher {
            inner: Rc::new(RefCell::new(WatcherData {
                id,
                vm: vm.map(Instance::downgrade),
                expression,
                getter,
                cb,
                deep: options.deep,
                user: options.user,
                lazy,
                sync: options.sync,
                before: options.before,
                active: true,
                dirty: lazy,
                value: Value::Null,
                deps: Vec::new(),
                dep_ids: FxHashSet::default(),
                new_deps: Vec::new(),
                new_dep_ids: FxHashSet::default(),
            })),
        };
        if let Some(vm) = vm {
            vm.register_watcher(&watcher);
        }
        if !lazy {
            let value = watcher.get();
            watcher.inner.borrow_mut().value = value;
        }
        watcher
    }

    pub fn id(&self) -> u64 {
        self.inner.borrow().id
    }

    pub fn downgrade(&self) -> WeakWatcher {
        WeakWatcher(Rc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &Watcher) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn dirty(&self) -> bool {
        self.inner.borrow().dirty
    }

    pub fn active(&self) -> bool {
        self.inner.borrow().active
    }

    pub fn value(&self) -> Value {
        self.inner.borrow().value.clone()
    }

    pub fn expression(&self) -> String {
        self.inner.borrow().expression.clone()
    }

    /// Number of deps collected by the last evaluation. Test-facing.
    pub fn dep_count(&self) -> usize {
        self.inner.borrow().deps.len()
    }

    pub(crate) fn call_before(&self) {
        let before = self.inner.borrow().before.clone();
        if let Some(before) = before {
            before();
        }
    }

    /// Evaluate the getter with this watcher as the active target, then
    /// reconcile dep subscriptions.
    fn get(&self) -> Value {
        push_target(Some(self.clone()));
        let (getter, vm_weak, deep, user, expression) = {
            let data = self.inner.borrow();
            (
                data.getter.clone(),
                data.vm.clone(),
                data.deep,
                data.user,
                data.expression.clone(),
            )
        };
        let vm = vm_weak.and_then(|w| w.upgrade());
        let value = match getter(vm.as_ref()) {
            Ok(value) => value,
            Err(err) => {
                if user {
                    handle_error(
                        &err,
                        vm.as_ref(),
                        &format!("getter for watcher \"{expression}\""),
                    );
                } else {
                    warn(
                        &format!("Error in watcher getter \"{expression}\": {err}"),
                        vm.as_ref(),
                    );
                }
                Value::Null
            }
        };
        // touch every nested property so deep watchers track them all
        if deep {
            traverse(&value);
        }
        pop_target();
        self.clean_up_deps();
        value
    }

    /// Record a dep touched during the current evaluation, subscribing to it
    /// if this watcher was not already a subscriber.
    pub(crate) fn add_dep(&self, dep: &Dep) {
        let id = dep.id();
        let need_sub = {
            let mut data = self.inner.borrow_mut();
            if data.new_dep_ids.contains(&id) {
                return;
            }
            data.new_dep_ids.insert(id);
            data.new_deps.push(dep.clone());
            !data.dep_ids.contains(&id)
        };
        if need_sub {
            dep.add_sub(self);
        }
    }

    /// Unsubscribe from deps not touched by the latest evaluation, then swap
    /// the dep sets.
    fn clean_up_deps(&self) {
        let stale: Vec<Dep> = {
            let data = self.inner.borrow();
            data.deps
                .iter()
                .filter(|dep| !data.new_dep_ids.contains(&dep.id()))
                .cloned()
                .collect()
        };
        let id = self.id();
        for dep in stale {
            dep.remove_sub(id);
        }
        let mut data = self.inner.borrow_mut();
        let WatcherData {
            deps,
            dep_ids,
            new_deps,
            new_dep_ids,
            ..
        } = &mut *data;
        std::mem::swap(deps, new_deps);
        std::mem::swap(dep_ids, new_dep_ids);
        new_deps.clear();
        new_dep_ids.clear();
    }

    /// Dep notification entry point.
    pub fn update(&self) {
        let (lazy, sync) = {
            let data = self.inner.borrow();
            (data.lazy, data.sync)
        };
        if lazy {
            self.inner.borrow_mut().dirty = true;
        } else if sync {
            self.run();
        } else {
            queue_watcher(self.clone());
        }
    }

    /// Re-evaluate and fire the callback when the value changed. Containers
    /// and deep watchers always fire: the value may have mutated in place.
    pub fn run(&self) {
        if !self.inner.borrow().active {
            return;
        }
        let value = self.get();
        let (old_value, deep, user, cb, vm_weak, expression) = {
            let data = self.inner.borrow();
            (
                data.value.clone(),
                data.deep,
                data.user,
                data.cb.clone(),
                data.vm.clone(),
                data.expression.clone(),
            )
        };
        if same_value(&value, &old_value) && !value.is_container() && !deep {
            return;
        }
        self.inner.borrow_mut().value = value.clone();
        if let Some(cb) = cb {
            let vm = vm_weak.and_then(|w| w.upgrade());
            if let Err(err) = cb(vm.as_ref(), &value, &old_value) {
                if user {
                    handle_error(
                        &err,
                        vm.as_ref(),
                        &format!("callback for watcher \"{expression}\""),
                    );
                } else {
                    warn(
                        &format!("Error in watcher callback \"{expression}\": {err}"),
                        vm.as_ref(),
                    );
                }
            }
        }
    }

    /// Evaluate a lazy watcher. Only ever called from the computed accessor.
    pub fn evaluate(&self) {
        let value = self.get();
        let mut data = self.inner.borrow_mut();
        data.value = value;
        data.dirty = false;
    }

    /// Re-register every dep of this watcher with the current active target.
    /// Lets an outer subscriber depend on a computed's inputs transitively.
    pub fn depend(&self) {
        let deps = self.inner.borrow().deps.clone();
        for dep in deps {
            dep.depend();
        }
    }

    /// Unsubscribe from all deps and deactivate. A queued run becomes a no-op.
    pub fn teardown(&self) {
        if !self.inner.borrow().active {
            return;
        }
        let vm = {
            let data = self.inner.borrow();
            data.vm.clone().and_then(|w| w.upgrade())
        };
        if let Some(vm) = vm {
            vm.remove_watcher(self);
        }
        let deps = self.inner.borrow().deps.clone();
        let id = self.id();
        for dep in deps {
            dep.remove_sub(id);
        }
        let mut data = self.inner.borrow_mut();
        data.active = false;
        data.deps.clear();
        data.dep_ids.clear();
    }
}
