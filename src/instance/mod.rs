//! Component instances: the options-to-instance pipeline.
//!
//! `Instance::new` merges the option record against the component
//! definition's resolved options and runs the observable init sequence:
//! lifecycle bookkeeping, events, `beforeCreate`, injections, state
//! (props → methods → data → computed → watch), provide, `created`.

pub mod error;
pub mod events;
pub mod extend;
pub mod inject;
pub mod lifecycle;
pub mod options;
pub mod props;
pub mod state;

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crate::instance::error::invoke_with_error_handling;
use crate::instance::events::EventHandler;
use crate::instance::extend::ComponentDef;
use crate::instance::inject::{init_injections, init_provide};
use crate::instance::lifecycle::call_hook;
use crate::instance::options::{
    entries_lookup, merge_options, Hook, OptionKey, OptionValue, Options,
};
use crate::instance::state::init_state;
use crate::reactive::watcher::Watcher;
use crate::types::{FnValue, Obj, Str, Value};
use crate::util::warn;

pub use error::RuntimeError;
pub use events::EventHandler as InstanceEventHandler;
pub use extend::Plugin;
pub use state::WatchOptions;

thread_local! {
    static UID: Cell<u64> = const { Cell::new(1) };
}

pub(crate) struct InstanceData {
    uid: u64,
    options: RefCell<Options>,
    parent: RefCell<Option<WeakInstance>>,
    root: RefCell<Option<WeakInstance>>,
    children: RefCell<Vec<Instance>>,
    refs: RefCell<FxHashMap<Str, Instance>>,
    data: RefCell<Obj>,
    props: RefCell<Obj>,
    injected: RefCell<Obj>,
    computed_watchers: RefCell<FxHashMap<Str, Watcher>>,
    watchers: RefCell<Vec<Watcher>>,
    render_watcher: RefCell<Option<Watcher>>,
    events: RefCell<FxHashMap<String, Vec<EventHandler>>>,
    provided: RefCell<Option<Obj>>,
    has_hook_event: Cell<bool>,
    is_being_destroyed: Cell<bool>,
    is_destroyed: Cell<bool>,
}

/// A component instance. Clone is handle-clone; the instance owns its
/// watchers, shares observers, and holds its parent weakly.
#[derive(Clone)]
pub struct Instance {
    pub(crate) inner: Rc<InstanceData>,
}

#[derive(Clone)]
pub struct WeakInstance(Weak<InstanceData>);

impl WeakInstance {
    pub fn upgrade(&self) -> Option<Instance> {
        self.0.upgrade().map(|inner| Instance { inner })
    }
}

impl Instance {
    /// Create a root instance from an option record.
    pub fn new(options: Options) -> Instance {
        Self::instantiate(None, options, None)
    }

    /// Create an instance of a component definition.
    pub fn new_of(def: &ComponentDef, options: Options) -> Instance {
        Self::instantiate(Some(def), options, None)
    }

    /// Create a child instance under `parent`.
    pub fn new_child(parent: &Instance, options: Options) -> Instance {
        Self::instantiate(None, options, Some(parent))
    }

    /// Internal child creation fast path: parent-provided fields are copied
    /// directly onto the definition's resolved options, skipping the
    /// per-key strategy pass.
    pub fn new_internal(
        def: &ComponentDef,
        parent: &Instance,
        props_data: Obj,
        listeners: Vec<(Str, FnValue)>,
    ) -> Instance {
        let vm = Instance::bare();
        let mut merged = def.resolve_options();
        merged.set(OptionKey::PropsData, OptionValue::PropsData(props_data));
        if !listeners.is_empty() {
            merged.set(
                OptionKey::ParentListeners,
                OptionValue::Methods(listeners),
            );
        }
        vm.finish_init(merged, Some(parent));
        vm
    }

    fn instantiate(def: Option<&ComponentDef>, user_options: Options, parent: Option<&Instance>) -> Instance {
        let vm = Instance::bare();
        let base = match def {
            Some(def) => def.resolve_options(),
            None => ComponentDef::base().resolve_options(),
        };
        let merged = merge_options(&base, &user_options, Some(&vm));
        vm.finish_init(merged, parent);
        vm
    }

    fn bare() -> Instance {
        let uid = UID.with(|c| {
            let uid = c.get();
            c.set(uid + 1);
            uid
        });
        Instance {
            inner: Rc::new(InstanceData {
                uid,
                options: RefCell::new(Options::new()),
                parent: RefCell::new(None),
                root: RefCell::new(None),
                children: RefCell::new(Vec::new()),
                refs: RefCell::new(FxHashMap::default()),
                data: RefCell::new(Obj::new()),
                props: RefCell::new(Obj::new()),
                injected: RefCell::new(Obj::new()),
                computed_watchers: RefCell::new(FxHashMap::default()),
                watchers: RefCell::new(Vec::new()),
                render_watcher: RefCell::new(None),
                events: RefCell::new(FxHashMap::default()),
                provided: RefCell::new(None),
                has_hook_event: Cell::new(false),
                is_being_destroyed: Cell::new(false),
                is_destroyed: Cell::new(false),
            }),
        }
    }

    fn finish_init(&self, merged: Options, parent: Option<&Instance>) {
        *self.inner.options.borrow_mut() = merged;
        self.init_lifecycle(parent);
        self.init_events();
        call_hook(self, Hook::BeforeCreate);
        init_injections(self);
        init_state(self);
        init_provide(self);
        call_hook(self, Hook::Created);
    }

    fn init_lifecycle(&self, parent: Option<&Instance>) {
        if let Some(parent) = parent {
            *self.inner.parent.borrow_mut() = Some(parent.downgrade());
            *self.inner.root.borrow_mut() = Some(parent.root().downgrade());
            parent.inner.children.borrow_mut().push(self.clone());
        }
    }

    fn init_events(&self) {
        let listeners = match self.options().get(&OptionKey::ParentListeners) {
            Some(OptionValue::Methods(listeners)) => listeners.clone(),
            _ => Vec::new(),
        };
        for (event, handler) in listeners {
            self.on(&event, handler);
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn uid(&self) -> u64 {
        self.inner.uid
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakInstance {
        WeakInstance(Rc::downgrade(&self.inner))
    }

    /// Clone of the merged `$options` record.
    pub fn options(&self) -> Options {
        self.inner.options.borrow().clone()
    }

    pub fn component_name(&self) -> Option<Str> {
        self.inner.options.borrow().option_name()
    }

    pub fn parent(&self) -> Option<Instance> {
        self.inner
            .parent
            .borrow()
            .as_ref()
            .and_then(WeakInstance::upgrade)
    }

    pub fn root(&self) -> Instance {
        self.inner
            .root
            .borrow()
            .as_ref()
            .and_then(WeakInstance::upgrade)
            .unwrap_or_else(|| self.clone())
    }

    pub fn children(&self) -> Vec<Instance> {
        self.inner.children.borrow().clone()
    }

    pub fn get_ref(&self, name: &str) -> Option<Instance> {
        self.inner.refs.borrow().get(name).cloned()
    }

    pub fn set_ref(&self, name: &str, instance: Instance) {
        self.inner.refs.borrow_mut().insert(Rc::from(name), instance);
    }

    /// The reactive data object (`$data`).
    pub fn data(&self) -> Obj {
        self.inner.data.borrow().clone()
    }

    /// The reactive props object (`$props`).
    pub fn props(&self) -> Obj {
        self.inner.props.borrow().clone()
    }

    pub(crate) fn provided(&self) -> Option<Obj> {
        self.inner.provided.borrow().clone()
    }

    pub(crate) fn hooks(&self, hook: Hook) -> Vec<FnValue> {
        match self.inner.options.borrow().get(&OptionKey::Hook(hook)) {
            Some(OptionValue::Hooks(hooks)) => hooks.clone(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn method(&self, name: &str) -> Option<FnValue> {
        match self.inner.options.borrow().get(&OptionKey::Methods) {
            Some(OptionValue::Methods(methods)) => entries_lookup(methods, name).cloned(),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Property surface
    // -------------------------------------------------------------------------

    /// Read an instance property: props, then data, then methods (bound),
    /// then computed, then injections.
    pub fn get(&self, key: &str) -> Value {
        let props = self.inner.props.borrow().clone();
        if props.contains_key(key) {
            return props.get(key);
        }
        let data = self.inner.data.borrow().clone();
        if data.contains_key(key) {
            return data.get(key);
        }
        if let Some(method) = self.method(key) {
            return Value::Func(self.bind_method(method));
        }
        if self.inner.computed_watchers.borrow().contains_key(key) {
            return self.computed_get(key);
        }
        let injected = self.inner.injected.borrow().clone();
        if injected.contains_key(key) {
            return injected.get(key);
        }
        Value::Null
    }

    /// Write an instance property. Prop writes warn on non-root instances;
    /// computed writes require a setter; unknown keys warn and drop.
    pub fn set(&self, key: &str, value: Value) {
        let props = self.inner.props.borrow().clone();
        if props.contains_key(key) {
            props.set(key, value);
            return;
        }
        let data = self.inner.data.borrow().clone();
        if data.contains_key(key) {
            data.set(key, value);
            return;
        }
        if self.inner.computed_watchers.borrow().contains_key(key) {
            self.computed_set(key, value);
            return;
        }
        warn(
            &format!(
                "Property \"{key}\" is not defined on the instance. Reactive \
                 properties must be declared in data, props or computed."
            ),
            Some(self),
        );
    }

    /// Add or replace a property on a reactive target with notification;
    /// array-index aware. The instance-level mirror of [`crate::reactive::set`].
    pub fn set_reactive(&self, target: &Value, key: &Value, value: Value) -> Value {
        crate::reactive::set(target, key, value)
    }

    /// Remove a property from a reactive target with notification. The
    /// instance-level mirror of [`crate::reactive::del`].
    pub fn delete_reactive(&self, target: &Value, key: &Value) {
        crate::reactive::del(target, key);
    }

    /// Invoke a method by name, routing errors through the error channel.
    pub fn call_method(&self, name: &str, args: &[Value]) -> Value {
        let Some(method) = self.method(name) else {
            warn(&format!("Method \"{name}\" is not defined."), Some(self));
            return Value::Null;
        };
        invoke_with_error_handling(&method, Some(self), args, &format!("method \"{name}\""))
    }

    fn bind_method(&self, method: FnValue) -> FnValue {
        let weak = self.downgrade();
        FnValue::new(move |_, args| match weak.upgrade() {
            Some(vm) => method.call(Some(&vm), args),
            None => Ok(Value::Null),
        })
    }

    // -------------------------------------------------------------------------
    // Watcher ownership
    // -------------------------------------------------------------------------

    pub(crate) fn register_watcher(&self, watcher: &Watcher) {
        self.inner.watchers.borrow_mut().push(watcher.clone());
    }

    pub(crate) fn remove_watcher(&self, watcher: &Watcher) {
        if self.inner.is_being_destroyed.get() {
            return;
        }
        self.inner
            .watchers
            .borrow_mut()
            .retain(|w| !w.ptr_eq(watcher));
    }
}
