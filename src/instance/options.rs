//! Option records and the merge algebra.
//!
//! A component definition is a record of well-known option keys (plus an
//! open namespace for user extensions). Merging a child record over a parent
//! runs one strategy per key from a process-global, user-extensible table;
//! `extends` and `mixins` fold into the parent before the per-key pass.
//!
//! Raw user shapes normalize on entry: prop name lists become descriptor
//! maps with camelized keys, inject name lists become `{from}` descriptors,
//! bare directive functions become `{bind, update}` pairs.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::instance::error::{invoke_with_error_handling, RuntimeError};
use crate::instance::Instance;
use crate::types::{merge_data, FnValue, Obj, Str, Value};
use crate::util::{camelize, capitalize, validate_component_name, warn};

// =============================================================================
// Keys
// =============================================================================

/// Lifecycle hooks, in firing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    BeforeCreate,
    Created,
    BeforeMount,
    Mounted,
    BeforeUpdate,
    Updated,
    BeforeDestroy,
    Destroyed,
    Activated,
    Deactivated,
    ErrorCaptured,
}

impl Hook {
    pub const ALL: [Hook; 11] = [
        Hook::BeforeCreate,
        Hook::Created,
        Hook::BeforeMount,
        Hook::Mounted,
        Hook::BeforeUpdate,
        Hook::Updated,
        Hook::BeforeDestroy,
        Hook::Destroyed,
        Hook::Activated,
        Hook::Deactivated,
        Hook::ErrorCaptured,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Hook::BeforeCreate => "beforeCreate",
            Hook::Created => "created",
            Hook::BeforeMount => "beforeMount",
            Hook::Mounted => "mounted",
            Hook::BeforeUpdate => "beforeUpdate",
            Hook::Updated => "updated",
            Hook::BeforeDestroy => "beforeDestroy",
            Hook::Destroyed => "destroyed",
            Hook::Activated => "activated",
            Hook::Deactivated => "deactivated",
            Hook::ErrorCaptured => "errorCaptured",
        }
    }
}

/// A well-known option name, or a user extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OptionKey {
    Name,
    El,
    PropsData,
    Data,
    Props,
    Computed,
    Methods,
    Watch,
    Provide,
    Inject,
    Components,
    Directives,
    Filters,
    Mixins,
    Extends,
    Delimiters,
    Comments,
    ParentListeners,
    Hook(Hook),
    /// Marks a record as already fully merged; `extends`/`mixins` of such a
    /// record are not folded again.
    Base,
    Custom(Str),
}

// =============================================================================
// Typed option payloads
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropType {
    Bool,
    Number,
    Str,
    Object,
    Array,
    Func,
}

impl PropType {
    pub fn name(&self) -> &'static str {
        match self {
            PropType::Bool => "Boolean",
            PropType::Number => "Number",
            PropType::Str => "String",
            PropType::Object => "Object",
            PropType::Array => "Array",
            PropType::Func => "Function",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            PropType::Bool => matches!(value, Value::Bool(_)),
            PropType::Number => matches!(value, Value::Number(_)),
            PropType::Str => matches!(value, Value::Str(_)),
            PropType::Object => matches!(value, Value::Object(_)),
            PropType::Array => matches!(value, Value::Array(_)),
            PropType::Func => matches!(value, Value::Func(_)),
        }
    }
}

#[derive(Clone)]
pub enum PropDefault {
    Value(Value),
    Factory(FnValue),
}

#[derive(Clone, Default)]
pub struct PropOptions {
    /// `None` means any type (`type: null`).
    pub types: Option<Vec<PropType>>,
    pub required: bool,
    pub default: Option<PropDefault>,
    pub validator: Option<FnValue>,
}

impl PropOptions {
    pub fn any() -> PropOptions {
        PropOptions::default()
    }

    pub fn of_type(types: impl IntoIterator<Item = PropType>) -> PropOptions {
        PropOptions {
            types: Some(types.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn required(mut self) -> PropOptions {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> PropOptions {
        self.default = Some(PropDefault::Value(value));
        self
    }

    pub fn default_factory(mut self, f: impl Fn() -> Value + 'static) -> PropOptions {
        self.default = Some(PropDefault::Factory(FnValue::simple(move |_, _| f())));
        self
    }

    pub fn validator(mut self, f: impl Fn(&Value) -> bool + 'static) -> PropOptions {
        self.validator = Some(FnValue::simple(move |_, args| {
            Value::Bool(args.first().map(|v| f(v)).unwrap_or(false))
        }));
        self
    }
}

#[derive(Clone)]
pub struct ComputedDef {
    pub get: FnValue,
    pub set: Option<FnValue>,
}

#[derive(Clone)]
pub enum WatchHandler {
    /// Resolved against the instance's methods at watcher creation.
    Method(Str),
    Func(FnValue),
}

#[derive(Clone)]
pub struct WatchDef {
    pub handler: WatchHandler,
    pub deep: bool,
    pub immediate: bool,
    pub sync: bool,
}

impl WatchDef {
    pub fn func(f: FnValue) -> WatchDef {
        WatchDef {
            handler: WatchHandler::Func(f),
            deep: false,
            immediate: false,
            sync: false,
        }
    }

    pub fn method(name: impl AsRef<str>) -> WatchDef {
        WatchDef {
            handler: WatchHandler::Method(Rc::from(name.as_ref())),
            deep: false,
            immediate: false,
            sync: false,
        }
    }

    pub fn deep(mut self) -> WatchDef {
        self.deep = true;
        self
    }

    pub fn immediate(mut self) -> WatchDef {
        self.immediate = true;
        self
    }

    pub fn sync(mut self) -> WatchDef {
        self.sync = true;
        self
    }
}

#[derive(Clone)]
pub struct InjectDef {
    pub from: Str,
    pub default: Option<PropDefault>,
}

/// The data (and provide) option: a factory, a plain object, or the merge
/// thunk produced by the data strategy, which deep-merges child over parent
/// at access time.
#[derive(Clone)]
pub enum DataDef {
    Factory(FnValue),
    Object(Obj),
    Merged(Rc<DataDef>, Rc<DataDef>),
}

impl DataDef {
    pub fn eval(&self, vm: Option<&Instance>) -> Value {
        match self {
            DataDef::Factory(f) => invoke_with_error_handling(f, vm, &[], "data()"),
            DataDef::Object(o) => Value::Object(o.clone()),
            DataDef::Merged(child, parent) => {
                let instance_data = child.eval(vm);
                let default_data = parent.eval(vm);
                if instance_data.is_object() {
                    merge_data(&instance_data, &default_data)
                } else {
                    default_data
                }
            }
        }
    }

    fn same(&self, other: &DataDef) -> bool {
        match (self, other) {
            (DataDef::Factory(a), DataDef::Factory(b)) => a.ptr_eq(b),
            (DataDef::Object(a), DataDef::Object(b)) => a.ptr_eq(b),
            (DataDef::Merged(a1, a2), DataDef::Merged(b1, b2)) => {
                Rc::ptr_eq(a1, b1) && Rc::ptr_eq(a2, b2)
            }
            _ => false,
        }
    }
}

#[derive(Clone, Default)]
pub struct DirectiveDef {
    pub bind: Option<FnValue>,
    pub inserted: Option<FnValue>,
    pub update: Option<FnValue>,
    pub component_updated: Option<FnValue>,
    pub unbind: Option<FnValue>,
}

/// A bare directive function normalizes to `{bind, update}`.
pub fn normalize_directive_fn(f: FnValue) -> DirectiveDef {
    DirectiveDef {
        bind: Some(f.clone()),
        update: Some(f),
        ..Default::default()
    }
}

#[derive(Clone)]
pub enum AssetDef {
    Component(crate::instance::extend::ComponentDef),
    /// Object-form component, extended lazily on registration/resolution.
    ComponentOptions(Rc<Options>),
    Directive(DirectiveDef),
    Filter(FnValue),
}

/// An asset registry (components, directives or filters): own entries over a
/// shared parent chain, so late global registrations reach merged children.
#[derive(Clone, Default)]
pub struct Registry {
    own: Rc<RefCell<Vec<(Str, AssetDef)>>>,
    parent: Option<Rc<Registry>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn with_parent(parent: &Registry) -> Registry {
        Registry {
            own: Rc::new(RefCell::new(Vec::new())),
            parent: Some(Rc::new(parent.clone())),
        }
    }

    pub fn insert(&self, name: &str, def: AssetDef) {
        let mut own = self.own.borrow_mut();
        if let Some(entry) = own.iter_mut().find(|(n, _)| &**n == name) {
            entry.1 = def;
        } else {
            own.push((Rc::from(name), def));
        }
    }

    pub fn get_own(&self, name: &str) -> Option<AssetDef> {
        self.own
            .borrow()
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, d)| d.clone())
    }

    pub fn own_entries(&self) -> Vec<(Str, AssetDef)> {
        self.own.borrow().clone()
    }

    fn lookup(&self, name: &str) -> Option<AssetDef> {
        self.get_own(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.lookup(name)))
    }

    /// Resolve an asset by id, then camelized, then PascalCase.
    pub fn resolve(&self, id: &str) -> Option<AssetDef> {
        if let Some(def) = self.lookup(id) {
            return Some(def);
        }
        let camelized = camelize(id);
        if let Some(def) = self.lookup(&camelized) {
            return Some(def);
        }
        self.lookup(&capitalize(&camelized))
    }

    fn same(&self, other: &Registry) -> bool {
        Rc::ptr_eq(&self.own, &other.own)
    }
}

// =============================================================================
// Option values and records
// =============================================================================

#[derive(Clone)]
pub enum OptionValue {
    Raw(Value),
    Data(DataDef),
    Props(Vec<(Str, PropOptions)>),
    Computed(Vec<(Str, ComputedDef)>),
    Methods(Vec<(Str, FnValue)>),
    Watch(Vec<(Str, Vec<WatchDef>)>),
    Provide(DataDef),
    Inject(Vec<(Str, InjectDef)>),
    Assets(Registry),
    Hooks(Vec<FnValue>),
    Mixins(Vec<Options>),
    Extends(Box<Options>),
    PropsData(Obj),
    Flag(bool),
}

fn entries_get<'a, T>(entries: &'a [(Str, T)], key: &str) -> Option<&'a T> {
    entries.iter().find(|(k, _)| &**k == key).map(|(_, v)| v)
}

fn entries_set<T>(entries: &mut Vec<(Str, T)>, key: Str, value: T) {
    if let Some(entry) = entries.iter_mut().find(|(k, _)| *k == key) {
        entry.1 = value;
    } else {
        entries.push((key, value));
    }
}

/// An option record: ordered `key → value` pairs.
#[derive(Clone, Default)]
pub struct Options {
    entries: Vec<(OptionKey, OptionValue)>,
}

impl Options {
    pub fn new() -> Options {
        Options::default()
    }

    pub fn get(&self, key: &OptionKey) -> Option<&OptionValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn set(&mut self, key: OptionKey, value: OptionValue) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn keys(&self) -> Vec<OptionKey> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn option_name(&self) -> Option<Str> {
        match self.get(&OptionKey::Name) {
            Some(OptionValue::Raw(Value::Str(name))) => Some(name.clone()),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Builder surface
    // -------------------------------------------------------------------------

    pub fn name(mut self, name: &str) -> Options {
        self.set(OptionKey::Name, OptionValue::Raw(Value::string(name)));
        self
    }

    pub fn el(mut self, selector: &str) -> Options {
        self.set(OptionKey::El, OptionValue::Raw(Value::string(selector)));
        self
    }

    pub fn data_fn(mut self, f: impl Fn(Option<&Instance>) -> Value + 'static) -> Options {
        self.set(
            OptionKey::Data,
            OptionValue::Data(DataDef::Factory(FnValue::simple(move |vm, _| f(vm)))),
        );
        self
    }

    /// Root-only object form of the data option.
    pub fn data_obj(mut self, data: Obj) -> Options {
        self.set(OptionKey::Data, OptionValue::Data(DataDef::Object(data)));
        self
    }

    /// Array-of-names prop declaration; names camelize, types stay open.
    pub fn prop_names(mut self, names: &[&str]) -> Options {
        let mut props = self.take_props();
        for name in names {
            entries_set(&mut props, camelize(name), PropOptions::any());
        }
        self.set(OptionKey::Props, OptionValue::Props(props));
        self
    }

    /// Name-to-type shorthand prop declaration.
    pub fn prop_type(self, name: &str, types: impl IntoIterator<Item = PropType>) -> Options {
        self.prop(name, PropOptions::of_type(types))
    }

    /// Full-descriptor prop declaration.
    pub fn prop(mut self, name: &str, options: PropOptions) -> Options {
        let mut props = self.take_props();
        entries_set(&mut props, camelize(name), options);
        self.set(OptionKey::Props, OptionValue::Props(props));
        self
    }

    fn take_props(&mut self) -> Vec<(Str, PropOptions)> {
        match self.get(&OptionKey::Props) {
            Some(OptionValue::Props(p)) => p.clone(),
            _ => Vec::new(),
        }
    }

    pub fn props_data(mut self, data: Obj) -> Options {
        self.set(OptionKey::PropsData, OptionValue::PropsData(data));
        self
    }

    pub fn computed(self, name: &str, get: impl Fn(&Instance) -> Value + 'static) -> Options {
        self.computed_def(
            name,
            ComputedDef {
                get: FnValue::simple(move |vm, _| match vm {
                    Some(vm) => get(vm),
                    None => Value::Null,
                }),
                set: None,
            },
        )
    }

    pub fn computed_def(mut self, name: &str, def: ComputedDef) -> Options {
        let mut computed = match self.get(&OptionKey::Computed) {
            Some(OptionValue::Computed(c)) => c.clone(),
            _ => Vec::new(),
        };
        entries_set(&mut computed, Rc::from(name), def);
        self.set(OptionKey::Computed, OptionValue::Computed(computed));
        self
    }

    pub fn method(
        mut self,
        name: &str,
        f: impl Fn(&Instance, &[Value]) -> Value + 'static,
    ) -> Options {
        let mut methods = match self.get(&OptionKey::Methods) {
            Some(OptionValue::Methods(m)) => m.clone(),
            _ => Vec::new(),
        };
        entries_set(
            &mut methods,
            Rc::from(name),
            FnValue::simple(move |vm, args| match vm {
                Some(vm) => f(vm, args),
                None => Value::Null,
            }),
        );
        self.set(OptionKey::Methods, OptionValue::Methods(methods));
        self
    }

    pub fn watch(mut self, path: &str, def: WatchDef) -> Options {
        let mut watch = match self.get(&OptionKey::Watch) {
            Some(OptionValue::Watch(w)) => w.clone(),
            _ => Vec::new(),
        };
        let key: Str = Rc::from(path);
        if let Some(entry) = watch.iter_mut().find(|(k, _)| *k == key) {
            entry.1.push(def);
        } else {
            watch.push((key, vec![def]));
        }
        self.set(OptionKey::Watch, OptionValue::Watch(watch));
        self
    }

    pub fn watch_fn(
        self,
        path: &str,
        cb: impl Fn(&Instance, &Value, &Value) + 'static,
    ) -> Options {
        self.watch(
            path,
            WatchDef::func(FnValue::new(move |vm, args| {
                let vm = vm.ok_or_else(|| RuntimeError::msg("watcher without instance"))?;
                let new_val = args.first().cloned().unwrap_or(Value::Null);
                let old_val = args.get(1).cloned().unwrap_or(Value::Null);
                cb(vm, &new_val, &old_val);
                Ok(Value::Null)
            })),
        )
    }

    pub fn hook(mut self, hook: Hook, f: impl Fn(&Instance) + 'static) -> Options {
        let key = OptionKey::Hook(hook);
        let mut hooks = match self.get(&key) {
            Some(OptionValue::Hooks(h)) => h.clone(),
            _ => Vec::new(),
        };
        hooks.push(FnValue::simple(move |vm, _| {
            if let Some(vm) = vm {
                f(vm);
            }
            Value::Null
        }));
        self.set(key, OptionValue::Hooks(hooks));
        self
    }

    pub fn hook_fn(mut self, hook: Hook, f: FnValue) -> Options {
        let key = OptionKey::Hook(hook);
        let mut hooks = match self.get(&key) {
            Some(OptionValue::Hooks(h)) => h.clone(),
            _ => Vec::new(),
        };
        hooks.push(f);
        self.set(key, OptionValue::Hooks(hooks));
        self
    }

    pub fn provide_fn(mut self, f: impl Fn(Option<&Instance>) -> Value + 'static) -> Options {
        self.set(
            OptionKey::Provide,
            OptionValue::Provide(DataDef::Factory(FnValue::simple(move |vm, _| f(vm)))),
        );
        self
    }

    pub fn provide_obj(mut self, provided: Obj) -> Options {
        self.set(
            OptionKey::Provide,
            OptionValue::Provide(DataDef::Object(provided)),
        );
        self
    }

    /// Array-of-names inject declaration: each key injects from itself.
    pub fn inject_names(mut self, names: &[&str]) -> Options {
        let mut inject = self.take_inject();
        for name in names {
            entries_set(
                &mut inject,
                Rc::from(*name),
                InjectDef {
                    from: Rc::from(*name),
                    default: None,
                },
            );
        }
        self.set(OptionKey::Inject, OptionValue::Inject(inject));
        self
    }

    /// `key: from` shorthand inject declaration.
    pub fn inject_from(mut self, key: &str, from: &str) -> Options {
        let mut inject = self.take_inject();
        entries_set(
            &mut inject,
            Rc::from(key),
            InjectDef {
                from: Rc::from(from),
                default: None,
            },
        );
        self.set(OptionKey::Inject, OptionValue::Inject(inject));
        self
    }

    /// Full-descriptor inject declaration; `from` defaults to the key.
    pub fn inject(mut self, key: &str, def: InjectDef) -> Options {
        let mut inject = self.take_inject();
        entries_set(&mut inject, Rc::from(key), def);
        self.set(OptionKey::Inject, OptionValue::Inject(inject));
        self
    }

    fn take_inject(&mut self) -> Vec<(Str, InjectDef)> {
        match self.get(&OptionKey::Inject) {
            Some(OptionValue::Inject(i)) => i.clone(),
            _ => Vec::new(),
        }
    }

    pub fn component(mut self, name: &str, def: AssetDef) -> Options {
        let registry = match self.get(&OptionKey::Components) {
            Some(OptionValue::Assets(r)) => r.clone(),
            _ => Registry::new(),
        };
        registry.insert(name, def);
        self.set(OptionKey::Components, OptionValue::Assets(registry));
        self
    }

    pub fn directive(mut self, name: &str, def: DirectiveDef) -> Options {
        let registry = match self.get(&OptionKey::Directives) {
            Some(OptionValue::Assets(r)) => r.clone(),
            _ => Registry::new(),
        };
        registry.insert(name, AssetDef::Directive(def));
        self.set(OptionKey::Directives, OptionValue::Assets(registry));
        self
    }

    pub fn directive_fn(self, name: &str, f: FnValue) -> Options {
        self.directive(name, normalize_directive_fn(f))
    }

    pub fn filter(mut self, name: &str, f: FnValue) -> Options {
        let registry = match self.get(&OptionKey::Filters) {
            Some(OptionValue::Assets(r)) => r.clone(),
            _ => Registry::new(),
        };
        registry.insert(name, AssetDef::Filter(f));
        self.set(OptionKey::Filters, OptionValue::Assets(registry));
        self
    }

    pub fn mixin(mut self, mixin: Options) -> Options {
        let mut mixins = match self.get(&OptionKey::Mixins) {
            Some(OptionValue::Mixins(m)) => m.clone(),
            _ => Vec::new(),
        };
        mixins.push(mixin);
        self.set(OptionKey::Mixins, OptionValue::Mixins(mixins));
        self
    }

    pub fn extends_options(mut self, base: Options) -> Options {
        self.set(OptionKey::Extends, OptionValue::Extends(Box::new(base)));
        self
    }
}

// =============================================================================
// Strategy table
// =============================================================================

pub type MergeStrategy = Rc<
    dyn Fn(
        Option<&OptionValue>,
        Option<&OptionValue>,
        Option<&Instance>,
        &OptionKey,
    ) -> Option<OptionValue>,
>;

thread_local! {
    static STRATS: RefCell<FxHashMap<OptionKey, MergeStrategy>> =
        RefCell::new(default_strategies());
}

/// Register (or replace) the merge strategy for an option key. Entries should
/// be set before any instance is created.
pub fn set_merge_strategy(key: OptionKey, strat: MergeStrategy) {
    STRATS.with(|s| {
        s.borrow_mut().insert(key, strat);
    });
}

/// Restore the built-in strategy table (for testing).
pub fn reset_merge_strategies() {
    STRATS.with(|s| *s.borrow_mut() = default_strategies());
}

fn default_strategy(
    parent: Option<&OptionValue>,
    child: Option<&OptionValue>,
) -> Option<OptionValue> {
    child.or(parent).cloned()
}

fn default_strategies() -> FxHashMap<OptionKey, MergeStrategy> {
    let mut strats: FxHashMap<OptionKey, MergeStrategy> = FxHashMap::default();

    // el / propsData exist only at instantiation
    let instance_only: MergeStrategy = Rc::new(|parent, child, vm, key| {
        if vm.is_none() {
            warn(
                &format!(
                    "option \"{key:?}\" can only be used during instance \
                     creation with the `new` keyword."
                ),
                None,
            );
        }
        default_strategy(parent, child)
    });
    strats.insert(OptionKey::El, instance_only.clone());
    strats.insert(OptionKey::PropsData, instance_only);

    // data and provide merge into an access-time thunk
    strats.insert(OptionKey::Data, Rc::new(merge_data_strategy));
    strats.insert(OptionKey::Provide, Rc::new(merge_data_strategy));

    // lifecycle hooks concatenate with order-preserving dedup
    for hook in Hook::ALL {
        strats.insert(OptionKey::Hook(hook), Rc::new(merge_hooks));
    }

    // asset registries layer child entries over the parent chain
    for key in [
        OptionKey::Components,
        OptionKey::Directives,
        OptionKey::Filters,
    ] {
        strats.insert(key, Rc::new(merge_assets));
    }

    strats.insert(OptionKey::Watch, Rc::new(merge_watch));

    for key in [
        OptionKey::Props,
        OptionKey::Methods,
        OptionKey::Inject,
        OptionKey::Computed,
    ] {
        strats.insert(key, Rc::new(merge_shallow));
    }

    strats
}

fn merge_data_strategy(
    parent: Option<&OptionValue>,
    child: Option<&OptionValue>,
    vm: Option<&Instance>,
    key: &OptionKey,
) -> Option<OptionValue> {
    let wrap = |def: DataDef| match key {
        OptionKey::Provide => OptionValue::Provide(def),
        _ => OptionValue::Data(def),
    };
    let parent_def = match parent {
        Some(OptionValue::Data(d)) | Some(OptionValue::Provide(d)) => Some(d.clone()),
        _ => None,
    };
    let child_def = match child {
        Some(OptionValue::Data(d)) | Some(OptionValue::Provide(d)) => Some(d.clone()),
        _ => None,
    };
    if vm.is_none() {
        // in a component definition both sides must be factories
        if let (Some(DataDef::Object(_)), OptionKey::Data) =
            (&child_def, key)
        {
            warn(
                "The \"data\" option should be a function that returns a \
                 per-instance value in component definitions.",
                None,
            );
            return parent_def.map(wrap);
        }
    }
    match (parent_def, child_def) {
        (None, None) => None,
        (Some(p), None) => Some(wrap(p)),
        (None, Some(c)) => Some(wrap(c)),
        (Some(p), Some(c)) => Some(wrap(DataDef::Merged(Rc::new(c), Rc::new(p)))),
    }
}

fn merge_hooks(
    parent: Option<&OptionValue>,
    child: Option<&OptionValue>,
    _vm: Option<&Instance>,
    _key: &OptionKey,
) -> Option<OptionValue> {
    let parent_hooks = match parent {
        Some(OptionValue::Hooks(h)) => h.clone(),
        _ => Vec::new(),
    };
    let child_hooks = match child {
        Some(OptionValue::Hooks(h)) => h.as_slice(),
        _ => &[],
    };
    let mut merged = parent_hooks;
    for hook in child_hooks {
        if !merged.iter().any(|existing| existing.ptr_eq(hook)) {
            merged.push(hook.clone());
        }
    }
    if merged.is_empty() {
        None
    } else {
        Some(OptionValue::Hooks(merged))
    }
}

fn merge_assets(
    parent: Option<&OptionValue>,
    child: Option<&OptionValue>,
    _vm: Option<&Instance>,
    _key: &OptionKey,
) -> Option<OptionValue> {
    let parent_reg = match parent {
        Some(OptionValue::Assets(r)) => r.clone(),
        _ => Registry::new(),
    };
    let merged = Registry::with_parent(&parent_reg);
    if let Some(OptionValue::Assets(child_reg)) = child {
        for (name, def) in child_reg.own_entries() {
            merged.insert(&name, def);
        }
    }
    Some(OptionValue::Assets(merged))
}

fn merge_watch(
    parent: Option<&OptionValue>,
    child: Option<&OptionValue>,
    _vm: Option<&Instance>,
    _key: &OptionKey,
) -> Option<OptionValue> {
    let parent_watch = match parent {
        Some(OptionValue::Watch(w)) => w.clone(),
        _ => Vec::new(),
    };
    let child_watch = match child {
        Some(OptionValue::Watch(w)) => w.as_slice(),
        _ => &[],
    };
    let mut merged = parent_watch;
    for (key, defs) in child_watch {
        if let Some(entry) = merged.iter_mut().find(|(k, _)| k == key) {
            entry.1.extend(defs.iter().cloned());
        } else {
            merged.push((key.clone(), defs.clone()));
        }
    }
    if merged.is_empty() {
        None
    } else {
        Some(OptionValue::Watch(merged))
    }
}

fn merge_shallow(
    parent: Option<&OptionValue>,
    child: Option<&OptionValue>,
    _vm: Option<&Instance>,
    _key: &OptionKey,
) -> Option<OptionValue> {
    match (parent, child) {
        (None, None) => None,
        (Some(p), None) => Some(p.clone()),
        (None, Some(c)) => Some(c.clone()),
        (Some(OptionValue::Props(p)), Some(OptionValue::Props(c))) => {
            let mut merged = p.clone();
            for (k, v) in c {
                entries_set(&mut merged, k.clone(), v.clone());
            }
            Some(OptionValue::Props(merged))
        }
        (Some(OptionValue::Methods(p)), Some(OptionValue::Methods(c))) => {
            let mut merged = p.clone();
            for (k, v) in c {
                entries_set(&mut merged, k.clone(), v.clone());
            }
            Some(OptionValue::Methods(merged))
        }
        (Some(OptionValue::Inject(p)), Some(OptionValue::Inject(c))) => {
            let mut merged = p.clone();
            for (k, v) in c {
                entries_set(&mut merged, k.clone(), v.clone());
            }
            Some(OptionValue::Inject(merged))
        }
        (Some(OptionValue::Computed(p)), Some(OptionValue::Computed(c))) => {
            let mut merged = p.clone();
            for (k, v) in c {
                entries_set(&mut merged, k.clone(), v.clone());
            }
            Some(OptionValue::Computed(merged))
        }
        (_, Some(c)) => Some(c.clone()),
    }
}

// =============================================================================
// merge_options
// =============================================================================

/// Merge a child record over a parent, folding `extends` and `mixins` of the
/// child first (unless the child is already a merged record).
pub fn merge_options(parent: &Options, child: &Options, vm: Option<&Instance>) -> Options {
    check_components(child);

    let mut parent = parent.clone();
    if child.get(&OptionKey::Base).is_none() {
        if let Some(OptionValue::Extends(extends)) = child.get(&OptionKey::Extends) {
            parent = merge_options(&parent, extends, vm);
        }
        if let Some(OptionValue::Mixins(mixins)) = child.get(&OptionKey::Mixins) {
            for mixin in mixins.clone() {
                parent = merge_options(&parent, &mixin, vm);
            }
        }
    }

    let mut keys = parent.keys();
    for key in child.keys() {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    let mut out = Options::new();
    for key in keys {
        let strat = STRATS.with(|s| s.borrow().get(&key).cloned());
        let merged = match strat {
            Some(strat) => strat(parent.get(&key), child.get(&key), vm, &key),
            None => default_strategy(parent.get(&key), child.get(&key)),
        };
        if let Some(value) = merged {
            out.set(key, value);
        }
    }
    out
}

fn check_components(options: &Options) {
    if let Some(OptionValue::Assets(registry)) = options.get(&OptionKey::Components) {
        for (name, _) in registry.own_entries() {
            if let Err(msg) = validate_component_name(&name) {
                warn(&msg, None);
            }
        }
    }
}

/// Coarse identity comparison between option values, used to detect options
/// modified after a subclass sealed its snapshot. Returning `false` when
/// unsure only causes a harmless re-merge.
pub(crate) fn option_value_same(a: &OptionValue, b: &OptionValue) -> bool {
    match (a, b) {
        (OptionValue::Raw(a), OptionValue::Raw(b)) => a == b,
        (OptionValue::Data(a), OptionValue::Data(b)) => a.same(b),
        (OptionValue::Provide(a), OptionValue::Provide(b)) => a.same(b),
        (OptionValue::Hooks(a), OptionValue::Hooks(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.ptr_eq(y))
        }
        (OptionValue::Methods(a), OptionValue::Methods(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|((ka, va), (kb, vb))| ka == kb && va.ptr_eq(vb))
        }
        (OptionValue::Assets(a), OptionValue::Assets(b)) => a.same(b),
        (OptionValue::Props(a), OptionValue::Props(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|((ka, _), (kb, _))| ka == kb)
        }
        (OptionValue::Computed(a), OptionValue::Computed(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|((ka, va), (kb, vb))| ka == kb && va.get.ptr_eq(&vb.get))
        }
        (OptionValue::Watch(a), OptionValue::Watch(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|((ka, va), (kb, vb))| ka == kb && va.len() == vb.len())
        }
        (OptionValue::Inject(a), OptionValue::Inject(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|((ka, _), (kb, _))| ka == kb)
        }
        (OptionValue::PropsData(a), OptionValue::PropsData(b)) => a.ptr_eq(b),
        (OptionValue::Flag(a), OptionValue::Flag(b)) => a == b,
        _ => false,
    }
}

pub(crate) fn entries_lookup<'a, T>(entries: &'a [(Str, T)], key: &str) -> Option<&'a T> {
    entries_get(entries, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_merge_concatenates_and_dedupes() {
        let shared = FnValue::simple(|_, _| Value::Null);
        let parent = Options::new()
            .hook_fn(Hook::Created, shared.clone())
            .hook_fn(Hook::Created, FnValue::simple(|_, _| Value::Null));
        let child = Options::new()
            .hook_fn(Hook::Created, shared.clone())
            .hook_fn(Hook::Created, FnValue::simple(|_, _| Value::Null));

        let merged = merge_options(&parent, &child, None);
        let Some(OptionValue::Hooks(hooks)) = merged.get(&OptionKey::Hook(Hook::Created)) else {
            panic!("expected hooks");
        };
        // parent's two + child's non-duplicate one
        assert_eq!(hooks.len(), 3);
        assert!(hooks[0].ptr_eq(&shared));
    }

    #[test]
    fn test_shallow_merge_child_wins() {
        let parent = Options::new()
            .method("a", |_, _| Value::from(1))
            .method("b", |_, _| Value::from(2));
        let child = Options::new().method("b", |_, _| Value::from(20));

        let merged = merge_options(&parent, &child, None);
        let Some(OptionValue::Methods(methods)) = merged.get(&OptionKey::Methods) else {
            panic!("expected methods");
        };
        assert_eq!(methods.len(), 2);
        let b = entries_get(methods, "b").unwrap();
        assert_eq!(b.call(None, &[]).unwrap(), Value::from(20));
    }

    #[test]
    fn test_data_merge_without_instance_returns_thunk() {
        let parent = Options::new()
            .data_fn(|_| Value::Object(Obj::from_pairs([("a", Value::from(1))])));
        let child = Options::new()
            .data_fn(|_| Value::Object(Obj::from_pairs([("b", Value::from(2))])));

        let merged = merge_options(&parent, &child, None);
        let Some(OptionValue::Data(def)) = merged.get(&OptionKey::Data) else {
            panic!("expected data");
        };
        assert!(matches!(def, DataDef::Merged(_, _)));

        let data = def.eval(None);
        let data = data.as_obj().unwrap();
        assert_eq!(data.get_raw("a"), Some(Value::from(1)));
        assert_eq!(data.get_raw("b"), Some(Value::from(2)));
    }

    #[test]
    fn test_merge_is_idempotent_on_canonical_records() {
        let parent = Options::new().method("m", |_, _| Value::Null).prop_names(&["x"]);
        let child = Options::new();

        let once = merge_options(&parent, &child, None);
        let twice = merge_options(&once, &child, None);
        assert_eq!(once.keys(), twice.keys());
        let (Some(OptionValue::Methods(a)), Some(OptionValue::Methods(b))) =
            (once.get(&OptionKey::Methods), twice.get(&OptionKey::Methods))
        else {
            panic!("expected methods");
        };
        assert!(option_value_same(
            &OptionValue::Methods(a.clone()),
            &OptionValue::Methods(b.clone())
        ));
    }

    #[test]
    fn test_watch_merge_concatenates_per_key() {
        let parent = Options::new().watch("n", WatchDef::func(FnValue::simple(|_, _| Value::Null)));
        let child = Options::new().watch("n", WatchDef::func(FnValue::simple(|_, _| Value::Null)));

        let merged = merge_options(&parent, &child, None);
        let Some(OptionValue::Watch(watch)) = merged.get(&OptionKey::Watch) else {
            panic!("expected watch");
        };
        assert_eq!(watch.len(), 1);
        assert_eq!(watch[0].1.len(), 2);
    }

    #[test]
    fn test_mixins_fold_into_parent() {
        let mixin = Options::new().method("from_mixin", |_, _| Value::from(1));
        let child = Options::new()
            .method("own", |_, _| Value::from(2))
            .mixin(mixin);

        let merged = merge_options(&Options::new(), &child, None);
        let Some(OptionValue::Methods(methods)) = merged.get(&OptionKey::Methods) else {
            panic!("expected methods");
        };
        assert!(entries_get(methods, "from_mixin").is_some());
        assert!(entries_get(methods, "own").is_some());
    }

    #[test]
    fn test_asset_registry_prototype_chain() {
        let parent_reg = Registry::new();
        parent_reg.insert("my-widget", AssetDef::Filter(FnValue::simple(|_, _| Value::Null)));
        let mut parent = Options::new();
        parent.set(OptionKey::Filters, OptionValue::Assets(parent_reg.clone()));

        let merged = merge_options(&parent, &Options::new(), None);
        let Some(OptionValue::Assets(reg)) = merged.get(&OptionKey::Filters) else {
            panic!("expected assets");
        };
        assert!(reg.resolve("my-widget").is_some());

        // registrations on the parent after the merge remain visible
        parent_reg.insert("late", AssetDef::Filter(FnValue::simple(|_, _| Value::Null)));
        assert!(reg.resolve("late").is_some());
        // and resolve falls back through name variants
        assert!(reg.resolve("myWidget").is_some());
    }

    #[test]
    fn test_invalid_component_name_warns() {
        use std::cell::Cell;
        let count = Rc::new(Cell::new(0));
        let count_handler = count.clone();
        crate::util::set_warn_handler(move |_, _| count_handler.set(count_handler.get() + 1));

        let child = Options::new().component(
            "div",
            AssetDef::Filter(FnValue::simple(|_, _| Value::Null)),
        );
        merge_options(&Options::new(), &child, None);
        assert_eq!(count.get(), 1);
        crate::util::reset_warn_state();
    }
}
